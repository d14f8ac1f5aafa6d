//! Types shared between the dataloader library and its tooling.

pub mod errors;

pub use errors::{LoaderError, LoaderResult, TaskError};
