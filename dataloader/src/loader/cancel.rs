//! Bookkeeping for pending retrievals that accept cancellation.

use super::LoaderShared;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Abort tokens of retrievals that are currently pending.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    next_key: u64,
    tokens: HashMap<u64, CancellationToken>,
}

impl InFlight {
    fn insert(&mut self, token: CancellationToken) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        self.tokens.insert(key, token);
        key
    }

    fn remove(&mut self, key: u64) {
        self.tokens.remove(&key);
    }

    /// Take every registered token, leaving the set empty.
    pub(crate) fn drain(&mut self) -> Vec<CancellationToken> {
        self.tokens.drain().map(|(_, token)| token).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tokens.len()
    }
}

/// RAII registration of one pending retrieval's abort token.
///
/// Dropped while still armed (the retrieval never settled), the token is
/// cancelled. Call [`AbortGuard::disarm`] once the retrieval has settled.
pub(crate) struct AbortGuard {
    shared: Arc<LoaderShared>,
    key: Option<u64>,
    token: CancellationToken,
    armed: bool,
}

impl AbortGuard {
    /// Register `token` with the loader.
    ///
    /// A loader that is already disposed cancels the token right away.
    pub(crate) fn register(shared: &Arc<LoaderShared>, token: CancellationToken) -> Self {
        let key = {
            let mut inner = shared.inner.lock();
            if inner.state.is_disposed() {
                None
            } else {
                Some(inner.in_flight.insert(token.clone()))
            }
        };

        if key.is_none() {
            token.cancel();
        }

        Self {
            shared: Arc::clone(shared),
            key,
            token,
            armed: true,
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key {
            self.shared.inner.lock().in_flight.remove(key);
        }

        if !self.armed {
            return;
        }

        tracing::debug!("Pending retrieval dropped before settling, cancelling it");
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::DataLoader;

    #[test]
    fn test_guard_registers_and_unregisters() {
        let loader = DataLoader::new();
        let token = CancellationToken::new();

        let mut guard = AbortGuard::register(loader.shared(), token.clone());
        assert_eq!(loader.shared().inner.lock().in_flight.len(), 1);

        guard.disarm();
        drop(guard);

        assert_eq!(loader.shared().inner.lock().in_flight.len(), 0);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_armed_guard_cancels_on_drop() {
        let loader = DataLoader::new();
        let token = CancellationToken::new();

        drop(AbortGuard::register(loader.shared(), token.clone()));

        assert!(token.is_cancelled());
    }

    #[test]
    fn test_register_after_dispose_cancels_immediately() {
        let loader = DataLoader::new();
        loader.dispose();
        let token = CancellationToken::new();

        let mut guard = AbortGuard::register(loader.shared(), token.clone());
        guard.disarm();

        assert!(token.is_cancelled());
        assert_eq!(loader.shared().inner.lock().in_flight.len(), 0);
    }

    #[test]
    fn test_drain_empties_set() {
        let mut in_flight = InFlight::default();
        in_flight.insert(CancellationToken::new());
        in_flight.insert(CancellationToken::new());

        assert_eq!(in_flight.drain().len(), 2);
        assert_eq!(in_flight.len(), 0);
    }
}
