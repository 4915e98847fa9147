//! Per-environment document locks
//!
//! Every read and write of an environment's document goes through the lock
//! returned here. Readers share it; writers are exclusive. Environments never
//! contend with each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;

/// Lazily created reader/writer lock per environment
#[derive(Debug, Default)]
pub struct EnvironmentLocks {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl EnvironmentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding `environment`'s document
    pub fn lock_for(&self, environment: &str) -> Arc<RwLock<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(environment.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_same_environment_same_lock() {
        let locks = EnvironmentLocks::new();
        let a = locks.lock_for("test");
        let b = locks.lock_for("test");
        let c = locks.lock_for("production");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_guard_outlives_registry_lookup() {
        let locks = EnvironmentLocks::new();
        tokio_test::block_on(async {
            let guard = locks.lock_for("test").write_owned().await;
            assert!(locks.lock_for("test").try_read().is_err());
            drop(guard);
            assert!(locks.lock_for("test").try_write().is_ok());
        });
    }

    #[tokio::test]
    async fn test_writer_excludes_readers() {
        let locks = EnvironmentLocks::new();
        let lock = locks.lock_for("test");

        let writer = lock.write().await;
        assert!(lock.try_read().is_err());
        // Other environments are unaffected
        assert!(locks.lock_for("production").try_write().is_ok());
        drop(writer);

        let r1 = lock.read().await;
        let r2 = tokio::time::timeout(Duration::from_millis(50), lock.read())
            .await
            .expect("readers share the lock");
        drop((r1, r2));
    }
}
