use crate::error::{LedgerError, LedgerResult};
use crate::ledger::Ledger;
use std::sync::{Arc, Mutex, MutexGuard};

/// A ledger shared between threads with exactly one writer at a time
///
/// Every call takes the lock for its whole duration, so operations never
/// interleave. Clones refer to the same ledger.
#[derive(Debug, Clone)]
pub struct SharedLedger {
    inner: Arc<Mutex<Ledger>>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, Ledger>> {
        self.inner
            .lock()
            .map_err(|e| LedgerError::LockPoisoned(format!("Failed to acquire ledger lock: {}", e)))
    }

    /// Run one closure with exclusive access to the ledger
    pub fn with<T>(&self, f: impl FnOnce(&mut Ledger) -> LedgerResult<T>) -> LedgerResult<T> {
        let mut ledger = self.lock()?;
        f(&mut ledger)
    }

    /// Run a batch of operations that commits entirely or not at all
    pub fn transact<T>(&self, batch: impl FnOnce(&mut Ledger) -> LedgerResult<T>) -> LedgerResult<T> {
        let mut ledger = self.lock()?;
        ledger.transact(batch)
    }

    /// Read-only access
    pub fn read<T>(&self, f: impl FnOnce(&Ledger) -> T) -> LedgerResult<T> {
        let ledger = self.lock()?;
        Ok(f(&ledger))
    }
}
