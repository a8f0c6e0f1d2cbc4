use crate::id::AccountId;
use crate::units::{Amount, UnitId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Value a receiver must return to accept a unit
pub const UNIT_RECEIVED_MAGIC: [u8; 4] = [0x15, 0x0b, 0x7a, 0x02];

/// Decides who may change ledger configuration
pub trait AdminGate: Send {
    fn is_admin(&self, caller: &AccountId) -> bool;
}

/// Exactly one admin account
#[derive(Debug, Clone, Copy)]
pub struct SingleAdmin(pub AccountId);

impl AdminGate for SingleAdmin {
    fn is_admin(&self, caller: &AccountId) -> bool {
        *caller == self.0
    }
}

/// Everyone is an admin; for tools and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenGate;

impl AdminGate for OpenGate {
    fn is_admin(&self, _caller: &AccountId) -> bool {
        true
    }
}

/// Destination for payments attached to paid issuance
pub trait PaymentSink: Send {
    /// Forward `amount` paid by `payer`
    ///
    /// # Returns
    /// Ok(()) once the payment is accepted, Err with a reason otherwise
    fn forward(&mut self, payer: &AccountId, amount: Amount) -> Result<(), String>;
}

/// In-memory treasury recording every forwarded payment
///
/// Clones share the same record, so a caller can keep a handle after giving
/// one to the ledger.
#[derive(Debug, Clone, Default)]
pub struct Treasury {
    received: Arc<Mutex<Vec<(AccountId, Amount)>>>,
    rejecting: Arc<Mutex<bool>>,
}

impl Treasury {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later forward fail (or succeed again)
    pub fn set_rejecting(&self, rejecting: bool) {
        if let Ok(mut guard) = self.rejecting.lock() {
            *guard = rejecting;
        }
    }

    pub fn payments(&self) -> Vec<(AccountId, Amount)> {
        self.received
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn total_received(&self) -> Amount {
        self.payments().iter().map(|(_, amount)| *amount).sum()
    }
}

impl PaymentSink for Treasury {
    fn forward(&mut self, payer: &AccountId, amount: Amount) -> Result<(), String> {
        let rejecting = *self
            .rejecting
            .lock()
            .map_err(|e| format!("Failed to acquire treasury lock: {}", e))?;
        if rejecting {
            return Err("treasury is not accepting payments".to_string());
        }
        self.received
            .lock()
            .map_err(|e| format!("Failed to acquire treasury lock: {}", e))?
            .push((*payer, amount));
        Ok(())
    }
}

/// Callback a program account implements to accept incoming units
pub trait UnitReceiver: Send + Sync {
    /// Called before a unit is moved to the program account
    ///
    /// # Parameters
    /// * `operator` - The caller performing the transfer
    /// * `from` - The unit's current owner
    /// * `id` - The unit being transferred
    /// * `data` - Opaque data supplied by the caller
    ///
    /// # Returns
    /// `UNIT_RECEIVED_MAGIC` to accept; any other value or an error rejects
    fn on_unit_received(
        &self,
        operator: &AccountId,
        from: &AccountId,
        id: UnitId,
        data: &[u8],
    ) -> Result<[u8; 4], String>;
}

impl<F> UnitReceiver for F
where
    F: Fn(&AccountId, &AccountId, UnitId, &[u8]) -> Result<[u8; 4], String> + Send + Sync,
{
    fn on_unit_received(
        &self,
        operator: &AccountId,
        from: &AccountId,
        id: UnitId,
        data: &[u8],
    ) -> Result<[u8; 4], String> {
        self(operator, from, id, data)
    }
}

/// Receivers registered for program accounts
#[derive(Default)]
pub struct ReceiverRegistry {
    receivers: HashMap<AccountId, Box<dyn UnitReceiver>>,
}

impl ReceiverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, account: AccountId, receiver: Box<dyn UnitReceiver>) {
        self.receivers.insert(account, receiver);
    }

    pub fn unregister(&mut self, account: &AccountId) -> bool {
        self.receivers.remove(account).is_some()
    }

    /// Whether a move of `id` to `to` is acknowledged
    ///
    /// Non-program recipients always accept. A program recipient accepts only if
    /// it has a receiver and that receiver returns the magic value.
    pub fn accepts(
        &self,
        operator: &AccountId,
        from: &AccountId,
        to: &AccountId,
        id: UnitId,
        data: &[u8],
    ) -> bool {
        if !to.is_program() {
            return true;
        }
        match self.receivers.get(to) {
            Some(receiver) => matches!(
                receiver.on_unit_received(operator, from, id, data),
                Ok(magic) if magic == UNIT_RECEIVED_MAGIC
            ),
            None => false,
        }
    }
}

impl std::fmt::Debug for ReceiverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverRegistry")
            .field("receivers", &self.receivers.keys().collect::<Vec<_>>())
            .finish()
    }
}
