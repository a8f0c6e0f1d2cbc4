use crate::error::{LedgerError, LedgerResult};
use crate::id::AccountId;
use crate::units::Amount;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Loose fungible balances per account plus the total supply
///
/// Only the loose component is stored. The locked component is derived by the
/// ledger from the unit registry as `units * unit_size`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceLedger {
    loose: HashMap<AccountId, Amount>,
    total_supply: Amount,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loose(&self, account: &AccountId) -> Amount {
        self.loose.get(account).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Sum of every loose balance
    pub fn total_loose(&self) -> Amount {
        self.loose.values().fold(0, |acc, value| acc.saturating_add(*value))
    }

    pub fn credit(&mut self, account: &AccountId, amount: Amount) -> LedgerResult<()> {
        let current = self.loose(account);
        let updated = current
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.store(account, updated);
        Ok(())
    }

    /// Subtract from the loose component only; fails if that would go negative
    pub fn debit(&mut self, account: &AccountId, amount: Amount) -> LedgerResult<()> {
        let current = self.loose(account);
        let updated = current
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                who: *account,
                have: current,
                need: amount,
            })?;
        self.store(account, updated);
        Ok(())
    }

    pub fn increase_supply(&mut self, amount: Amount) -> LedgerResult<()> {
        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        Ok(())
    }

    pub fn decrease_supply(&mut self, amount: Amount) -> LedgerResult<()> {
        self.total_supply = self
            .total_supply
            .checked_sub(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        Ok(())
    }

    fn store(&mut self, account: &AccountId, value: Amount) {
        if value == 0 {
            self.loose.remove(account);
        } else {
            self.loose.insert(*account, value);
        }
    }
}
