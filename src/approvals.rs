use crate::error::{LedgerError, LedgerResult};
use crate::id::AccountId;
use crate::units::Amount;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Allowance value that is never decremented
pub const UNLIMITED_ALLOWANCE: Amount = Amount::MAX;

/// Fungible allowances and blanket operator approvals
///
/// Single-unit approvals live on the unit's registry record so they are cleared
/// by the same move that changes the unit's owner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalStore {
    allowances: HashMap<(AccountId, AccountId), Amount>,
    operators: HashSet<(AccountId, AccountId)>,
}

impl ApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    /// Overwrite the allowance `owner` grants `spender`
    pub fn set_allowance(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        value: Amount,
    ) -> LedgerResult<()> {
        if spender.is_null() {
            return Err(LedgerError::InvalidSpender(*spender));
        }
        if value == 0 {
            self.allowances.remove(&(*owner, *spender));
        } else {
            self.allowances.insert((*owner, *spender), value);
        }
        Ok(())
    }

    /// Check that `spender` may move `amount` on behalf of `owner`
    pub fn check_allowance(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> LedgerResult<()> {
        let have = self.allowance(owner, spender);
        if have != UNLIMITED_ALLOWANCE && have < amount {
            return Err(LedgerError::InsufficientAllowance {
                spender: *spender,
                have,
                need: amount,
            });
        }
        Ok(())
    }

    /// Consume `amount` of allowance; the unlimited sentinel is left untouched
    pub fn spend_allowance(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> LedgerResult<()> {
        self.check_allowance(owner, spender, amount)?;
        let have = self.allowance(owner, spender);
        if have != UNLIMITED_ALLOWANCE {
            self.set_allowance(owner, spender, have - amount)?;
        }
        Ok(())
    }

    pub fn set_approval_for_all(
        &mut self,
        owner: &AccountId,
        operator: &AccountId,
        approved: bool,
    ) -> LedgerResult<()> {
        if operator.is_null() {
            return Err(LedgerError::InvalidOperator(*operator));
        }
        if approved {
            self.operators.insert((*owner, *operator));
        } else {
            self.operators.remove(&(*owner, *operator));
        }
        Ok(())
    }

    pub fn is_approved_for_all(&self, owner: &AccountId, operator: &AccountId) -> bool {
        self.operators.contains(&(*owner, *operator))
    }
}
