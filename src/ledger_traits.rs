use crate::error::LedgerResult;
use crate::events::Receipt;
use crate::id::AccountId;
use crate::units::{Amount, UnitId};

/// Divisible view of the ledger
pub trait FungibleLedger {
    /// Total balance of an account: loose value plus value locked in owned units
    fn balance_of(&self, account: &AccountId) -> Amount;

    /// Sum of every account's total balance
    fn total_supply(&self) -> Amount;

    /// Remaining fungible allowance `owner` granted to `spender`
    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount;

    /// Move fungible value from the caller to `to`
    ///
    /// # Parameters
    /// * `caller` - The sending account
    /// * `to` - The receiving account; must not be null
    /// * `amount` - Value to move; may exceed the caller's loose balance, in
    ///   which case whole units are withdrawn to the bank to cover the shortfall
    ///
    /// # Returns
    /// The receipt of the committed transfer
    fn transfer(&mut self, caller: &AccountId, to: &AccountId, amount: Amount)
        -> LedgerResult<Receipt>;

    /// Move fungible value on behalf of `from`, consuming the caller's allowance
    ///
    /// # Parameters
    /// * `caller` - The spender
    /// * `from` - The account being debited
    /// * `to` - The receiving account
    /// * `amount` - Value to move
    ///
    /// # Returns
    /// The receipt of the committed transfer
    fn transfer_from_amount(
        &mut self,
        caller: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> LedgerResult<Receipt>;

    /// Set a fungible allowance without unit-id dispatch
    ///
    /// Unlike `Ledger::approve`, the value is never interpreted as a unit id.
    fn set_allowance(
        &mut self,
        caller: &AccountId,
        spender: &AccountId,
        value: Amount,
    ) -> LedgerResult<Receipt>;

    /// Destroy fungible value held by the caller
    fn burn(&mut self, caller: &AccountId, amount: Amount) -> LedgerResult<Receipt>;
}

/// Discrete-unit view of the ledger
pub trait DiscreteUnitLedger {
    /// Current owner of a unit
    ///
    /// # Returns
    /// The owner, `InvalidUnitId` outside the reserved range, or `NotFound` for
    /// ids that were never issued or are held by the bank
    fn owner_of(&self, id: UnitId) -> LedgerResult<AccountId>;

    /// Whether the unit is currently owned by an account
    fn exists(&self, id: UnitId) -> bool;

    /// Units owned by an account, in owned-set order
    fn units_of(&self, account: &AccountId) -> &[UnitId];

    /// Number of units owned by an account
    fn unit_count(&self, account: &AccountId) -> usize;

    /// Spender approved for a single unit, if any
    fn get_approved(&self, id: UnitId) -> LedgerResult<Option<AccountId>>;

    /// Whether `operator` may move every unit of `owner`
    fn is_approved_for_all(&self, owner: &AccountId, operator: &AccountId) -> bool;

    /// Approve `spender` for one unit; a null spender clears the approval
    fn approve_unit(
        &mut self,
        caller: &AccountId,
        spender: &AccountId,
        id: UnitId,
    ) -> LedgerResult<Receipt>;

    /// Grant or revoke blanket approval over the caller's units
    fn set_approval_for_all(
        &mut self,
        caller: &AccountId,
        operator: &AccountId,
        approved: bool,
    ) -> LedgerResult<Receipt>;

    /// Move one unit together with its backing value
    fn transfer_unit_from(
        &mut self,
        caller: &AccountId,
        from: &AccountId,
        to: &AccountId,
        id: UnitId,
    ) -> LedgerResult<Receipt> {
        self.safe_transfer_unit_from(caller, from, to, id, &[])
    }

    /// Move one unit, passing `data` to a program recipient's receiver
    ///
    /// # Parameters
    /// * `caller` - The owner, a blanket operator of the owner, or the unit's approved spender
    /// * `from` - The unit's current owner
    /// * `to` - The receiving account
    /// * `id` - The unit to move
    /// * `data` - Opaque data handed to the recipient's receiver
    ///
    /// # Returns
    /// The receipt of the committed transfer
    fn safe_transfer_unit_from(
        &mut self,
        caller: &AccountId,
        from: &AccountId,
        to: &AccountId,
        id: UnitId,
        data: &[u8],
    ) -> LedgerResult<Receipt>;
}
