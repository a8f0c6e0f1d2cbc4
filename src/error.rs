use crate::id::AccountId;
use crate::units::{Amount, UnitId};
use thiserror::Error;

/// Represents all possible errors that can occur when operating on the hybrid ledger
///
/// Every variant is terminal for the operation that produced it: the ledger
/// validates before it mutates, so a returned error means no state changed.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Fungible debit exceeds the account's total balance
    #[error("Insufficient balance: {who} has {have}, needs {need}")]
    InsufficientBalance {
        who: AccountId,
        have: Amount,
        need: Amount,
    },

    /// Delegated debit exceeds the granted allowance
    #[error("Insufficient allowance: {spender} has {have}, needs {need}")]
    InsufficientAllowance {
        spender: AccountId,
        have: Amount,
        need: Amount,
    },

    /// Caller lacks rights over a unit, an owner's units, or an admin action
    #[error("Unauthorized: {caller} {reason}")]
    Unauthorized { caller: AccountId, reason: String },

    /// The null account was used as a recipient
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(AccountId),

    /// The null account was used as a sender
    #[error("Invalid sender: {0}")]
    InvalidSender(AccountId),

    /// The null account was used as a fungible spender
    #[error("Invalid spender: {0}")]
    InvalidSpender(AccountId),

    /// The null account was used as a blanket operator
    #[error("Invalid operator: {0}")]
    InvalidOperator(AccountId),

    /// The id falls outside the reserved unit id range
    #[error("Invalid unit id: {0:#x}")]
    InvalidUnitId(UnitId),

    /// A valid id with no current owner (never issued, or held by the bank)
    #[error("Unit not found: {0:#x}")]
    NotFound(UnitId),

    /// Issuance tried to assign an id that is already owned
    #[error("Unit already exists: {0:#x}")]
    AlreadyExists(UnitId),

    /// No more units can be issued or recycled for the request
    #[error("Issuance limit reached: requested {requested}, available {available}")]
    IssuanceLimitReached { requested: u128, available: u128 },

    /// Attached payment does not match the exact issuance cost
    #[error("Incorrect payment value: expected {expected}, got {actual}")]
    IncorrectPaymentValue { expected: Amount, actual: Amount },

    /// The treasury refused the forwarded payment
    #[error("Payment forwarding failed: {0}")]
    PaymentForwardingFailed(String),

    /// A program recipient did not acknowledge the unit
    #[error("Unsafe recipient: {0}")]
    UnsafeRecipient(AccountId),

    /// Minting would push the total supply over the configured cap
    #[error("Supply cap exceeded: cap {cap}, requested total {requested}")]
    SupplyCapExceeded { cap: Amount, requested: Amount },

    /// The unit size must be strictly positive
    #[error("Invalid unit size: {0}")]
    InvalidUnitSize(Amount),

    /// The issuance limit cannot drop below what was already issued
    #[error("Invalid issuance limit: requested {requested}, already issued {issued}")]
    InvalidIssuanceLimit { requested: u128, issued: u128 },

    /// Checked arithmetic overflowed
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// The shared ledger lock was poisoned by a panicking writer
    #[error("Ledger lock poisoned: {0}")]
    LockPoisoned(String),

    /// Receipt digest could not be computed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors that don't fit in other categories
    #[error("Other error: {0}")]
    Other(String),

    /// Anyhow error wrapper for error context
    #[error(transparent)]
    Context(#[from] anyhow::Error),
}

/// Result alias used throughout the ledger
pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    /// Build an `Unauthorized` error for `caller`
    pub fn unauthorized(caller: &AccountId, reason: impl Into<String>) -> Self {
        LedgerError::Unauthorized {
            caller: *caller,
            reason: reason.into(),
        }
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(err: bincode::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<String> for LedgerError {
    fn from(err: String) -> Self {
        LedgerError::Other(err)
    }
}

impl From<&str> for LedgerError {
    fn from(err: &str) -> Self {
        LedgerError::Other(err.to_string())
    }
}
