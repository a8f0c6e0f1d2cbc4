pub mod approvals;
pub mod balances;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod id;
pub mod ledger;
pub mod ledger_traits;
pub mod queue;
pub mod registry;
pub mod shared;
pub mod units;

// Re-export the main types for convenience
pub use approvals::{ApprovalStore, UNLIMITED_ALLOWANCE};
pub use balances::BalanceLedger;
pub use collaborators::{
    AdminGate,
    OpenGate,
    PaymentSink,
    ReceiverRegistry,
    SingleAdmin,
    Treasury,
    UnitReceiver,
    UNIT_RECEIVED_MAGIC
};
pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use events::{JournalVerification, LedgerEvent, LedgerObserver, Receipt, ReceiptDigest};
pub use id::AccountId;
pub use ledger::Ledger;
pub use ledger_traits::{DiscreteUnitLedger, FungibleLedger};
pub use queue::ReuseQueue;
pub use registry::{UnitRecord, UnitRegistry};
pub use shared::SharedLedger;
pub use units::{is_valid_unit_id, ordinal_of, unit_id, Amount, UnitId, UNIT_ID_PREFIX};
