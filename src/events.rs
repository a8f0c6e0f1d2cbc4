//! Notifications emitted by committed ledger operations
//!
//! Each committed operation produces one `Receipt` holding the events it emitted.
//! Receipts are hash-chained: every digest commits to the previous receipt's
//! digest, so a journal can be checked for gaps or tampering after the fact.

use crate::error::LedgerResult;
use crate::id::AccountId;
use crate::units::{Amount, UnitId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Digest of a receipt
pub type ReceiptDigest = [u8; 32];

/// A state change observers can react to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// Fungible value moved; `None` marks minting (from) or burning (to)
    Transfer {
        from: Option<AccountId>,
        to: Option<AccountId>,
        amount: Amount,
    },

    /// A discrete unit moved; `None` marks the bank
    UnitTransfer {
        from: Option<AccountId>,
        to: Option<AccountId>,
        id: UnitId,
    },

    /// Fungible allowance set
    Approval {
        owner: AccountId,
        spender: AccountId,
        value: Amount,
    },

    /// Single-unit approval set
    UnitApproval {
        owner: AccountId,
        spender: AccountId,
        id: UnitId,
    },

    /// Blanket operator approval toggled
    ApprovalForAll {
        owner: AccountId,
        operator: AccountId,
        approved: bool,
    },

    UnitSizeChanged { previous: Amount, current: Amount },

    IssuanceLimitChanged { previous: u128, current: u128 },

    UnitPriceChanged {
        previous: Option<Amount>,
        current: Option<Amount>,
    },

    SupplyCapChanged {
        previous: Option<Amount>,
        current: Option<Amount>,
    },
}

/// Record of one committed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Position of the operation in the ledger's history, starting at 0
    pub sequence: u64,

    /// Events in emission order
    pub events: Vec<LedgerEvent>,

    /// When the operation was committed
    pub executed_at: DateTime<Utc>,

    /// Digest of the preceding receipt (all zeros for the first)
    pub prev_digest: ReceiptDigest,

    /// Digest over `prev_digest`, `sequence` and the encoded events
    pub digest: ReceiptDigest,
}

impl Receipt {
    /// Seal a set of events into a receipt chained onto `prev_digest`
    pub fn seal(
        sequence: u64,
        events: Vec<LedgerEvent>,
        prev_digest: ReceiptDigest,
    ) -> LedgerResult<Self> {
        let digest = Self::compute_digest(sequence, &events, &prev_digest)?;
        Ok(Self {
            sequence,
            events,
            executed_at: Utc::now(),
            prev_digest,
            digest,
        })
    }

    pub fn compute_digest(
        sequence: u64,
        events: &[LedgerEvent],
        prev_digest: &ReceiptDigest,
    ) -> LedgerResult<ReceiptDigest> {
        let encoded = bincode::serialize(events)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(prev_digest);
        hasher.update(&sequence.to_le_bytes());
        hasher.update(&encoded);
        Ok(*hasher.finalize().as_bytes())
    }

    /// Unit ids that entered `account` in this operation, in order
    pub fn units_received_by(&self, account: &AccountId) -> Vec<UnitId> {
        self.events
            .iter()
            .filter_map(|event| match event {
                LedgerEvent::UnitTransfer { to: Some(to), id, .. } if to == account => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Unit ids withdrawn to the bank in this operation, in order
    pub fn units_withdrawn(&self) -> Vec<UnitId> {
        self.events
            .iter()
            .filter_map(|event| match event {
                LedgerEvent::UnitTransfer { to: None, id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }
}

/// Result of checking a receipt journal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalVerification {
    Valid,
    /// The chain breaks at this sequence number
    Broken(u64),
}

/// Recompute every digest and link in `journal`
pub fn verify_journal(journal: &[Receipt]) -> LedgerResult<JournalVerification> {
    let mut prev = [0u8; 32];
    for (position, receipt) in journal.iter().enumerate() {
        let expected = Receipt::compute_digest(receipt.sequence, &receipt.events, &prev)?;
        if receipt.sequence != position as u64
            || receipt.prev_digest != prev
            || receipt.digest != expected
        {
            return Ok(JournalVerification::Broken(position as u64));
        }
        prev = receipt.digest;
    }
    Ok(JournalVerification::Valid)
}

/// Receives every receipt the ledger commits
pub trait LedgerObserver: Send {
    fn on_commit(&mut self, receipt: &Receipt);
}
