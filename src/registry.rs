use crate::id::AccountId;
use crate::units::UnitId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ownership record for an assigned unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    /// Current owner
    pub owner: AccountId,
    /// Position of the unit inside the owner's owned-set
    pub owned_index: usize,
    /// Single-unit approved spender, cleared on every move
    pub approved: Option<AccountId>,
}

/// Tracks who owns each discrete unit and where it sits in the owner's owned-set
///
/// An assigned id always has a record, and appears exactly once in its owner's
/// owned-set at `owned_index`. Ids held by the bank or never issued have no record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitRegistry {
    records: HashMap<UnitId, UnitRecord>,
    owned: HashMap<AccountId, Vec<UnitId>>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner_of(&self, id: UnitId) -> Option<AccountId> {
        self.records.get(&id).map(|record| record.owner)
    }

    pub fn record(&self, id: UnitId) -> Option<&UnitRecord> {
        self.records.get(&id)
    }

    pub fn exists_assigned(&self, id: UnitId) -> bool {
        self.records.contains_key(&id)
    }

    /// Units owned by `account`, in owned-set order
    pub fn owned(&self, account: &AccountId) -> &[UnitId] {
        self.owned.get(account).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn owned_count(&self, account: &AccountId) -> usize {
        self.owned.get(account).map_or(0, Vec::len)
    }

    /// The most recently acquired unit of `account`
    pub fn last_owned(&self, account: &AccountId) -> Option<UnitId> {
        self.owned.get(account).and_then(|units| units.last().copied())
    }

    /// Number of assigned units across all accounts
    pub fn assigned_count(&self) -> usize {
        self.records.len()
    }

    pub fn set_approved(&mut self, id: UnitId, spender: Option<AccountId>) -> bool {
        match self.records.get_mut(&id) {
            Some(record) => {
                record.approved = spender;
                true
            }
            None => false,
        }
    }

    pub fn insert(&mut self, id: UnitId, owner: AccountId) {
        self.transfer_unit(None, Some(owner), id);
    }

    pub fn remove(&mut self, id: UnitId) {
        let owner = self.owner_of(id);
        self.transfer_unit(owner, None, id);
    }

    /// Move a unit between owners; the primitive every higher-level move uses
    ///
    /// # Parameters
    /// * `from` - Current owner, or None when the unit comes from the bank or is new
    /// * `to` - New owner, or None when the unit is withdrawn to the bank
    /// * `id` - The unit being moved
    ///
    /// Removal from `from` is swap-and-pop, so owned-set order is not stable
    /// across transfers. Fungible balances are not touched here.
    pub fn transfer_unit(&mut self, from: Option<AccountId>, to: Option<AccountId>, id: UnitId) {
        if let Some(from) = from {
            let mut emptied = false;
            if let (Some(record), Some(units)) =
                (self.records.get(&id).copied(), self.owned.get_mut(&from))
            {
                if let Some(last) = units.last().copied() {
                    if last != id {
                        units[record.owned_index] = last;
                        if let Some(moved) = self.records.get_mut(&last) {
                            moved.owned_index = record.owned_index;
                        }
                    }
                    units.pop();
                }
                emptied = units.is_empty();
            }
            if emptied {
                self.owned.remove(&from);
            }
        }

        match to {
            Some(to) => {
                let units = self.owned.entry(to).or_default();
                units.push(id);
                self.records.insert(
                    id,
                    UnitRecord {
                        owner: to,
                        owned_index: units.len() - 1,
                        approved: None,
                    },
                );
            }
            None => {
                self.records.remove(&id);
            }
        }
    }

    /// Check that every record and owned-set agree with each other
    pub fn is_consistent(&self) -> bool {
        let listed: usize = self.owned.values().map(Vec::len).sum();
        if listed != self.records.len() {
            return false;
        }
        self.owned.iter().all(|(owner, units)| {
            units.iter().enumerate().all(|(index, id)| {
                self.records
                    .get(id)
                    .map_or(false, |record| record.owner == *owner && record.owned_index == index)
            })
        })
    }
}
