use crate::units::UnitId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Units withdrawn from circulation and held by the bank for reuse
///
/// Withdrawn units enter at the front and issuance takes from the back, so the
/// unit that has waited longest is recycled first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReuseQueue {
    units: VecDeque<UnitId>,
}

impl ReuseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_front(&mut self, id: UnitId) {
        self.units.push_front(id);
    }

    pub fn pop_back(&mut self) -> Option<UnitId> {
        self.units.pop_back()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Peek at position `index`, counted from the front
    pub fn at(&self, index: usize) -> Option<UnitId> {
        self.units.get(index).copied()
    }

    /// The next `count` ids issuance would take, in the order it would take them
    pub fn next_out(&self, count: usize) -> impl Iterator<Item = UnitId> + '_ {
        self.units.iter().rev().take(count).copied()
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.units.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.iter().copied()
    }
}
