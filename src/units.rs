//! Numeric model shared by the ledger components
//!
//! Fungible amounts and unit ids share one numeric type so a single value can be
//! dispatched on (see `Ledger::approve`). Unit ids live above a reserved high-bit
//! prefix, which keeps them syntactically apart from any realistic amount.

/// Fungible quantity
pub type Amount = u128;

/// Discrete unit identifier: `UNIT_ID_PREFIX + ordinal`
pub type UnitId = u128;

/// High bit marking a value as possibly a unit id
pub const UNIT_ID_PREFIX: u128 = 1 << 127;

/// Largest ordinal that fits below the prefix bit
pub const MAX_ORDINAL: u128 = !UNIT_ID_PREFIX;

/// Encode an issuance ordinal as a unit id
pub fn unit_id(ordinal: u128) -> UnitId {
    UNIT_ID_PREFIX | ordinal
}

/// Decode a unit id back into its ordinal, if it carries the prefix
pub fn ordinal_of(id: UnitId) -> Option<u128> {
    if id & UNIT_ID_PREFIX == 0 {
        None
    } else {
        Some(id & !UNIT_ID_PREFIX)
    }
}

/// Whether `value` is a unit id within `[1, max_issuable]`
///
/// Ordinal 0 is never a unit, so the bare prefix falls through to fungible handling.
pub fn is_valid_unit_id(value: u128, max_issuable: u128) -> bool {
    match ordinal_of(value) {
        Some(ordinal) => ordinal >= 1 && ordinal <= max_issuable,
        None => false,
    }
}

/// `ceil(amount / unit_size)`; `unit_size` must be non-zero
pub fn units_to_cover(amount: Amount, unit_size: Amount) -> u128 {
    amount / unit_size + u128::from(amount % unit_size != 0)
}
