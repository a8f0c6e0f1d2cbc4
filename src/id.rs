use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::ops::Deref;

// AccountId identifies a balance holder in the ledger.
// It is a 32 byte long address, resembling a public key. User accounts are
// points on the ed25519 curve; program accounts are derived off-curve so they
// can never collide with a key-holding user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId([u8; 32]);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = hex::encode(&self.0[0..6]);
        write!(f, "acct:{}", prefix)
    }
}

impl Ord for AccountId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for AccountId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Default for AccountId {
    fn default() -> Self {
        AccountId::NULL
    }
}

impl Deref for AccountId {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AccountId {
    /// The null account. Never a valid sender, recipient, spender or operator.
    pub const NULL: AccountId = AccountId([0; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        AccountId(bytes)
    }

    /// Get a reference to the internal bytes
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0; 32]
    }

    fn seeded_hash(domain: &[u8], seeds: &[&[u8]], bump: Option<u8>) -> [u8; 32] {
        let mut hasher = Sha256::new();

        hasher.update(domain);
        for seed in seeds {
            hasher.update(seed);
        }
        if let Some(bump) = bump {
            hasher.update([bump]);
        }

        hasher.finalize().into()
    }

    /// Derive a user account from a seed
    ///
    /// The seed is hashed into a scalar and multiplied by the ed25519 base point,
    /// so the resulting address is always a valid compressed curve point.
    pub fn user(seed: &[u8]) -> Self {
        let scalar = Scalar::from_bytes_mod_order(Self::seeded_hash(b"UNITS_Account", &[seed], None));
        AccountId(EdwardsPoint::mul_base(&scalar).compress().to_bytes())
    }

    /// Verify that a 32-byte array is not a valid point on the ed25519 curve
    ///
    /// Returns true if the bytes do not represent a valid curve point.
    pub fn is_off_curve(bytes: &[u8; 32]) -> bool {
        let Ok(compressed_edwards_y) = CompressedEdwardsY::from_slice(bytes.as_ref()) else {
            return true;
        };
        compressed_edwards_y.decompress().is_none()
    }

    /// Try to derive a program account for the given seeds
    ///
    /// # Parameters
    /// * `seeds` - Seeds identifying the program
    ///
    /// # Returns
    /// The first off-curve address and the bump that produced it, or None if
    /// every bump landed on the curve
    pub fn derive_program(seeds: &[&[u8]]) -> Option<(AccountId, u8)> {
        for bump in 0..255 {
            let id = Self::seeded_hash(b"UNITS_Program", seeds, Some(bump));
            if Self::is_off_curve(&id) {
                return Some((AccountId(id), bump));
            }
        }
        None
    }

    /// Whether this address belongs to a program (contract-like) account
    pub fn is_program(&self) -> bool {
        !self.is_null() && Self::is_off_curve(&self.0)
    }
}
