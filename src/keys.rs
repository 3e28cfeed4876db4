//! BLS12-381 public key derivation
//!
//! Only unhardened (public) derivation is supported, so addresses can be
//! generated from a master public key without any secret material.
//!
//! - Child key: `pk + G * (sha256(pk_compressed || index_be) mod r)`
//! - Synthetic key: `pk + G * (sha256(pk_compressed || hidden_puzzle_hash)
//!   as a signed big-endian integer, mod r)`
//!
//! Both must stay byte-for-byte compatible with the receiving wallet, which
//! uses the path `m/12381/8444/2/index`.

use bls12_381::{G1Affine, G1Projective, Scalar};
use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::bytes::{decode_hex, Bytes32};
use crate::error::ListenerError;

/// Order of the G1 subgroup
pub const GROUP_ORDER_HEX: &str =
    "73eda753299d7d483339d80809a1d80553bda402fffe5bfeffffffff00000001";

pub const PURPOSE: u32 = 12381;
pub const COIN_TYPE: u32 = 8444;
pub const ACCOUNT_CHANGE: u32 = 2;

/// Wallet path used for receive addresses
pub fn wallet_path(index: u32) -> [u32; 4] {
    [PURPOSE, COIN_TYPE, ACCOUNT_CHANGE, index]
}

#[derive(Clone, Copy)]
pub struct PublicKey(G1Affine);

impl PublicKey {
    /// Parse a G1 point from its compressed (48 byte) or uncompressed
    /// (96 byte) encoding
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ListenerError> {
        let point: Option<G1Affine> = match bytes.len() {
            48 => {
                let mut buf = [0u8; 48];
                buf.copy_from_slice(bytes);
                G1Affine::from_compressed(&buf).into()
            }
            96 => {
                let mut buf = [0u8; 96];
                buf.copy_from_slice(bytes);
                G1Affine::from_uncompressed(&buf).into()
            }
            n => {
                return Err(ListenerError::InvalidKey(format!(
                    "expected 48 or 96 bytes, got {}",
                    n
                )))
            }
        };

        point
            .map(Self)
            .ok_or_else(|| ListenerError::InvalidKey("not a valid G1 point".into()))
    }

    pub fn from_hex(value: &str) -> Result<Self, ListenerError> {
        let bytes = decode_hex(value).map_err(|e| ListenerError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Compressed encoding, the form that gets hashed and curried
    pub fn to_bytes(&self) -> [u8; 48] {
        self.0.to_compressed()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn is_identity(&self) -> bool {
        bool::from(self.0.is_identity())
    }

    /// Add `G * scalar` to this key
    fn offset_by(&self, scalar: &Scalar) -> Self {
        let sum = G1Projective::generator() * scalar + G1Projective::from(self.0);
        Self(G1Affine::from(sum))
    }

    /// Single unhardened derivation step
    pub fn derive_unhardened(&self, index: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(self.to_bytes());
        hasher.update(index.to_be_bytes());
        let digest: [u8; 32] = hasher.finalize().into();

        self.offset_by(&scalar_from_be(&digest))
    }

    /// Apply unhardened derivation once per path element, in order
    pub fn derive_path(&self, path: &[u32]) -> Self {
        path.iter()
            .fold(*self, |key, index| key.derive_unhardened(*index))
    }

    /// Key used by the standard puzzle: this key offset by the hidden
    /// puzzle commitment
    pub fn synthetic(&self, hidden_puzzle_hash: &Bytes32) -> Self {
        let offset = synthetic_offset(self, hidden_puzzle_hash);
        self.offset_by(&scalar_from_be(&offset))
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PublicKey {}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// Apply unhardened derivation along `path`
pub fn derive_path(master: &MasterPublicKey, path: &[u32]) -> PublicKey {
    master.key().derive_path(path)
}

/// Offset `public_key` by the hidden puzzle commitment
pub fn synthetic_public_key(public_key: &PublicKey, hidden_puzzle_hash: &Bytes32) -> PublicKey {
    public_key.synthetic(hidden_puzzle_hash)
}

/// `sha256(pk || hidden)` read as a signed big-endian integer, reduced into
/// `[0, r)` and returned as 32 big-endian bytes
pub fn synthetic_offset(public_key: &PublicKey, hidden_puzzle_hash: &Bytes32) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(public_key.to_bytes());
    hasher.update(hidden_puzzle_hash.as_bytes());
    let digest = hasher.finalize();

    let order = BigInt::from_bytes_be(Sign::Plus, &group_order_bytes());
    let offset = BigInt::from_signed_bytes_be(&digest).mod_floor(&order);

    let (_, magnitude) = offset.to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - magnitude.len()..].copy_from_slice(&magnitude);
    out
}

fn group_order_bytes() -> [u8; 32] {
    let mut out = [0u8; 32];
    // constant is well-formed hex
    if let Ok(bytes) = hex::decode(GROUP_ORDER_HEX) {
        out.copy_from_slice(&bytes);
    }
    out
}

/// Interpret 32 big-endian bytes as an integer and reduce it mod r
fn scalar_from_be(bytes: &[u8; 32]) -> Scalar {
    let mut wide = [0u8; 64];
    for (slot, byte) in wide.iter_mut().zip(bytes.iter().rev()) {
        *slot = *byte;
    }
    Scalar::from_bytes_wide(&wide)
}

/// A validated master public key
///
/// Construction is the only validation point: anything that holds a
/// `MasterPublicKey` can derive addresses without further checks.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MasterPublicKey(PublicKey);

impl MasterPublicKey {
    pub fn parse(value: &str) -> Result<Self, ListenerError> {
        let key = PublicKey::from_hex(value)?;
        if key.is_identity() {
            return Err(ListenerError::InvalidKey(
                "the point at infinity cannot be used as a master key".into(),
            ));
        }
        Ok(Self(key))
    }

    pub fn is_valid(value: &str) -> bool {
        Self::parse(value).is_ok()
    }

    pub fn key(&self) -> &PublicKey {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Key for receive address `index`
    pub fn derive_receive_key(&self, index: u32) -> PublicKey {
        self.0.derive_path(&wallet_path(index))
    }
}
