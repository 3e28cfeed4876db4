//! Address codec
//!
//! Turns a master public key and an index into a receive address, and maps
//! puzzle hashes reported by the node back to the same address form.
//!
//! `derive_address` = derive path -> synthetic key -> curry the standard
//! puzzle -> tree hash -> bech32m encode.

use bech32::{FromBase32, ToBase32, Variant};
use serde::{Deserialize, Serialize};

use crate::bytes::Bytes32;
use crate::clvm::{curry_tree_hash, hash_atom};
use crate::error::ListenerError;
use crate::keys::{MasterPublicKey, PublicKey};

/// Hash of the default hidden puzzle `(=)`; receiving wallets use this same
/// constant, so it must never change
pub const DEFAULT_HIDDEN_PUZZLE_HASH: Bytes32 = Bytes32::new([
    0x71, 0x1d, 0x6c, 0x4e, 0x32, 0xc9, 0x2e, 0x53, 0x17, 0x9b, 0x19, 0x94, 0x84, 0xcf, 0x8c, 0x89,
    0x75, 0x42, 0xbc, 0x57, 0xf2, 0xb2, 0x25, 0x82, 0x79, 0x9f, 0x9d, 0x65, 0x7e, 0xec, 0x46, 0x99,
]);

/// Serialized standard transaction puzzle
pub const P2_DELEGATED_PUZZLE_OR_HIDDEN_PUZZLE: &str = "ff02ffff01ff02ffff03ff0bffff01ff02ffff03ffff09ff05ffff1dff0bffff1effff0bff0bffff02ff06ffff04ff02ffff04ff17ff8080808080808080ffff01ff02ff17ff2f80ffff01ff088080ff0180ffff01ff04ffff04ff04ffff04ff05ffff04ffff02ff06ffff04ff02ffff04ff17ff80808080ff80808080ffff02ff17ff2f808080ff0180ffff04ffff01ff32ff02ffff03ffff07ff0580ffff01ff0bffff0102ffff02ff06ffff04ff02ffff04ff09ff80808080ffff02ff06ffff04ff02ffff04ff0dff8080808080ffff01ff0bffff0101ff058080ff0180ff018080";

pub const P2_DELEGATED_PUZZLE_OR_HIDDEN_PUZZLE_HASH: Bytes32 = Bytes32::new([
    0xe9, 0xaa, 0xa4, 0x9f, 0x45, 0xba, 0xd5, 0xc8, 0x89, 0xb8, 0x6e, 0xe3, 0x34, 0x15, 0x50, 0xc1,
    0x55, 0xcf, 0xdd, 0x10, 0xc3, 0xa6, 0x75, 0x7d, 0xe6, 0x18, 0xd2, 0x06, 0x12, 0xff, 0xfd, 0x52,
]);

pub const MAINNET_PREFIX: &str = "xch";
pub const TESTNET_PREFIX: &str = "txch";

/// Puzzle hash of the standard puzzle locked to `synthetic_key`
pub fn puzzle_hash_for(synthetic_key: &PublicKey) -> Bytes32 {
    let key_hash = hash_atom(&synthetic_key.to_bytes());
    curry_tree_hash(&P2_DELEGATED_PUZZLE_OR_HIDDEN_PUZZLE_HASH, &[key_hash])
}

/// Addresses compare case-insensitively
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAddress {
    pub index: u32,
    pub puzzle_hash: Bytes32,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCodec {
    prefix: String,
}

impl AddressCodec {
    pub fn new(prefix: impl Into<String>) -> Result<Self, ListenerError> {
        let prefix = prefix.into().to_ascii_lowercase();
        let codec = Self { prefix };
        // rejects prefixes bech32 cannot carry
        codec.encode(&Bytes32::default())?;
        Ok(codec)
    }

    pub fn mainnet() -> Self {
        Self {
            prefix: MAINNET_PREFIX.to_string(),
        }
    }

    pub fn testnet() -> Self {
        Self {
            prefix: TESTNET_PREFIX.to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn encode(&self, puzzle_hash: &Bytes32) -> Result<String, ListenerError> {
        bech32::encode(&self.prefix, puzzle_hash.as_bytes().to_base32(), Variant::Bech32m)
            .map_err(|e| ListenerError::InvalidAddress(e.to_string()))
    }

    pub fn decode(&self, address: &str) -> Result<Bytes32, ListenerError> {
        let (hrp, data, variant) = bech32::decode(address.trim())
            .map_err(|e| ListenerError::InvalidAddress(format!("{}: {}", address, e)))?;

        if variant != Variant::Bech32m {
            return Err(ListenerError::InvalidAddress(format!(
                "{}: plain bech32 checksum, expected bech32m",
                address
            )));
        }
        if hrp != self.prefix {
            return Err(ListenerError::InvalidAddress(format!(
                "{}: prefix '{}' does not match '{}'",
                address, hrp, self.prefix
            )));
        }

        let bytes = Vec::<u8>::from_base32(&data)
            .map_err(|e| ListenerError::InvalidAddress(format!("{}: {}", address, e)))?;
        Bytes32::from_slice(&bytes)
            .map_err(|_| ListenerError::InvalidAddress(format!("{}: payload is not 32 bytes", address)))
    }

    /// Derive the receive address at `index`
    pub fn derive_address(
        &self,
        master: &MasterPublicKey,
        index: u32,
    ) -> Result<DerivedAddress, ListenerError> {
        let child = master.derive_receive_key(index);
        let synthetic = child.synthetic(&DEFAULT_HIDDEN_PUZZLE_HASH);
        let puzzle_hash = puzzle_hash_for(&synthetic);

        Ok(DerivedAddress {
            index,
            puzzle_hash,
            address: self.encode(&puzzle_hash)?,
        })
    }
}

impl Default for AddressCodec {
    fn default() -> Self {
        Self::mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clvm::Program;
    use sha2::{Digest, Sha256};
    use std::collections::HashSet;

    const GENERATOR_HEX: &str = "97f1d3a73197d7942695638c4fa9ac0fc3688c4f9774b905a14e3a3f171bac586c55e83ff97a1aeffb3af00adb22c6bb";

    #[test]
    fn test_known_burn_address() {
        let mut bytes = [0u8; 32];
        bytes[30] = 0xde;
        bytes[31] = 0xad;
        let codec = AddressCodec::mainnet();
        let address = codec.encode(&Bytes32::new(bytes)).unwrap();
        assert_eq!(address, "xch1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqm6ks6e8mvy");
        assert_eq!(codec.decode(&address).unwrap(), Bytes32::new(bytes));
    }

    #[test]
    fn test_derived_address_vectors() {
        let master = MasterPublicKey::parse(GENERATOR_HEX).unwrap();
        let codec = AddressCodec::mainnet();

        let first = codec.derive_address(&master, 0).unwrap();
        assert_eq!(
            first.puzzle_hash.to_hex(),
            "f591f49b892b73f7d49f56f5d06acf0e3e3f36b9fdb828dd6f19ddc9dae19683"
        );
        assert_eq!(first.address, "xch17kglfxuf9del04yl2m6aq6k0pclr7d4elkuz3ht0r8wunkhpj6pszv2f06");

        let second = codec.derive_address(&master, 1).unwrap();
        assert_eq!(second.address, "xch1vpka6tsmhdpyuzs8rrf7q3deza7g2zqx5trylda55wfxpnaadmrq6uqnqc");

        let third = codec.derive_address(&master, 2).unwrap();
        assert_eq!(third.address, "xch1qclyxarzdmacdqz905vyh6w0kcfdu8xke56tu54ugksmh6ehxvns48py6k");
    }

    #[test]
    fn test_puzzle_hash_matches_full_curry() {
        let synthetic = PublicKey::from_hex(GENERATOR_HEX).unwrap();
        let module = Program::from_hex(P2_DELEGATED_PUZZLE_OR_HIDDEN_PUZZLE).unwrap();
        let curried = module.curry(vec![Program::atom(synthetic.to_bytes().to_vec())]);
        assert_eq!(puzzle_hash_for(&synthetic), curried.tree_hash());
    }

    #[test]
    fn test_decode_rejects_wrong_prefix_and_variant() {
        let hash = Bytes32::new([7u8; 32]);
        let testnet = AddressCodec::testnet().encode(&hash).unwrap();
        assert!(matches!(
            AddressCodec::mainnet().decode(&testnet),
            Err(ListenerError::InvalidAddress(_))
        ));

        let plain = bech32::encode("xch", hash.as_bytes().to_base32(), Variant::Bech32).unwrap();
        assert!(AddressCodec::mainnet().decode(&plain).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_checksum() {
        let codec = AddressCodec::mainnet();
        let mut address = codec.encode(&Bytes32::new([9u8; 32])).unwrap();
        let last = address.pop().unwrap();
        address.push(if last == 'q' { 'p' } else { 'q' });
        assert!(codec.decode(&address).is_err());
    }

    #[test]
    fn test_decode_accepts_upper_case() {
        let codec = AddressCodec::mainnet();
        let hash = Bytes32::new([0x5a; 32]);
        let address = codec.encode(&hash).unwrap().to_ascii_uppercase();
        assert_eq!(codec.decode(&address).unwrap(), hash);
    }

    #[test]
    fn test_round_trip_and_distinct_encodings() {
        let mut hashes = vec![Bytes32::new([0u8; 32]), Bytes32::new([0xff; 32])];
        let mut seed = [0u8; 32];
        for _ in 0..256 {
            let digest = Sha256::digest(seed);
            seed.copy_from_slice(&digest);
            hashes.push(Bytes32::new(seed));
        }
        // single bit flips of one value
        for bit in 0..256 {
            let mut bytes = [0u8; 32];
            bytes[bit / 8] = 1 << (bit % 8);
            hashes.push(Bytes32::new(bytes));
        }

        for codec in [AddressCodec::mainnet(), AddressCodec::testnet()] {
            let mut seen = HashSet::new();
            for hash in &hashes {
                let address = codec.encode(hash).unwrap();
                assert_eq!(codec.decode(&address).unwrap(), *hash);
                assert!(seen.insert(address), "duplicate encoding for {}", hash.to_hex());
            }
            assert_eq!(seen.len(), hashes.len());
        }
    }
}
