//! Account keys and addresses.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

pub const ADDRESS_LEN: usize = 20;
const SECRET_LEN: usize = 32;

/// 20-byte account or contract identifier, rendered as `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Address controlled by the holder of `key`.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        hasher.update(key.as_bytes());
        Self::truncate(hasher.finalize().into())
    }

    /// Address of the contract created by `deployer` at `nonce`.
    pub fn contract(deployer: &Address, nonce: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"contract");
        hasher.update(deployer.0);
        hasher.update(nonce.to_le_bytes());
        Self::truncate(hasher.finalize().into())
    }

    fn truncate(digest: [u8; 32]) -> Self {
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest[32 - ADDRESS_LEN..]);
        Self(out)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let body = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(body).map_err(|e| CoreError::InvalidHex {
            what: "address",
            reason: e.to_string(),
        })?;
        let arr: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|b: Vec<u8>| CoreError::InvalidHex {
            what: "address",
            reason: format!("expected {ADDRESS_LEN} bytes, got {}", b.len()),
        })?;
        Ok(Self(arr))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Signing identity of an account.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        let mut sk_bytes = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut sk_bytes);
        Self::from_secret(sk_bytes)
    }

    pub fn from_secret(bytes: [u8; SECRET_LEN]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&bytes),
        }
    }

    /// Parse a 32-byte secret given as 64 hex characters, `0x` optional.
    pub fn from_hex(secret_hex: &str) -> Result<Self, CoreError> {
        let secret_hex = secret_hex.trim();
        let body = secret_hex.strip_prefix("0x").unwrap_or(secret_hex);
        let bytes = decode_fixed::<SECRET_LEN>("secret key", body)?;
        Ok(Self::from_secret(bytes))
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing.to_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.verifying_key().as_bytes())
    }

    pub fn address(&self) -> Address {
        Address::from_verifying_key(&self.verifying_key())
    }

    pub fn sign(&self, digest: &[u8; 32]) -> Signature {
        self.signing.sign(digest)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

pub(crate) fn decode_fixed<const N: usize>(
    what: &'static str,
    value: &str,
) -> Result<[u8; N], CoreError> {
    let bytes = hex::decode(value.trim()).map_err(|e| CoreError::InvalidHex {
        what,
        reason: e.to_string(),
    })?;
    bytes.try_into().map_err(|b: Vec<u8>| CoreError::InvalidHex {
        what,
        reason: format!("expected {N} bytes, got {}", b.len()),
    })
}

/// Hex (de)serialization for fixed 32-byte digests.
pub mod serde_hash {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(value)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let body = encoded.strip_prefix("0x").unwrap_or(&encoded);
        super::decode_fixed::<32>("hash", body).map_err(D::Error::custom)
    }
}
