//! Signed transactions and the receipts the ledger hands back for them.

use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::crypto::{decode_fixed, serde_hash, Address, Keypair};
use crate::units::{serde_amount, Amount};

pub type TxHash = [u8; 32];

pub fn hash_hex(hash: &TxHash) -> String {
    format!("0x{}", hex::encode(hash))
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TxAction {
    /// Create a contract by name with JSON constructor arguments.
    Deploy { contract: String, args: Value },
    /// Invoke a state-changing contract method.
    Call {
        to: Address,
        method: String,
        args: Value,
    },
    /// Plain value transfer between accounts.
    Transfer { to: Address },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub chain_id: u64,
    pub from: Address,
    pub nonce: u64,
    #[serde(with = "serde_amount")]
    pub value: Amount,
    pub action: TxAction,
}

impl Transaction {
    pub fn digest(&self) -> Result<[u8; 32], serde_json::Error> {
        let mut hasher = Sha256::new();
        hasher.update(b"crowdledger-tx");
        hasher.update(serde_json::to_vec(self)?);
        Ok(hasher.finalize().into())
    }

    pub fn sign(self, key: &Keypair) -> Result<SignedTransaction, serde_json::Error> {
        let digest = self.digest()?;
        let signature = key.sign(&digest);
        Ok(SignedTransaction {
            tx: self,
            public_key: key.public_hex(),
            signature: signature.to_bytes().to_vec(),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx: Transaction,
    pub public_key: String,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl SignedTransaction {
    /// Hash identifying this transaction in receipts and blocks.
    pub fn hash(&self) -> Result<TxHash, serde_json::Error> {
        let mut hasher = Sha256::new();
        hasher.update(self.tx.digest()?);
        hasher.update(&self.signature);
        Ok(hasher.finalize().into())
    }

    /// Checks the signature and that the key actually owns `tx.from`.
    pub fn verify(&self) -> Result<(), TxError> {
        let pk = decode_fixed::<32>("public key", &self.public_key)
            .map_err(|_| TxError::MalformedKey)?;
        let key = VerifyingKey::from_bytes(&pk).map_err(|_| TxError::MalformedKey)?;
        if Address::from_verifying_key(&key) != self.tx.from {
            return Err(TxError::SenderMismatch(self.tx.from));
        }
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| TxError::MalformedSignature)?;
        let digest = self.tx.digest().map_err(|_| TxError::Encoding)?;
        key.verify_strict(&digest, &signature)
            .map_err(|_| TxError::InvalidSignature)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TxError {
    #[error("malformed public key")]
    MalformedKey,
    #[error("malformed signature")]
    MalformedSignature,
    #[error("signature does not verify")]
    InvalidSignature,
    #[error("public key does not control sender {0}")]
    SenderMismatch(Address),
    #[error("transaction cannot be encoded")]
    Encoding,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReceiptStatus {
    Success,
    Reverted { reason: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ContractDeployed {
        address: Address,
        contract: String,
        deployer: Address,
    },
    ValueTransferred {
        from: Address,
        to: Address,
        #[serde(with = "serde_amount")]
        amount: Amount,
    },
    CampaignCreated {
        campaign_id: u64,
        owner: Address,
        #[serde(with = "serde_amount")]
        target: Amount,
        deadline: u64,
    },
    DonationReceived {
        campaign_id: u64,
        donor: Address,
        #[serde(with = "serde_amount")]
        amount: Amount,
    },
    GasLotDeposit {
        depositor: Address,
        #[serde(with = "serde_amount")]
        amount: Amount,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    #[serde(with = "serde_hash")]
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub contract_address: Option<Address>,
    pub status: ReceiptStatus,
    pub events: Vec<Event>,
    pub output: Value,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ReceiptStatus::Success)
    }
}

pub(crate) mod serde_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(D::Error::custom)
    }
}
