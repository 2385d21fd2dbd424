//! Deployment artifacts shared between the deployer and clients.
//!
//! The deployer is the only writer. Files are pretty-printed JSON so they can
//! be committed next to a front end and diffed by hand.

use std::fs;
use std::path::{Path, PathBuf};

use crowdledger_core::abi::ContractAbi;
use crowdledger_core::Address;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const ADDRESS_FILE: &str = "contract-address.json";
pub const MANAGER_ABI_FILE: &str = "contractAbi.json";
pub const GAS_LOT_ABI_FILE: &str = "contractAbiGasLot.json";

pub const ARTIFACT_FORMAT: &str = "crowdledger-artifact-1";

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is not a valid artifact: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddressBook {
    pub contract_address: Address,
    pub gas_lot_contract_address: Address,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    #[serde(rename = "_format")]
    pub format: String,
    pub contract_name: String,
    pub code_hash: String,
    pub abi: ContractAbi,
}

impl ContractArtifact {
    pub fn new(abi: ContractAbi) -> Self {
        Self {
            format: ARTIFACT_FORMAT.to_string(),
            contract_name: abi.contract_name.clone(),
            code_hash: abi.code_hash_hex(),
            abi,
        }
    }
}

/// Everything a deployment leaves on disk.
#[derive(Clone, Debug)]
pub struct ArtifactSet {
    pub addresses: AddressBook,
    pub manager: ContractArtifact,
    pub gas_lot: ContractArtifact,
}

impl ArtifactSet {
    /// Write all files into `dir`, creating it if needed. Returns the paths
    /// written, address book first.
    pub fn write(&self, dir: &Path) -> Result<Vec<PathBuf>, ArtifactError> {
        fs::create_dir_all(dir).map_err(|source| ArtifactError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(vec![
            write_json(&dir.join(ADDRESS_FILE), &self.addresses)?,
            write_json(&dir.join(MANAGER_ABI_FILE), &self.manager)?,
            write_json(&dir.join(GAS_LOT_ABI_FILE), &self.gas_lot)?,
        ])
    }

    pub fn read(dir: &Path) -> Result<Self, ArtifactError> {
        Ok(Self {
            addresses: read_address_book(dir)?,
            manager: read_json(&dir.join(MANAGER_ABI_FILE))?,
            gas_lot: read_json(&dir.join(GAS_LOT_ABI_FILE))?,
        })
    }
}

pub fn read_address_book(dir: &Path) -> Result<AddressBook, ArtifactError> {
    read_json(&dir.join(ADDRESS_FILE))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<PathBuf, ArtifactError> {
    let mut text = serde_json::to_string_pretty(value).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    text.push('\n');
    fs::write(path, text).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(path.to_path_buf())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let text = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })
}
