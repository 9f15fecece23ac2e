//! Persistent deployment registry.
//!
//! Records live under `<root>/<network>/<name>.json`, one file per logical name, with a
//! `.chainId` file pinning the chain the directory belongs to. The registry holds an
//! exclusive lock on `<root>/<network>/.lock` for as long as it is open.

use std::{
    collections::BTreeMap,
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use derive_more::{Deref, From};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::{DeploymentRecord, network::NetworkId};

const CHAIN_ID_FILENAME: &str = ".chainId";
const LOCK_FILENAME: &str = ".lock";

/// Replace `path` with `contents`, flushed to disk before the rename makes it visible.
pub(crate) fn write_durable(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    let mut file = File::create(&tmp_path)
        .context(format!("Failed to create {}", tmp_path.display()))?;
    file.write_all(contents)
        .context(format!("Failed to write {}", tmp_path.display()))?;
    file.sync_all()
        .context(format!("Failed to sync {}", tmp_path.display()))?;
    drop(file);

    std::fs::rename(&tmp_path, path)
        .context(format!("Failed to move {} into place", path.display()))?;

    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        File::open(parent)
            .and_then(|dir| dir.sync_all())
            .context(format!("Failed to sync directory {}", parent.display()))?;
    }

    Ok(())
}

/// Logical name to address, for every record of a network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Deref, From)]
pub struct AddressBook(BTreeMap<String, Address>);

/// Network-scoped store of [`DeploymentRecord`]s.
#[derive(Debug)]
pub struct DeploymentRegistry {
    network: NetworkId,
    dir: PathBuf,
    /// Held for the lifetime of the registry, released on drop.
    _lock: File,
}

impl DeploymentRegistry {
    /// Open (and create if needed) the registry of `network` under `root`.
    pub fn open(root: &Path, network: NetworkId, chain_id: u64) -> Result<Self> {
        let dir = root.join(network.to_string());
        std::fs::create_dir_all(&dir).context(format!(
            "Failed to create deployments directory {}",
            dir.display()
        ))?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILENAME))
            .context("Failed to open registry lock file")?;
        lock.try_lock_exclusive().context(format!(
            "Deployments for {} are locked by another run",
            network
        ))?;

        let chain_id_path = dir.join(CHAIN_ID_FILENAME);
        if chain_id_path.exists() {
            let stored = std::fs::read_to_string(&chain_id_path)
                .context("Failed to read registry chain id")?;
            let stored: u64 = stored
                .trim()
                .parse()
                .context(format!("Malformed chain id in {}", chain_id_path.display()))?;
            if stored != chain_id {
                anyhow::bail!(
                    "Deployments in {} belong to chain {}, not {}",
                    dir.display(),
                    stored,
                    chain_id
                );
            }
        } else {
            write_durable(&chain_id_path, chain_id.to_string().as_bytes())
                .context("Failed to write registry chain id")?;
        }

        tracing::debug!(network = %network, path = %dir.display(), "Deployment registry opened");

        Ok(Self {
            network,
            dir,
            _lock: lock,
        })
    }

    pub fn network(&self) -> NetworkId {
        self.network
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            anyhow::bail!("Invalid deployment name: {:?}", name);
        }
        Ok(self.dir.join(format!("{name}.json")))
    }

    /// Fetch the record of a logical name. Unknown names are `None`, not an error.
    pub fn get(&self, name: &str) -> Result<Option<DeploymentRecord>> {
        let path = self.record_path(name)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .context(format!("Failed to read deployment record {}", path.display()))?;
        let record = serde_json::from_str(&content)
            .context(format!("Failed to parse deployment record {}", path.display()))?;
        Ok(Some(record))
    }

    pub fn has(&self, name: &str) -> bool {
        self.record_path(name).is_ok_and(|path| path.exists())
    }

    /// Durably store a record, replacing any previous record of the same name.
    pub fn put(&self, record: &DeploymentRecord) -> Result<()> {
        if record.network != self.network {
            anyhow::bail!(
                "Record `{}` belongs to {}, registry is for {}",
                record.name,
                record.network,
                self.network
            );
        }

        let path = self.record_path(&record.name)?;
        if let Some(previous) = self.get(&record.name)? {
            if previous.address != record.address {
                tracing::warn!(
                    name = %record.name,
                    previous = %previous.address,
                    address = %record.address,
                    "Superseding existing deployment"
                );
            }
        }

        let json = serde_json::to_string_pretty(record)
            .context("Failed to serialize deployment record")?;
        write_durable(&path, json.as_bytes())
            .context(format!("Failed to commit deployment record {}", path.display()))?;

        tracing::debug!(name = %record.name, path = %path.display(), "Deployment record saved");
        Ok(())
    }

    /// All records of the network, ordered by name.
    pub fn all(&self) -> Result<Vec<DeploymentRecord>> {
        let mut records = Vec::new();
        let entries = std::fs::read_dir(&self.dir)
            .context(format!("Failed to list deployments in {}", self.dir.display()))?;

        for entry in entries {
            let path = entry.context("Failed to read deployments directory entry")?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(name) = file_name.strip_suffix(".json") else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if let Some(record) = self.get(name)? {
                records.push(record);
            }
        }

        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    pub fn addresses(&self) -> Result<AddressBook> {
        Ok(self
            .all()?
            .into_iter()
            .map(|record| (record.name, record.address))
            .collect::<BTreeMap<_, _>>()
            .into())
    }
}
