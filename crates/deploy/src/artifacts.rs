//! Hardhat compilation artifacts.
//!
//! Contracts are compiled outside of this tool. An artifact is found by contract name
//! anywhere under the artifacts directory (`<root>/contracts/<File>.sol/<Name>.json`),
//! and its `<Name>.dbg.json` sibling points at the build info holding the standard JSON
//! compiler input used for source verification.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

const BUILD_INFO_DIR: &str = "build-info";

/// A compiled contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    pub source_name: String,
    #[serde(default)]
    pub abi: Value,
    /// Creation bytecode, `0x`-prefixed hex.
    pub bytecode: String,
}

impl Artifact {
    /// Decode the creation bytecode.
    ///
    /// Fails on unlinked library placeholders, which this tool does not resolve.
    pub fn creation_code(&self) -> Result<Vec<u8>> {
        let code = self.bytecode.trim_start_matches("0x");
        if code.contains("__$") {
            anyhow::bail!(
                "Contract {} requires library linking, which is not supported",
                self.contract_name
            );
        }
        if code.is_empty() {
            anyhow::bail!(
                "Contract {} has no creation bytecode (abstract contract or interface?)",
                self.contract_name
            );
        }
        hex::decode(code).context(format!("Invalid bytecode for {}", self.contract_name))
    }

    /// SHA-256 hex digest of the creation bytecode.
    pub fn bytecode_hash(&self) -> Result<String> {
        let code = self.creation_code()?;
        Ok(hex::encode(Sha256::digest(&code)))
    }

    /// Fully qualified name expected by source verifiers.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: String,
}

/// Compiler input and version a contract was built with.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub solc_long_version: String,
    pub input: Value,
}

/// Read-only view over a Hardhat artifacts directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locate the artifact file of a contract.
    pub fn artifact_path(&self, contract: &str) -> Result<PathBuf> {
        let file_name = format!("{contract}.json");
        let mut matches = Vec::new();
        find_files(&self.root, &file_name, &mut matches)?;

        match matches.len() {
            0 => anyhow::bail!(
                "No artifact for contract {} under {}",
                contract,
                self.root.display()
            ),
            1 => Ok(matches.remove(0)),
            _ => {
                matches.sort();
                anyhow::bail!(
                    "Contract name {} is ambiguous: {}",
                    contract,
                    matches
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
        }
    }

    pub fn load(&self, contract: &str) -> Result<Artifact> {
        let path = self.artifact_path(contract)?;
        let content = std::fs::read_to_string(&path)
            .context(format!("Failed to read artifact {}", path.display()))?;
        serde_json::from_str(&content).context(format!("Failed to parse artifact {}", path.display()))
    }

    /// Load the build info referenced by a contract's debug file.
    pub fn build_info(&self, contract: &str) -> Result<BuildInfo> {
        let artifact_path = self.artifact_path(contract)?;
        let dbg_path = artifact_path.with_file_name(format!("{contract}.dbg.json"));
        let dbg_content = std::fs::read_to_string(&dbg_path)
            .context(format!("Failed to read debug file {}", dbg_path.display()))?;
        let dbg: DebugFile = serde_json::from_str(&dbg_content)
            .context(format!("Failed to parse debug file {}", dbg_path.display()))?;

        let parent = dbg_path
            .parent()
            .context("Debug file path must have a parent directory")?;
        let build_info_path = parent.join(&dbg.build_info);
        let content = std::fs::read_to_string(&build_info_path).context(format!(
            "Failed to read build info {}",
            build_info_path.display()
        ))?;
        serde_json::from_str(&content).context(format!(
            "Failed to parse build info {}",
            build_info_path.display()
        ))
    }
}

fn find_files(dir: &Path, file_name: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).context(format!("Failed to read directory {}", dir.display()))?;

    for entry in entries {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|n| n == BUILD_INFO_DIR) {
                continue;
            }
            find_files(&path, file_name, out)?;
        } else if path.file_name().is_some_and(|n| n == file_name) {
            out.push(path);
        }
    }
    Ok(())
}
