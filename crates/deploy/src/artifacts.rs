//! Compiled contract artifacts and library linking.
//!
//! Artifacts are the JSON files a Hardhat build writes under `artifacts/`:
//! one per contract, carrying creation bytecode with unresolved library
//! placeholders and the byte offsets of those placeholders.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use alloy_core::primitives::{Address, Bytes};
use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::contracts::Contract;

/// Width of a linked library address, in bytes.
const ADDRESS_LEN: usize = 20;

/// A placeholder location inside creation bytecode, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LinkReference {
    pub start: usize,
    pub length: usize,
}

/// One compiled contract.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    pub contract_name: String,
    #[serde(default)]
    pub source_name: Option<String>,
    /// Hex creation code, possibly containing `__$...$__` placeholders.
    pub bytecode: String,
    /// Source file -> library name -> placeholder locations.
    #[serde(default)]
    pub link_references: BTreeMap<String, BTreeMap<String, Vec<LinkReference>>>,
}

impl ContractArtifact {
    /// Libraries this contract must be linked against.
    pub fn libraries(&self) -> impl Iterator<Item = &str> {
        self.link_references
            .values()
            .flat_map(|libraries| libraries.keys().map(String::as_str))
    }

    /// Creation code with every library placeholder replaced.
    ///
    /// `libraries` maps library names to deployed addresses. A referenced
    /// library missing from the map is an error, as is empty bytecode.
    pub fn link(&self, libraries: &HashMap<String, Address>) -> Result<Bytes> {
        let mut code = self
            .bytecode
            .strip_prefix("0x")
            .unwrap_or(&self.bytecode)
            .to_string();

        if code.is_empty() {
            bail!(
                "{} has no creation bytecode (interface or abstract contract)",
                self.contract_name
            );
        }
        if !code.is_ascii() {
            bail!("{} bytecode is not valid hex", self.contract_name);
        }

        for references in self.link_references.values() {
            for (library, locations) in references {
                let address = libraries.get(library).with_context(|| {
                    format!(
                        "{} must be linked against library {library}, which is not deployed",
                        self.contract_name
                    )
                })?;
                let address = hex::encode(address);

                for location in locations {
                    let span = location
                        .start
                        .checked_mul(2)
                        .and_then(|start| Some((start, start.checked_add(ADDRESS_LEN * 2)?)))
                        .filter(|&(_, end)| location.length == ADDRESS_LEN && end <= code.len());
                    let Some((start, end)) = span else {
                        bail!(
                            "{}: invalid link reference for {library} at byte {}",
                            self.contract_name,
                            location.start
                        );
                    };
                    code.replace_range(start..end, &address);
                }
            }
        }

        let bytes = hex::decode(&code).with_context(|| {
            format!("{} bytecode is not valid hex after linking", self.contract_name)
        })?;
        Ok(bytes.into())
    }
}

/// Artifacts of a build, indexed by contract name.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    root: PathBuf,
    by_name: HashMap<String, Vec<PathBuf>>,
}

impl Artifacts {
    /// Index every artifact under `root`, recursively.
    ///
    /// Debug sidecars (`*.dbg.json`) and the `build-info` directory are skipped.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!("Artifacts directory not found: {}", root.display());
        }

        let mut artifacts = Self {
            root: root.to_path_buf(),
            by_name: HashMap::new(),
        };
        artifacts.index_dir(root)?;

        tracing::debug!(
            root = %root.display(),
            contracts = artifacts.by_name.len(),
            "Artifacts indexed"
        );
        Ok(artifacts)
    }

    fn index_dir(&mut self, dir: &Path) -> Result<()> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

        for entry in entries {
            let path = entry
                .with_context(|| format!("Failed to read entry in {}", dir.display()))?
                .path();

            if path.is_dir() {
                if path.file_name().is_some_and(|n| n == "build-info") {
                    continue;
                }
                self.index_dir(&path)?;
                continue;
            }

            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.ends_with(".dbg.json") {
                continue;
            }
            if let Some(name) = file_name.strip_suffix(".json") {
                self.by_name.entry(name.to_string()).or_default().push(path.clone());
            }
        }

        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the artifact named `name`.
    ///
    /// Fails if no artifact or more than one artifact carries that name.
    pub fn load(&self, name: &str) -> Result<ContractArtifact> {
        let path = match self.by_name.get(name).map(Vec::as_slice) {
            None | Some([]) => bail!(
                "No artifact for contract {name} under {}",
                self.root.display()
            ),
            Some([path]) => path,
            Some(paths) => bail!(
                "Contract name {name} is ambiguous: {}",
                paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact: {}", path.display()))?;
        let artifact: ContractArtifact = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact: {}", path.display()))?;

        if artifact.contract_name != name {
            bail!(
                "Artifact {} declares contract {}, expected {name}",
                path.display(),
                artifact.contract_name
            );
        }
        Ok(artifact)
    }

    pub fn contract(&self, contract: Contract) -> Result<ContractArtifact> {
        self.load(contract.artifact_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempdir::TempDir;

    fn write_artifact(dir: &Path, name: &str, artifact: serde_json::Value) {
        std::fs::create_dir_all(dir).expect("Failed to create artifact dir");
        std::fs::write(dir.join(format!("{name}.json")), artifact.to_string())
            .expect("Failed to write artifact");
    }

    /// 4 bytes of code, a 20-byte placeholder, then 2 more bytes.
    fn linked_artifact() -> serde_json::Value {
        let placeholder = format!("__${}$__", "a".repeat(34));
        json!({
            "contractName": "Vault",
            "sourceName": "contracts/core/Vault.sol",
            "bytecode": format!("0x60806040{placeholder}6000"),
            "linkReferences": {
                "contracts/libraries/MathLibrary.sol": {
                    "MathLibrary": [{ "start": 4, "length": 20 }]
                }
            }
        })
    }

    #[test]
    fn test_link_substitutes_library_address() {
        let artifact: ContractArtifact = serde_json::from_value(linked_artifact()).unwrap();
        assert_eq!(artifact.libraries().collect::<Vec<_>>(), vec!["MathLibrary"]);

        let library = Address::repeat_byte(0xab);
        let libraries = HashMap::from([("MathLibrary".to_string(), library)]);
        let code = artifact.link(&libraries).unwrap();

        assert_eq!(code.len(), 26);
        assert_eq!(&code[..4], &[0x60, 0x80, 0x60, 0x40]);
        assert_eq!(&code[4..24], library.as_slice());
        assert_eq!(&code[24..], &[0x60, 0x00]);
    }

    #[test]
    fn test_link_requires_every_library() {
        let artifact: ContractArtifact = serde_json::from_value(linked_artifact()).unwrap();
        let err = artifact.link(&HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("MathLibrary"));
    }

    #[test]
    fn test_malformed_bytecode_is_an_error() {
        let mut artifact: ContractArtifact = serde_json::from_value(linked_artifact()).unwrap();
        let libraries = HashMap::from([("MathLibrary".to_string(), Address::repeat_byte(0xab))]);

        artifact.bytecode = format!("0x6\u{e9}{}", "0".repeat(60));
        let err = artifact.link(&libraries).unwrap_err();
        assert!(err.to_string().contains("not valid hex"));

        let mut artifact: ContractArtifact = serde_json::from_value(linked_artifact()).unwrap();
        for references in artifact.link_references.values_mut() {
            for locations in references.values_mut() {
                locations[0].start = usize::MAX;
            }
        }
        let err = artifact.link(&libraries).unwrap_err();
        assert!(err.to_string().contains("invalid link reference for MathLibrary"));
    }

    #[test]
    fn test_empty_bytecode_cannot_be_deployed() {
        let artifact: ContractArtifact = serde_json::from_value(json!({
            "contractName": "IStrategy",
            "bytecode": "0x",
        }))
        .unwrap();
        assert!(artifact.link(&HashMap::new()).is_err());
    }

    #[test]
    fn test_open_indexes_recursively() {
        let temp_dir = TempDir::new("oven-artifacts").expect("Failed to create temp dir");
        let root = temp_dir.path();

        write_artifact(&root.join("contracts/core/Vault.sol"), "Vault", linked_artifact());
        std::fs::write(root.join("contracts/core/Vault.sol/Vault.dbg.json"), "{}").unwrap();
        write_artifact(
            &root.join("build-info"),
            "Vault",
            json!({ "contractName": "Vault", "bytecode": "0x00" }),
        );

        let artifacts = Artifacts::open(root).unwrap();
        let vault = artifacts.contract(Contract::Vault).unwrap();
        assert_eq!(vault.contract_name, "Vault");
        assert!(artifacts.load("MathLibrary").is_err());
    }

    #[test]
    fn test_duplicate_names_are_ambiguous() {
        let temp_dir = TempDir::new("oven-artifacts").expect("Failed to create temp dir");
        let root = temp_dir.path();
        let artifact = json!({ "contractName": "Settings", "bytecode": "0x6080" });

        write_artifact(&root.join("a/Settings.sol"), "Settings", artifact.clone());
        write_artifact(&root.join("b/Settings.sol"), "Settings", artifact);

        let err = Artifacts::open(root).unwrap().load("Settings").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn test_missing_root() {
        let temp_dir = TempDir::new("oven-artifacts").expect("Failed to create temp dir");
        assert!(Artifacts::open(&temp_dir.path().join("nope")).is_err());
    }
}
