use crate::{AddressPair, AddressTable, LivenessConfig, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressLayout {
    #[default]
    Sequential,
    /// Identifier table of the deployed board firmware (slots 3 and 4 share a status id).
    Legacy,
    /// `pairs`, one per slot.
    Custom,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressConfig {
    #[serde(default)]
    pub layout: AddressLayout,
    #[serde(default)]
    pub pairs: Vec<AddressPair>,
}

/// Host-side settings for a node bus.
///
/// ```yaml
/// addresses:
///   layout: legacy
/// liveness:
///   inactivity_threshold_ms: 2000
///   max_retries: 8
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub addresses: AddressConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    /// Mode byte of the start request.
    #[serde(default)]
    pub start_mode: u8,
}

impl NodeConfig {
    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(raw).context("parsing node config yaml")
    }

    pub fn address_table(&self) -> Result<AddressTable> {
        let table = match self.addresses.layout {
            AddressLayout::Sequential => AddressTable::sequential(),
            AddressLayout::Legacy => AddressTable::legacy(),
            AddressLayout::Custom => AddressTable::custom(&self.addresses.pairs)?,
        };
        for (a, b) in table.collisions() {
            tracing::warn!(slot_a = a, slot_b = b, "address table: slots share a bus identifier");
        }
        Ok(table)
    }
}

pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<NodeConfig> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading config: {}", path.display()))?;
    let cfg = NodeConfig::from_yaml_str(&raw)
        .with_context(|| format!("decoding config: {}", path.display()))?;
    cfg.address_table()
        .with_context(|| format!("address table in {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() -> anyhow::Result<()> {
        let cfg = NodeConfig::from_yaml_str("{}")?;
        assert_eq!(cfg, NodeConfig::default());
        assert_eq!(cfg.liveness.max_retries, 8);
        assert_eq!(cfg.address_table()?, AddressTable::sequential());
        Ok(())
    }

    #[test]
    fn partial_liveness_keeps_other_defaults() -> anyhow::Result<()> {
        let cfg = NodeConfig::from_yaml_str(
            "addresses:\n  layout: legacy\nliveness:\n  max_retries: 3\n",
        )?;
        assert_eq!(cfg.liveness.max_retries, 3);
        assert_eq!(cfg.liveness.attempt_window_ms, 50);
        assert_eq!(cfg.address_table()?, AddressTable::legacy());
        Ok(())
    }

    #[test]
    fn custom_pairs() -> anyhow::Result<()> {
        let cfg = NodeConfig::from_yaml_str(
            "addresses:\n  layout: custom\n  pairs:\n    - { inbound: 768, outbound: 769 }\n",
        )?;
        let table = cfg.address_table()?;
        assert_eq!(table.capacity(), 1);
        assert_eq!(table.address_for(0)?, AddressPair::new(0x300, 0x301));
        Ok(())
    }

    #[test]
    fn load_from_file() -> anyhow::Result<()> {
        let path = std::env::temp_dir().join(format!("node-config-{}.yaml", std::process::id()));
        fs::write(&path, "start_mode: 2\n")?;
        let cfg = load_config_file(&path)?;
        fs::remove_file(&path)?;
        assert_eq!(cfg.start_mode, 2);
        Ok(())
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_config_file("/nonexistent/node.yaml");
        let msg = err.err().map(|e| format!("{e:#}")).unwrap_or_default();
        assert!(msg.contains("/nonexistent/node.yaml"));
    }
}
