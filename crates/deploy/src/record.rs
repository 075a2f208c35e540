//! The Deployment Record: what was deployed or registered, in order.

use alloy_core::primitives::Address;
use comfy_table::{Table, presets::UTF8_FULL};
use derive_more::Deref;

/// One labeled address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub label: String,
    pub address: Address,
}

/// Ordered `(label, address)` entries, appended as each step completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref)]
pub struct DeploymentRecord {
    #[deref]
    entries: Vec<RecordEntry>,
}

impl DeploymentRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: impl Into<String>, address: Address) {
        let label = label.into();
        tracing::debug!(%label, %address, "Recorded");
        self.entries.push(RecordEntry { label, address });
    }

    /// Index of the first entry with `label`.
    pub fn position(&self, label: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.label == label)
    }

    pub fn find(&self, label: &str) -> Option<Address> {
        self.entries
            .iter()
            .find(|e| e.label == label)
            .map(|e| e.address)
    }

    /// Render the report printed at the end of a run.
    pub fn to_table(&self, network: &str, chain_id: u64) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Name", "Value"]);
        table.add_row(vec!["Network Name".to_string(), network.to_string()]);
        table.add_row(vec!["Network Id".to_string(), chain_id.to_string()]);
        for entry in &self.entries {
            table.add_row(vec![entry.label.clone(), entry.address.to_checksum(None)]);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_keep_insertion_order() {
        let mut record = DeploymentRecord::new();
        record.push("Proxy Admin", Address::repeat_byte(0x01));
        record.push("WETH", Address::repeat_byte(0x02));
        record.push("WETH", Address::repeat_byte(0x03));

        assert_eq!(record.len(), 3);
        assert_eq!(record.position("WETH"), Some(1));
        assert_eq!(record.find("WETH"), Some(Address::repeat_byte(0x02)));
        assert_eq!(record.find("Vault"), None);
        assert_eq!(record[2].address, Address::repeat_byte(0x03));
    }

    #[test]
    fn test_table_has_network_header_rows() {
        let mut record = DeploymentRecord::new();
        record.push("Vault (Proxy)", Address::repeat_byte(0xaa));

        let rendered = record.to_table("base", 8453).to_string();
        assert!(rendered.contains("Network Name"));
        assert!(rendered.contains("8453"));
        assert!(rendered.contains("Vault (Proxy)"));
        assert!(rendered.contains(&Address::repeat_byte(0xaa).to_checksum(None)));
    }
}
