//! Export journal data to various formats

use crate::journal::{JournalEntry, JournalStats};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// RON format (Rust Object Notation)
    Ron,
    /// JSON format (requires serde_json feature)
    Json,
    /// CSV format (one row per committed change)
    Csv,
    /// Human-readable text format
    Text,
}

/// Exporter for journal data
pub struct Exporter<'a> {
    entries: &'a [JournalEntry],
}

impl<'a> Exporter<'a> {
    /// Create a new exporter
    pub fn new(entries: &'a [JournalEntry]) -> Self {
        Self { entries }
    }

    /// Export to a string in the specified format
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Ron => self.to_ron(),
            ExportFormat::Json => self.to_json(),
            ExportFormat::Csv => Ok(self.to_csv()),
            ExportFormat::Text => Ok(self.to_text()),
        }
    }

    /// Export to a writer
    pub fn export_to<W: Write>(&self, writer: &mut W, format: ExportFormat) -> Result<()> {
        let content = self.export(format)?;
        writer.write_all(content.as_bytes())?;
        Ok(())
    }

    /// Export to RON format
    pub fn to_ron(&self) -> Result<String> {
        let export = ExportData::from_entries(self.entries);
        ron::ser::to_string_pretty(&export, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Export to JSON format
    #[cfg(feature = "serde_json")]
    pub fn to_json(&self) -> Result<String> {
        let export = ExportData::from_entries(self.entries);
        serde_json::to_string_pretty(&export).map_err(|e| Error::Serialization(e.to_string()))
    }

    #[cfg(not(feature = "serde_json"))]
    pub fn to_json(&self) -> Result<String> {
        Err(Error::ExportError(
            "JSON export requires the 'serde_json' feature".to_string(),
        ))
    }

    /// Export to CSV format (committed changes only)
    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str("revision,category,type,key,property_changes\n");

        for entry in self.entries {
            let Some(revision) = entry.revision() else {
                continue;
            };
            for change in entry.changes() {
                let diffs = change
                    .property_changes
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");

                output.push_str(&format!(
                    "{},{},{},{},{}\n",
                    revision,
                    change.category,
                    csv_field(&change.type_name),
                    csv_field(change.instance_key.as_deref().unwrap_or_default()),
                    csv_field(&diffs)
                ));
            }
        }

        output
    }

    /// Export to human-readable text format
    pub fn to_text(&self) -> String {
        let mut output = String::new();
        let stats = JournalStats::from_entries(self.entries);

        output.push_str("=== Journal Export ===\n\n");
        output.push_str(&format!("Total entries: {}\n", stats.total_entries));
        output.push_str(&format!("Commits: {}\n", stats.commit_count));
        output.push_str(&format!("Rollbacks: {}\n", stats.rollback_count));

        if let (Some(first), Some(last)) = (stats.first_revision, stats.last_revision) {
            output.push_str(&format!("Revision range: {} - {}\n", first, last));
        }

        output.push_str("\n=== Entries ===\n");

        for entry in self.entries {
            match entry {
                JournalEntry::Committed {
                    from_revision,
                    to_revision,
                    message,
                    changes,
                    recorded_at,
                } => {
                    output.push_str(&format!(
                        "\n--- Revision {} (from {}) at {} ---\n",
                        to_revision,
                        from_revision,
                        recorded_at.to_rfc3339()
                    ));
                    if let Some(message) = message {
                        output.push_str(&format!("  message: {}\n", message));
                    }
                    for change in changes {
                        output.push_str(&format!("  {}\n", change));
                    }
                }
                JournalEntry::RolledBack {
                    base_revision,
                    message,
                    change_count,
                    recorded_at,
                } => {
                    output.push_str(&format!(
                        "\n--- Rolled back over {} at {} ---\n",
                        base_revision,
                        recorded_at.to_rfc3339()
                    ));
                    if let Some(message) = message {
                        output.push_str(&format!("  message: {}\n", message));
                    }
                    output.push_str(&format!("  {} changes discarded\n", change_count));
                }
            }
        }

        output
    }

    /// Export only committed entries in a revision range (inclusive)
    pub fn export_range(&self, start: u64, end: u64, format: ExportFormat) -> Result<String> {
        let entries: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.revision().is_some_and(|r| r >= start && r <= end))
            .cloned()
            .collect();
        let filtered = Exporter::new(&entries);

        match format {
            ExportFormat::Ron | ExportFormat::Json => filtered.export(format),
            _ => Err(Error::ExportError(
                "Range export only supports RON and JSON".to_string(),
            )),
        }
    }
}

/// Parse entries back from a RON export
pub fn import_ron(text: &str) -> Result<Vec<JournalEntry>> {
    let data: ExportData = ron::from_str(text).map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(data.entries)
}

/// Data structure for full journal export
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExportData {
    version: u32,
    stats: ExportStats,
    entries: Vec<JournalEntry>,
}

impl ExportData {
    fn from_entries(entries: &[JournalEntry]) -> Self {
        let stats = JournalStats::from_entries(entries);
        Self {
            version: 1,
            stats: ExportStats {
                total_entries: stats.total_entries,
                commit_count: stats.commit_count,
                rollback_count: stats.rollback_count,
                first_revision: stats.first_revision,
                last_revision: stats.last_revision,
            },
            entries: entries.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExportStats {
    total_entries: usize,
    commit_count: usize,
    rollback_count: usize,
    first_revision: Option<u64>,
    last_revision: Option<u64>,
}

/// Quote a CSV field, doubling embedded quotes
fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::CommitJournal;
    use confhub::{Hub, ListenerSet};
    use confhub_core::Value;
    use std::sync::Arc;

    fn create_test_journal() -> (Vec<JournalEntry>, Vec<u64>) {
        let journal = Arc::new(CommitJournal::new());
        let listeners = Arc::new(ListenerSet::new());
        listeners.register(journal.clone());
        let hub = Hub::builder().listeners(listeners).build();
        let mut revisions = Vec::new();

        let txn = hub.new_transaction();
        txn.find_or_add_type("Widget")
            .unwrap()
            .add_instance("w1", Value::bean([("color", "red")]), None)
            .unwrap();
        revisions.push(txn.commit(Some(Value::from("seed"))).unwrap().revision());

        let txn = hub.new_transaction();
        txn.get_type("Widget")
            .unwrap()
            .modify_instance("w1", Value::bean([("color", "blue")]), Vec::new())
            .unwrap();
        revisions.push(txn.commit(None).unwrap().revision());

        (journal.entries(), revisions)
    }

    #[test]
    fn test_export_ron_roundtrip() {
        let (entries, _) = create_test_journal();
        let exporter = Exporter::new(&entries);
        let ron = exporter.to_ron().unwrap();

        assert!(ron.contains("version"));
        assert!(ron.contains("entries"));

        let back = import_ron(&ron).unwrap();
        assert_eq!(back.len(), entries.len());
        assert_eq!(back[1].changes(), entries[1].changes());
        assert_eq!(back[0].message(), Some(&Value::from("seed")));
    }

    #[test]
    fn test_export_csv() {
        let (entries, revisions) = create_test_journal();
        let csv = Exporter::new(&entries).to_csv();

        assert!(csv.starts_with("revision,category,type,key,property_changes\n"));
        assert_eq!(csv.lines().count(), 4);
        assert!(csv.contains(&format!(
            "{},MODIFY_INSTANCE,\"Widget\",\"w1\",\"color: \"\"red\"\" -> \"\"blue\"\"\"",
            revisions[1]
        )));
    }

    #[test]
    fn test_export_csv_quotes_names_and_keys() {
        let journal = Arc::new(CommitJournal::new());
        let listeners = Arc::new(ListenerSet::new());
        listeners.register(journal.clone());
        let hub = Hub::builder().listeners(listeners).build();

        let txn = hub.new_transaction();
        txn.find_or_add_type("Rack, east")
            .unwrap()
            .add_instance("say \"hi\",twice", Value::bean([("n", 1)]), None)
            .unwrap();
        let revision = txn.commit(None).unwrap().revision();

        let entries = journal.entries();
        let csv = Exporter::new(&entries).to_csv();
        let rows: Vec<_> = csv.lines().skip(1).collect();
        assert_eq!(
            rows,
            vec![
                format!("{},ADD_TYPE,\"Rack, east\",\"\",\"\"", revision),
                format!(
                    "{},ADD_INSTANCE,\"Rack, east\",\"say \"\"hi\"\",twice\",\"\"",
                    revision
                ),
            ]
        );
    }

    #[test]
    fn test_export_text() {
        let (entries, revisions) = create_test_journal();
        let text = Exporter::new(&entries).to_text();

        assert!(text.contains("Journal Export"));
        assert!(text.contains(&format!("Revision {}", revisions[0])));
        assert!(text.contains("message: \"seed\""));
        assert!(text.contains("ADD_INSTANCE Widget/w1"));
    }

    #[test]
    fn test_export_range() {
        let (entries, revisions) = create_test_journal();
        let exporter = Exporter::new(&entries);
        let ron = exporter
            .export_range(revisions[1], revisions[1], ExportFormat::Ron)
            .unwrap();

        let back = import_ron(&ron).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].revision(), Some(revisions[1]));
        assert!(exporter
            .export_range(0, u64::MAX, ExportFormat::Text)
            .is_err());
    }

    #[test]
    fn test_export_to_writer() {
        let (entries, _) = create_test_journal();
        let mut buffer = Vec::new();
        Exporter::new(&entries)
            .export_to(&mut buffer, ExportFormat::Text)
            .unwrap();
        assert!(String::from_utf8(buffer).unwrap().starts_with("=== Journal Export ==="));
    }

    #[cfg(not(feature = "serde_json"))]
    #[test]
    fn test_json_requires_feature() {
        let (entries, _) = create_test_journal();
        assert!(matches!(
            Exporter::new(&entries).to_json(),
            Err(Error::ExportError(_))
        ));
    }

    #[cfg(feature = "serde_json")]
    #[test]
    fn test_export_json() {
        let (entries, _) = create_test_journal();
        let json = Exporter::new(&entries).to_json().unwrap();
        assert!(json.contains("\"Committed\""));
    }
}
