//! Auditing and analytics for journal data

use crate::journal::{ChangeEntry, JournalEntry, JournalStats};
use confhub::ChangeCategory;
use std::collections::HashMap;

/// Auditor for querying and analyzing journal entries
pub struct Auditor<'a> {
    entries: &'a [JournalEntry],
}

impl<'a> Auditor<'a> {
    /// Create a new auditor over journal entries
    pub fn new(entries: &'a [JournalEntry]) -> Self {
        Self { entries }
    }

    /// Generate a comprehensive audit report
    pub fn generate_report(&self) -> AuditReport {
        let stats = JournalStats::from_entries(self.entries);
        let mut changes_by_category: HashMap<ChangeCategory, u64> = HashMap::new();
        let mut changes_by_type: HashMap<String, u64> = HashMap::new();
        let mut total_changes = 0;

        for change in self.entries.iter().flat_map(JournalEntry::changes) {
            total_changes += 1;
            *changes_by_category.entry(change.category).or_insert(0) += 1;
            *changes_by_type.entry(change.type_name.clone()).or_insert(0) += 1;
        }

        AuditReport {
            total_entries: stats.total_entries,
            commit_count: stats.commit_count,
            rollback_count: stats.rollback_count,
            first_revision: stats.first_revision,
            last_revision: stats.last_revision,
            total_changes,
            changes_by_category,
            changes_by_type,
        }
    }

    /// Query committed changes matching specific criteria
    ///
    /// Each result carries the revision that published it.
    pub fn query(&self, query: &AuditQuery) -> Vec<(u64, &'a ChangeEntry)> {
        self.committed_changes()
            .filter(|(revision, change)| query.matches(*revision, change))
            .collect()
    }

    /// History of one instance, oldest first
    pub fn changes_for(&self, type_name: &str, key: &str) -> Vec<(u64, &'a ChangeEntry)> {
        self.query(&AuditQuery::new().by_instance(type_name, key))
    }

    /// Get all type names that were ever touched, in first-touched order
    pub fn touched_types(&self) -> Vec<&'a str> {
        let mut types: Vec<&str> = Vec::new();
        for (_, change) in self.committed_changes() {
            if !types.contains(&change.type_name.as_str()) {
                types.push(&change.type_name);
            }
        }
        types
    }

    /// Committed entries whose message equals `message`
    pub fn commits_with_message(&self, message: &str) -> Vec<&'a JournalEntry> {
        self.entries
            .iter()
            .filter(|e| e.is_commit() && e.message().and_then(|m| m.as_str()) == Some(message))
            .collect()
    }

    fn committed_changes(&self) -> impl Iterator<Item = (u64, &'a ChangeEntry)> {
        let entries: &'a [JournalEntry] = self.entries;
        entries.iter().flat_map(|entry| {
            let revision = entry.revision().unwrap_or_default();
            entry.changes().iter().map(move |change| (revision, change))
        })
    }
}

/// A comprehensive audit report
#[derive(Debug, Clone)]
pub struct AuditReport {
    /// Total number of journal entries
    pub total_entries: usize,
    /// Number of published revisions
    pub commit_count: usize,
    /// Number of abandoned transactions
    pub rollback_count: usize,
    /// First published revision in journal
    pub first_revision: Option<u64>,
    /// Last published revision in journal
    pub last_revision: Option<u64>,
    /// Total number of committed changes
    pub total_changes: u64,
    /// Committed changes per category
    pub changes_by_category: HashMap<ChangeCategory, u64>,
    /// Committed changes per type
    pub changes_by_type: HashMap<String, u64>,
}

impl std::fmt::Display for AuditReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Audit Report ===")?;
        writeln!(f, "Total entries: {}", self.total_entries)?;
        writeln!(f, "Commits: {}", self.commit_count)?;
        writeln!(f, "Rollbacks: {}", self.rollback_count)?;
        writeln!(f, "Changes: {}", self.total_changes)?;

        if let (Some(first), Some(last)) = (self.first_revision, self.last_revision) {
            writeln!(f, "Revision range: {} - {}", first, last)?;
        }

        if !self.changes_by_category.is_empty() {
            writeln!(f, "\nChanges by category:")?;
            let mut sorted: Vec<_> = self.changes_by_category.iter().collect();
            sorted.sort_by_key(|(category, count)| (std::cmp::Reverse(**count), category.label()));
            for (category, count) in sorted {
                writeln!(f, "  {}: {}", category, count)?;
            }
        }

        if !self.changes_by_type.is_empty() {
            writeln!(f, "\nChanges by type:")?;
            let mut sorted: Vec<_> = self.changes_by_type.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (type_name, count) in sorted {
                writeln!(f, "  {}: {}", type_name, count)?;
            }
        }

        Ok(())
    }
}

/// Query criteria for filtering committed changes
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Start revision (inclusive)
    pub from_revision: Option<u64>,
    /// End revision (inclusive)
    pub to_revision: Option<u64>,
    /// Filter by type
    pub type_name: Option<String>,
    /// Filter by instance key
    pub instance_key: Option<String>,
    /// Filter by change category
    pub category: Option<ChangeCategory>,
}

impl AuditQuery {
    /// Create a new empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by revision range
    pub fn in_range(mut self, from: u64, to: u64) -> Self {
        self.from_revision = Some(from);
        self.to_revision = Some(to);
        self
    }

    /// Filter by type
    pub fn by_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Filter by type and instance key
    pub fn by_instance(mut self, type_name: impl Into<String>, key: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self.instance_key = Some(key.into());
        self
    }

    /// Filter by change category
    pub fn by_category(mut self, category: ChangeCategory) -> Self {
        self.category = Some(category);
        self
    }

    fn matches(&self, revision: u64, change: &ChangeEntry) -> bool {
        if self.from_revision.is_some_and(|from| revision < from) {
            return false;
        }
        if self.to_revision.is_some_and(|to| revision > to) {
            return false;
        }
        if let Some(ref type_name) = self.type_name {
            if &change.type_name != type_name {
                return false;
            }
        }
        if let Some(ref key) = self.instance_key {
            if change.instance_key.as_ref() != Some(key) {
                return false;
            }
        }
        if let Some(category) = self.category {
            if change.category != category {
                return false;
            }
        }
        true
    }
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
        let servers = txn.find_or_add_type("Server").unwrap();
        servers.add_instance("srv1", Value::bean([("port", 80)]), None).unwrap();
        servers.add_instance("srv2", Value::bean([("port", 81)]), None).unwrap();
        revisions.push(txn.commit(Some(Value::from("seed"))).unwrap().revision());

        let txn = hub.new_transaction();
        txn.get_type("Server")
            .unwrap()
            .modify_instance("srv1", Value::bean([("port", 8080)]), Vec::new())
            .unwrap();
        txn.find_or_add_type("Client").unwrap();
        revisions.push(txn.commit(None).unwrap().revision());

        let txn = hub.new_transaction();
        txn.get_type("Server").unwrap().remove_instance("srv1").unwrap();
        revisions.push(txn.commit(Some(Value::from("retire srv1"))).unwrap().revision());

        (journal.entries(), revisions)
    }

    #[test]
    fn test_generate_report() {
        let (entries, revisions) = create_test_journal();
        let report = Auditor::new(&entries).generate_report();

        assert_eq!(report.commit_count, 3);
        assert_eq!(report.rollback_count, 0);
        assert_eq!(report.total_changes, 6);
        assert_eq!(report.first_revision, revisions.first().copied());
        assert_eq!(report.last_revision, revisions.last().copied());
        assert_eq!(report.changes_by_type.get("Server"), Some(&5));
        assert_eq!(
            report.changes_by_category.get(&ChangeCategory::AddInstance),
            Some(&2)
        );

        let text = report.to_string();
        assert!(text.contains("Commits: 3"));
        assert!(text.contains("ADD_INSTANCE: 2"));
    }

    #[test]
    fn test_changes_for_instance() {
        let (entries, revisions) = create_test_journal();
        let auditor = Auditor::new(&entries);
        let history = auditor.changes_for("Server", "srv1");

        let summary: Vec<_> = history.iter().map(|(rev, c)| (*rev, c.category)).collect();
        assert_eq!(
            summary,
            vec![
                (revisions[0], ChangeCategory::AddInstance),
                (revisions[1], ChangeCategory::ModifyInstance),
                (revisions[2], ChangeCategory::RemoveInstance),
            ]
        );
        assert_eq!(history[1].1.to_string(), "MODIFY_INSTANCE Server/srv1 [port: 80 -> 8080]");
    }

    #[test]
    fn test_query_by_range_and_category() {
        let (entries, revisions) = create_test_journal();
        let auditor = Auditor::new(&entries);

        let later = auditor.query(&AuditQuery::new().in_range(revisions[1], revisions[2]));
        assert!(later.iter().all(|(rev, _)| *rev >= revisions[1]));
        assert_eq!(later.len(), 3);

        let added_types = auditor.query(&AuditQuery::new().by_category(ChangeCategory::AddType));
        let names: Vec<_> = added_types.iter().map(|(_, c)| c.type_name.as_str()).collect();
        assert_eq!(names, vec!["Server", "Client"]);
    }

    #[test]
    fn test_touched_types_and_messages() {
        let (entries, revisions) = create_test_journal();
        let auditor = Auditor::new(&entries);

        assert_eq!(auditor.touched_types(), vec!["Server", "Client"]);
        let retired = auditor.commits_with_message("retire srv1");
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].revision(), Some(revisions[2]));
    }
}
