//! Confhub Journal - Commit journaling, auditing, and replay
//!
//! This crate plugs into a hub as a listener and provides:
//!
//! - **CommitJournal**: Records every published revision (and abandoned transactions)
//! - **Auditor**: Query and analyze recorded changes
//! - **Replayer**: Rebuild hub contents at any recorded revision
//! - **Exporter**: Export journal data to various formats
//!
//! # Example
//!
//! ```
//! use confhub::{Hub, ListenerSet};
//! use confhub_core::Value;
//! use confhub_journal::{Auditor, CommitJournal, ExportFormat, Exporter, Replayer};
//! use std::sync::Arc;
//!
//! // Record a session
//! let journal = Arc::new(CommitJournal::new());
//! let listeners = Arc::new(ListenerSet::new());
//! listeners.register(journal.clone());
//! let hub = Hub::builder().listeners(listeners).build();
//!
//! let txn = hub.new_transaction();
//! txn.find_or_add_type("Server")
//!     .unwrap()
//!     .add_instance("srv1", Value::bean([("port", 80)]), None)
//!     .unwrap();
//! let published = txn.commit(None).unwrap();
//!
//! let entries = journal.entries();
//!
//! // Audit the session
//! let report = Auditor::new(&entries).generate_report();
//! assert_eq!(report.commit_count, 1);
//!
//! // Replay to a specific revision
//! let state = Replayer::new(&entries).replay_to(published.revision()).unwrap();
//! assert!(state.matches(&published));
//!
//! // Export for external analysis
//! let text = Exporter::new(&entries).export(ExportFormat::Text).unwrap();
//! assert!(text.contains("ADD_INSTANCE Server/srv1"));
//! ```

mod auditor;
mod error;
mod exporter;
mod journal;
mod replayer;

pub use auditor::{AuditQuery, AuditReport, Auditor};
pub use error::{Error, Result};
pub use exporter::{import_ron, ExportFormat, Exporter};
pub use journal::{ChangeEntry, CommitJournal, JournalConfig, JournalEntry, JournalStats};
pub use replayer::{ReplayedState, Replayer};
