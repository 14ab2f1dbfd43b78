// =============================================================================
// Audit Log — append-only streams for every consequential engine event
// =============================================================================
//
// Five logical streams (state transitions, risk events, orders, executions,
// user profits) plus weight changes and loop decisions.  Records flow through
// an unbounded channel into a single writer task that appends JSONL, one file
// per stream, so every stream has exactly one writer.  A capped in-memory
// mirror keeps the most recent records readable without touching disk.
//
// Persistence failures are logged and dropped; the decision loop never blocks
// on the audit path.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Maximum records retained in the in-memory mirror, across all streams.
const MAX_RECENT: usize = 512;

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

/// Logical audit stream.  Each stream maps to one append-only JSONL file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AuditStream {
    StateTransitions,
    RiskEvents,
    Orders,
    Executions,
    UserProfits,
    Weights,
    Decisions,
    Lifecycle,
}

impl AuditStream {
    fn file_name(self) -> &'static str {
        match self {
            Self::StateTransitions => "state_transitions.jsonl",
            Self::RiskEvents => "risk_events.jsonl",
            Self::Orders => "orders.jsonl",
            Self::Executions => "executions.jsonl",
            Self::UserProfits => "user_profits.jsonl",
            Self::Weights => "weights.jsonl",
            Self::Decisions => "decisions.jsonl",
            Self::Lifecycle => "lifecycle.jsonl",
        }
    }
}

/// One appended record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// Monotonic sequence number within this process.
    pub seq: u64,
    /// ISO 8601 UTC timestamp.
    pub timestamp: String,
    pub stream: AuditStream,
    /// Component that produced the record.
    pub source: String,
    /// Ties together every record born from the same decision loop.
    pub correlation_id: String,
    pub payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

pub struct AuditLog {
    tx: Option<mpsc::UnboundedSender<AuditRecord>>,
    recent: RwLock<VecDeque<AuditRecord>>,
    seq: AtomicU64,
}

impl AuditLog {
    /// Persistent log: spawns the single writer task appending under `dir`.
    pub fn spawn(dir: impl Into<PathBuf>) -> Arc<Self> {
        let dir = dir.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditRecord>();

        tokio::spawn(async move {
            if let Err(e) = std::fs::create_dir_all(&dir) {
                error!(dir = %dir.display(), error = %e, "audit dir creation failed; records will be dropped");
            }
            let mut files: HashMap<AuditStream, std::fs::File> = HashMap::new();

            while let Some(record) = rx.recv().await {
                let file = match files.entry(record.stream) {
                    std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                    std::collections::hash_map::Entry::Vacant(e) => {
                        let path = dir.join(record.stream.file_name());
                        match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
                            Ok(f) => e.insert(f),
                            Err(err) => {
                                warn!(path = %path.display(), error = %err, "audit file open failed; record dropped");
                                continue;
                            }
                        }
                    }
                };

                match serde_json::to_string(&record) {
                    Ok(line) => {
                        if let Err(e) = writeln!(file, "{line}") {
                            warn!(error = %e, "audit append failed; record dropped");
                        }
                    }
                    Err(e) => warn!(error = %e, "audit record serialisation failed"),
                }
            }
        });

        Arc::new(Self {
            tx: Some(tx),
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT)),
            seq: AtomicU64::new(0),
        })
    }

    /// Mirror-only log for tests and tools that never touch disk.
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self {
            tx: None,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT)),
            seq: AtomicU64::new(0),
        })
    }

    /// Append a record to `stream`.
    pub fn record(
        &self,
        stream: AuditStream,
        source: &str,
        correlation_id: &str,
        payload: impl Serialize,
    ) {
        let payload = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, source, "unserialisable audit payload dropped");
                return;
            }
        };

        let record = AuditRecord {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now().to_rfc3339(),
            stream,
            source: source.to_string(),
            correlation_id: correlation_id.to_string(),
            payload,
        };

        {
            let mut recent = self.recent.write();
            recent.push_back(record.clone());
            while recent.len() > MAX_RECENT {
                recent.pop_front();
            }
        }

        if let Some(tx) = &self.tx {
            // Writer gone during shutdown: the mirror already has the record.
            let _ = tx.send(record);
        }
    }

    /// Most recent records for one stream, oldest first.
    pub fn recent(&self, stream: AuditStream) -> Vec<AuditRecord> {
        self.recent
            .read()
            .iter()
            .filter(|r| r.stream == stream)
            .cloned()
            .collect()
    }

    pub fn total_recorded(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }
}
