use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use crate::registry::TestId;

/// What a check resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub passed: bool,
    pub message: Option<String>,
}

impl CheckOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: Some(message.into()),
        }
    }
}

/// Recorded outcome of one test in a run. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub index: usize,
    pub test_id: TestId,
    pub passed: bool,
    pub message: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl Verdict {
    pub fn new(index: usize, test_id: TestId, outcome: CheckOutcome) -> Self {
        Self {
            index,
            test_id,
            passed: outcome.passed,
            message: outcome.message,
            recorded_at: Utc::now(),
        }
    }

    pub fn marker(&self) -> VerdictMarker {
        if self.passed {
            VerdictMarker::Success
        } else {
            VerdictMarker::Danger
        }
    }
}

/// Visual state applied to a test's row once it has a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictMarker {
    Success,
    Danger,
}

impl VerdictMarker {
    pub fn result_text(&self) -> &'static str {
        match self {
            VerdictMarker::Success => "pass",
            VerdictMarker::Danger => "fail",
        }
    }
}

#[async_trait]
pub trait VerdictSink: Send + Sync {
    async fn record(&self, verdict: Verdict);
}

/// In-memory ordered verdict log that also fans verdicts out to subscribers.
pub struct VerdictLog {
    entries: RwLock<Vec<Verdict>>,
    sender: broadcast::Sender<Verdict>,
}

impl Default for VerdictLog {
    fn default() -> Self {
        Self::new()
    }
}

impl VerdictLog {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            entries: RwLock::new(Vec::new()),
            sender,
        }
    }

    pub async fn all(&self) -> Vec<Verdict> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn marker_for(&self, id: TestId) -> Option<VerdictMarker> {
        self.entries
            .read()
            .await
            .iter()
            .find(|v| v.test_id == id)
            .map(Verdict::marker)
    }

    /// (passed, failed)
    pub async fn counts(&self) -> (usize, usize) {
        let entries = self.entries.read().await;
        let passed = entries.iter().filter(|v| v.passed).count();
        (passed, entries.len() - passed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Verdict> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl VerdictSink for VerdictLog {
    async fn record(&self, verdict: Verdict) {
        self.entries.write().await.push(verdict.clone());
        let _ = self.sender.send(verdict);
    }
}

/// Plain-text result table: one line per verdict, id padded to a column.
pub fn render_table(verdicts: &[Verdict]) -> String {
    let width = verdicts
        .iter()
        .map(|v| v.test_id.as_str().len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for verdict in verdicts {
        out.push_str(&format!(
            "{:>2}  {:<width$}  {}",
            verdict.index + 1,
            verdict.test_id.as_str(),
            verdict.marker().result_text(),
            width = width
        ));
        if let Some(message) = verdict.message.as_deref().filter(|_| !verdict.passed) {
            out.push_str(&format!("  ({})", message));
        }
        out.push('\n');
    }
    out
}
