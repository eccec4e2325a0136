//! Declarative test markup and the enabled-test query the runner drains.
//!
//! Markup is a table of rows, each naming a test and the toggle groups it belongs to. A row
//! is enabled when it is not hidden and none of its groups is hidden. Choosing a run mode
//! toggles the mode groups, so the enabled set must be computed when the run starts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::MarkupError;
use crate::mode::RunMode;

/// Every check the harness knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TestId {
    #[serde(rename = "testMediaNameSpaceSupported")]
    MediaNamespaceSupported,
    #[serde(rename = "testInvalidURL")]
    InvalidUrl,
    #[serde(rename = "testInvalidRequest")]
    InvalidRequest,
    #[serde(rename = "testPlayPauseRequest")]
    PlayPauseRequest,
    #[serde(rename = "testTimepointControl")]
    TimepointControl,
    #[serde(rename = "testVolumeRequest")]
    VolumeRequest,
    #[serde(rename = "testStopRequest")]
    StopRequest,
    #[serde(rename = "testStopSessionRequest")]
    StopSessionRequest,
}

impl TestId {
    pub const ALL: [TestId; 8] = [
        TestId::MediaNamespaceSupported,
        TestId::InvalidUrl,
        TestId::InvalidRequest,
        TestId::PlayPauseRequest,
        TestId::TimepointControl,
        TestId::VolumeRequest,
        TestId::StopRequest,
        TestId::StopSessionRequest,
    ];

    /// Identifier used in markup.
    pub fn as_str(&self) -> &'static str {
        match self {
            TestId::MediaNamespaceSupported => "testMediaNameSpaceSupported",
            TestId::InvalidUrl => "testInvalidURL",
            TestId::InvalidRequest => "testInvalidRequest",
            TestId::PlayPauseRequest => "testPlayPauseRequest",
            TestId::TimepointControl => "testTimepointControl",
            TestId::VolumeRequest => "testVolumeRequest",
            TestId::StopRequest => "testStopRequest",
            TestId::StopSessionRequest => "testStopSessionRequest",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TestId::MediaNamespaceSupported => "Media namespace is supported",
            TestId::InvalidUrl => "Loading an unreachable URL fails with LOAD_FAILED",
            TestId::InvalidRequest => "A malformed seek is rejected with INVALID_PARAMETER",
            TestId::PlayPauseRequest => "Play and pause reach the expected player states",
            TestId::TimepointControl => "Load offset and seek land on the requested time",
            TestId::VolumeRequest => "Volume changes are reported back",
            TestId::StopRequest => "Stopping media detaches it from the session",
            TestId::StopSessionRequest => "The session can be stopped",
        }
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestId {
    type Err = MarkupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TestId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| MarkupError::UnknownTest(s.to_string()))
    }
}

/// A test row with its visibility resolved at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TestCase {
    pub id: TestId,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupRow {
    pub test: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct MarkupDocument {
    #[serde(default)]
    hidden_groups: BTreeSet<String>,
    rows: Vec<MarkupRow>,
}

#[derive(Debug, Clone)]
struct Row {
    id: TestId,
    groups: Vec<String>,
    hidden: bool,
}

/// The table of tests a run draws from.
#[derive(Debug, Clone)]
pub struct TestMarkup {
    rows: Vec<Row>,
    hidden_groups: BTreeSet<String>,
}

/// Built-in table: shared rows, one row per mode, then the tear-down rows.
pub const DEFAULT_MARKUP: &str = r#"{
  "hidden_groups": ["auth", "no-auth"],
  "rows": [
    { "test": "testMediaNameSpaceSupported" },
    { "test": "testInvalidURL", "groups": ["no-auth"] },
    { "test": "testInvalidRequest" },
    { "test": "testPlayPauseRequest" },
    { "test": "testTimepointControl" },
    { "test": "testVolumeRequest", "hidden": true },
    { "test": "testStopRequest" },
    { "test": "testStopSessionRequest" }
  ]
}"#;

impl TestMarkup {
    pub fn parse(json: &str) -> Result<Self, MarkupError> {
        let doc: MarkupDocument = serde_json::from_str(json)?;
        let mut seen = BTreeSet::new();
        let mut rows = Vec::with_capacity(doc.rows.len());
        for row in doc.rows {
            let id: TestId = row.test.parse()?;
            if !seen.insert(id) {
                return Err(MarkupError::DuplicateTest(row.test));
            }
            rows.push(Row {
                id,
                groups: row.groups,
                hidden: row.hidden,
            });
        }
        Ok(Self {
            rows,
            hidden_groups: doc.hidden_groups,
        })
    }

    pub fn builtin() -> Self {
        Self::parse(DEFAULT_MARKUP).expect("built-in test markup is valid")
    }

    pub fn load(path: &Path) -> Result<Self, crate::error::HarnessError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content)?)
    }

    /// Un-hide `on`, then hide `off`.
    pub fn toggle<S: AsRef<str>>(&mut self, on: &[S], off: &[S]) {
        for group in on {
            self.hidden_groups.remove(group.as_ref());
        }
        for group in off {
            self.hidden_groups.insert(group.as_ref().to_string());
        }
    }

    /// Show the chosen mode's rows and hide the other mode's.
    pub fn select_mode(&mut self, mode: RunMode) {
        self.toggle(&[mode.as_str()], &[mode.other().as_str()]);
    }

    fn is_visible(&self, row: &Row) -> bool {
        !row.hidden && !row.groups.iter().any(|g| self.hidden_groups.contains(g))
    }

    /// All rows in table order with their current visibility.
    pub fn test_cases(&self) -> Vec<TestCase> {
        self.rows
            .iter()
            .map(|row| TestCase {
                id: row.id,
                visible: self.is_visible(row),
            })
            .collect()
    }

    /// Rows that are visible right now, in table order.
    pub fn list_enabled_tests(&self) -> Vec<TestCase> {
        self.test_cases().into_iter().filter(|t| t.visible).collect()
    }

    pub fn groups_of(&self, id: TestId) -> Option<&[String]> {
        self.rows
            .iter()
            .find(|row| row.id == id)
            .map(|row| row.groups.as_slice())
    }

    pub fn hidden_groups(&self) -> impl Iterator<Item = &str> {
        self.hidden_groups.iter().map(String::as_str)
    }
}

impl Default for TestMarkup {
    fn default() -> Self {
        Self::builtin()
    }
}
