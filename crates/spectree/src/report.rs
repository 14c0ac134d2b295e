//! Ginkgo JSON report ingestion.
//!
//! The runner writes one JSON array of suite reports. [`ReportReader`]
//! turns it into normalized [`SuiteReport`]s; the `lenient` entry points never
//! fail and return an empty set when nothing usable was found.

use crate::error::{ReportError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Leaf text used when a spec carries none.
pub const UNNAMED_LEAF: &str = "unnamed";

/// Ginkgo node types that belong to the suite rather than to a runnable spec.
const SUITE_LEVEL_NODE_TYPES: &[&str] = &[
    "BeforeSuite",
    "AfterSuite",
    "SynchronizedBeforeSuite",
    "SynchronizedAfterSuite",
    "ReportBeforeSuite",
    "ReportAfterSuite",
    "CleanupAfterSuite",
];

// ── Wire format ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSuiteReport {
    #[serde(default)]
    suite_path: String,

    #[serde(default)]
    suite_description: String,

    #[serde(default)]
    spec_reports: Option<Vec<RawSpecReport>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSpecReport {
    #[serde(default)]
    container_hierarchy_texts: Option<Vec<String>>,

    #[serde(default)]
    container_hierarchy_locations: Option<Vec<Option<RawLocation>>>,

    #[serde(default)]
    leaf_node_text: Option<String>,

    #[serde(default)]
    leaf_node_location: Option<RawLocation>,

    #[serde(default)]
    leaf_node_type: Option<String>,

    #[serde(default)]
    state: Option<String>,

    #[serde(default)]
    failure: Option<RawFailure>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawLocation {
    #[serde(default)]
    file_name: Option<String>,

    #[serde(default)]
    line_number: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawFailure {
    #[serde(default)]
    message: Option<String>,
}

// ── Normalized form ──────────────────────────────────────────────────

/// A source location as reported by the runner. `file` may be empty (meaning
/// the suite itself) or relative to the suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub file: String,
    /// 1-based.
    pub line: u32,
}

/// Outcome of a single spec as reported by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecState {
    Passed,
    Failed,
    Skipped,
    Pending,
    Unknown,
}

impl SpecState {
    /// Map a runner state string; anything unrecognized (panicked, timedout,
    /// interrupted, ...) is `Unknown`.
    pub fn parse(state: &str) -> Self {
        match state.to_lowercase().as_str() {
            "passed" => SpecState::Passed,
            "failed" => SpecState::Failed,
            "skipped" => SpecState::Skipped,
            "pending" => SpecState::Pending,
            _ => SpecState::Unknown,
        }
    }
}

impl std::fmt::Display for SpecState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecState::Passed => write!(f, "passed"),
            SpecState::Failed => write!(f, "failed"),
            SpecState::Skipped => write!(f, "skipped"),
            SpecState::Pending => write!(f, "pending"),
            SpecState::Unknown => write!(f, "unknown"),
        }
    }
}

/// One flattened spec.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecEntry {
    pub container_path: Vec<String>,
    /// Same length as `container_path`.
    pub container_locations: Vec<Option<Location>>,
    pub leaf_text: String,
    pub leaf_location: Option<Location>,
    pub leaf_type: Option<String>,
    pub state: SpecState,
    pub failure_message: Option<String>,
}

impl SpecEntry {
    /// A runnable spec with the given container chain and leaf text, state
    /// `Unknown`, and no locations.
    pub fn new<I, S>(container_path: I, leaf_text: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let container_path: Vec<String> = container_path.into_iter().map(Into::into).collect();
        let container_locations = vec![None; container_path.len()];
        Self {
            container_path,
            container_locations,
            leaf_text: leaf_text.into(),
            leaf_location: None,
            leaf_type: None,
            state: SpecState::Unknown,
            failure_message: None,
        }
    }

    pub fn with_leaf_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.leaf_location = Some(Location {
            file: file.into(),
            line,
        });
        self
    }

    pub fn with_state(mut self, state: SpecState) -> Self {
        self.state = state;
        self
    }

    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    /// Whether this entry is a suite setup/teardown node rather than a spec.
    pub fn is_suite_level(&self) -> bool {
        self.leaf_type
            .as_deref()
            .is_some_and(|t| SUITE_LEVEL_NODE_TYPES.contains(&t))
    }
}

/// One runner invocation's output unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteReport {
    pub suite_path: String,
    pub suite_description: String,
    pub specs: Vec<SpecEntry>,
}

impl SuiteReport {
    pub fn new(suite_path: impl Into<String>, suite_description: impl Into<String>) -> Self {
        Self {
            suite_path: suite_path.into(),
            suite_description: suite_description.into(),
            specs: Vec::new(),
        }
    }

    pub fn with_spec(mut self, spec: SpecEntry) -> Self {
        self.specs.push(spec);
        self
    }
}

fn normalize_location(raw: Option<RawLocation>) -> Option<Location> {
    let raw = raw?;
    let line = raw.line_number.filter(|l| *l > 0)?;
    Some(Location {
        file: raw.file_name.unwrap_or_default(),
        line: u32::try_from(line).ok()?,
    })
}

fn normalize_spec(raw: RawSpecReport) -> SpecEntry {
    let container_path = raw.container_hierarchy_texts.unwrap_or_default();
    let mut raw_locations = raw
        .container_hierarchy_locations
        .unwrap_or_default()
        .into_iter();
    let container_locations = container_path
        .iter()
        .map(|_| normalize_location(raw_locations.next().flatten()))
        .collect();

    let leaf_text = raw
        .leaf_node_text
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNNAMED_LEAF.to_string());

    SpecEntry {
        container_path,
        container_locations,
        leaf_text,
        leaf_location: normalize_location(raw.leaf_node_location),
        leaf_type: raw.leaf_node_type,
        state: raw
            .state
            .as_deref()
            .map(SpecState::parse)
            .unwrap_or(SpecState::Unknown),
        failure_message: raw.failure.and_then(|f| f.message),
    }
}

fn normalize_suite(raw: RawSuiteReport) -> SuiteReport {
    SuiteReport {
        suite_path: raw.suite_path,
        suite_description: raw.suite_description,
        specs: raw
            .spec_reports
            .unwrap_or_default()
            .into_iter()
            .map(normalize_spec)
            .collect(),
    }
}

pub struct ReportReader;

impl ReportReader {
    /// Parse a report, failing if the top level is not a JSON array.
    ///
    /// Individual suites that don't match the expected shape are skipped with
    /// a warning rather than failing the whole report.
    pub fn parse_str(raw: &str) -> Result<Vec<SuiteReport>> {
        let values: Vec<serde_json::Value> = serde_json::from_str(raw)?;
        let mut suites = Vec::with_capacity(values.len());

        for (idx, value) in values.into_iter().enumerate() {
            match serde_json::from_value::<RawSuiteReport>(value) {
                Ok(suite) => suites.push(normalize_suite(suite)),
                Err(e) => {
                    tracing::warn!(suite = idx, error = %e, "skipping malformed suite report");
                }
            }
        }

        Ok(suites)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Vec<SuiteReport>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ReportError::NotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        Self::parse_str(&raw)
    }

    /// Like [`parse_str`](Self::parse_str) but never fails: an unusable report
    /// is logged and treated as empty.
    pub fn parse_lenient(raw: &str) -> Vec<SuiteReport> {
        Self::parse_str(raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "discarding unparsable report");
            Vec::new()
        })
    }

    /// Like [`read`](Self::read) but never fails.
    pub fn read_lenient<P: AsRef<Path>>(path: P) -> Vec<SuiteReport> {
        let path = path.as_ref();
        Self::read(path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "no usable report");
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const WIDGETS: &str = r#"[
      {
        "SuitePath": "/pkg/widgets_suite_test.go",
        "SuiteDescription": "Widgets Suite",
        "SpecReports": [
          {
            "ContainerHierarchyTexts": ["Widget"],
            "ContainerHierarchyLocations": [{"FileName": "/pkg/widget_test.go", "LineNumber": 10}],
            "LeafNodeText": "creates correctly",
            "LeafNodeLocation": {"FileName": "/pkg/widget_test.go", "LineNumber": 42},
            "LeafNodeType": "It",
            "State": "passed"
          },
          {
            "ContainerHierarchyTexts": ["Widget"],
            "LeafNodeText": "breaks",
            "State": "failed",
            "Failure": {"Message": "expected true"}
          }
        ]
      }
    ]"#;

    #[test]
    fn test_parse_widgets_report() {
        let suites = ReportReader::parse_str(WIDGETS).unwrap();
        assert_eq!(suites.len(), 1);
        let suite = &suites[0];
        assert_eq!(suite.suite_description, "Widgets Suite");
        assert_eq!(suite.specs.len(), 2);

        let first = &suite.specs[0];
        assert_eq!(first.container_path, vec!["Widget".to_string()]);
        assert_eq!(
            first.container_locations[0],
            Some(Location {
                file: "/pkg/widget_test.go".into(),
                line: 10
            })
        );
        assert_eq!(first.leaf_location.as_ref().unwrap().line, 42);
        assert_eq!(first.state, SpecState::Passed);

        let second = &suite.specs[1];
        assert_eq!(second.container_locations, vec![None]);
        assert!(second.leaf_location.is_none());
        assert_eq!(second.state, SpecState::Failed);
        assert_eq!(second.failure_message.as_deref(), Some("expected true"));
    }

    #[test]
    fn test_missing_optional_fields() {
        let raw = r#"[{"SuitePath": "pkg", "SpecReports": [{}]}]"#;
        let suites = ReportReader::parse_str(raw).unwrap();
        let spec = &suites[0].specs[0];
        assert_eq!(spec.leaf_text, UNNAMED_LEAF);
        assert!(spec.container_path.is_empty());
        assert!(spec.container_locations.is_empty());
        assert_eq!(spec.state, SpecState::Unknown);
        assert!(spec.failure_message.is_none());
    }

    #[test]
    fn test_null_spec_reports() {
        let raw = r#"[{"SuitePath": "pkg", "SuiteDescription": "Empty", "SpecReports": null}]"#;
        let suites = ReportReader::parse_str(raw).unwrap();
        assert!(suites[0].specs.is_empty());
    }

    #[test]
    fn test_short_location_list_is_padded() {
        let raw = r#"[{"SuitePath": "pkg", "SpecReports": [{
            "ContainerHierarchyTexts": ["A", "B"],
            "ContainerHierarchyLocations": [{"FileName": "a_test.go", "LineNumber": 3}],
            "LeafNodeText": "x"
        }]}]"#;
        let suites = ReportReader::parse_str(raw).unwrap();
        let spec = &suites[0].specs[0];
        assert_eq!(spec.container_locations.len(), 2);
        assert!(spec.container_locations[0].is_some());
        assert!(spec.container_locations[1].is_none());
    }

    #[test]
    fn test_zero_line_is_no_location() {
        let raw = r#"[{"SuitePath": "pkg", "SpecReports": [{
            "LeafNodeText": "x",
            "LeafNodeLocation": {"FileName": "a_test.go", "LineNumber": 0}
        }]}]"#;
        let suites = ReportReader::parse_str(raw).unwrap();
        assert!(suites[0].specs[0].leaf_location.is_none());
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(SpecState::parse("passed"), SpecState::Passed);
        assert_eq!(SpecState::parse("FAILED"), SpecState::Failed);
        assert_eq!(SpecState::parse("pending"), SpecState::Pending);
        assert_eq!(SpecState::parse("skipped"), SpecState::Skipped);
        assert_eq!(SpecState::parse("panicked"), SpecState::Unknown);
        assert_eq!(SpecState::Passed.to_string(), "passed");
    }

    #[test]
    fn test_malformed_suite_is_skipped() {
        let raw = r#"[{"SuitePath": 12}, {"SuitePath": "ok", "SpecReports": []}]"#;
        let suites = ReportReader::parse_str(raw).unwrap();
        assert_eq!(suites.len(), 1);
        assert_eq!(suites[0].suite_path, "ok");
    }

    #[test]
    fn test_malformed_report_is_error() {
        assert!(ReportReader::parse_str("{not json").is_err());
        assert!(ReportReader::parse_str(r#"{"SuitePath": "x"}"#).is_err());
    }

    #[test]
    fn test_lenient_parse_returns_empty() {
        assert!(ReportReader::parse_lenient("garbage").is_empty());
        assert!(ReportReader::read_lenient("/nonexistent/report.json").is_empty());
    }

    #[test]
    fn test_read_missing_file() {
        let result = ReportReader::read("/nonexistent/report.json");
        assert!(matches!(result, Err(ReportError::NotFound(_))));
    }

    #[test]
    fn test_read_file() {
        let mut temp = NamedTempFile::new().unwrap();
        write!(temp, "{}", WIDGETS).unwrap();
        temp.flush().unwrap();

        let suites = ReportReader::read(temp.path()).unwrap();
        assert_eq!(suites.len(), 1);
    }

    #[test]
    fn test_suite_level_entries() {
        let raw = r#"[{"SuitePath": "pkg", "SpecReports": [
            {"LeafNodeType": "BeforeSuite", "State": "passed"},
            {"LeafNodeType": "It", "LeafNodeText": "x", "State": "passed"}
        ]}]"#;
        let suites = ReportReader::parse_str(raw).unwrap();
        assert!(suites[0].specs[0].is_suite_level());
        assert!(!suites[0].specs[1].is_suite_level());
    }

    #[test]
    fn test_builders() {
        let spec = SpecEntry::new(["A", "B"], "works")
            .with_leaf_location("a_test.go", 5)
            .with_state(SpecState::Failed)
            .with_failure("boom");
        assert_eq!(spec.container_locations.len(), 2);
        assert_eq!(spec.leaf_location.as_ref().unwrap().line, 5);
        assert_eq!(spec.failure_message.as_deref(), Some("boom"));

        let suite = SuiteReport::new("/pkg", "Pkg").with_spec(spec);
        assert_eq!(suite.specs.len(), 1);
    }
}
