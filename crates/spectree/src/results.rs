//! Map a run's report back onto tree nodes.

use crate::index::LookupIndex;
use crate::keys;
use crate::report::{SpecState, SuiteReport};
use crate::tree::{LeafMeta, TestTree};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Message used when a failure carries no text of its own.
pub const DEFAULT_FAILURE: &str = "Failed";

/// Terminal status reported to the host for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed { message: String },
    Skipped,
    Errored { message: String },
}

impl TestStatus {
    pub fn failed(message: impl Into<String>) -> Self {
        TestStatus::Failed {
            message: message.into(),
        }
    }

    pub fn errored(message: impl Into<String>) -> Self {
        TestStatus::Errored {
            message: message.into(),
        }
    }

    /// Status implied by the runner's exit code alone. `None` (killed, or
    /// never started) counts as a failure.
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => TestStatus::Passed,
            _ => TestStatus::failed(DEFAULT_FAILURE),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TestStatus::Failed { .. } | TestStatus::Errored { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            TestStatus::Failed { message } | TestStatus::Errored { message } => Some(message),
            _ => None,
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Passed => write!(f, "passed"),
            TestStatus::Failed { message } => write!(f, "failed: {message}"),
            TestStatus::Skipped => write!(f, "skipped"),
            TestStatus::Errored { message } => write!(f, "errored: {message}"),
        }
    }
}

/// A spec's result as found in a run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecOutcome {
    pub state: SpecState,
    pub message: Option<String>,
}

impl SpecOutcome {
    pub fn status(&self) -> TestStatus {
        match self.state {
            SpecState::Passed => TestStatus::Passed,
            SpecState::Skipped | SpecState::Pending => TestStatus::Skipped,
            SpecState::Failed | SpecState::Unknown => TestStatus::failed(
                self.message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE.to_string()),
            ),
        }
    }
}

/// Run results keyed the same way discovery keys its leaves.
#[derive(Debug, Clone, Default)]
pub struct RunResults {
    outcomes: HashMap<String, SpecOutcome>,
}

impl RunResults {
    /// Index every spec in `reports` under its leaf key and its fallback key.
    /// When two specs share a key the first one wins.
    pub fn from_reports(reports: &[SuiteReport], root: &Path) -> Self {
        let mut outcomes = HashMap::new();

        for suite in reports {
            let suite_key = keys::suite_key(root, &suite.suite_path);
            let suite_path = PathBuf::from(&suite_key);

            for spec in suite.specs.iter().filter(|s| !s.is_suite_level()) {
                let location = spec.leaf_location.as_ref().map(|loc| {
                    (
                        keys::resolve_location_file(&suite_path, &loc.file),
                        loc.line,
                    )
                });
                let leaf_key = keys::leaf_key(
                    &suite_key,
                    &spec.container_path,
                    &spec.leaf_text,
                    location.as_ref().map(|(file, line)| (file.as_path(), *line)),
                );
                let fallback_key =
                    keys::fallback_leaf_key(&suite_key, &spec.container_path, &spec.leaf_text);

                let outcome = SpecOutcome {
                    state: spec.state,
                    message: spec.failure_message.clone(),
                };
                outcomes.entry(leaf_key).or_insert_with(|| outcome.clone());
                outcomes.entry(fallback_key).or_insert(outcome);
            }
        }

        Self { outcomes }
    }

    pub fn get(&self, key: &str) -> Option<&SpecOutcome> {
        self.outcomes.get(key)
    }

    /// Find a leaf's outcome under its index key, then its fallback key.
    pub fn lookup(&self, leaf: &LeafMeta) -> Option<&SpecOutcome> {
        leaf.lookup_keys().find_map(|key| self.outcomes.get(key))
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// One status assignment produced by [`map_results`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub node_id: String,
    #[serde(flatten)]
    pub status: TestStatus,
}

#[derive(Debug, Default)]
struct Aggregate {
    total: usize,
    passed: usize,
    failed: usize,
}

impl Aggregate {
    fn fold(&mut self, status: &TestStatus) {
        self.total += 1;
        match status {
            TestStatus::Passed => self.passed += 1,
            TestStatus::Failed { .. } | TestStatus::Errored { .. } => self.failed += 1,
            TestStatus::Skipped => {}
        }
    }

    fn finish(&self) -> Option<TestStatus> {
        if self.total == 0 {
            None
        } else if self.failed > 0 {
            Some(TestStatus::failed(format!(
                "{} of {} specs failed",
                self.failed, self.total
            )))
        } else if self.passed > 0 {
            Some(TestStatus::Passed)
        } else {
            Some(TestStatus::Skipped)
        }
    }
}

/// Compute the statuses to report after running `target_id`.
///
/// Descendant leaves come first, the target last. Each node appears at most
/// once. A leaf missing from `results` gets the exit-code status; a group
/// none of whose leaves appear in `results` gets the exit-code status too.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use spectree::v1::{
///     LookupIndex, RunResults, SpecEntry, SpecState, SuiteReport, TestStatus, TestTree,
///     reconcile, results,
/// };
///
/// let report = SuiteReport::new("/pkg/widgets_suite_test.go", "Widgets Suite").with_spec(
///     SpecEntry::new(["Widget"], "creates correctly")
///         .with_leaf_location("/pkg/widget_test.go", 42)
///         .with_state(SpecState::Passed),
/// );
/// let root = Path::new("/");
/// let mut tree = TestTree::new();
/// let mut index = LookupIndex::new();
/// reconcile::reconcile_all(&mut tree, &mut index, root, &[report.clone()]);
///
/// let run = RunResults::from_reports(&[report], root);
/// let leaf = "/pkg/widgets_suite_test.go::Widget::creates correctly";
/// let updates = results::map_results(&tree, &index, leaf, &run, Some(0));
/// assert_eq!(updates.len(), 1);
/// assert_eq!(updates[0].status, TestStatus::Passed);
/// ```
pub fn map_results(
    tree: &TestTree,
    index: &LookupIndex,
    target_id: &str,
    results: &RunResults,
    exit_code: Option<i32>,
) -> Vec<StatusUpdate> {
    let fallback = TestStatus::from_exit_code(exit_code);
    let Some(target) = tree.get(target_id) else {
        tracing::warn!(node = target_id, "run target is no longer in the tree");
        return Vec::new();
    };

    if let Some(leaf) = target.kind.as_leaf() {
        let status = results
            .lookup(leaf)
            .map(SpecOutcome::status)
            .unwrap_or(fallback);
        return vec![StatusUpdate {
            node_id: target_id.to_string(),
            status,
        }];
    }

    let empty = BTreeSet::new();
    let leaf_keys = target
        .kind
        .descendant_leaf_keys()
        .filter(|keys| !keys.is_empty())
        .or_else(|| {
            target
                .kind
                .group_key()
                .and_then(|group| index.leaf_keys_for_group(group))
        })
        .unwrap_or(&empty);

    let mut updates = Vec::new();
    let mut assigned: HashSet<&str> = HashSet::new();
    let mut aggregate = Aggregate::default();

    for key in leaf_keys {
        let Some(node_id) = index.node_for_leaf(key) else {
            continue;
        };
        if node_id == target_id || !assigned.insert(node_id) {
            continue;
        }

        let outcome = match tree.get(node_id).and_then(|n| n.kind.as_leaf()) {
            Some(leaf) => results.lookup(leaf),
            None => results.get(key),
        };
        let status = match outcome {
            Some(outcome) => {
                let status = outcome.status();
                aggregate.fold(&status);
                status
            }
            None => fallback.clone(),
        };
        updates.push(StatusUpdate {
            node_id: node_id.to_string(),
            status,
        });
    }

    tracing::debug!(
        node = target_id,
        leaves = updates.len(),
        found = aggregate.total,
        failed = aggregate.failed,
        "mapped run results"
    );

    updates.push(StatusUpdate {
        node_id: target_id.to_string(),
        status: aggregate.finish().unwrap_or(fallback),
    });
    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::reconcile_all;
    use crate::report::{ReportReader, SpecEntry};

    const SUITE: &str = "/pkg/widgets_suite_test.go";

    fn spec(leaf: &str, line: u32, state: SpecState) -> SpecEntry {
        SpecEntry::new(["Widget"], leaf)
            .with_leaf_location("/pkg/widget_test.go", line)
            .with_state(state)
    }

    fn suite(specs: Vec<SpecEntry>) -> SuiteReport {
        specs
            .into_iter()
            .fold(SuiteReport::new(SUITE, "Widgets Suite"), SuiteReport::with_spec)
    }

    fn discovered(report: &SuiteReport) -> (TestTree, LookupIndex) {
        let mut tree = TestTree::new();
        let mut index = LookupIndex::new();
        reconcile_all(&mut tree, &mut index, Path::new("/"), std::slice::from_ref(report));
        (tree, index)
    }

    fn status_of<'a>(updates: &'a [StatusUpdate], id: &str) -> Option<&'a TestStatus> {
        updates.iter().find(|u| u.node_id == id).map(|u| &u.status)
    }

    fn run_container(states: &[SpecState]) -> TestStatus {
        let specs = states
            .iter()
            .enumerate()
            .map(|(i, s)| spec(&format!("case {i}"), 10 + i as u32, *s))
            .collect();
        let report = suite(specs);
        let (tree, index) = discovered(&report);
        let results = RunResults::from_reports(&[report], Path::new("/"));
        let container = format!("{SUITE}::Widget");
        let updates = map_results(&tree, &index, &container, &results, Some(1));
        updates.last().unwrap().status.clone()
    }

    #[test]
    fn test_aggregate_failed_dominates() {
        let status = run_container(&[SpecState::Passed, SpecState::Passed, SpecState::Failed]);
        assert_eq!(status, TestStatus::failed("1 of 3 specs failed"));
    }

    #[test]
    fn test_aggregate_passed_over_skipped() {
        let status = run_container(&[SpecState::Passed, SpecState::Skipped]);
        assert_eq!(status, TestStatus::Passed);
    }

    #[test]
    fn test_aggregate_all_skipped() {
        let status = run_container(&[SpecState::Skipped, SpecState::Pending]);
        assert_eq!(status, TestStatus::Skipped);
    }

    #[test]
    fn test_widgets_scenario_replay() {
        let report = suite(vec![spec("creates correctly", 42, SpecState::Passed)]);
        let (tree, index) = discovered(&report);
        let results = RunResults::from_reports(&[report], Path::new("/"));

        let leaf = format!("{SUITE}::Widget::creates correctly");
        let updates = map_results(&tree, &index, &leaf, &results, Some(0));
        assert_eq!(updates, vec![StatusUpdate {
            node_id: leaf.clone(),
            status: TestStatus::Passed,
        }]);

        let updates = map_results(&tree, &index, SUITE, &results, Some(0));
        assert_eq!(status_of(&updates, &leaf), Some(&TestStatus::Passed));
        assert_eq!(updates.last().unwrap().node_id, SUITE);
        assert_eq!(updates.last().unwrap().status, TestStatus::Passed);
    }

    #[test]
    fn test_failure_message_propagates() {
        let report = suite(vec![
            spec("breaks", 7, SpecState::Failed).with_failure("expected true, got false"),
        ]);
        let (tree, index) = discovered(&report);
        let results = RunResults::from_reports(&[report], Path::new("/"));

        let leaf = format!("{SUITE}::Widget::breaks");
        let updates = map_results(&tree, &index, &leaf, &results, Some(1));
        assert_eq!(updates[0].status, TestStatus::failed("expected true, got false"));
    }

    #[test]
    fn test_unknown_state_without_message_is_failed() {
        let outcome = SpecOutcome {
            state: SpecState::Unknown,
            message: None,
        };
        assert_eq!(outcome.status(), TestStatus::failed(DEFAULT_FAILURE));
    }

    #[test]
    fn test_unparsable_report_falls_back_to_exit_code() {
        let report = suite(vec![
            spec("a", 1, SpecState::Unknown),
            spec("b", 2, SpecState::Unknown),
        ]);
        let (tree, index) = discovered(&report);
        let reports = ReportReader::parse_lenient("{oops");
        let results = RunResults::from_reports(&reports, Path::new("/"));
        assert!(results.is_empty());

        let container = format!("{SUITE}::Widget");
        let passed = map_results(&tree, &index, &container, &results, Some(0));
        assert_eq!(passed.len(), 3);
        assert!(passed.iter().all(|u| u.status == TestStatus::Passed));

        let failed = map_results(&tree, &index, &container, &results, Some(2));
        assert!(failed.iter().all(|u| u.status == TestStatus::failed(DEFAULT_FAILURE)));

        let killed = map_results(&tree, &index, &format!("{container}::a"), &results, None);
        assert_eq!(killed[0].status, TestStatus::failed(DEFAULT_FAILURE));
    }

    #[test]
    fn test_leaf_missing_from_report_is_not_folded() {
        let discovery = suite(vec![
            spec("ran", 1, SpecState::Unknown),
            spec("did not run", 2, SpecState::Unknown),
        ]);
        let (tree, index) = discovered(&discovery);
        let run = suite(vec![spec("ran", 1, SpecState::Skipped)]);
        let results = RunResults::from_reports(&[run], Path::new("/"));

        let container = format!("{SUITE}::Widget");
        let updates = map_results(&tree, &index, &container, &results, Some(1));
        assert_eq!(
            status_of(&updates, &format!("{container}::did not run")),
            Some(&TestStatus::failed(DEFAULT_FAILURE))
        );
        assert_eq!(
            status_of(&updates, &format!("{container}::ran")),
            Some(&TestStatus::Skipped)
        );
        assert_eq!(status_of(&updates, &container), Some(&TestStatus::Skipped));
    }

    #[test]
    fn test_each_node_gets_one_status_target_last() {
        let report = suite(vec![
            spec("a", 1, SpecState::Passed),
            spec("b", 2, SpecState::Failed),
        ]);
        let (tree, index) = discovered(&report);
        let results = RunResults::from_reports(&[report], Path::new("/"));

        let updates = map_results(&tree, &index, SUITE, &results, Some(1));
        let ids: HashSet<&str> = updates.iter().map(|u| u.node_id.as_str()).collect();
        assert_eq!(ids.len(), updates.len());
        assert_eq!(updates.last().unwrap().node_id, SUITE);
        assert_eq!(
            updates.last().unwrap().status,
            TestStatus::failed("1 of 2 specs failed")
        );
        // Intermediate containers are not reported on a suite run.
        assert!(status_of(&updates, &format!("{SUITE}::Widget")).is_none());
    }

    #[test]
    fn test_location_less_leaf_matches_by_fallback() {
        let report = SuiteReport::new("/pkg", "Pkg")
            .with_spec(SpecEntry::new(["G"], "floating").with_state(SpecState::Passed));
        let (tree, index) = discovered(&report);
        let results = RunResults::from_reports(&[report], Path::new("/"));

        let updates = map_results(&tree, &index, "/pkg::G::floating", &results, Some(1));
        assert_eq!(updates[0].status, TestStatus::Passed);
    }

    #[test]
    fn test_reindexed_leaf_matches_its_own_result() {
        let report = SuiteReport::new("/pkg", "Pkg")
            .with_spec(
                SpecEntry::new(["T"], "row 1")
                    .with_leaf_location("/pkg/t_test.go", 5)
                    .with_state(SpecState::Passed),
            )
            .with_spec(
                SpecEntry::new(["T"], "row 2")
                    .with_leaf_location("/pkg/t_test.go", 5)
                    .with_state(SpecState::Failed)
                    .with_failure("row 2 broke"),
            );
        let (tree, index) = discovered(&report);
        let results = RunResults::from_reports(&[report], Path::new("/"));

        let updates = map_results(&tree, &index, "/pkg::T", &results, Some(1));
        assert_eq!(status_of(&updates, "/pkg::T::row 1"), Some(&TestStatus::Passed));
        assert_eq!(
            status_of(&updates, "/pkg::T::row 2"),
            Some(&TestStatus::failed("row 2 broke"))
        );
    }

    #[test]
    fn test_unknown_target_yields_nothing() {
        let tree = TestTree::new();
        let index = LookupIndex::new();
        let updates = map_results(&tree, &index, "/gone", &RunResults::default(), Some(0));
        assert!(updates.is_empty());
    }

    #[test]
    fn test_status_serializes_tagged() {
        let update = StatusUpdate {
            node_id: "/pkg::x".into(),
            status: TestStatus::failed("boom"),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["message"], "boom");
        assert_eq!(json["node_id"], "/pkg::x");
    }
}
