//! A workspace root with its test tree: discovery, runs, and debug runs.

use crate::cancel::CancelToken;
use crate::command::{Focus, GinkgoCommand};
use crate::config::RunnerConfig;
use crate::debug::{DebugLauncher, DebugRequest, DebugSession};
use crate::error::{Result, RunnerError};
use crate::invoke::{Invocation, ReportSlot, invoke};
use crate::observer::RunObserver;
use chrono::{DateTime, Utc};
use serde::Serialize;
use spectree::v1::{
    DiscoveryPass, LookupIndex, RunResults, StatusUpdate, SuiteReport, TestStatus, TestTree,
    TreeNode, keys, reconcile, results,
};
use std::path::{Path, PathBuf};

/// Result of one discovery pass, as reported to the host.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryOutcome {
    pub completed_at: DateTime<Utc>,
    /// Whether Ginkgo produced a usable report. When `false` the pass
    /// counted as empty and every suite was removed.
    pub reported: bool,
    pub exit_code: Option<i32>,
    pub suites: usize,
    pub nodes: usize,
    pub leaves: usize,
    pub pass: DiscoveryPass,
}

/// An item that can carry editor "run"/"debug" affordances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LensItem {
    pub node_id: String,
    pub label: String,
    pub kind: &'static str,
    pub line: u32,
}

/// What happened when one item was run or debugged.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub node_id: String,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub exit_code: Option<i32>,
    pub cancelled: bool,
    pub updates: Vec<StatusUpdate>,
}

impl RunSummary {
    /// Status assigned to the run target itself.
    pub fn target_status(&self) -> Option<&TestStatus> {
        self.updates
            .iter()
            .rev()
            .find(|u| u.node_id == self.node_id)
            .map(|u| &u.status)
    }

    pub fn failed(&self) -> bool {
        self.target_status().is_none_or(TestStatus::is_failure)
    }
}

/// One workspace root, its runner config, and the tree discovered in it.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    config: RunnerConfig,
    tree: TestTree,
    index: LookupIndex,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, config: RunnerConfig) -> Self {
        Self {
            root: keys::normalize_path(&root.into()),
            config,
            tree: TestTree::new(),
            index: LookupIndex::new(),
        }
    }

    /// Workspace with config read from `<root>/spectree.toml` when present.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let config = RunnerConfig::for_workspace(&root);
        Self::new(root, config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn tree(&self) -> &TestTree {
        &self.tree
    }

    pub fn index(&self) -> &LookupIndex {
        &self.index
    }

    /// Run Ginkgo in dry-run mode over the whole root and reconcile the tree
    /// with what it reports.
    ///
    /// Never fails: if Ginkgo can't be launched or leaves no usable report,
    /// the pass yields zero suites, so every suite is removed and `reported`
    /// is `false`.
    pub async fn discover(&mut self) -> DiscoveryOutcome {
        let (reported, exit_code, reports) = match self.collect_discovery().await {
            Ok((exit_code, Some(reports))) => {
                if exit_code != Some(0) {
                    tracing::warn!(
                        ?exit_code,
                        "ginkgo dry-run exited unsuccessfully, using its report"
                    );
                }
                (true, exit_code, reports)
            }
            Ok((exit_code, None)) => {
                tracing::warn!(?exit_code, "discovery produced no usable report");
                (false, exit_code, Vec::new())
            }
            Err(e) => {
                tracing::warn!(error = %e, "discovery failed");
                (false, None, Vec::new())
            }
        };
        let pass = self.apply_discovery(&reports);
        self.outcome(reported, exit_code, pass)
    }

    async fn collect_discovery(&self) -> Result<(Option<i32>, Option<Vec<SuiteReport>>)> {
        let slot = ReportSlot::new()?;
        let command = GinkgoCommand::discovery(&self.config, &self.root, &slot.path());
        let invocation = invoke(&command, &slot, &CancelToken::new(), &mut |line: &str| {
            tracing::trace!(target: "spectree::ginkgo", "{line}");
        })
        .await?;
        Ok((invocation.exit_code, invocation.reports))
    }

    /// Reconcile the tree with already-parsed discovery reports.
    pub fn apply_discovery(&mut self, reports: &[SuiteReport]) -> DiscoveryPass {
        reconcile::reconcile_all(&mut self.tree, &mut self.index, &self.root, reports)
    }

    fn outcome(
        &self,
        reported: bool,
        exit_code: Option<i32>,
        pass: DiscoveryPass,
    ) -> DiscoveryOutcome {
        let outcome = DiscoveryOutcome {
            completed_at: Utc::now(),
            reported,
            exit_code,
            suites: self.tree.root_ids().len(),
            nodes: self.tree.len(),
            leaves: self.index.leaf_count(),
            pass,
        };
        tracing::info!(
            reported,
            suites = outcome.suites,
            leaves = outcome.leaves,
            "discovery complete"
        );
        outcome
    }

    /// Runnable items whose source location is `file`, in tree order.
    ///
    /// Files that don't match the configured test-file suffix have none.
    pub fn lens(&self, file: &Path) -> Vec<LensItem> {
        if !self.config.watches(file) {
            return Vec::new();
        }
        let file = keys::resolve(&self.root, &file.to_string_lossy());
        self.tree
            .runnable_in_file(&file)
            .into_iter()
            .map(|node| LensItem {
                node_id: node.id.clone(),
                label: node.label.clone(),
                kind: node.kind.name(),
                line: node.range.line(),
            })
            .collect()
    }

    fn node(&self, node_id: &str) -> Result<&TreeNode> {
        self.tree
            .get(node_id)
            .ok_or_else(|| RunnerError::NodeNotFound(node_id.to_string()))
    }

    /// Directory Ginkgo runs in for `node`: its suite's package directory,
    /// or the workspace root if that doesn't exist.
    fn working_dir(&self, node: &TreeNode) -> PathBuf {
        let suite_path = PathBuf::from(node.kind.suite_key());
        let dir = keys::suite_dir(&suite_path);
        if dir.is_dir() {
            dir.to_path_buf()
        } else {
            self.root.clone()
        }
    }

    fn run_command(&self, node: &TreeNode, slot: &ReportSlot) -> GinkgoCommand {
        GinkgoCommand::run(
            &self.config,
            &self.working_dir(node),
            &slot.path(),
            &Focus::for_node(node),
        )
    }

    fn finish(
        &self,
        node_id: &str,
        command: &GinkgoCommand,
        started_at: DateTime<Utc>,
        invocation: Invocation,
        observer: &mut dyn RunObserver,
    ) -> RunSummary {
        let reports = invocation.reports.unwrap_or_default();
        let run = RunResults::from_reports(&reports, &self.root);
        let updates = results::map_results(
            &self.tree,
            &self.index,
            node_id,
            &run,
            invocation.exit_code,
        );
        for update in &updates {
            observer.status(update);
        }
        RunSummary {
            node_id: node_id.to_string(),
            command: command.to_string(),
            started_at,
            finished_at: Utc::now(),
            exit_code: invocation.exit_code,
            cancelled: invocation.cancelled,
            updates,
        }
    }

    fn abandon(
        &self,
        node_id: &str,
        command: &GinkgoCommand,
        started_at: DateTime<Utc>,
        error: &RunnerError,
        observer: &mut dyn RunObserver,
    ) -> RunSummary {
        let message = match error {
            RunnerError::DebugSession(message) => message.clone(),
            other => other.to_string(),
        };
        observer.output(&error.to_string());
        let update = StatusUpdate {
            node_id: node_id.to_string(),
            status: TestStatus::errored(message),
        };
        observer.status(&update);
        RunSummary {
            node_id: node_id.to_string(),
            command: command.to_string(),
            started_at,
            finished_at: Utc::now(),
            exit_code: None,
            cancelled: false,
            updates: vec![update],
        }
    }

    /// Run one item and report statuses for it and every leaf beneath it.
    ///
    /// The first output line is the exact command. Cancelling kills Ginkgo;
    /// whatever report it left is still used. Fails only if `node_id` is not
    /// in the tree or the temporary report location can't be created.
    pub async fn run(
        &self,
        node_id: &str,
        cancel: &CancelToken,
        observer: &mut dyn RunObserver,
    ) -> Result<RunSummary> {
        let node = self.node(node_id)?;
        let slot = ReportSlot::new()?;
        let command = self.run_command(node, &slot);
        let started_at = Utc::now();

        observer.started(node_id);
        observer.output(&command.to_string());

        let invocation = invoke(&command, &slot, cancel, &mut |line: &str| {
            observer.output(line)
        })
        .await;
        match invocation {
            Ok(invocation) => Ok(self.finish(node_id, &command, started_at, invocation, observer)),
            Err(e) => {
                tracing::warn!(node = node_id, error = %e, "run could not start");
                Ok(self.abandon(node_id, &command, started_at, &e, observer))
            }
        }
    }

    /// Run one item under a debugger.
    ///
    /// Waits for the session to end. Cancelling asks the session to stop
    /// and returns at once. A launcher that can't start a session marks the
    /// item errored.
    pub async fn debug<L: DebugLauncher>(
        &self,
        node_id: &str,
        launcher: &L,
        cancel: &CancelToken,
        observer: &mut dyn RunObserver,
    ) -> Result<RunSummary> {
        let node = self.node(node_id)?;
        let slot = ReportSlot::new()?;
        let command = self.run_command(node, &slot);
        let started_at = Utc::now();

        observer.started(node_id);
        observer.output(&command.to_string());

        let env = self.config.environment_variables.clone();
        let request = DebugRequest::new(node_id, &command, env);
        let mut session = match launcher.launch(&request) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(node = node_id, error = %e, "debug session did not start");
                return Ok(self.abandon(node_id, &command, started_at, &e, observer));
            }
        };

        let (exit_code, cancelled) = tokio::select! {
            code = session.terminated() => (code, false),
            _ = cancel.cancelled() => (None, true),
        };
        if cancelled {
            session.stop();
        }

        let invocation = Invocation {
            exit_code,
            cancelled,
            reports: slot.take(),
        };
        Ok(self.finish(node_id, &command, started_at, invocation, observer))
    }
}
