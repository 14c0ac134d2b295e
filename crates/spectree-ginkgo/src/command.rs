//! Ginkgo command lines for discovery and focused runs.

use crate::config::RunnerConfig;
use spectree::v1::{NodeKind, TreeNode};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// What a run should restrict itself to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Focus {
    /// The whole suite in the working directory.
    All,
    /// `--focus=<regex>`; the text is escaped when the argument is built.
    Text(String),
    /// `--focus-file=<file>:<line>`.
    FileLine { file: PathBuf, line: u32 },
}

impl Focus {
    /// Focus that selects exactly `node`.
    ///
    /// Leaves focus by location. Containers (and leaves with no location)
    /// focus on their container texts joined the way Ginkgo joins them into
    /// a spec's full text.
    pub fn for_node(node: &TreeNode) -> Self {
        match &node.kind {
            NodeKind::Suite(_) => Focus::All,
            NodeKind::Container(meta) => Focus::Text(meta.container_path.join(" ")),
            NodeKind::Leaf(meta) => match &meta.location {
                Some(loc) => Focus::FileLine {
                    file: loc.file.clone(),
                    line: loc.line,
                },
                None => {
                    let mut parts = meta.container_path.clone();
                    parts.push(meta.leaf_text.clone());
                    Focus::Text(parts.join(" "))
                }
            },
        }
    }

    fn arg(&self) -> Option<String> {
        match self {
            Focus::All => None,
            Focus::Text(text) => Some(format!("--focus={}", quote_meta(text))),
            Focus::FileLine { file, line } => {
                Some(format!("--focus-file={}:{}", file.display(), line))
            }
        }
    }
}

/// Escape every regular-expression metacharacter in `text`, as Go's
/// `regexp.QuoteMeta` does.
pub fn quote_meta(text: &str) -> String {
    const SPECIAL: &[char] = &[
        '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$',
    ];
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if SPECIAL.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// A fully resolved Ginkgo invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GinkgoCommand {
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
    env: BTreeMap<String, String>,
}

impl GinkgoCommand {
    /// `ginkgo run --dry-run --json-report=<report> -r` in `root`.
    pub fn discovery(config: &RunnerConfig, root: &Path, report: &Path) -> Self {
        let mut args = vec![
            "run".to_string(),
            "--dry-run".to_string(),
            format!("--json-report={}", report.display()),
            "-r".to_string(),
        ];
        args.extend(config.tags_arg());
        Self::new(config, root, args)
    }

    /// `ginkgo run --json-report=<report> [focus]` in `cwd`.
    pub fn run(config: &RunnerConfig, cwd: &Path, report: &Path, focus: &Focus) -> Self {
        let mut args = vec![
            "run".to_string(),
            format!("--json-report={}", report.display()),
        ];
        args.extend(focus.arg());
        args.extend(config.tags_arg());
        Self::new(config, cwd, args)
    }

    fn new(config: &RunnerConfig, cwd: &Path, args: Vec<String>) -> Self {
        Self {
            program: config.ginkgo_path.clone(),
            args,
            cwd: cwd.to_path_buf(),
            env: config.environment_variables.clone(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Build the process, with piped output and the configured environment
    /// layered over the inherited one.
    pub fn to_tokio(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.cwd)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl fmt::Display for GinkgoCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
