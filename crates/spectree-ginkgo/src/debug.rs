//! Debug-mode runs: the same Ginkgo invocation, handed to an external
//! debugger instead of being spawned directly.

use crate::command::GinkgoCommand;
use crate::error::{Result, RunnerError};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;

/// Message reported when no debugger integration is available.
pub const DEBUG_UNSUPPORTED: &str = "Debugging not supported";

/// What a debugger needs to start the focused run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugRequest {
    pub node_id: String,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl DebugRequest {
    pub fn new(node_id: &str, command: &GinkgoCommand, env: BTreeMap<String, String>) -> Self {
        Self {
            node_id: node_id.to_string(),
            program: command.program().to_string(),
            args: command.args().to_vec(),
            cwd: command.cwd().to_path_buf(),
            env,
        }
    }
}

/// A running debug session.
pub trait DebugSession: Send {
    /// Resolves when the session ends, with the debuggee's exit code if known.
    fn terminated(&mut self) -> impl Future<Output = Option<i32>> + Send;

    /// Ask the session to stop. Must not block.
    fn stop(&mut self);
}

/// Starts debug sessions.
pub trait DebugLauncher: Sync {
    type Session: DebugSession;

    fn launch(&self, request: &DebugRequest) -> Result<Self::Session>;
}

/// Launcher for hosts without a debugger: every launch fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedDebugger;

/// Session type of [`UnsupportedDebugger`]; never constructed.
#[derive(Debug)]
pub enum NoSession {}

impl DebugSession for NoSession {
    async fn terminated(&mut self) -> Option<i32> {
        match *self {}
    }

    fn stop(&mut self) {
        match *self {}
    }
}

impl DebugLauncher for UnsupportedDebugger {
    type Session = NoSession;

    fn launch(&self, _request: &DebugRequest) -> Result<NoSession> {
        Err(RunnerError::DebugSession(DEBUG_UNSUPPORTED.to_string()))
    }
}
