//! Spawn Ginkgo, stream its output, and collect the JSON report it writes.

use crate::cancel::CancelToken;
use crate::command::GinkgoCommand;
use crate::error::{Result, RunnerError};
use spectree::v1::{ReportReader, SuiteReport};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

/// File name of the report inside its private temporary directory.
const REPORT_FILE_NAME: &str = "spectree_report.json";

/// How long output is still collected after Ginkgo exits.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// A temporary location for one invocation's JSON report.
///
/// The directory (and any report in it) is deleted on drop.
pub struct ReportSlot {
    dir: TempDir,
}

impl ReportSlot {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("spectree-").tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join(REPORT_FILE_NAME)
    }

    /// Read whatever report the runner left, then delete it.
    ///
    /// `None` means there was no report or it could not be parsed.
    pub fn take(&self) -> Option<Vec<SuiteReport>> {
        let path = self.path();
        let reports = match ReportReader::read(&path) {
            Ok(reports) => Some(reports),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "no usable report");
                None
            }
        };
        remove_report(&path);
        reports
    }
}

fn remove_report(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove report");
    }
}

/// Outcome of one finished (or killed) Ginkgo process.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub cancelled: bool,
    /// `None` when no report was written or it was unparsable.
    pub reports: Option<Vec<SuiteReport>>,
}

impl Invocation {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).is_err() {
            break;
        }
    }
}

/// Run `command`, feeding each stdout/stderr line to `on_output`, killing
/// the process if `cancel` fires. The report at `slot` is read and removed
/// afterwards, even when the process failed or was cancelled.
pub async fn invoke(
    command: &GinkgoCommand,
    slot: &ReportSlot,
    cancel: &CancelToken,
    on_output: &mut (dyn FnMut(&str) + Send),
) -> Result<Invocation> {
    tracing::debug!(command = %command, cwd = %command.cwd().display(), "spawning ginkgo");

    let mut child = command
        .to_tokio()
        .spawn()
        .map_err(|source| RunnerError::Launch {
            program: command.program().to_string(),
            source,
        })?;

    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    let mut forwarders = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        forwarders.push(tokio::spawn(forward_lines(stdout, line_tx.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        forwarders.push(tokio::spawn(forward_lines(stderr, line_tx.clone())));
    }
    drop(line_tx);

    let mut cancelled = false;
    let status = loop {
        tokio::select! {
            Some(line) = line_rx.recv() => on_output(&line),
            status = child.wait() => break status?,
            _ = cancel.cancelled(), if !cancelled => {
                cancelled = true;
                tracing::debug!(command = %command, "cancelled, killing ginkgo");
                let _ = child.start_kill();
            }
        }
    };

    // Drain output written just before exit. Background processes left by
    // the tests (or by a killed run) may hold the pipes open, so the drain is
    // bounded and stops on cancel.
    if !cancelled {
        let grace = tokio::time::sleep(DRAIN_GRACE);
        tokio::pin!(grace);
        loop {
            tokio::select! {
                line = line_rx.recv() => match line {
                    Some(line) => on_output(&line),
                    None => break,
                },
                _ = &mut grace => {
                    tracing::debug!(
                        command = %command,
                        "output still open after exit, not waiting"
                    );
                    break;
                }
                _ = cancel.cancelled() => break,
            }
        }
    }
    for forwarder in forwarders {
        forwarder.abort();
    }
    while let Ok(line) = line_rx.try_recv() {
        on_output(&line);
    }

    let exit_code = status.code();
    tracing::debug!(command = %command, ?exit_code, cancelled, "ginkgo exited");

    Ok(Invocation {
        exit_code,
        cancelled,
        reports: slot.take(),
    })
}
