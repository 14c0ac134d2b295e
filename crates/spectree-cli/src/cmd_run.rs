use crate::GlobalOpts;
use crate::render;
use anyhow::{Context, Result, bail};
use spectree::v1::StatusUpdate;
use spectree_ginkgo::{CancelToken, RunEvent, RunObserver};
use std::process::ExitCode;

/// Streams run progress to stdout, as text or one JSON event per line.
struct ConsoleObserver {
    json: bool,
}

impl ConsoleObserver {
    fn emit(&self, event: &RunEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
    }
}

impl RunObserver for ConsoleObserver {
    fn started(&mut self, node_id: &str) {
        if self.json {
            self.emit(&RunEvent::Started {
                node_id: node_id.to_string(),
            });
        }
    }

    fn output(&mut self, line: &str) {
        if self.json {
            self.emit(&RunEvent::Output {
                line: line.to_string(),
            });
        } else {
            println!("{line}");
        }
    }

    fn status(&mut self, update: &StatusUpdate) {
        if self.json {
            self.emit(&RunEvent::Status {
                node_id: update.node_id.clone(),
                status: update.status.clone(),
            });
        } else {
            println!("{}", render::status_line(update));
        }
    }
}

pub async fn run(opts: &GlobalOpts, node_id: &str) -> Result<ExitCode> {
    let mut ws = opts.workspace()?;
    let outcome = ws.discover().await;
    if !outcome.reported {
        bail!("discovery produced no report (exit code {:?})", outcome.exit_code);
    }

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut observer = ConsoleObserver { json: opts.json };
    let summary = ws
        .run(node_id, &cancel, &mut observer)
        .await
        .with_context(|| format!("failed to run {node_id}"))?;

    tracing::debug!(
        node = node_id,
        updates = summary.updates.len(),
        cancelled = summary.cancelled,
        "run finished"
    );
    Ok(if summary.failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
