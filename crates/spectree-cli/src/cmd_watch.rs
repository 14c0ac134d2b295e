use crate::GlobalOpts;
use crate::render;
use anyhow::{Context, Result};
use spectree_ginkgo::AsyncDiscoveryWatcher;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

pub async fn run(opts: &GlobalOpts, max_passes: Option<usize>) -> Result<ExitCode> {
    let ws = opts.workspace()?;
    eprintln!("Watching {} (Ctrl+C to stop)", ws.root().display());

    let workspace = Arc::new(Mutex::new(ws));
    let (tx, mut rx) = mpsc::channel(16);
    let handle = AsyncDiscoveryWatcher::new(workspace, None)
        .await
        .start(tx)
        .await
        .context("failed to start watcher")?;

    let mut passes = 0usize;
    loop {
        tokio::select! {
            outcome = rx.recv() => {
                let Some(outcome) = outcome else { break };
                if opts.json {
                    println!("{}", serde_json::to_string(&outcome)?);
                } else {
                    println!("{}", render::outcome_line(&outcome));
                }
                passes += 1;
                if max_passes.is_some_and(|max| passes >= max) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.stop().await;
    Ok(ExitCode::SUCCESS)
}
