use crate::GlobalOpts;
use crate::render;
use anyhow::{Result, bail};
use serde::Serialize;
use spectree::v1::NodeView;
use spectree_ginkgo::DiscoveryOutcome;
use std::process::ExitCode;

#[derive(Serialize)]
struct DiscoverOutput<'a> {
    outcome: &'a DiscoveryOutcome,
    tree: Vec<NodeView>,
}

pub async fn run(opts: &GlobalOpts) -> Result<ExitCode> {
    let mut ws = opts.workspace()?;
    let outcome = ws.discover().await;
    if !outcome.reported {
        bail!(
            "discovery produced no report (ginkgo `{}` exit code {:?})",
            ws.config().ginkgo_path,
            outcome.exit_code
        );
    }

    if opts.json {
        let output = DiscoverOutput {
            outcome: &outcome,
            tree: ws.tree().views(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", render::outline(&ws.tree().views()));
    }
    Ok(ExitCode::SUCCESS)
}
