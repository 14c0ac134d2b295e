use crate::GlobalOpts;
use crate::render;
use anyhow::{Result, bail};
use std::path::Path;
use std::process::ExitCode;

pub async fn run(opts: &GlobalOpts, file: &Path) -> Result<ExitCode> {
    let mut ws = opts.workspace()?;
    let outcome = ws.discover().await;
    if !outcome.reported {
        bail!("discovery produced no report (exit code {:?})", outcome.exit_code);
    }

    let items = ws.lens(file);
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for item in &items {
            println!("{}", render::lens_line(item));
        }
    }
    Ok(ExitCode::SUCCESS)
}
