//! Plain-text rendering of trees, statuses, and discovery passes.

use spectree::v1::{NodeView, StatusUpdate, TestStatus};
use spectree_ginkgo::{DiscoveryOutcome, LensItem};
use std::fmt::Write;

/// Indented outline, one item per line with its id.
pub fn outline(views: &[NodeView]) -> String {
    let mut out = String::new();
    for view in views {
        outline_into(&mut out, view, 0);
    }
    out
}

fn outline_into(out: &mut String, view: &NodeView, depth: usize) {
    let _ = writeln!(
        out,
        "{:indent$}{} [{}]  {}",
        "",
        view.label,
        view.kind,
        view.id,
        indent = depth * 2
    );
    for child in &view.children {
        outline_into(out, child, depth + 1);
    }
}

pub fn status_line(update: &StatusUpdate) -> String {
    let tag = match update.status {
        TestStatus::Passed => "PASS",
        TestStatus::Failed { .. } => "FAIL",
        TestStatus::Skipped => "SKIP",
        TestStatus::Errored { .. } => "ERROR",
    };
    match update.status.message() {
        Some(message) => format!("{tag:<5} {}: {message}", update.node_id),
        None => format!("{tag:<5} {}", update.node_id),
    }
}

pub fn lens_line(item: &LensItem) -> String {
    format!("{}\t{}\t{}\t{}", item.line, item.kind, item.label, item.node_id)
}

pub fn outcome_line(outcome: &DiscoveryOutcome) -> String {
    let at = outcome
        .completed_at
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S");
    let mut line = if outcome.reported {
        format!("[{at}] {} suites, {} specs", outcome.suites, outcome.leaves)
    } else {
        format!("[{at}] discovery failed (exit {:?}), no suites", outcome.exit_code)
    };
    let pass = &outcome.pass;
    if !pass.is_unchanged() {
        let _ = write!(line, " (+{} -{})", pass.created_count(), pass.removed_count());
    }
    line
}
