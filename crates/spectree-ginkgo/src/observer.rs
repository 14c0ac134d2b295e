//! Callbacks a host receives while an item runs.

use serde::Serialize;
use spectree::v1::{StatusUpdate, TestStatus};

/// Receives progress for one run or debug pass.
pub trait RunObserver: Send {
    /// The target item started.
    fn started(&mut self, _node_id: &str) {}

    /// One line of runner output (the first line is the command itself).
    fn output(&mut self, _line: &str) {}

    /// A terminal status for one item. Called at most once per item, with
    /// the target last.
    fn status(&mut self, update: &StatusUpdate);
}

/// Everything an observer can be told, as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started { node_id: String },
    Output { line: String },
    Status { node_id: String, status: TestStatus },
}

/// Observer that records every event in order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    pub events: Vec<RunEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_lines(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(|e| match e {
            RunEvent::Output { line } => Some(line.as_str()),
            _ => None,
        })
    }

    pub fn status_of(&self, node_id: &str) -> Option<&TestStatus> {
        self.events.iter().find_map(|e| match e {
            RunEvent::Status { node_id: id, status } if id == node_id => Some(status),
            _ => None,
        })
    }
}

impl RunObserver for EventLog {
    fn started(&mut self, node_id: &str) {
        self.events.push(RunEvent::Started {
            node_id: node_id.to_string(),
        });
    }

    fn output(&mut self, line: &str) {
        self.events.push(RunEvent::Output {
            line: line.to_string(),
        });
    }

    fn status(&mut self, update: &StatusUpdate) {
        self.events.push(RunEvent::Status {
            node_id: update.node_id.clone(),
            status: update.status.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_records_in_order() {
        let mut log = EventLog::new();
        log.started("/pkg::a");
        log.output("ginkgo run");
        log.status(&StatusUpdate {
            node_id: "/pkg::a".into(),
            status: TestStatus::Passed,
        });

        assert_eq!(log.events.len(), 3);
        assert_eq!(log.output_lines().collect::<Vec<_>>(), vec!["ginkgo run"]);
        assert_eq!(log.status_of("/pkg::a"), Some(&TestStatus::Passed));
        assert!(log.status_of("/pkg::b").is_none());
    }

    #[test]
    fn test_event_serialization() {
        let event = RunEvent::Status {
            node_id: "/pkg::a".into(),
            status: TestStatus::failed("boom"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "status");
        assert_eq!(json["status"]["status"], "failed");
        assert_eq!(json["status"]["message"], "boom");
    }
}
