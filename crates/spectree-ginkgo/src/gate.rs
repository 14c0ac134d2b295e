use std::sync::{Mutex, MutexGuard};

/// Single-flight guard for discovery passes with one trailing re-run.
///
/// A request made while a pass is running doesn't start a second pass; it
/// sets a pending flag, and the running pass runs once more when it
/// finishes. Any number of requests during one pass collapse into one re-run.
#[derive(Debug, Default)]
pub struct DiscoveryGate {
    state: Mutex<GateState>,
}

#[derive(Debug, Default)]
struct GateState {
    running: bool,
    pending: bool,
}

impl DiscoveryGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ask for a pass. Returns `true` if the caller should start one now,
    /// `false` if one is already running (it will re-run afterwards).
    pub fn request(&self) -> bool {
        let mut state = self.lock();
        if state.running {
            state.pending = true;
            false
        } else {
            state.running = true;
            true
        }
    }

    /// Mark the running pass finished. Returns `true` if a request arrived
    /// meanwhile; the caller should then run again (and call `complete`
    /// again afterwards).
    pub fn complete(&self) -> bool {
        let mut state = self.lock();
        if state.pending {
            state.pending = false;
            true
        } else {
            state.running = false;
            false
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_request_starts() {
        let gate = DiscoveryGate::new();
        assert!(gate.request());
        assert!(gate.is_running());
        assert!(!gate.complete());
        assert!(!gate.is_running());
    }

    #[test]
    fn test_requests_during_pass_collapse_into_one_rerun() {
        let gate = DiscoveryGate::new();
        assert!(gate.request());
        assert!(!gate.request());
        assert!(!gate.request());
        assert!(!gate.request());

        assert!(gate.complete());
        assert!(gate.is_running());
        assert!(!gate.complete());
        assert!(!gate.is_running());
    }

    #[test]
    fn test_request_after_completion_starts_fresh() {
        let gate = DiscoveryGate::new();
        assert!(gate.request());
        assert!(!gate.complete());
        assert!(gate.request());
    }
}
