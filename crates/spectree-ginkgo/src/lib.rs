#![doc = include_str!("../README.md")]

#[cfg(feature = "watcher")]
pub mod async_watcher;
pub mod cancel;
pub mod command;
pub mod config;
pub mod debug;
pub mod error;
pub mod gate;
pub mod invoke;
pub mod observer;
pub mod workspace;

#[cfg(feature = "watcher")]
pub use async_watcher::{AsyncDiscoveryWatcher, WatcherConfig, WatcherHandle};
pub use cancel::CancelToken;
pub use command::{Focus, GinkgoCommand};
pub use config::{CONFIG_FILE_NAME, RunnerConfig};
pub use debug::{DEBUG_UNSUPPORTED, DebugLauncher, DebugRequest, DebugSession, UnsupportedDebugger};
pub use error::{Result, RunnerError};
pub use gate::DiscoveryGate;
pub use invoke::{Invocation, ReportSlot};
pub use observer::{EventLog, RunEvent, RunObserver};
pub use workspace::{DiscoveryOutcome, LensItem, RunSummary, Workspace};
