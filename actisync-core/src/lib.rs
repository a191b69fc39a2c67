//! Core of actisync: reconciles tracked activities into calendar events.
//!
//! - `record` and `event` define what goes in and what the calendar holds
//! - `identity` derives keys and detects changes
//! - `engine` and `pool` run reconciliation passes per destination
//! - `source` adapters fetch Toggl and Google Fit data
//! - `monitor` times each source for the end-of-run report

pub mod batch;
pub mod config;
pub mod constants;
pub mod date_range;
pub mod destination;
pub mod engine;
pub mod error;
pub mod event;
pub mod http;
pub mod identity;
pub mod monitor;
pub mod pool;
pub mod record;
pub mod report;
pub mod retry;
pub mod source;

pub use config::SyncConfig;
pub use date_range::TimeWindow;
pub use engine::{Engine, EngineSettings, SyncStats};
pub use error::{SyncError, SyncResult};
pub use monitor::PerformanceMonitor;
pub use pool::EnginePool;
pub use record::{CanonicalRecord, ColorTag, Span};
pub use report::ErrorReporter;
