//! Self-measurement and the feedback loop.
//!
//! The monitor samples frame timings per frame; on a slower cadence its
//! `tick` turns rolling averages into discrete issues, and the adaptive
//! controller turns issues and summaries into settings changes.

pub mod adaptive;
pub mod monitor;

pub use adaptive::AdaptiveController;
pub use monitor::{
    PerfMonitor, PerfRating, PerfSummary, PerfThresholds, PerformanceIssue, PerformanceSample,
};
