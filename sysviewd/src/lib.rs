pub mod aggregator;
pub mod api;
pub mod cancel;
pub mod collectors;
pub mod config;
pub mod rate;
pub mod types;
pub mod utils;

pub use aggregator::{CaptureError, SnapshotAggregator};
pub use cancel::CancelToken;
pub use config::Config;
pub use rate::{Clock, CounterSample, MonotonicClock, RateTracker};
pub use types::{Captured, CategoryError, Snapshot};
