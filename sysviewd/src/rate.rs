//! Per-channel rate computation over cumulative counters.
//!
//! OS counters such as "bytes received since boot" only ever grow, so a
//! single read says nothing about current throughput. The tracker keeps the
//! last sample seen on each channel and turns the next one into a
//! per-second rate:
//!
//! - first sample on a channel: stored, no rate yet (`None`)
//! - non-positive elapsed time: `Some(0.0)`, baseline kept
//! - counter went backwards (device reattached, wrap): new baseline, `None`
//! - otherwise: `Δvalue / Δt`, baseline replaced
//!
//! Timestamps are [`Instant`]s. Calendar time can jump and must never feed
//! a rate.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::debug;
use std::time::Instant;

/// One reading of a cumulative counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSample {
    pub value: u64,
    pub timestamp: Instant,
}

impl CounterSample {
    pub fn new(value: u64, timestamp: Instant) -> Self {
        Self { value, timestamp }
    }
}

/// Source of monotonic timestamps for samples.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Last sample per channel.
///
/// Each observation holds the channel's map entry for the whole
/// compare-and-replace, so two concurrent pollers cannot both compute a delta
/// against the same baseline and then race to overwrite it.
#[derive(Debug, Default)]
pub struct RateTracker {
    samples: DashMap<String, CounterSample>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `sample` on `channel` and returns the rate per second since
    /// the previous sample, if one can be computed.
    pub fn observe(&self, channel: &str, sample: CounterSample) -> Option<f64> {
        match self.samples.entry(channel.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(sample);
                None
            }
            Entry::Occupied(mut slot) => {
                let previous = *slot.get();

                let elapsed = sample
                    .timestamp
                    .checked_duration_since(previous.timestamp)
                    .filter(|elapsed| !elapsed.is_zero());
                let Some(elapsed) = elapsed else {
                    debug!("[rate] {channel}: sample not newer than baseline, reporting 0");
                    return Some(0.0);
                };

                if sample.value < previous.value {
                    debug!(
                        "[rate] {channel}: counter went from {} to {}, resetting baseline",
                        previous.value, sample.value
                    );
                    slot.insert(sample);
                    return None;
                }

                let rate = (sample.value - previous.value) as f64 / elapsed.as_secs_f64();
                slot.insert(sample);
                Some(rate)
            }
        }
    }

    /// The stored baseline for `channel`.
    pub fn baseline(&self, channel: &str) -> Option<CounterSample> {
        self.samples.get(channel).map(|entry| *entry.value())
    }

    pub fn channels(&self) -> usize {
        self.samples.len()
    }
}
