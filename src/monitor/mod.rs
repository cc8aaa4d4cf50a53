//! The presentation-side monitoring core.
//!
//! - `poll` - the fetch state machine and its single-owner event loop
//! - `backoff` - jittered exponential retry scheduling
//! - `dedup` - persisted last-seen category and alert decisions
//! - `source` - what the loop fetches from

mod backoff;
mod dedup;
mod poll;
mod source;

pub use backoff::{BackoffPolicy, BackoffScheduler};
pub use dedup::{Alert, Deduplicator, LastSeen};
pub use poll::{
    LoopCommand, MonitorEvent, Phase, PollLoop, PollState, Trigger, DEFAULT_INTERVAL,
};
pub use source::{FeedSource, StationFeed};
