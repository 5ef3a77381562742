//! Stats Module - Collection and Heap Statistics
//!
//! Two kinds of statistics:
//! - Collection statistics, accumulated per cycle (pause times, reclaimed
//!   objects and bytes, released segments)
//! - Heap census, built on demand by scanning segments (per-type and
//!   per-segment-class counters); never persisted

pub mod census;
pub mod cycle;
pub mod histogram;
pub mod timer;

pub use census::{MemoryStats, ObjectStats, SegmentStats};
pub use cycle::{CycleStats, GcStats, GcSummary};
pub use histogram::{Histogram, HistogramSummary};
pub use timer::GcTimer;
