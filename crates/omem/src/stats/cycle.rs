//! Collection Cycle Statistics
//!
//! One [`CycleStats`] per collection; [`GcStats`] aggregates them and keeps
//! a bounded history plus the pause-time histogram.

use std::collections::VecDeque;

use serde::Serialize;

use super::histogram::{Histogram, HistogramSummary};
use crate::gc::CollectionReason;

/// Statistics of one collection cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleStats {
    pub cycle: u64,
    pub reason: CollectionReason,
    /// Epoch the cycle marked with
    pub epoch: u64,

    /// Phase timings (nanoseconds)
    pub mark_ns: u64,
    pub sweep_ns: u64,

    /// Root references scanned
    pub roots_scanned: usize,
    pub objects_marked: usize,
    pub objects_reclaimed: usize,
    pub bytes_reclaimed: usize,
    pub segments_released: usize,

    /// Memory statistics
    pub heap_used_before: usize,
    pub heap_used_after: usize,
    pub heap_committed: usize,
}

impl CycleStats {
    pub fn new(cycle: u64, reason: CollectionReason, epoch: u64) -> Self {
        Self {
            cycle,
            reason,
            epoch,
            mark_ns: 0,
            sweep_ns: 0,
            roots_scanned: 0,
            objects_marked: 0,
            objects_reclaimed: 0,
            bytes_reclaimed: 0,
            segments_released: 0,
            heap_used_before: 0,
            heap_used_after: 0,
            heap_committed: 0,
        }
    }

    /// Whole stop-the-world pause
    pub fn pause_ns(&self) -> u64 {
        self.mark_ns + self.sweep_ns
    }
}

/// Cumulative collection statistics of one instance
#[derive(Debug, Clone)]
pub struct GcStats {
    total_cycles: u64,
    allocation_cycles: u64,
    explicit_cycles: u64,
    shutdown_cycles: u64,

    total_objects_marked: u64,
    total_objects_reclaimed: u64,
    total_bytes_reclaimed: u64,
    total_segments_released: u64,
    peak_heap_used: usize,

    pauses: Histogram,
    history: VecDeque<CycleStats>,
    max_history: usize,
}

impl GcStats {
    pub fn new(max_history: usize) -> Self {
        Self {
            total_cycles: 0,
            allocation_cycles: 0,
            explicit_cycles: 0,
            shutdown_cycles: 0,
            total_objects_marked: 0,
            total_objects_reclaimed: 0,
            total_bytes_reclaimed: 0,
            total_segments_released: 0,
            peak_heap_used: 0,
            pauses: Histogram::new(),
            history: VecDeque::with_capacity(max_history),
            max_history,
        }
    }

    /// Fold a finished cycle into the totals
    pub fn record_cycle(&mut self, cycle: &CycleStats) {
        self.total_cycles += 1;
        match cycle.reason {
            CollectionReason::AllocationFailure => self.allocation_cycles += 1,
            CollectionReason::Explicit => self.explicit_cycles += 1,
            CollectionReason::Shutdown => self.shutdown_cycles += 1,
        }

        self.total_objects_marked += cycle.objects_marked as u64;
        self.total_objects_reclaimed += cycle.objects_reclaimed as u64;
        self.total_bytes_reclaimed += cycle.bytes_reclaimed as u64;
        self.total_segments_released += cycle.segments_released as u64;
        self.peak_heap_used = self.peak_heap_used.max(cycle.heap_used_before);
        self.pauses.record(cycle.pause_ns());

        if self.max_history > 0 {
            if self.history.len() == self.max_history {
                self.history.pop_front();
            }
            self.history.push_back(cycle.clone());
        }
    }

    /// Track heap usage outside collections
    pub fn record_heap_used(&mut self, used: usize) {
        self.peak_heap_used = self.peak_heap_used.max(used);
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn last_cycle(&self) -> Option<&CycleStats> {
        self.history.back()
    }

    /// Retained cycles, oldest first
    pub fn history(&self) -> impl Iterator<Item = &CycleStats> {
        self.history.iter()
    }

    pub fn pause_histogram(&self) -> &Histogram {
        &self.pauses
    }

    pub fn summary(&self) -> GcSummary {
        GcSummary {
            total_cycles: self.total_cycles,
            allocation_cycles: self.allocation_cycles,
            explicit_cycles: self.explicit_cycles,
            shutdown_cycles: self.shutdown_cycles,
            total_objects_marked: self.total_objects_marked,
            total_objects_reclaimed: self.total_objects_reclaimed,
            total_bytes_reclaimed: self.total_bytes_reclaimed,
            total_segments_released: self.total_segments_released,
            peak_heap_used: self.peak_heap_used,
            pause_ns: self.pauses.summary(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.max_history);
    }
}

impl Default for GcStats {
    fn default() -> Self {
        Self::new(32)
    }
}

/// Summary statistics
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct GcSummary {
    pub total_cycles: u64,
    pub allocation_cycles: u64,
    pub explicit_cycles: u64,
    pub shutdown_cycles: u64,
    pub total_objects_marked: u64,
    pub total_objects_reclaimed: u64,
    pub total_bytes_reclaimed: u64,
    pub total_segments_released: u64,
    pub peak_heap_used: usize,
    pub pause_ns: HistogramSummary,
}
