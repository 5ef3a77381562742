//! GC Core Module - Mark-Sweep Cycle Management
//!
//! Implements the collection cycle of one memory instance:
//!
//! ```text
//! Idle ──advance epoch──► Marking ──worklist empty──► Sweeping ──► Idle
//! ```
//!
//! 1. The epoch advances, which un-marks every object at once.
//! 2. Every root and held object is reported to a [`Marker`]; marking
//!    follows `HeapObject::live` edges until the worklist is empty.
//! 3. Sweep frees every slot whose mark word differs from the epoch,
//!    coalesces dead chunks per segment, and releases empty segments
//!    (never the startup segment).
//!
//! Collection is stop-the-world for its instance and runs to completion.

use std::fmt;

use serde::Serialize;

use crate::config::MemoryConfig;
use crate::error::{MemoryError, Result};
use crate::heap::Heap;
use crate::logging::{self, MemoryEvent};
use crate::marker::{Marker, RootSet};
use crate::stats::{CycleStats, GcStats, GcTimer};

/// Collector state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CollectorState {
    /// No collection in progress
    Idle,
    /// Propagating marks from roots
    Marking,
    /// Freeing unmarked slots
    Sweeping,
}

impl fmt::Display for CollectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Reason for a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CollectionReason {
    /// Allocation found no room
    AllocationFailure,
    /// Requested by the runtime
    Explicit,
    /// Final collection before the instance is dropped
    Shutdown,
}

impl fmt::Display for CollectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Mark-sweep collector of one memory instance
#[derive(Debug)]
pub struct Collector {
    state: CollectorState,

    /// Current epoch; never 0
    epoch: u64,

    /// Completed cycles
    cycle: u64,

    stats: GcStats,

    /// Forward cycle events to the global logger
    verbose: bool,
}

impl Collector {
    /// First epoch of a new instance
    pub const INITIAL_EPOCH: u64 = 1;

    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            state: CollectorState::Idle,
            epoch: Self::INITIAL_EPOCH,
            cycle: 0,
            stats: GcStats::default(),
            verbose: config.verbose,
        }
    }

    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[inline]
    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn is_collecting(&self) -> bool {
        self.state != CollectorState::Idle
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut GcStats {
        &mut self.stats
    }

    fn advance_epoch(&mut self) -> u64 {
        self.epoch = match self.epoch.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        self.epoch
    }

    /// Run one full collection
    ///
    /// # Arguments
    /// * `heap` - heap to collect
    /// * `roots` - root set; every root and held object survives
    /// * `reason` - recorded in the cycle statistics
    ///
    /// # Returns
    /// Statistics of the finished cycle, or `InvalidState` if a collection
    /// is already running
    pub fn collect(
        &mut self,
        heap: &mut Heap,
        roots: &RootSet,
        reason: CollectionReason,
    ) -> Result<CycleStats> {
        if self.state != CollectorState::Idle {
            return Err(MemoryError::InvalidState {
                expected: CollectorState::Idle.to_string(),
                actual: self.state.to_string(),
            });
        }

        let cycle_id = self.cycle + 1;
        let epoch = self.advance_epoch();
        self.emit(MemoryEvent::CycleStart {
            cycle: cycle_id,
            reason: reason.to_string(),
        });

        let mut cycle = CycleStats::new(cycle_id, reason, epoch);
        cycle.heap_used_before = heap.used_bytes();
        let mut timer = GcTimer::start();
        let started = timer;

        // === Mark ===
        self.state = CollectorState::Marking;
        let mut marker = Marker::new(epoch);
        cycle.roots_scanned = roots.scan(|r| marker.mark(r));
        marker.drain(heap);
        cycle.objects_marked = marker.marked_count();
        cycle.mark_ns = duration_ns(timer.lap());

        // === Sweep ===
        self.state = CollectorState::Sweeping;
        let (objects, bytes) = Self::sweep(heap, epoch);
        cycle.objects_reclaimed = objects;
        cycle.bytes_reclaimed = bytes;
        cycle.segments_released = heap.release_empty_segments();
        cycle.sweep_ns = duration_ns(timer.lap());

        self.state = CollectorState::Idle;
        self.cycle = cycle_id;

        cycle.heap_used_after = heap.used_bytes();
        cycle.heap_committed = heap.committed_bytes();
        self.stats.record_cycle(&cycle);

        log::debug!(
            "cycle {} ({}): marked {}, reclaimed {} objects / {} bytes, released {} segments",
            cycle_id,
            reason,
            cycle.objects_marked,
            cycle.objects_reclaimed,
            cycle.bytes_reclaimed,
            cycle.segments_released
        );
        self.emit(logging::cycle_end(
            cycle_id,
            started.elapsed(),
            cycle.objects_marked,
            cycle.objects_reclaimed,
            cycle.bytes_reclaimed,
        ));

        Ok(cycle)
    }

    /// Free every slot not carrying `epoch`
    ///
    /// # Returns
    /// (objects freed, bytes freed)
    fn sweep(heap: &mut Heap, epoch: u64) -> (usize, usize) {
        let mut objects = 0;
        let mut bytes = 0;

        for id in heap.segment_ids() {
            let Some(segment) = heap.segment_mut(id) else {
                continue;
            };

            let dead: Vec<_> = segment
                .slots()
                .filter(|(_, slot)| !slot.header.is_live(epoch))
                .map(|(slot_id, _)| slot_id)
                .collect();

            for slot_id in dead {
                if let Some(freed) = segment.free(slot_id) {
                    objects += 1;
                    bytes += freed.size();
                }
            }
            segment.coalesce();
        }

        (objects, bytes)
    }

    fn emit(&self, event: MemoryEvent) {
        if self.verbose {
            logging::log_event(event);
        }
    }
}

fn duration_ns(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
