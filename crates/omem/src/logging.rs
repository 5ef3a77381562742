//! Memory Event Logging
//!
//! Structured events for heap lifecycle operations, useful for:
//! - Diagnosing heap growth
//! - Tracing image save/restore
//! - Production monitoring
//!
//! Every recorded event is also forwarded to the `log` facade at its level,
//! so a host that installs a `log` backend sees the same stream.
//!
//! Log Levels:
//! - ERROR: allocation failures
//! - INFO: collection cycles, image save/load
//! - DEBUG: segment lifecycle

use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;

/// Log level for memory events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// Memory event types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryEvent {
    /// Collection cycle started
    CycleStart { cycle: u64, reason: String },

    /// Collection cycle completed
    CycleEnd {
        cycle: u64,
        duration_ms: f64,
        marked_objects: usize,
        reclaimed_objects: usize,
        reclaimed_bytes: usize,
    },

    /// Segment added to the heap
    SegmentAcquired {
        segment: u32,
        size: usize,
        large: bool,
    },

    /// Segment returned after becoming empty
    SegmentReleased {
        segment: u32,
        size: usize,
        large: bool,
    },

    /// Object graph flattened into an image
    ImageSaved { objects: u64, bytes: usize },

    /// Object graph restored from an image
    ImageLoaded { objects: u64, bytes: usize },

    /// Allocation could not be satisfied
    AllocationFailure { size: usize, heap_used: usize },
}

impl MemoryEvent {
    /// Log level for event
    pub fn level(&self) -> LogLevel {
        match self {
            MemoryEvent::AllocationFailure { .. } => LogLevel::Error,
            MemoryEvent::CycleStart { .. }
            | MemoryEvent::CycleEnd { .. }
            | MemoryEvent::ImageSaved { .. }
            | MemoryEvent::ImageLoaded { .. } => LogLevel::Info,
            MemoryEvent::SegmentAcquired { .. } | MemoryEvent::SegmentReleased { .. } => {
                LogLevel::Debug
            },
        }
    }

    /// Human-readable rendering
    pub fn to_human(&self) -> String {
        match self {
            MemoryEvent::CycleStart { cycle, reason } => {
                format!("[omem] Cycle {} started (reason: {})", cycle, reason)
            },
            MemoryEvent::CycleEnd {
                cycle,
                duration_ms,
                marked_objects,
                reclaimed_objects,
                reclaimed_bytes,
            } => format!(
                "[omem] Cycle {} completed ({:.2}ms, {} marked, reclaimed {} objects / {} bytes)",
                cycle, duration_ms, marked_objects, reclaimed_objects, reclaimed_bytes
            ),
            MemoryEvent::SegmentAcquired {
                segment,
                size,
                large,
            } => format!(
                "[omem] Segment {} acquired ({} bytes{})",
                segment,
                size,
                if *large { ", large" } else { "" }
            ),
            MemoryEvent::SegmentReleased {
                segment,
                size,
                large,
            } => format!(
                "[omem] Segment {} released ({} bytes{})",
                segment,
                size,
                if *large { ", large" } else { "" }
            ),
            MemoryEvent::ImageSaved { objects, bytes } => {
                format!("[omem] Image saved: {} objects, {} bytes", objects, bytes)
            },
            MemoryEvent::ImageLoaded { objects, bytes } => {
                format!("[omem] Image loaded: {} objects, {} bytes", objects, bytes)
            },
            MemoryEvent::AllocationFailure { size, heap_used } => format!(
                "[omem] Allocation failure: {} bytes (heap used: {})",
                size, heap_used
            ),
        }
    }

    /// JSON rendering
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Build a `CycleEnd` event from a measured duration
pub(crate) fn cycle_end(
    cycle: u64,
    duration: Duration,
    marked_objects: usize,
    reclaimed_objects: usize,
    reclaimed_bytes: usize,
) -> MemoryEvent {
    MemoryEvent::CycleEnd {
        cycle,
        duration_ms: duration.as_secs_f64() * 1000.0,
        marked_objects,
        reclaimed_objects,
        reclaimed_bytes,
    }
}

/// Memory logger configuration
#[derive(Debug, Clone)]
pub struct MemoryLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Also print to stderr
    pub console: bool,

    /// Render console output as JSON
    pub json: bool,

    /// Prefix console output with a timestamp
    pub timestamps: bool,

    /// Maximum number of retained events (oldest dropped first)
    pub capacity: usize,
}

impl Default for MemoryLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: false,
            json: false,
            timestamps: true,
            capacity: 4096,
        }
    }
}

/// Memory Logger - records events with their wall-clock time
pub struct MemoryLogger {
    config: MemoryLoggerConfig,
    events: Mutex<Vec<(DateTime<Local>, MemoryEvent)>>,
    enabled: bool,
}

impl MemoryLogger {
    /// Create new memory logger
    pub fn new(config: MemoryLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(Vec::new()),
            enabled: true,
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record an event
    pub fn log(&self, event: MemoryEvent) {
        if !self.enabled {
            return;
        }

        let level = event.level();
        if level > self.config.level {
            return;
        }

        log::log!(level.into(), "{}", event.to_human());

        let now = Local::now();
        if self.config.console {
            self.output_console(now, &event);
        }

        let mut events = self.events.lock();
        if events.len() >= self.config.capacity {
            events.remove(0);
        }
        events.push((now, event));
    }

    fn output_console(&self, now: DateTime<Local>, event: &MemoryEvent) {
        let body = if self.config.json {
            event.to_json()
        } else {
            event.to_human()
        };

        if self.config.timestamps {
            eprintln!("[{}] {}", now.format("%Y-%m-%d %H:%M:%S%.3f"), body);
        } else {
            eprintln!("{}", body);
        }
    }

    /// Snapshot of all retained events
    pub fn events(&self) -> Vec<(DateTime<Local>, MemoryEvent)> {
        self.events.lock().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for MemoryLogger {
    fn default() -> Self {
        Self::new(MemoryLoggerConfig::default())
    }
}

/// Process-wide memory logger
lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER: Mutex<MemoryLogger> = Mutex::new(MemoryLogger::default());
}

/// Log an event to the global logger
pub fn log_event(event: MemoryEvent) {
    GLOBAL_LOGGER.lock().log(event);
}

/// Replace the global logger configuration (retained events are dropped)
pub fn configure_logger(config: MemoryLoggerConfig) {
    *GLOBAL_LOGGER.lock() = MemoryLogger::new(config);
}

/// Global logger event count
pub fn event_count() -> usize {
    GLOBAL_LOGGER.lock().event_count()
}

/// Snapshot of the global logger's events
pub fn global_events() -> Vec<MemoryEvent> {
    GLOBAL_LOGGER
        .lock()
        .events()
        .into_iter()
        .map(|(_, event)| event)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_basic() {
        let logger = MemoryLogger::default();

        logger.log(MemoryEvent::CycleStart {
            cycle: 1,
            reason: "Explicit".to_string(),
        });

        assert_eq!(logger.event_count(), 1);
    }

    #[test]
    fn test_logger_disable() {
        let mut logger = MemoryLogger::default();

        logger.disable();
        logger.log(MemoryEvent::ImageSaved {
            objects: 3,
            bytes: 120,
        });

        assert_eq!(logger.event_count(), 0);
    }

    #[test]
    fn test_level_filter_drops_segment_events() {
        let logger = MemoryLogger::default();

        logger.log(MemoryEvent::SegmentAcquired {
            segment: 0,
            size: 4096,
            large: false,
        });

        assert_eq!(logger.event_count(), 0);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let logger = MemoryLogger::new(MemoryLoggerConfig {
            capacity: 2,
            ..Default::default()
        });

        for cycle in 1..=3 {
            logger.log(MemoryEvent::CycleStart {
                cycle,
                reason: "Explicit".to_string(),
            });
        }

        let cycles: Vec<u64> = logger
            .events()
            .into_iter()
            .filter_map(|(_, e)| match e {
                MemoryEvent::CycleStart { cycle, .. } => Some(cycle),
                _ => None,
            })
            .collect();
        assert_eq!(cycles, vec![2, 3]);
    }

    #[test]
    fn test_json_rendering() {
        let event = MemoryEvent::AllocationFailure {
            size: 64,
            heap_used: 1024,
        };
        let json: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();

        assert_eq!(json["type"], "allocation_failure");
        assert_eq!(json["size"], 64);
    }

    #[test]
    fn test_global_logger() {
        log_event(MemoryEvent::ImageLoaded {
            objects: 1,
            bytes: 40,
        });

        assert!(event_count() > 0);
    }
}
