//! Optional resource and throughput reporting for a batch run.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct RunStats {
    pub rows_done: usize,
    pub rows_per_minute: f64,
    pub elapsed: Duration,
    /// Resident memory of this process; `None` when unavailable.
    pub memory_mb: Option<u64>,
}

pub struct RunMonitor {
    enabled: bool,
    started: Instant,
    #[cfg(feature = "cli")]
    system: std::sync::Mutex<sysinfo::System>,
}

impl RunMonitor {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            started: Instant::now(),
            #[cfg(feature = "cli")]
            system: std::sync::Mutex::new(sysinfo::System::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn snapshot(&self, rows_done: usize) -> Option<RunStats> {
        if !self.enabled {
            return None;
        }

        let elapsed = self.started.elapsed();
        let minutes = elapsed.as_secs_f64() / 60.0;
        let rows_per_minute = if minutes > 0.0 {
            rows_done as f64 / minutes
        } else {
            0.0
        };

        Some(RunStats {
            rows_done,
            rows_per_minute,
            elapsed,
            memory_mb: self.memory_mb(),
        })
    }

    #[cfg(feature = "cli")]
    fn memory_mb(&self) -> Option<u64> {
        use sysinfo::{ProcessRefreshKind, ProcessesToUpdate};

        let pid = sysinfo::get_current_pid().ok()?;
        let mut system = self.system.lock().ok()?;
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        system.process(pid).map(|process| process.memory() / 1024 / 1024)
    }

    #[cfg(not(feature = "cli"))]
    fn memory_mb(&self) -> Option<u64> {
        None
    }

    pub fn log_progress(&self, phase: &str, rows_done: usize) {
        let Some(stats) = self.snapshot(rows_done) else {
            return;
        };
        let memory = stats
            .memory_mb
            .map(|mb| format!("{}MB", mb))
            .unwrap_or_else(|| "n/a".to_string());
        tracing::info!(
            "📊 {} - rows: {}, {:.1} rows/min, memory: {}, time: {:?}",
            phase,
            stats.rows_done,
            stats.rows_per_minute,
            memory,
            stats.elapsed
        );
    }
}
