//! Samples CPU and memory usage of the worker child processes the pool
//! has spawned, feeding the adaptive scaling engine's resource gates.

use std::collections::VecDeque;

use parking_lot::Mutex;
use sysinfo::{Pid, System};
use tracing::debug;

const HISTORY_LEN: usize = 10;

struct Samples {
    system: System,
    tracked: Vec<Pid>,
    cpu_core_history: VecDeque<f64>,
    memory_gb_history: VecDeque<f64>,
}

/// Tracks a set of worker PIDs supplied by the pool and reports aggregate
/// CPU-core and memory consumption across them.
pub struct SystemMonitor {
    inner: Mutex<Samples>,
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMonitor {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Samples {
                system: System::new(),
                tracked: Vec::new(),
                cpu_core_history: VecDeque::with_capacity(HISTORY_LEN),
                memory_gb_history: VecDeque::with_capacity(HISTORY_LEN),
            }),
        }
    }

    /// Replaces the set of tracked child PIDs. Called by the pool whenever
    /// it resizes, so stale PIDs from a just-shut-down generation of
    /// workers are dropped immediately rather than at the next sweep.
    pub fn set_tracked_pids(&self, pids: impl IntoIterator<Item = u32>) {
        let mut guard = self.inner.lock();
        guard.tracked = pids.into_iter().map(|p| Pid::from_u32(p)).collect();
    }

    /// Re-reads process stats for every tracked PID and appends one sample
    /// to each bounded history.
    pub fn refresh(&self) {
        let mut guard = self.inner.lock();
        guard.system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

        let tracked = guard.tracked.clone();
        let mut total_cores = 0.0_f64;
        let mut total_mem_gb = 0.0_f64;
        let mut alive = 0usize;

        for pid in &tracked {
            if let Some(process) = guard.system.process(*pid) {
                total_cores += process.cpu_usage() as f64 / 100.0;
                total_mem_gb += process.memory() as f64 / 1_073_741_824.0;
                alive += 1;
            }
        }

        debug!(alive, total_cores, total_mem_gb, "system monitor sample");

        push_bounded(&mut guard.cpu_core_history, total_cores);
        push_bounded(&mut guard.memory_gb_history, total_mem_gb);
    }

    pub fn total_cpu_cores(&self) -> f64 {
        self.inner
            .lock()
            .cpu_core_history
            .back()
            .copied()
            .unwrap_or(0.0)
    }

    pub fn average_cpu_cores(&self) -> f64 {
        let guard = self.inner.lock();
        mean(&guard.cpu_core_history)
    }

    pub fn total_memory_gb(&self) -> f64 {
        self.inner
            .lock()
            .memory_gb_history
            .back()
            .copied()
            .unwrap_or(0.0)
    }

    pub fn average_memory_gb(&self) -> f64 {
        let guard = self.inner.lock();
        mean(&guard.memory_gb_history)
    }

    pub fn active_worker_count(&self) -> usize {
        let mut guard = self.inner.lock();
        guard.system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
        guard
            .tracked
            .iter()
            .filter(|pid| guard.system.process(**pid).is_some())
            .count()
    }
}

fn push_bounded(history: &mut VecDeque<f64>, value: f64) {
    if history.len() == HISTORY_LEN {
        history.pop_front();
    }
    history.push_back(value);
}

fn mean(history: &VecDeque<f64>) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    history.iter().sum::<f64>() / history.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_monitor_reports_zero() {
        let monitor = SystemMonitor::new();
        assert_eq!(monitor.total_cpu_cores(), 0.0);
        assert_eq!(monitor.average_memory_gb(), 0.0);
        assert_eq!(monitor.active_worker_count(), 0);
    }

    #[test]
    fn history_push_bounded_caps_at_ten_samples() {
        let mut history = VecDeque::new();
        for i in 0..15 {
            push_bounded(&mut history, i as f64);
        }
        assert_eq!(history.len(), HISTORY_LEN);
        assert_eq!(*history.front().unwrap(), 5.0);
        assert_eq!(*history.back().unwrap(), 14.0);
    }

    #[test]
    fn tracking_self_pid_yields_a_nonzero_sample() {
        let monitor = SystemMonitor::new();
        monitor.set_tracked_pids([std::process::id()]);
        monitor.refresh();
        assert_eq!(monitor.active_worker_count(), 1);
    }
}
