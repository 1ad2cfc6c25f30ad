//! Adaptive worker-pool scaling.
//!
//! `W_max` is fixed at construction from the configured resource quotas;
//! `target_workers` and `queue_length` are read and written together under
//! one lock since scale-up/down decisions need a consistent view of both.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::info;

use dispatch_monitor::SystemMonitor;
use dispatch_shared::config::ScalingConfig;
use dispatch_shared::{ScalingSnapshot, ScalingVerdict};

struct State {
    target_workers: usize,
    queue_length: usize,
    last_action_at: Instant,
}

pub struct ScalingEngine {
    config: ScalingConfig,
    monitor: Arc<SystemMonitor>,
    max_workers: usize,
    state: Mutex<State>,
}

impl ScalingEngine {
    pub fn new(config: ScalingConfig, monitor: Arc<SystemMonitor>) -> Self {
        let max_workers = calculate_max_workers(&config);
        let cooldown = Duration::from_secs(config.scale_down_timeout_secs);
        let state = State {
            target_workers: config.min_workers,
            queue_length: 0,
            // Back-date so a scale-down is not blocked by cooldown before
            // the engine has ever taken an action.
            last_action_at: Instant::now() - cooldown,
        };
        Self {
            config,
            monitor,
            max_workers,
            state: Mutex::new(state),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn target_workers(&self) -> usize {
        self.state.lock().target_workers
    }

    pub fn update_queue_length(&self, length: usize) {
        self.state.lock().queue_length = length;
    }

    pub fn calculate_optimal_batch_size(&self) -> usize {
        let state = self.state.lock();
        batch_size_for(&self.config, state.target_workers, state.queue_length)
    }

    pub fn should_scale_up(&self) -> ScalingVerdict {
        let state = self.state.lock();
        let cores = self.monitor.average_cpu_cores();
        let mem = self.monitor.total_memory_gb();
        scale_up_verdict(&self.config, self.max_workers, &state, cores, mem)
    }

    pub fn should_scale_down(&self) -> ScalingVerdict {
        let state = self.state.lock();
        let cores = self.monitor.average_cpu_cores();
        scale_down_verdict(&self.config, &state, cores)
    }

    /// Clamps `target` into `[min_workers, W_max]` and applies it, bumping
    /// the cooldown clock only if the value actually changed.
    pub fn set_target_worker_count(&self, target: usize) -> usize {
        let clamped = target.clamp(self.config.min_workers, self.max_workers);
        let mut state = self.state.lock();
        if clamped != state.target_workers {
            info!(from = state.target_workers, to = clamped, "scaling target worker count");
            state.target_workers = clamped;
            state.last_action_at = Instant::now();
        }
        clamped
    }

    /// Runs one scaling decision: evaluates both predicates and, if
    /// `aggressive_scaling` is set, applies a single +1/-1 step. Always
    /// returns a full snapshot, whether or not the step was applied.
    pub fn tick(&self) -> ScalingSnapshot {
        self.monitor.refresh();

        let scale_up = self.should_scale_up();
        let scale_down = self.should_scale_down();

        if self.config.aggressive_scaling {
            if scale_up.decision {
                self.set_target_worker_count(self.target_workers() + 1);
            } else if scale_down.decision {
                self.set_target_worker_count(self.target_workers().saturating_sub(1));
            }
        }

        let state = self.state.lock();
        ScalingSnapshot {
            active_workers: self.monitor.active_worker_count(),
            target_workers: state.target_workers,
            max_workers: self.max_workers,
            average_cpu_cores: self.monitor.average_cpu_cores(),
            total_memory_gb: self.monitor.total_memory_gb(),
            queue_length: state.queue_length,
            batch_size: batch_size_for(&self.config, state.target_workers, state.queue_length),
            scale_up,
            scale_down,
            taken_at: Utc::now(),
        }
    }
}

fn calculate_max_workers(config: &ScalingConfig) -> usize {
    let cpu_based = (config.max_cpu_quota / config.cpu_per_worker).floor();
    let mem_based = (config.max_memory_quota_gb / config.memory_per_worker_gb).floor();
    let resource_based = cpu_based.min(mem_based).max(0.0) as usize;
    config.min_workers.max(resource_based)
}

fn batch_size_for(config: &ScalingConfig, target_workers: usize, queue_length: usize) -> usize {
    let base = config.parallelism_multiplier * target_workers;
    let scaled = if queue_length < target_workers {
        (base as f64 * 1.5) as usize
    } else if queue_length > 5 * target_workers {
        (base as f64 * 0.5) as usize
    } else {
        base
    };
    scaled.max(config.min_workers)
}

fn scale_up_verdict(
    config: &ScalingConfig,
    max_workers: usize,
    state: &State,
    cores: f64,
    mem_gb: f64,
) -> ScalingVerdict {
    let deny = |reason: String| ScalingVerdict { decision: false, reason };

    if state.target_workers >= max_workers {
        return deny("already at max workers".into());
    }
    let cpu_ceiling = config.cpu_threshold_scale_up * config.max_cpu_quota;
    if cores >= cpu_ceiling {
        return deny(format!("cpu usage {cores:.2} cores at/above threshold {cpu_ceiling:.2}"));
    }
    let mem_ceiling = config.memory_threshold * config.max_memory_quota_gb;
    if mem_gb >= mem_ceiling {
        return deny(format!("memory usage {mem_gb:.2}gb at/above threshold {mem_ceiling:.2}gb"));
    }
    let required = config.scale_up_threshold * state.target_workers as f64;
    if (state.queue_length as f64) < required {
        return deny(format!(
            "queue length {} below scale-up threshold {required:.1}",
            state.queue_length
        ));
    }
    ScalingVerdict {
        decision: true,
        reason: format!(
            "queue length {} at/above threshold {required:.1} with headroom on cpu/memory",
            state.queue_length
        ),
    }
}

fn scale_down_verdict(config: &ScalingConfig, state: &State, cores: f64) -> ScalingVerdict {
    let deny = |reason: String| ScalingVerdict { decision: false, reason };

    if state.target_workers <= config.min_workers {
        return deny("already at min workers".into());
    }
    if state.queue_length != 0 {
        return deny(format!("queue not empty ({} pending)", state.queue_length));
    }
    let cpu_ceiling = config.cpu_threshold_scale_down * config.max_cpu_quota;
    if cores >= cpu_ceiling {
        return deny(format!("cpu usage {cores:.2} cores at/above scale-down threshold {cpu_ceiling:.2}"));
    }
    let cooldown = Duration::from_secs(config.scale_down_timeout_secs);
    let elapsed = state.last_action_at.elapsed();
    if elapsed < cooldown {
        return deny(format!(
            "cooldown active, {:.1}s remaining",
            (cooldown - elapsed).as_secs_f64()
        ));
    }
    ScalingVerdict {
        decision: true,
        reason: "idle queue, cpu below threshold, cooldown elapsed".into(),
    }
}
