use std::time::Duration;

use skein_notify::Limits;
use skein_pipe::PipeConfig;
use skein_runtime::SchedulerConfig;

/// Everything about an `Environment` that varies between a quick unit test
/// and a production deployment, gathered in one place so `EnvironmentBuilder`
/// has a single knob to override instead of a dozen.
#[derive(Clone, Debug)]
pub struct EnvironmentConfig {
    /// Soft backpressure cap applied to every actor's stdout pipe. `None`
    /// leaves pipes unbounded (`spec.md`'s default; see `skein-pipe`'s
    /// `PipeConfig::unbounded`).
    pub pipe_soft_cap_bytes: Option<usize>,
    /// Per-handle waiter/subscriber caps on the shared notification queue.
    pub queue_limits: Limits,
    /// Upper bound on actor bodies running at once. `None` spawns every
    /// ready node immediately.
    pub max_concurrent_actors: Option<usize>,
    /// How long the scheduler's `one_step` may block before returning idle.
    pub scheduler_idle_poll: Duration,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            pipe_soft_cap_bytes: None,
            queue_limits: Limits::default(),
            max_concurrent_actors: None,
            scheduler_idle_poll: Duration::from_millis(20),
        }
    }
}

impl EnvironmentConfig {
    pub(crate) fn pipe_config(&self) -> PipeConfig {
        match self.pipe_soft_cap_bytes {
            Some(cap) => PipeConfig::capped(cap),
            None => PipeConfig::unbounded(),
        }
    }

    pub(crate) fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            idle_poll: self.scheduler_idle_poll,
            max_concurrent_actors: self.max_concurrent_actors,
            pipe_config: self.pipe_config(),
        }
    }
}
