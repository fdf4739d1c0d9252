use anyhow::Result;
use std::time::Duration;

/// Autoscaling policy for a consumer pool. The gap between the two
/// thresholds is the hysteresis band; the cooldown bounds how often any
/// action may fire.
#[derive(Debug, Clone)]
pub struct AutoscaleConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub scale_up_threshold: usize,
    pub scale_down_threshold: usize,
    pub scale_up_step: usize,
    pub scale_down_step: usize,
    pub check_interval: Duration,
    pub cooldown: Duration,
    /// Weight given to scaled-out consumers: 0.5 means 5 slots each.
    pub scale_weight: f64,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 8,
            scale_up_threshold: 50,
            scale_down_threshold: 10,
            scale_up_step: 1,
            scale_down_step: 1,
            check_interval: Duration::from_secs(10),
            cooldown: Duration::from_secs(30),
            scale_weight: 0.5,
        }
    }
}

impl AutoscaleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_size == 0 {
            return Err(anyhow::anyhow!("min_size must be positive"));
        }
        if self.min_size > self.max_size {
            return Err(anyhow::anyhow!(
                "min_size {} exceeds max_size {}",
                self.min_size,
                self.max_size
            ));
        }
        if self.scale_down_threshold >= self.scale_up_threshold {
            return Err(anyhow::anyhow!(
                "scale_down_threshold {} must be below scale_up_threshold {}",
                self.scale_down_threshold,
                self.scale_up_threshold
            ));
        }
        if self.scale_up_step == 0 || self.scale_down_step == 0 {
            return Err(anyhow::anyhow!("scale steps must be at least 1"));
        }
        if self.cooldown.is_zero() {
            return Err(anyhow::anyhow!("cooldown must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleAction {
    Up(usize),
    Down(usize),
}

/// Pure scaling decision for one control-loop tick. `since_last` is the
/// time elapsed since the previous action, if there was one; inside the
/// cooldown no action fires. Steps are clamped so the pool size never
/// leaves `[min_size, max_size]`.
pub fn decide(
    queue_depth: usize,
    current_size: usize,
    since_last: Option<Duration>,
    config: &AutoscaleConfig,
) -> Option<ScaleAction> {
    if let Some(elapsed) = since_last {
        if elapsed < config.cooldown {
            return None;
        }
    }

    if queue_depth >= config.scale_up_threshold && current_size < config.max_size {
        let count = config.scale_up_step.min(config.max_size - current_size);
        return Some(ScaleAction::Up(count));
    }

    if queue_depth <= config.scale_down_threshold && current_size > config.min_size {
        let count = config.scale_down_step.min(current_size - config.min_size);
        return Some(ScaleAction::Down(count));
    }

    None
}
