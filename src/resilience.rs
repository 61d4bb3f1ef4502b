use crate::contract::Dimensions;

/// Policy knobs for the decode health feedback loop. The defaults are the
/// shipped policy; hosts that want a different envelope construct their
/// own and hand it to [`crate::DecodeSession::with_tuning`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResilienceTuning {
    pub min_bitrate: u32,
    pub max_bitrate: u32,
    pub initial_bitrate: u32,
    /// Linear scale from output pixel count to a fresh bitrate estimate
    /// after a resolution change. Empirical knob, not a protocol value.
    pub bits_per_pixel: u32,
    pub success_streak: u32,
    pub success_step: u32,
    pub success_margin: u32,
    pub minor_failure_threshold: u32,
    pub minor_failure_step: u32,
    pub severe_failure_threshold: u32,
}

impl Default for ResilienceTuning {
    fn default() -> Self {
        Self {
            min_bitrate: 1_000_000,
            max_bitrate: 10_000_000,
            initial_bitrate: 5_000_000,
            bits_per_pixel: 4,
            success_streak: 30,
            success_step: 100_000,
            success_margin: 1_000_000,
            minor_failure_threshold: 5,
            minor_failure_step: 500_000,
            severe_failure_threshold: 20,
        }
    }
}

/// What the session should do with its backend context after a failed
/// frame. A soft reset also bumped the bitrate estimate; a hard reset
/// leaves it alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextAction {
    Retain,
    SoftReset,
    HardReset,
}

/// Decode health bookkeeping. The bitrate estimate is a quality proxy
/// tracking whether recent decodes are healthy; it gates context
/// recycling and the de-escalation branch, and is never handed to the
/// backend (there is no bitrate knob on the decode boundary).
///
/// Invariants: the estimate stays inside `[min_bitrate, max_bitrate]`,
/// and at most one of the two streak counters is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResilienceState {
    pub target_bitrate: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl ResilienceState {
    #[must_use]
    pub fn new(tuning: &ResilienceTuning) -> Self {
        Self {
            target_bitrate: tuning
                .initial_bitrate
                .clamp(tuning.min_bitrate, tuning.max_bitrate),
            consecutive_successes: 0,
            consecutive_failures: 0,
        }
    }

    /// Resolution change: re-derive the estimate from the new pixel count
    /// and forget both streaks.
    pub fn rebase(&mut self, dims: Dimensions, tuning: &ResilienceTuning) {
        let estimate = dims
            .pixel_count()
            .saturating_mul(u64::from(tuning.bits_per_pixel));
        self.target_bitrate =
            estimate.clamp(u64::from(tuning.min_bitrate), u64::from(tuning.max_bitrate)) as u32;
        self.consecutive_successes = 0;
        self.consecutive_failures = 0;
    }

    /// A full healthy streak walks the estimate back down one step, then
    /// the streak restarts from zero. The safety margin keeps the
    /// estimate from grinding into the floor.
    pub fn on_success(&mut self, tuning: &ResilienceTuning) {
        self.consecutive_failures = 0;
        self.consecutive_successes += 1;
        if self.consecutive_successes >= tuning.success_streak
            && self.target_bitrate > tuning.min_bitrate + tuning.success_margin
        {
            self.target_bitrate = self
                .target_bitrate
                .saturating_sub(tuning.success_step)
                .max(tuning.min_bitrate);
            self.consecutive_successes = 0;
        }
    }

    /// Ordered remediation policy; only the first matching branch fires.
    /// The minor branch needs headroom below the ceiling, so at the cap
    /// only the severe branch can trigger.
    pub fn on_failure(&mut self, tuning: &ResilienceTuning) -> ContextAction {
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        if self.consecutive_failures > tuning.minor_failure_threshold
            && self.target_bitrate < tuning.max_bitrate
        {
            self.target_bitrate = self
                .target_bitrate
                .saturating_add(tuning.minor_failure_step)
                .min(tuning.max_bitrate);
            self.consecutive_failures = 0;
            ContextAction::SoftReset
        } else if self.consecutive_failures > tuning.severe_failure_threshold {
            self.consecutive_failures = 0;
            ContextAction::HardReset
        } else {
            ContextAction::Retain
        }
    }
}
