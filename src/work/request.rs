use std::time::Duration;

use super::conditions::DeviceConditions;

/// Smallest backoff the engine is designed around; also the default start.
pub const MIN_BACKOFF: Duration = Duration::from_secs(10);
/// Ceiling for any single backoff delay (5 hours).
pub const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60 * 60);

/// Preconditions that must hold before an attempt starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Constraints {
    pub requires_network: bool,
    pub requires_battery_not_low: bool,
}

impl Constraints {
    /// True when nothing needs probing.
    pub fn is_empty(&self) -> bool {
        !self.requires_network && !self.requires_battery_not_low
    }

    pub fn is_satisfied_by(&self, conditions: &dyn DeviceConditions) -> bool {
        (!self.requires_network || conditions.network_available())
            && (!self.requires_battery_not_low || !conditions.battery_low())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    /// `initial * attempts`
    Linear,
    /// `initial * 2^(attempts - 1)`
    Exponential,
}

/// How long to wait before re-running an attempt that asked for a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub kind: BackoffKind,
    pub initial: Duration,
    pub max_delay: Duration,
    /// Total attempts allowed per run, `None` for unlimited.
    pub max_attempts: Option<u32>,
}

impl BackoffPolicy {
    pub fn linear(initial: Duration) -> Self {
        Self {
            kind: BackoffKind::Linear,
            initial,
            max_delay: MAX_BACKOFF,
            max_attempts: None,
        }
    }

    pub fn exponential(initial: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            ..Self::linear(initial)
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay after the `attempts`-th attempt (1-based) returned retry.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let attempts = attempts.max(1);
        let delay = match self.kind {
            BackoffKind::Linear => self.initial.saturating_mul(attempts),
            BackoffKind::Exponential => {
                let factor = 2u32.checked_pow(attempts - 1).unwrap_or(u32::MAX);
                self.initial.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }

    /// Whether attempt number `attempt` (1-based) may start.
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(MIN_BACKOFF)
    }
}

/// What to do when unique work with the same name is already scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingWorkPolicy {
    /// Leave the existing schedule untouched; the new request is dropped.
    Keep,
    /// Cancel the existing work and schedule the new request.
    Replace,
}

/// What an expedited request does when the expedited quota is used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfQuotaPolicy {
    /// Run at standard priority instead.
    RunAsNonExpedited,
    /// Drop the request; it ends CANCELLED without running.
    DropWorkRequest,
}

/// Work that repeats every `interval` until cancelled.
#[derive(Debug, Clone)]
pub struct PeriodicWorkRequest {
    pub interval: Duration,
    pub constraints: Constraints,
    pub backoff: BackoffPolicy,
}

impl PeriodicWorkRequest {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            constraints: Constraints::default(),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Work that runs until it succeeds, fails, or runs out of attempts.
#[derive(Debug, Clone, Default)]
pub struct OneTimeWorkRequest {
    pub constraints: Constraints,
    pub backoff: BackoffPolicy,
    pub expedited: Option<OutOfQuotaPolicy>,
}

impl OneTimeWorkRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Ask for elevated priority, falling back per `policy` when the quota is gone.
    pub fn expedited(mut self, policy: OutOfQuotaPolicy) -> Self {
        self.expedited = Some(policy);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_linear_backoff_grows_by_initial() {
        let policy = BackoffPolicy::linear(MIN_BACKOFF);
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(5), Duration::from_secs(50));
    }

    #[test]
    fn test_exponential_backoff_doubles() {
        let policy = BackoffPolicy::exponential(MIN_BACKOFF);
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(4), Duration::from_secs(80));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = BackoffPolicy::exponential(MIN_BACKOFF);
        assert_eq!(policy.delay_for(64), MAX_BACKOFF);

        let policy = BackoffPolicy::linear(MIN_BACKOFF).with_max_delay(Duration::from_secs(25));
        assert_eq!(policy.delay_for(3), Duration::from_secs(25));
    }

    #[test]
    fn test_attempt_limit() {
        let unlimited = BackoffPolicy::linear(MIN_BACKOFF);
        assert!(unlimited.allows_attempt(1_000));

        let limited = unlimited.with_max_attempts(Some(3));
        assert!(limited.allows_attempt(3));
        assert!(!limited.allows_attempt(4));
    }

    proptest! {
        #[test]
        fn prop_backoff_never_exceeds_ceiling(attempts in 0u32..10_000, initial_ms in 1u64..120_000) {
            for policy in [
                BackoffPolicy::linear(Duration::from_millis(initial_ms)),
                BackoffPolicy::exponential(Duration::from_millis(initial_ms)),
            ] {
                prop_assert!(policy.delay_for(attempts) <= MAX_BACKOFF);
            }
        }

        #[test]
        fn prop_linear_backoff_is_monotonic(attempts in 1u32..10_000) {
            let policy = BackoffPolicy::linear(MIN_BACKOFF);
            prop_assert!(policy.delay_for(attempts) <= policy.delay_for(attempts + 1));
        }
    }
}
