use std::time::Duration;

/// Fixed-interval reconnect schedule with a bounded number of attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts allowed before giving up
    pub max_attempts: u32,
    /// Delay before each attempt
    pub interval: Duration,
}

/// What to do after a connection loss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait `delay`, then make attempt number `attempt` (1-based)
    Retry { attempt: u32, delay: Duration },
    /// Attempts exhausted
    GiveUp,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Decide the next step given how many attempts have already been made
    pub fn decide(&self, attempts_made: u32) -> ReconnectDecision {
        if attempts_made < self.max_attempts {
            ReconnectDecision::Retry {
                attempt: attempts_made + 1,
                delay: self.interval,
            }
        } else {
            ReconnectDecision::GiveUp
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_secs(3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.interval, Duration::from_secs(3));
    }

    #[test]
    fn test_retries_until_limit() {
        let policy = ReconnectPolicy::new(3, Duration::from_millis(250));

        for made in 0..3 {
            assert_eq!(
                policy.decide(made),
                ReconnectDecision::Retry {
                    attempt: made + 1,
                    delay: Duration::from_millis(250),
                }
            );
        }

        assert_eq!(policy.decide(3), ReconnectDecision::GiveUp);
        assert_eq!(policy.decide(10), ReconnectDecision::GiveUp);
    }

    #[test]
    fn test_zero_attempts_never_retries() {
        let policy = ReconnectPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.decide(0), ReconnectDecision::GiveUp);
    }
}
