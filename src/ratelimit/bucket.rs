//! Token bucket implementation.

use std::time::Duration;
use tokio::time::Instant;

/// Capacity and refill rate shared by every bucket a registry creates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quota {
    /// Maximum number of tokens a bucket can hold
    capacity: u32,
    /// Tokens added per second
    refill_rate: f64,
}

impl Quota {
    /// Create a quota from a burst capacity and a per-second refill rate.
    ///
    /// Negative or NaN rates are treated as zero (no replenishment).
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let refill_rate = if refill_rate.is_nan() || refill_rate < 0.0 {
            0.0
        } else {
            refill_rate
        };
        Self {
            capacity,
            refill_rate,
        }
    }

    /// Create a quota that replenishes `requests` tokens every `period`.
    ///
    /// A zero period yields an unlimited quota, a zero request count yields
    /// a quota that never refills.
    pub fn per_period(capacity: u32, requests: u32, period: Duration) -> Self {
        if requests == 0 {
            return Self::new(capacity, 0.0);
        }
        if period.is_zero() {
            return Self::unlimited();
        }
        Self::new(capacity, f64::from(requests) / period.as_secs_f64())
    }

    /// A quota that admits everything regardless of capacity.
    pub fn unlimited() -> Self {
        Self {
            capacity: 0,
            refill_rate: f64::INFINITY,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    pub fn is_unlimited(&self) -> bool {
        self.refill_rate.is_infinite()
    }
}

/// Token bucket for a single identity.
///
/// Not synchronized; the registry serializes access to each bucket.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    quota: Quota,
    /// Currently available tokens, always within `0..=capacity`
    tokens: f64,
    /// When `tokens` was last recomputed
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(quota: Quota) -> Self {
        Self::new_at(quota, Instant::now())
    }

    /// Create a full bucket as of `now`.
    pub fn new_at(quota: Quota, now: Instant) -> Self {
        Self {
            quota,
            tokens: f64::from(quota.capacity),
            last_refill: now,
        }
    }

    /// Refill, then take one token if available.
    ///
    /// Returns `true` if the request is admitted. A rejection leaves the
    /// fractional balance untouched.
    pub fn try_admit(&mut self) -> bool {
        self.try_admit_at(Instant::now())
    }

    /// Same as [`TokenBucket::try_admit`] with an explicit clock reading.
    pub fn try_admit_at(&mut self, now: Instant) -> bool {
        if self.quota.is_unlimited() {
            self.last_refill = self.last_refill.max(now);
            return true;
        }

        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Get the tokens available as of the last recomputation.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn quota(&self) -> Quota {
        self.quota
    }

    fn refill(&mut self, now: Instant) {
        // A reading older than the last refill counts as zero elapsed time.
        let elapsed = now.saturating_duration_since(self.last_refill);
        let capacity = f64::from(self.quota.capacity);

        if self.quota.refill_rate > 0.0 {
            self.tokens = (self.tokens + elapsed.as_secs_f64() * self.quota.refill_rate).min(capacity);
        }
        self.last_refill = self.last_refill.max(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_starts_full() {
        let bucket = TokenBucket::new(Quota::new(5, 1.0));
        assert_eq!(bucket.tokens(), 5.0);
    }

    #[test]
    fn test_no_refill_admits_exactly_capacity() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new_at(Quota::new(3, 0.0), now);

        for _ in 0..3 {
            assert!(bucket.try_admit_at(now));
        }

        // Even much later, nothing comes back
        let later = now + Duration::from_secs(3600);
        assert!(!bucket.try_admit_at(later));
        assert!(!bucket.try_admit_at(later));
    }

    #[test]
    fn test_refill_after_one_interval() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new_at(Quota::new(1, 2.0), now);

        assert!(bucket.try_admit_at(now));
        assert!(!bucket.try_admit_at(now));

        // 1/R seconds later one whole token is back
        assert!(bucket.try_admit_at(now + Duration::from_millis(500)));
    }

    #[test]
    fn test_rejection_keeps_fractional_tokens() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new_at(Quota::new(1, 1.0), now);
        assert!(bucket.try_admit_at(now));

        let half = now + Duration::from_millis(500);
        assert!(!bucket.try_admit_at(half));
        assert!((bucket.tokens() - 0.5).abs() < 1e-9);

        // The remaining half second completes the token
        assert!(bucket.try_admit_at(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_tokens_capped_at_capacity() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new_at(Quota::new(2, 100.0), now);

        assert!(bucket.try_admit_at(now + Duration::from_secs(60)));
        assert!((bucket.tokens() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_clock_going_backwards_adds_nothing() {
        let now = Instant::now() + Duration::from_secs(10);
        let mut bucket = TokenBucket::new_at(Quota::new(1, 1.0), now);
        assert!(bucket.try_admit_at(now));

        let earlier = now - Duration::from_secs(5);
        assert!(!bucket.try_admit_at(earlier));
        assert_eq!(bucket.tokens(), 0.0);

        // Refill math still measures from the newer reading
        assert!(!bucket.try_admit_at(now + Duration::from_millis(900)));
        assert!(bucket.try_admit_at(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_zero_capacity_rejects() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new_at(Quota::new(0, 10.0), now);
        assert!(!bucket.try_admit_at(now));
        assert!(!bucket.try_admit_at(now + Duration::from_secs(5)));
    }

    #[test]
    fn test_unlimited_always_admits() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new_at(Quota::unlimited(), now);
        for _ in 0..1000 {
            assert!(bucket.try_admit_at(now));
        }
    }

    #[test]
    fn test_quota_per_period() {
        let quota = Quota::per_period(1, 1, Duration::from_secs(5));
        assert!((quota.refill_rate() - 0.2).abs() < 1e-9);
        assert_eq!(quota.capacity(), 1);

        let quota = Quota::per_period(4, 0, Duration::from_secs(5));
        assert_eq!(quota.refill_rate(), 0.0);

        assert!(Quota::per_period(1, 3, Duration::ZERO).is_unlimited());
    }

    #[test]
    fn test_quota_sanitizes_rate() {
        assert_eq!(Quota::new(1, -4.0).refill_rate(), 0.0);
        assert_eq!(Quota::new(1, f64::NAN).refill_rate(), 0.0);
    }
}
