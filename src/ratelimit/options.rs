//! Construction parameters for a [`Limiter`](super::Limiter).

use std::time::Duration;
use tracing::warn;

use super::allowlist::AllowList;
use super::bucket::Quota;

/// Default requests replenished per period.
pub const DEFAULT_RPS: u32 = 10;
/// Default bucket capacity.
pub const DEFAULT_BURST: u32 = 20;
/// Default idle time before an identity is forgotten.
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(5 * 60);
/// Default interval between eviction sweeps.
pub const DEFAULT_CLEANUP_FREQUENCY: Duration = Duration::from_secs(5 * 60);
/// Default replenishment period.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);
/// Header the HTTP adapter reads the client identity from.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-original-forwarded-for";

/// Limiter parameters, built up by chaining setters on the defaults.
///
/// Setters apply in call order, so `rps(5).burst(1)` yields a burst of 1
/// while `burst(1).rps(5)` yields a burst of 5.
///
/// ```
/// use std::time::Duration;
/// use floodgate::ratelimit::LimiterOptions;
///
/// let options = LimiterOptions::default()
///     .period(1, Duration::from_secs(5))
///     .burst(1)
///     .allowed_prefixes(["10."]);
/// assert!((options.refill_rate() - 0.2).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct LimiterOptions {
    requests: u32,
    burst: u32,
    period: Duration,
    custom_period: bool,
    unlimited: bool,
    record_ttl: Duration,
    cleanup_frequency: Duration,
    identity_header: String,
    allowed_identities: Vec<String>,
    allowed_prefixes: Vec<String>,
}

impl Default for LimiterOptions {
    fn default() -> Self {
        Self {
            requests: DEFAULT_RPS,
            burst: DEFAULT_BURST,
            period: DEFAULT_PERIOD,
            custom_period: false,
            unlimited: false,
            record_ttl: DEFAULT_RECORD_TTL,
            cleanup_frequency: DEFAULT_CLEANUP_FREQUENCY,
            identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
            allowed_identities: Vec::new(),
            allowed_prefixes: Vec::new(),
        }
    }
}

impl LimiterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the requests per second and the burst capacity.
    ///
    /// A zero burst rejects everything unless the limiter is unlimited.
    pub fn rps_with_burst(mut self, rps: u32, burst: u32) -> Self {
        self.requests = rps;
        self.burst = burst;
        self
    }

    /// Set the requests per second with no extra burst.
    pub fn rps(mut self, rps: u32) -> Self {
        self.requests = rps;
        self.burst = rps;
        self
    }

    /// Override the burst capacity, leaving the rate alone.
    pub fn burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    /// Replenish `requests` tokens every `period`, for rates below one per
    /// second such as one request per five seconds. Usually paired with a
    /// burst of 1.
    ///
    /// A zero period with a non-zero `requests` refills instantly, which is
    /// the same as [`LimiterOptions::unlimited`].
    pub fn period(mut self, requests: u32, period: Duration) -> Self {
        self.requests = requests;
        self.period = period;
        self.custom_period = true;
        self
    }

    /// Admit everything; buckets are still tracked and expired.
    pub fn unlimited(mut self) -> Self {
        self.unlimited = true;
        self
    }

    /// How often the evictor sweeps. Zero falls back to the default.
    pub fn cleanup_frequency(mut self, frequency: Duration) -> Self {
        self.cleanup_frequency = if frequency.is_zero() {
            warn!("Zero cleanup frequency, using default");
            DEFAULT_CLEANUP_FREQUENCY
        } else {
            frequency
        };
        self
    }

    /// How long an identity may stay idle before it is forgotten.
    pub fn record_ttl(mut self, ttl: Duration) -> Self {
        self.record_ttl = ttl;
        self
    }

    /// Identities that are never rate limited. Appends to earlier calls.
    pub fn allowed_identities<I>(mut self, identities: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.allowed_identities
            .extend(identities.into_iter().map(Into::into));
        self
    }

    /// Identity prefixes that are never rate limited. Appends to earlier calls.
    pub fn allowed_prefixes<I>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.allowed_prefixes
            .extend(prefixes.into_iter().map(Into::into));
        self
    }

    /// Header the HTTP adapter takes the client identity from.
    pub fn identity_header(mut self, header: impl Into<String>) -> Self {
        self.identity_header = header.into();
        self
    }

    /// The bucket parameters these options describe.
    pub fn quota(&self) -> Quota {
        if self.unlimited {
            return Quota::unlimited();
        }
        Quota::per_period(self.burst, self.requests, self.period)
    }

    pub fn allow_list(&self) -> AllowList {
        AllowList::new(
            self.allowed_identities.iter().cloned(),
            self.allowed_prefixes.iter().cloned(),
        )
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        self.quota().refill_rate()
    }

    pub fn requests(&self) -> u32 {
        self.requests
    }

    pub fn burst_size(&self) -> u32 {
        self.burst
    }

    pub fn period_length(&self) -> Duration {
        self.period
    }

    pub fn has_custom_period(&self) -> bool {
        self.custom_period
    }

    pub fn ttl(&self) -> Duration {
        self.record_ttl
    }

    pub fn sweep_interval(&self) -> Duration {
        self.cleanup_frequency
    }

    pub fn header(&self) -> &str {
        &self.identity_header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = LimiterOptions::default();
        assert_eq!(options.requests(), 10);
        assert_eq!(options.burst_size(), 20);
        assert_eq!(options.ttl(), Duration::from_secs(300));
        assert_eq!(options.sweep_interval(), Duration::from_secs(300));
        assert_eq!(options.period_length(), Duration::from_secs(1));
        assert_eq!(options.header(), "x-original-forwarded-for");
        assert!(!options.has_custom_period());
        assert!((options.refill_rate() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_rps_disables_extra_burst() {
        let options = LimiterOptions::default().rps(7);
        assert_eq!(options.requests(), 7);
        assert_eq!(options.burst_size(), 7);
    }

    #[test]
    fn test_setters_apply_in_order() {
        assert_eq!(LimiterOptions::default().rps(5).burst(1).burst_size(), 1);
        assert_eq!(LimiterOptions::default().burst(1).rps(5).burst_size(), 5);
    }

    #[test]
    fn test_rps_with_burst() {
        let options = LimiterOptions::default().rps_with_burst(3, 9);
        assert_eq!(options.quota(), Quota::new(9, 3.0));
    }

    #[test]
    fn test_period_derives_fractional_rate() {
        let options = LimiterOptions::default().period(1, Duration::from_secs(5)).burst(1);
        assert!(options.has_custom_period());
        assert_eq!(options.quota().capacity(), 1);
        assert!((options.refill_rate() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_period_with_zero_requests_never_refills() {
        let options = LimiterOptions::default().period(0, Duration::from_secs(5));
        assert_eq!(options.refill_rate(), 0.0);
    }

    #[test]
    fn test_zero_cleanup_frequency_falls_back() {
        let options = LimiterOptions::default().cleanup_frequency(Duration::ZERO);
        assert_eq!(options.sweep_interval(), DEFAULT_CLEANUP_FREQUENCY);
    }

    #[test]
    fn test_zero_period_is_unlimited() {
        let options = LimiterOptions::default().period(2, Duration::ZERO).burst(1);
        assert_eq!(options.period_length(), Duration::ZERO);
        assert!(options.quota().is_unlimited());

        // No requests per period still means no refill
        let options = LimiterOptions::default().period(0, Duration::ZERO);
        assert_eq!(options.refill_rate(), 0.0);
        assert!(!options.quota().is_unlimited());
    }

    #[test]
    fn test_allow_lists_append() {
        let options = LimiterOptions::default()
            .allowed_identities(["1.1.1.1"])
            .allowed_identities(["2.2.2.2"])
            .allowed_prefixes(["10."]);

        let allow = options.allow_list();
        assert!(allow.permits("1.1.1.1"));
        assert!(allow.permits("2.2.2.2"));
        assert!(allow.permits("10.1.2.3"));
        assert!(!allow.permits("3.3.3.3"));
    }

    #[test]
    fn test_unlimited_quota() {
        assert!(LimiterOptions::default().unlimited().quota().is_unlimited());
    }
}
