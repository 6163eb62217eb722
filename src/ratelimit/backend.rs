//! Admission decision trait consumed by request-handling adapters.

/// Trait for admission controllers.
///
/// This trait abstracts the [`Limiter`](super::Limiter) away from the HTTP
/// adapter so the gate and gateway can be driven by any implementation.
pub trait AdmissionControl: Send + Sync {
    /// Decide whether a request from `identity` may proceed.
    fn admit(&self, identity: &str) -> bool;

    /// Name of the request header carrying the client identity.
    fn identity_header(&self) -> &str;
}
