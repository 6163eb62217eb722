//! Core admission limiter.

use std::sync::Arc;
use tracing::{debug, info, trace};

use super::allowlist::AllowList;
use super::backend::AdmissionControl;
use super::evictor::Evictor;
use super::options::LimiterOptions;
use super::registry::Registry;
use crate::error::Result;

/// Per-identity admission controller.
///
/// Combines the allow-list, the bucket registry and the idle evictor. The
/// limiter is thread-safe; share it behind an `Arc`.
///
/// The empty identity is an ordinary key: every caller presenting no
/// identity draws from one shared bucket.
#[derive(Debug)]
pub struct Limiter {
    registry: Arc<Registry>,
    allow_list: AllowList,
    options: LimiterOptions,
    evictor: Evictor,
}

impl Limiter {
    /// Create a limiter and start its evictor.
    ///
    /// The evictor runs on the current Tokio runtime when there is one, and
    /// on a dedicated thread otherwise.
    pub fn new(options: LimiterOptions) -> Self {
        let quota = options.quota();
        let registry = Arc::new(Registry::new(quota));
        let evictor = Evictor::spawn(
            Arc::clone(&registry),
            options.sweep_interval(),
            options.ttl(),
        );

        info!(
            capacity = quota.capacity(),
            refill_rate = quota.refill_rate(),
            unlimited = quota.is_unlimited(),
            allow_list_empty = options.allow_list().is_empty(),
            "Limiter initialized"
        );

        Self {
            registry,
            allow_list: options.allow_list(),
            options,
            evictor,
        }
    }

    /// Decide whether a request from `identity` may proceed.
    ///
    /// Allow-listed identities are admitted without touching the registry.
    pub fn admit(&self, identity: &str) -> bool {
        if self.allow_list.permits(identity) {
            trace!(identity = %identity, "Identity is allow-listed");
            return true;
        }

        let admitted = self.registry.get_or_create(identity).try_admit();

        trace!(identity = %identity, admitted = admitted, "Checked admission");
        if !admitted {
            debug!(identity = %identity, "Rate limit exceeded");
        }

        admitted
    }

    /// Stop the evictor. Tracked identities are kept.
    ///
    /// Returns [`FloodgateError::AlreadyStopped`](crate::error::FloodgateError::AlreadyStopped)
    /// if called more than once.
    pub fn stop(&self) -> Result<()> {
        self.evictor.stop()?;
        info!("Limiter stopped");
        Ok(())
    }

    /// Stop the evictor and wait for its task to exit.
    pub async fn shutdown(&self) -> Result<()> {
        let stopped = self.stop();
        self.evictor.join().await;
        stopped
    }

    /// Whether the evictor has not been stopped yet.
    pub fn is_running(&self) -> bool {
        self.evictor.is_running()
    }

    /// Forget an identity so its next request starts with a full bucket.
    pub fn forget(&self, identity: &str) -> bool {
        self.registry.remove(identity)
    }

    /// Whether `identity` currently has a bucket.
    pub fn is_tracked(&self, identity: &str) -> bool {
        self.registry.contains(identity)
    }

    /// Get the number of identities holding a bucket.
    pub fn tracked_identities(&self) -> usize {
        self.registry.len()
    }

    pub fn options(&self) -> &LimiterOptions {
        &self.options
    }
}

impl AdmissionControl for Limiter {
    fn admit(&self, identity: &str) -> bool {
        Limiter::admit(self, identity)
    }

    fn identity_header(&self) -> &str {
        self.options.header()
    }
}
