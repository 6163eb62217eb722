//! Per-identity rate limiting: token buckets, their registry, idle expiry and
//! the limiter that ties them together.

mod allowlist;
mod backend;
mod bucket;
mod evictor;
mod limiter;
mod options;
mod registry;

pub use allowlist::AllowList;
pub use backend::AdmissionControl;
pub use bucket::{Quota, TokenBucket};
pub use evictor::Evictor;
pub use limiter::Limiter;
pub use options::{
    LimiterOptions, DEFAULT_BURST, DEFAULT_CLEANUP_FREQUENCY, DEFAULT_IDENTITY_HEADER,
    DEFAULT_PERIOD, DEFAULT_RECORD_TTL, DEFAULT_RPS,
};
pub use registry::{BucketHandle, Registry};
