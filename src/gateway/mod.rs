//! HTTP adapter: identity extraction, the admit-or-429 gate and a gateway
//! server built on hyper.

mod identity;
mod middleware;
mod server;

pub use identity::extract_identity;
pub use middleware::{check, too_many_requests, TOO_MANY_REQUESTS_MSG};
pub use server::{handle, Gateway};
