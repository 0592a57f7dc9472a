//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// General budget for any inbound frame on one connection
pub const MESSAGE_RATE_LIMIT: u32 = 200;

/// Stricter budget for state-update frames
pub const STATE_UPDATE_RATE_LIMIT: u32 = 120;

/// Per-connection rate limiter state. Disallowed frames are dropped by the
/// caller without surfacing an error; the limiter protects the server, not
/// the protocol.
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    message_limiter: Arc<Limiter>,
    state_limiter: Arc<Limiter>,
}

impl ConnectionRateLimiter {
    pub fn new() -> Self {
        Self {
            message_limiter: create_limiter(MESSAGE_RATE_LIMIT),
            state_limiter: create_limiter(STATE_UPDATE_RATE_LIMIT),
        }
    }

    /// Check the general message budget (returns true if allowed)
    pub fn check_message(&self) -> bool {
        self.message_limiter.check().is_ok()
    }

    /// Check the state-update budget. Counts against the state budget only;
    /// callers run `check_message` first.
    pub fn check_state_update(&self) -> bool {
        self.state_limiter.check().is_ok()
    }
}

impl Default for ConnectionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
