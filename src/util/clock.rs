//! Client clock alignment
//!
//! Clients report timestamps from their own clock. Fire commands are
//! validated against historical server state, so each connection keeps an
//! estimate of the offset between the client clock and the server clock.

/// Smoothing factor for the offset estimate. New samples move the estimate
/// by 20%, so a single delayed packet cannot yank the mapping around.
const OFFSET_ALPHA: f64 = 0.2;

/// Per-connection estimator mapping client timestamps onto the server
/// timeline. One instance per connection, owned by the session context.
#[derive(Debug, Clone, Default)]
pub struct ClockSync {
    /// Smoothed estimate of `server_ts - client_ts`, None until sampled.
    offset_ms: Option<f64>,
    /// Highest server-time estimate handed out so far.
    last_estimate: u64,
}

impl ClockSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an offset sample from a state update. Timestamps of zero are
    /// ignored: clients without a clock send 0.
    pub fn update(&mut self, client_ts: u64, server_ts: u64) {
        if client_ts == 0 {
            return;
        }
        let sample = server_ts as f64 - client_ts as f64;
        self.offset_ms = Some(match self.offset_ms {
            None => sample,
            Some(prev) => prev + (sample - prev) * OFFSET_ALPHA,
        });
    }

    /// Map a client timestamp to the estimated server timestamp.
    ///
    /// Falls back to passing the value through until the first sample has
    /// been recorded. Estimates never run backwards: increasing client
    /// timestamps yield non-decreasing server timestamps even while the
    /// offset estimate is still settling.
    pub fn to_server_time(&mut self, client_ts: u64) -> u64 {
        let estimate = match self.offset_ms {
            None => client_ts,
            Some(offset) => {
                let mapped = client_ts as f64 + offset;
                if mapped <= 0.0 {
                    0
                } else {
                    mapped.round() as u64
                }
            }
        };
        let estimate = estimate.max(self.last_estimate);
        self.last_estimate = estimate;
        estimate
    }

    /// Whether at least one sample has been recorded.
    pub fn is_synced(&self) -> bool {
        self.offset_ms.is_some()
    }
}
