//! Match conclusion reporting seam
//!
//! Persistence of results is owned by an external collaborator; the room
//! loop hands finished standings across this trait exactly once per match.

use tracing::info;
use uuid::Uuid;

/// Final tally for one player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerResult {
    pub user_id: Uuid,
    pub kills: u32,
    pub deaths: u32,
    /// 1-based placement, best first
    pub ranking: u32,
}

/// Receives the outcome of a concluded match
pub trait ResultsReporter: Send + Sync {
    fn on_game_concluded(&self, game_id: Uuid, results: Vec<PlayerResult>);
}

/// Default reporter: logs the outcome for the operator
pub struct TracingReporter;

impl ResultsReporter for TracingReporter {
    fn on_game_concluded(&self, game_id: Uuid, results: Vec<PlayerResult>) {
        for result in &results {
            info!(
                game_id = %game_id,
                user_id = %result.user_id,
                kills = result.kills,
                deaths = result.deaths,
                ranking = result.ranking,
                "Match result"
            );
        }
    }
}
