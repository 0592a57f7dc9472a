//! Session service - room lifecycle and connection routing
//!
//! Matchmaking itself lives in an external collaborator; its success
//! notification enters here. The service owns the room registry entry for
//! each match and hands every WebSocket connection one `ConnectionContext`.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::drops::SupplyDropStore;
use crate::game::results::ResultsReporter;
use crate::game::room::{GameRoom, RoomHandle, RoomRegistry};
use crate::game::RoomInput;
use crate::util::clock::ClockSync;
use crate::util::rate_limit::ConnectionRateLimiter;

/// Everything the server tracks for one live connection: identity, the room
/// handle, clock alignment and rate budgets. One owned record, created on
/// attach and destroyed on detach, instead of per-concern maps that can
/// drift out of sync.
pub struct ConnectionContext {
    pub user_id: Uuid,
    pub room: RoomHandle,
    pub clock: ClockSync,
    pub limiter: ConnectionRateLimiter,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("room not found")]
    RoomNotFound,

    #[error("room no longer accepts input")]
    RoomClosed,
}

/// Routes connections to rooms and owns room lifecycle
pub struct SessionService {
    config: Arc<GameConfig>,
    registry: Arc<RoomRegistry>,
    drops: Arc<SupplyDropStore>,
    reporter: Arc<dyn ResultsReporter>,
}

impl SessionService {
    pub fn new(
        config: Arc<GameConfig>,
        registry: Arc<RoomRegistry>,
        drops: Arc<SupplyDropStore>,
        reporter: Arc<dyn ResultsReporter>,
    ) -> Self {
        Self {
            config,
            registry,
            drops,
            reporter,
        }
    }

    /// Match-success notification from the matchmaking collaborator.
    ///
    /// The room and its players' initial state exist before this returns.
    /// Idempotent per game id: a duplicate notification returns false and
    /// never spawns a second loop.
    pub fn on_match_success(&self, game_id: Uuid, player_ids: &[Uuid]) -> bool {
        let (room, handle) = GameRoom::new(
            game_id,
            player_ids,
            self.config.clone(),
            self.drops.clone(),
            rand::random(),
        );

        if !self.registry.insert_if_absent(handle) {
            info!(game_id = %game_id, "Duplicate match notification ignored");
            return false;
        }

        info!(
            game_id = %game_id,
            player_count = player_ids.len(),
            "Room created"
        );

        // Owner task: run the loop, then tear the room down however the
        // loop ended
        let registry = self.registry.clone();
        let drops = self.drops.clone();
        let reporter = self.reporter.clone();
        tokio::spawn(async move {
            room.run(reporter).await;
            registry.remove(&game_id);
            drops.clear_room(game_id);
            info!(room_id = %game_id, "Room removed from registry");
        });

        true
    }

    /// Attach a connection to a room. Rejects unknown rooms; the join
    /// command creates the player's state if it does not already exist.
    pub async fn attach(
        &self,
        user_id: Uuid,
        room_id: Uuid,
    ) -> Result<ConnectionContext, SessionError> {
        let room = self
            .registry
            .get(&room_id)
            .ok_or(SessionError::RoomNotFound)?;

        room.input_tx
            .send(RoomInput::Join { player_id: user_id })
            .await
            .map_err(|_: mpsc::error::SendError<_>| SessionError::RoomClosed)?;

        Ok(ConnectionContext {
            user_id,
            room,
            clock: ClockSync::new(),
            limiter: ConnectionRateLimiter::new(),
        })
    }

    /// Detach a connection. The room sees a leave command; dropping the
    /// context releases the clock and limiter state.
    pub async fn detach(&self, context: &ConnectionContext) {
        if context
            .room
            .input_tx
            .send(RoomInput::Leave {
                player_id: context.user_id,
            })
            .await
            .is_err()
        {
            // Room already gone; registry cleanup happened in its owner task
            warn!(user_id = %context.user_id, "Detach from finished room");
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }
}
