//! World snapshot assembly

use std::collections::HashMap;
use uuid::Uuid;

use crate::ws::protocol::{GameEvent, PlayerSnapshot, ServerMsg};

use super::PlayerState;

/// Builds the per-tick snapshot broadcast to every connection in a room
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Assemble a snapshot message from the current authoritative state.
    /// The event list is this tick's accumulated events; the caller clears
    /// its buffer after handing it over.
    pub fn build(
        tick: u64,
        players: &HashMap<Uuid, PlayerState>,
        events: Vec<GameEvent>,
        countdown_seconds: Option<u64>,
        time_remaining_seconds: Option<u64>,
    ) -> ServerMsg {
        let mut player_snapshots: Vec<PlayerSnapshot> = players
            .values()
            .map(|p| PlayerSnapshot {
                user_id: p.user_id,
                x: p.x,
                y: p.y,
                vx: p.vx,
                vy: p.vy,
                health: p.health,
                ammo: p.ammo,
                kills: p.kills,
                deaths: p.deaths,
                facing_right: p.facing_right,
                action: p.action,
                last_input_seq: p.last_input_seq,
            })
            .collect();

        // Stable wire order regardless of map iteration
        player_snapshots.sort_by_key(|p| p.user_id);

        ServerMsg::Snapshot {
            tick,
            players: player_snapshots,
            events,
            countdown_seconds,
            time_remaining_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::ws::protocol::PlayerAction;

    #[test]
    fn snapshot_carries_players_and_events() {
        let config = GameConfig::default();
        let mut players = HashMap::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        players.insert(a, PlayerState::new(a, (100.0, 600.0), &config));
        players.insert(b, PlayerState::new(b, (200.0, 600.0), &config));

        let msg = SnapshotBuilder::build(42, &players, Vec::new(), None, Some(90));
        match msg {
            ServerMsg::Snapshot {
                tick,
                players,
                events,
                countdown_seconds,
                time_remaining_seconds,
            } => {
                assert_eq!(tick, 42);
                assert_eq!(players.len(), 2);
                assert!(players.windows(2).all(|w| w[0].user_id <= w[1].user_id));
                assert!(events.is_empty());
                assert_eq!(countdown_seconds, None);
                assert_eq!(time_remaining_seconds, Some(90));
                assert!(players.iter().all(|p| p.action == PlayerAction::Idle));
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }
}
