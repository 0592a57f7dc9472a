//! World-event scheduler: periodic supply drops
//!
//! Runs on its own coarse interval, independent of every room tick loop.
//! The scheduler only publishes spawn broadcasts and records drops in a
//! shared collection; collection and removal are resolved by the room loop's
//! pickup phase. Player state is never touched from here.

use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::room::RoomRegistry;
use crate::ws::protocol::{DropKind, ServerMsg};

/// An uncollected supply drop
#[derive(Debug, Clone, Copy)]
pub struct SupplyDrop {
    pub drop_id: Uuid,
    pub room_id: Uuid,
    pub kind: DropKind,
    pub x: f32,
    pub y: f32,
}

/// Active drops across all rooms, keyed by drop id
#[derive(Default)]
pub struct SupplyDropStore {
    drops: DashMap<Uuid, SupplyDrop>,
}

impl SupplyDropStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, drop: SupplyDrop) {
        self.drops.insert(drop.drop_id, drop);
    }

    /// Claim a drop. Returns None if it was already collected.
    pub fn take(&self, drop_id: Uuid) -> Option<SupplyDrop> {
        self.drops.remove(&drop_id).map(|(_, drop)| drop)
    }

    /// Drops currently active in one room
    pub fn in_room(&self, room_id: Uuid) -> Vec<SupplyDrop> {
        self.drops
            .iter()
            .filter(|entry| entry.value().room_id == room_id)
            .map(|entry| *entry.value())
            .collect()
    }

    /// Discard everything belonging to a torn-down room
    pub fn clear_room(&self, room_id: Uuid) {
        self.drops.retain(|_, drop| drop.room_id != room_id);
    }

    pub fn len(&self) -> usize {
        self.drops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drops.is_empty()
    }
}

/// Periodic task spawning supply drops into active rooms
pub struct SupplyDropScheduler {
    config: Arc<GameConfig>,
    registry: Arc<RoomRegistry>,
    drops: Arc<SupplyDropStore>,
}

impl SupplyDropScheduler {
    pub fn new(
        config: Arc<GameConfig>,
        registry: Arc<RoomRegistry>,
        drops: Arc<SupplyDropStore>,
    ) -> Self {
        Self {
            config,
            registry,
            drops,
        }
    }

    /// Run the scheduler until the process shuts down
    pub async fn run(self) {
        let mut ticker = interval(Duration::from_secs(self.config.drop_interval_secs));
        info!(
            period_secs = self.config.drop_interval_secs,
            "Supply drop scheduler started"
        );

        loop {
            ticker.tick().await;
            self.spawn_pass();
        }
    }

    /// One scheduler pass over all active rooms
    pub fn spawn_pass(&self) {
        let mut rng = rand::thread_rng();
        for room_id in self.registry.room_ids() {
            if !rng.gen_bool(self.config.drop_chance) {
                continue;
            }
            let Some(handle) = self.registry.get(&room_id) else {
                continue;
            };

            let (x, ground_y) = self.config.spawn_points[rng.gen_range(0..self.config.spawn_points.len())];
            let kind = if rng.gen_bool(0.5) {
                DropKind::Weapon
            } else {
                DropKind::Heal
            };
            let drop = SupplyDrop {
                drop_id: Uuid::new_v4(),
                room_id,
                kind,
                x,
                y: ground_y,
            };

            self.drops.insert(drop);
            debug!(room_id = %room_id, drop_id = %drop.drop_id, ?kind, "Supply drop spawned");

            let _ = handle.broadcast_tx.send(ServerMsg::SupplySpawn {
                drop_id: drop.drop_id,
                kind,
                x: drop.x,
                y: drop.y,
            });
        }
    }
}
