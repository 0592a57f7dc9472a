//! Game simulation modules

pub mod combat;
pub mod drops;
pub mod geometry;
pub mod physics;
pub mod results;
pub mod room;
pub mod snapshot;
pub mod store;

pub use room::{GameRoom, PlayerState, RoomHandle, RoomRegistry};

use uuid::Uuid;

/// Jump requested this command
pub const ACTION_JUMP: u8 = 1 << 0;
/// Fire requested this command
pub const ACTION_FIRE: u8 = 1 << 1;

/// Fire geometry attached to a command carrying the fire bit
#[derive(Debug, Clone, Copy)]
pub struct FireInput {
    pub origin_x: f32,
    pub origin_y: f32,
    pub dir_x: f32,
    pub dir_y: f32,
    pub range: f32,
}

/// One client input event, normalized by the session layer.
/// Consumed exactly once by the room loop, never mutated after creation.
#[derive(Debug, Clone)]
pub struct PlayerCommand {
    pub player_id: Uuid,
    /// Monotonically increasing per player; 0 = untracked
    pub sequence: u32,
    /// Horizontal movement input in [-1, 1]
    pub move_input: f32,
    /// Bitmask of ACTION_JUMP / ACTION_FIRE
    pub action_bits: u8,
    /// Present iff ACTION_FIRE is set
    pub fire: Option<FireInput>,
    /// Client clock when the event happened (0 = unknown)
    pub client_timestamp: u64,
    /// The session's clock-aligned server-time estimate for the event
    pub server_timestamp: u64,
}

impl PlayerCommand {
    pub fn wants_jump(&self) -> bool {
        self.action_bits & ACTION_JUMP != 0
    }

    pub fn wants_fire(&self) -> bool {
        self.action_bits & ACTION_FIRE != 0
    }
}

/// Inbound frame routed to a room's command queue
#[derive(Debug, Clone)]
pub enum RoomInput {
    Join { player_id: Uuid },
    Command(PlayerCommand),
    Leave { player_id: Uuid },
}
