//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Animation/combat state of a player, mirrored to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerAction {
    Idle,
    Run,
    Jump,
    Fall,
    Shoot,
    Hit,
    Dead,
}

impl Default for PlayerAction {
    fn default() -> Self {
        Self::Idle
    }
}

/// Supply drop variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropKind {
    /// Weapon crate: refills reserve ammo
    Weapon,
    /// Heal pack: restores health up to the cap
    Heal,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Announce presence in the room the connection is attached to
    Join,

    /// Per-frame input plus the client's own view of its kinematics.
    ///
    /// The kinematic fields are advisory: the server never adopts them as
    /// authoritative position, they only feed clock alignment.
    StateUpdate {
        /// Monotonically increasing input sequence (0 = untracked)
        sequence: u32,
        /// Horizontal movement input (-1.0 = left, 1.0 = right)
        move_input: f32,
        /// Jump requested this frame
        jump: bool,
        /// Client-predicted position and velocity
        x: f32,
        y: f32,
        vx: f32,
        vy: f32,
        facing_right: bool,
        on_ground: bool,
        /// Client clock, milliseconds (0 = unknown)
        client_timestamp: u64,
    },

    /// Hitscan shot as observed by the client
    Fire {
        origin_x: f32,
        origin_y: f32,
        dir_x: f32,
        dir_y: f32,
        /// Maximum travel distance of the shot
        range: f32,
        client_timestamp: u64,
    },

    /// Leave the room
    Leave,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        user_id: Uuid,
        server_time: u64,
    },

    /// A player joined the room
    PlayerJoined {
        user_id: Uuid,
        x: f32,
        y: f32,
    },

    /// A player left the room
    PlayerLeft {
        user_id: Uuid,
    },

    /// Authoritative world state, sent every tick
    Snapshot {
        /// Server tick number
        tick: u64,
        /// All player states
        players: Vec<PlayerSnapshot>,
        /// Events that occurred this tick
        events: Vec<GameEvent>,
        /// Present while the pre-match countdown runs
        #[serde(skip_serializing_if = "Option::is_none")]
        countdown_seconds: Option<u64>,
        /// Present once the match clock is running
        #[serde(skip_serializing_if = "Option::is_none")]
        time_remaining_seconds: Option<u64>,
    },

    /// A dead player came back at a spawn point
    Respawn {
        user_id: Uuid,
        x: f32,
        y: f32,
        health: f32,
        server_time: u64,
    },

    /// A supply drop appeared
    SupplySpawn {
        drop_id: Uuid,
        kind: DropKind,
        x: f32,
        y: f32,
    },

    /// Match is over
    MatchEnd {
        winner_user_id: Option<Uuid>,
        results: Vec<PlayerStanding>,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },
}

/// Player state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub user_id: Uuid,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub health: f32,
    pub ammo: u32,
    pub kills: u32,
    pub deaths: u32,
    pub facing_right: bool,
    pub action: PlayerAction,
    /// Last processed input sequence, for client-side reconciliation
    pub last_input_seq: u32,
}

/// Game events (hits, kills, pickups)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    /// A validated shot connected
    PlayerHit {
        shooter_id: Uuid,
        victim_id: Uuid,
        damage: f32,
        x: f32,
        y: f32,
    },

    /// A player died
    PlayerDied {
        victim_id: Uuid,
        /// None for environment deaths (death line)
        killer_id: Option<Uuid>,
    },

    /// A player collected a supply drop
    SupplyPickup {
        user_id: Uuid,
        drop_id: Uuid,
        kind: DropKind,
    },
}

/// Final per-player standing reported at match end
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStanding {
    pub user_id: Uuid,
    pub kills: u32,
    pub deaths: u32,
    pub ranking: u32,
}
