//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origin for CORS
    pub client_origin: String,
    /// Gameplay tuning
    pub game: GameConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            game: GameConfig::from_env()?,
        })
    }
}

/// Gameplay tuning surface consumed by the simulation core.
///
/// Defaults match the shipped arena ruleset; every value can be overridden
/// through a `GAME_*` environment variable for tuning without a rebuild.
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// Simulation tick period in milliseconds (50 = 20 Hz)
    pub tick_period_ms: u64,
    /// Maximum player health
    pub max_health: f32,
    /// Delay between death and respawn, milliseconds
    pub respawn_delay_ms: u64,
    /// Downward acceleration, px/s^2 (y grows downward)
    pub gravity: f32,
    /// Upward velocity granted by a jump, px/s (negative = up)
    pub jump_velocity: f32,
    /// Horizontal distance applied per movement command, px
    pub move_step: f32,
    /// Horizontal drag factor applied each tick
    pub friction: f32,
    /// Y coordinate of the ground line
    pub ground_y: f32,
    /// Ground platform extent; outside this span players fall
    pub ground_min_x: f32,
    pub ground_max_x: f32,
    /// Y coordinate past which a falling player dies
    pub death_y: f32,
    /// Damage per validated hitscan hit
    pub weapon_damage: f32,
    /// Longest accepted fire ray, px
    pub max_fire_range: f32,
    /// Player hitbox half extents, px
    pub hitbox_half_width: f32,
    pub hitbox_half_height: f32,
    /// Horizontal velocity applied to a hit victim, px/s
    pub knockback_velocity: f32,
    /// Starting and maximum reserve ammo
    pub initial_ammo: u32,
    /// Ammo granted by a weapon crate
    pub drop_ammo_bonus: u32,
    /// Health restored by a heal pack (capped at max health)
    pub drop_heal_amount: f32,
    /// Maximum players per room
    pub room_size: usize,
    /// Kills required to win
    pub kill_threshold: u32,
    /// Maximum match duration in seconds
    pub max_match_secs: u64,
    /// Pre-match countdown in seconds
    pub countdown_secs: u64,
    /// Snapshot history retention window, milliseconds
    pub history_window_ms: u64,
    /// Snapshot history length cap per player
    pub history_max_len: usize,
    /// Supply drop scheduler period in seconds
    pub drop_interval_secs: u64,
    /// Per-room chance of a drop each scheduler pass
    pub drop_chance: f64,
    /// Distance within which a player collects a drop, px
    pub pickup_radius: f32,
    /// Spawn points used for joins, respawns and drops
    pub spawn_points: Vec<(f32, f32)>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 50,
            max_health: 100.0,
            respawn_delay_ms: 3000,
            gravity: 2400.0,
            jump_velocity: -900.0,
            move_step: 13.0,
            friction: 0.85,
            ground_y: 620.0,
            ground_min_x: 0.0,
            ground_max_x: 1280.0,
            death_y: 1000.0,
            weapon_damage: 25.0,
            max_fire_range: 900.0,
            hitbox_half_width: 24.0,
            hitbox_half_height: 32.0,
            knockback_velocity: 420.0,
            initial_ammo: 30,
            drop_ammo_bonus: 15,
            drop_heal_amount: 50.0,
            room_size: 8,
            kill_threshold: 10,
            max_match_secs: 180,
            countdown_secs: 3,
            history_window_ms: 2000,
            history_max_len: 64,
            drop_interval_secs: 20,
            drop_chance: 0.6,
            pickup_radius: 48.0,
            spawn_points: vec![
                (160.0, 560.0),
                (480.0, 560.0),
                (800.0, 560.0),
                (1120.0, 560.0),
            ],
        }
    }
}

impl GameConfig {
    /// Build from defaults with `GAME_*` overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        override_var("GAME_TICK_PERIOD_MS", &mut cfg.tick_period_ms)?;
        override_var("GAME_MAX_HEALTH", &mut cfg.max_health)?;
        override_var("GAME_RESPAWN_DELAY_MS", &mut cfg.respawn_delay_ms)?;
        override_var("GAME_GRAVITY", &mut cfg.gravity)?;
        override_var("GAME_JUMP_VELOCITY", &mut cfg.jump_velocity)?;
        override_var("GAME_MOVE_STEP", &mut cfg.move_step)?;
        override_var("GAME_WEAPON_DAMAGE", &mut cfg.weapon_damage)?;
        override_var("GAME_ROOM_SIZE", &mut cfg.room_size)?;
        override_var("GAME_KILL_THRESHOLD", &mut cfg.kill_threshold)?;
        override_var("GAME_MAX_MATCH_SECS", &mut cfg.max_match_secs)?;
        override_var("GAME_COUNTDOWN_SECS", &mut cfg.countdown_secs)?;
        if cfg.tick_period_ms == 0 {
            return Err(ConfigError::Invalid("GAME_TICK_PERIOD_MS"));
        }
        Ok(cfg)
    }

    /// Tick delta in seconds, derived from the tick period
    pub fn tick_delta(&self) -> f32 {
        self.tick_period_ms as f32 / 1000.0
    }
}

fn override_var<T: FromStr>(name: &'static str, slot: &mut T) -> Result<(), ConfigError> {
    match env::var(name) {
        Ok(raw) => {
            *slot = raw.parse().map_err(|_| ConfigError::Invalid(name))?;
            Ok(())
        }
        Err(_) => Ok(()),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let cfg = GameConfig::default();
        assert!(cfg.death_y > cfg.ground_y, "death line must lie below ground");
        assert!(cfg.jump_velocity < 0.0, "jumps move up (negative y)");
        assert!(cfg.friction > 0.0 && cfg.friction < 1.0);
        assert!(!cfg.spawn_points.is_empty());
        assert_eq!(cfg.tick_delta(), 0.05);
    }
}
