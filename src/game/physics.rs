//! Player movement physics
//!
//! Side-view arena rules: gravity pulls toward positive y, the ground
//! platform spans a finite x-range, and anything falling past the death
//! line is killed by the room loop.

use crate::config::GameConfig;

/// Physics integration for player motion
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Integrate one tick of motion for a player.
    /// Returns (new_x, new_y, new_vx, new_vy, on_ground)
    pub fn integrate(
        x: f32,
        y: f32,
        vx: f32,
        vy: f32,
        config: &GameConfig,
    ) -> (f32, f32, f32, f32, bool) {
        let dt = config.tick_delta();

        // Gravity into vertical velocity, then velocity into position
        let mut new_vy = vy + config.gravity * dt;
        let new_x = x + vx * dt;
        let mut new_y = y + new_vy * dt;

        // Horizontal drag
        let mut new_vx = vx * config.friction;
        if new_vx.abs() < 1.0 {
            new_vx = 0.0;
        }

        // Ground clamp, only where the platform exists. Past the edge the
        // player keeps falling toward the death line.
        let over_ground = new_x >= config.ground_min_x && new_x <= config.ground_max_x;
        let mut on_ground = false;
        if over_ground && new_y >= config.ground_y {
            new_y = config.ground_y;
            new_vy = 0.0;
            on_ground = true;
        }

        (new_x, new_y, new_vx, new_vy, on_ground)
    }

    /// Whether a position has fallen past the death line
    pub fn past_death_line(y: f32, config: &GameConfig) -> bool {
        y > config.death_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> GameConfig {
        GameConfig::default()
    }

    #[test]
    fn gravity_accelerates_falling_player() {
        let config = cfg();
        let (_, y, _, vy, on_ground) =
            PhysicsSystem::integrate(100.0, 100.0, 0.0, 0.0, &config);
        assert!(vy > 0.0, "gravity adds downward velocity");
        assert!(y > 100.0, "player falls");
        assert!(!on_ground);
    }

    #[test]
    fn ground_clamps_and_zeroes_vertical_velocity() {
        let config = cfg();
        let (_, y, _, vy, on_ground) =
            PhysicsSystem::integrate(100.0, config.ground_y - 1.0, 0.0, 800.0, &config);
        assert_eq!(y, config.ground_y);
        assert_eq!(vy, 0.0);
        assert!(on_ground);
    }

    #[test]
    fn no_clamp_past_platform_edge() {
        let config = cfg();
        let (_, y, _, _, on_ground) = PhysicsSystem::integrate(
            config.ground_max_x + 50.0,
            config.ground_y - 1.0,
            0.0,
            800.0,
            &config,
        );
        assert!(y > config.ground_y, "falls through where there is no ground");
        assert!(!on_ground);
    }

    #[test]
    fn drag_decays_horizontal_velocity() {
        let config = cfg();
        let (_, _, vx, _, _) =
            PhysicsSystem::integrate(100.0, config.ground_y, 400.0, 0.0, &config);
        assert!(vx < 400.0 && vx > 0.0);

        // Tiny residual velocity snaps to zero
        let (_, _, vx, _, _) = PhysicsSystem::integrate(100.0, config.ground_y, 1.0, 0.0, &config);
        assert_eq!(vx, 0.0);
    }

    #[test]
    fn death_line_check() {
        let config = cfg();
        assert!(!PhysicsSystem::past_death_line(config.ground_y, &config));
        assert!(PhysicsSystem::past_death_line(config.death_y + 1.0, &config));
    }
}
