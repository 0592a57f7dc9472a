//! Lag-compensated hitscan validation
//!
//! A fire command describes a shot the client observed against its own,
//! delayed view of the world. The validator rewinds every potential victim
//! to the shot's server-aligned timestamp via the state store's history and
//! intersects the fire ray with a fixed-size hitbox at that past position.

use std::sync::Arc;
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::geometry::ray_segment_vs_aabb;
use crate::game::store::PlayerStateStore;

/// Components this large are treated as garbage and collapsed to a unit sign
const DIRECTION_SANITY_BOUND: f32 = 1.0e4;

/// Result of a validated shot: who was hit, and where along the ray
/// (`t` in `[0, 1]`, 0 = muzzle, 1 = max range).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitInfo {
    pub victim_id: Uuid,
    pub t: f32,
}

/// Clamp a client-supplied direction into sane finite components.
/// Non-finite components become 0; oversized magnitudes collapse to their sign.
pub fn sanitize_direction(dir_x: f32, dir_y: f32) -> (f32, f32) {
    let clamp = |v: f32| {
        if !v.is_finite() {
            0.0
        } else if v.abs() > DIRECTION_SANITY_BOUND {
            v.signum()
        } else {
            v
        }
    };
    (clamp(dir_x), clamp(dir_y))
}

/// Validates fire commands against historical player positions
pub struct HitValidator {
    store: Arc<PlayerStateStore>,
    config: Arc<GameConfig>,
}

impl HitValidator {
    pub fn new(store: Arc<PlayerStateStore>, config: Arc<GameConfig>) -> Self {
        Self { store, config }
    }

    /// Decide whether a shot hit anyone, and whom.
    ///
    /// Every living player except the shooter is rewound to
    /// `shot_server_ts` and tested against the fire segment. The victim with
    /// the smallest ray parameter wins; an exact tie goes to the lowest
    /// player id so the outcome never depends on iteration order.
    pub fn validate_shot(
        &self,
        shooter_id: Uuid,
        shot_server_ts: u64,
        origin_x: f32,
        origin_y: f32,
        dir_x: f32,
        dir_y: f32,
        range: f32,
    ) -> Option<HitInfo> {
        let (dir_x, dir_y) = sanitize_direction(dir_x, dir_y);
        let len = (dir_x * dir_x + dir_y * dir_y).sqrt();
        if len < 1.0e-6 || !range.is_finite() || range <= 0.0 {
            return None;
        }
        let range = range.min(self.config.max_fire_range);

        // Segment from muzzle to max range
        let seg_x = dir_x / len * range;
        let seg_y = dir_y / len * range;

        let hw = self.config.hitbox_half_width;
        let hh = self.config.hitbox_half_height;

        let mut best: Option<HitInfo> = None;
        for victim_id in self.store.player_ids() {
            if victim_id == shooter_id || self.store.is_dead(victim_id) {
                continue;
            }
            let Some(past) = self.store.interpolate_at(victim_id, shot_server_ts) else {
                continue;
            };

            let t = ray_segment_vs_aabb(
                origin_x,
                origin_y,
                seg_x,
                seg_y,
                past.x - hw,
                past.y - hh,
                past.x + hw,
                past.y + hh,
            );
            if !t.is_finite() || t > 1.0 {
                continue;
            }

            let closer = match best {
                None => true,
                Some(current) => {
                    t < current.t || (t == current.t && victim_id < current.victim_id)
                }
            };
            if closer {
                best = Some(HitInfo { victim_id, t });
            }
        }

        best
    }
}
