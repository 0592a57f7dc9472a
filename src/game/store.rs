//! Authoritative player combat state and snapshot history
//!
//! Single source of truth for health, deaths, kill/death tallies, input
//! sequence de-duplication and the per-player position history used for
//! lag-compensated hit validation. The owning room task is the only writer;
//! the hit validator and diagnostics read concurrently, so every player
//! record sits behind its own lock to keep scan + evict + append atomic.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use uuid::Uuid;

use crate::config::GameConfig;

/// One historical sample of a player's kinematic state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateSnapshot {
    pub server_time: u64,
    pub client_time: u64,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub facing_right: bool,
    pub on_ground: bool,
}

/// Kill/death tallies for one player
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerStats {
    pub kills: u32,
    pub deaths: u32,
}

#[derive(Debug)]
struct PlayerRecord {
    health: f32,
    dead: bool,
    death_time: Option<u64>,
    last_sequence: u32,
    stats: PlayerStats,
    history: VecDeque<StateSnapshot>,
}

impl PlayerRecord {
    fn fresh(max_health: f32) -> Self {
        Self {
            health: max_health,
            dead: false,
            death_time: None,
            last_sequence: 0,
            stats: PlayerStats::default(),
            history: VecDeque::new(),
        }
    }
}

/// Authoritative combat-state store for one room
pub struct PlayerStateStore {
    max_health: f32,
    history_window_ms: u64,
    history_max_len: usize,
    records: DashMap<Uuid, Mutex<PlayerRecord>>,
}

impl PlayerStateStore {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            max_health: config.max_health,
            history_window_ms: config.history_window_ms,
            history_max_len: config.history_max_len,
            records: DashMap::new(),
        }
    }

    /// Reset a player to full health with cleared death, sequence and
    /// history state. Called on join; an existing record is replaced.
    pub fn initialize(&self, player_id: Uuid) {
        self.records
            .insert(player_id, Mutex::new(PlayerRecord::fresh(self.max_health)));
    }

    /// Drop a player's record entirely (leave or room teardown)
    pub fn remove(&self, player_id: Uuid) {
        self.records.remove(&player_id);
    }

    /// All players currently tracked by this store
    pub fn player_ids(&self) -> Vec<Uuid> {
        self.records.iter().map(|entry| *entry.key()).collect()
    }

    /// Apply damage from an attacker to a victim.
    ///
    /// Returns `(new_health, became_dead)`. Non-positive amounts,
    /// self-damage and hits on an already-dead victim leave the record
    /// untouched. Reaching zero health marks the victim dead and stamps the
    /// death time used by the respawn timer, exactly once per death.
    pub fn apply_damage(
        &self,
        attacker_id: Uuid,
        victim_id: Uuid,
        amount: f32,
        now_ms: u64,
    ) -> (f32, bool) {
        let Some(entry) = self.records.get(&victim_id) else {
            return (0.0, false);
        };
        let mut record = entry.lock();

        if amount <= 0.0 || attacker_id == victim_id || record.dead || record.health <= 0.0 {
            return (record.health, false);
        }

        record.health = (record.health - amount).max(0.0);
        if record.health <= 0.0 {
            record.dead = true;
            record.death_time = Some(now_ms);
            return (0.0, true);
        }
        (record.health, false)
    }

    /// Kill a player outright (death line, environment). No-op if already
    /// dead. Returns true when the player newly died.
    pub fn force_kill(&self, player_id: Uuid, now_ms: u64) -> bool {
        let Some(entry) = self.records.get(&player_id) else {
            return false;
        };
        let mut record = entry.lock();
        if record.dead {
            return false;
        }
        record.health = 0.0;
        record.dead = true;
        record.death_time = Some(now_ms);
        true
    }

    /// Restore health up to the cap. Dead players cannot be healed.
    /// Returns the resulting health.
    pub fn heal(&self, player_id: Uuid, amount: f32) -> Option<f32> {
        let entry = self.records.get(&player_id)?;
        let mut record = entry.lock();
        if record.dead || amount <= 0.0 {
            return Some(record.health);
        }
        record.health = (record.health + amount).min(self.max_health);
        Some(record.health)
    }

    /// Bring a dead player back to full health. Kill/death tallies and
    /// snapshot history survive the respawn.
    pub fn respawn(&self, player_id: Uuid) {
        if let Some(entry) = self.records.get(&player_id) {
            let mut record = entry.lock();
            record.health = self.max_health;
            record.dead = false;
            record.death_time = None;
        }
    }

    pub fn is_dead(&self, player_id: Uuid) -> bool {
        self.records
            .get(&player_id)
            .map(|entry| entry.lock().dead)
            .unwrap_or(true)
    }

    pub fn health(&self, player_id: Uuid) -> Option<f32> {
        self.records.get(&player_id).map(|entry| entry.lock().health)
    }

    /// When the player died, if currently dead
    pub fn death_time(&self, player_id: Uuid) -> Option<u64> {
        self.records
            .get(&player_id)
            .and_then(|entry| entry.lock().death_time)
    }

    /// Append a history sample and evict anything outside the retention
    /// window or beyond the length cap. Appends must arrive in server-time
    /// order; a stale timestamp is dropped to keep the buffer sorted.
    pub fn record_snapshot(&self, player_id: Uuid, snapshot: StateSnapshot) {
        let Some(entry) = self.records.get(&player_id) else {
            return;
        };
        let mut record = entry.lock();

        if let Some(last) = record.history.back_mut() {
            if snapshot.server_time < last.server_time {
                return;
            }
            if snapshot.server_time == last.server_time {
                *last = snapshot;
                return;
            }
        }
        record.history.push_back(snapshot);

        let cutoff = snapshot.server_time.saturating_sub(self.history_window_ms);
        while let Some(front) = record.history.front() {
            if front.server_time < cutoff || record.history.len() > self.history_max_len {
                record.history.pop_front();
            } else {
                break;
            }
        }
    }

    /// Reconstruct a player's state at a past server time.
    ///
    /// Picks the latest sample at or before and the earliest sample at or
    /// after the target; a lone side is returned as-is, otherwise position
    /// and velocity are linearly interpolated. None when no history exists.
    pub fn interpolate_at(&self, player_id: Uuid, target_server_ts: u64) -> Option<StateSnapshot> {
        let entry = self.records.get(&player_id)?;
        let record = entry.lock();

        if record.history.is_empty() {
            return None;
        }

        let mut prev: Option<&StateSnapshot> = None;
        let mut next: Option<&StateSnapshot> = None;
        for sample in record.history.iter() {
            if sample.server_time <= target_server_ts {
                prev = Some(sample);
            } else {
                next = Some(sample);
                break;
            }
        }

        match (prev, next) {
            (Some(p), None) => Some(*p),
            (None, Some(n)) => Some(*n),
            (Some(p), Some(n)) => {
                if p.server_time == n.server_time {
                    return Some(*p);
                }
                let span = (n.server_time - p.server_time) as f32;
                let t = ((target_server_ts - p.server_time) as f32 / span).clamp(0.0, 1.0);
                Some(StateSnapshot {
                    server_time: target_server_ts,
                    client_time: p.client_time,
                    x: p.x + (n.x - p.x) * t,
                    y: p.y + (n.y - p.y) * t,
                    vx: p.vx + (n.vx - p.vx) * t,
                    vy: p.vy + (n.vy - p.vy) * t,
                    facing_right: p.facing_right,
                    on_ground: p.on_ground,
                })
            }
            (None, None) => None,
        }
    }

    /// Sequence-based duplicate/reorder rejection.
    ///
    /// Zero is untracked and always accepted; anything else is accepted only
    /// if strictly greater than the player's watermark, which it then becomes.
    pub fn accept_sequence(&self, player_id: Uuid, sequence: u32) -> bool {
        if sequence == 0 {
            return true;
        }
        let Some(entry) = self.records.get(&player_id) else {
            return false;
        };
        let mut record = entry.lock();
        if sequence > record.last_sequence {
            record.last_sequence = sequence;
            true
        } else {
            false
        }
    }

    /// Record a completed kill: killer (when present) gains a kill, the
    /// victim gains a death.
    pub fn record_kill(&self, killer_id: Option<Uuid>, victim_id: Uuid) {
        if let Some(killer_id) = killer_id {
            if let Some(entry) = self.records.get(&killer_id) {
                entry.lock().stats.kills += 1;
            }
        }
        if let Some(entry) = self.records.get(&victim_id) {
            entry.lock().stats.deaths += 1;
        }
    }

    pub fn stats(&self, player_id: Uuid) -> Option<PlayerStats> {
        self.records.get(&player_id).map(|entry| entry.lock().stats)
    }
}
