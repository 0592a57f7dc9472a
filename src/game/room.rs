//! Room state and authoritative tick loop

use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::combat::HitValidator;
use crate::game::drops::SupplyDropStore;
use crate::game::physics::PhysicsSystem;
use crate::game::results::{PlayerResult, ResultsReporter};
use crate::game::snapshot::SnapshotBuilder;
use crate::game::store::{PlayerStateStore, StateSnapshot};
use crate::game::{FireInput, PlayerCommand, RoomInput};
use crate::util::time::{unix_millis, Timer};
use crate::ws::protocol::{DropKind, GameEvent, PlayerAction, PlayerStanding, ServerMsg};

/// Room lifecycle. Ended is terminal; the room is discarded afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Running,
    Ended,
}

/// Authoritative per-player state, mutated only by the owning room task
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub user_id: Uuid,

    // Position and movement
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub on_ground: bool,
    pub facing_right: bool,
    pub can_double_jump: bool,

    // Combat (health and tallies mirror the state store for broadcast)
    pub health: f32,
    pub ammo: u32,
    pub kills: u32,
    pub deaths: u32,
    pub action: PlayerAction,

    // Input tracking
    pub last_input_seq: u32,
    pub last_client_ts: u64,
}

impl PlayerState {
    pub fn new(user_id: Uuid, spawn: (f32, f32), config: &GameConfig) -> Self {
        Self {
            user_id,
            x: spawn.0,
            y: spawn.1,
            vx: 0.0,
            vy: 0.0,
            on_ground: true,
            facing_right: true,
            can_double_jump: false,
            health: config.max_health,
            ammo: config.initial_ammo,
            kills: 0,
            deaths: 0,
            action: PlayerAction::Idle,
            last_input_seq: 0,
            last_client_ts: 0,
        }
    }
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub room_id: Uuid,
    pub input_tx: mpsc::Sender<RoomInput>,
    pub broadcast_tx: broadcast::Sender<ServerMsg>,
    player_count: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
}

impl RoomHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    /// Ask the room loop to shut down before its next tick
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Registry of all active rooms. Explicitly constructed at startup and
/// passed down; never a global.
pub struct RoomRegistry {
    rooms: DashMap<Uuid, RoomHandle>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<RoomHandle> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    /// Register a handle unless the id is already taken.
    /// Returns false on a duplicate, leaving the existing room in place.
    pub fn insert_if_absent(&self, handle: RoomHandle) -> bool {
        match self.rooms.entry(handle.room_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    pub fn remove(&self, id: &Uuid) -> Option<RoomHandle> {
        self.rooms.remove(id).map(|(_, h)| h)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn room_ids(&self) -> Vec<Uuid> {
        self.rooms.iter().map(|r| *r.key()).collect()
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().player_count()).sum()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative room simulation
pub struct GameRoom {
    config: Arc<GameConfig>,
    room_id: Uuid,
    status: RoomStatus,
    tick_number: u64,
    players: HashMap<Uuid, PlayerState>,
    store: Arc<PlayerStateStore>,
    validator: HitValidator,
    drops: Arc<SupplyDropStore>,
    input_rx: mpsc::Receiver<RoomInput>,
    broadcast_tx: broadcast::Sender<ServerMsg>,
    player_count: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
    rng: ChaCha8Rng,
    events: Vec<GameEvent>,
    countdown_remaining_ms: u64,
    match_started_at: Option<u64>,
}

impl GameRoom {
    /// Create a room with its initial roster. Player states exist before
    /// this returns, so a caller holding the handle can rely on them.
    pub fn new(
        room_id: Uuid,
        player_ids: &[Uuid],
        config: Arc<GameConfig>,
        drops: Arc<SupplyDropStore>,
        seed: u64,
    ) -> (Self, RoomHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (broadcast_tx, _) = broadcast::channel(64);
        let player_count = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let store = Arc::new(PlayerStateStore::new(&config));
        let validator = HitValidator::new(store.clone(), config.clone());

        let handle = RoomHandle {
            room_id,
            input_tx,
            broadcast_tx: broadcast_tx.clone(),
            player_count: player_count.clone(),
            stop: stop.clone(),
        };

        let mut room = Self {
            countdown_remaining_ms: config.countdown_secs * 1000,
            config,
            room_id,
            status: RoomStatus::Running,
            tick_number: 0,
            players: HashMap::new(),
            store,
            validator,
            drops,
            input_rx,
            broadcast_tx,
            player_count,
            stop,
            rng: ChaCha8Rng::seed_from_u64(seed),
            events: Vec::new(),
            match_started_at: None,
        };

        for &player_id in player_ids.iter().take(room.config.room_size) {
            room.add_player(player_id);
        }

        (room, handle)
    }

    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn store(&self) -> &Arc<PlayerStateStore> {
        &self.store
    }

    /// Run the authoritative tick loop until the match ends
    pub async fn run(mut self, reporter: Arc<dyn ResultsReporter>) {
        info!(room_id = %self.room_id, players = self.players.len(), "Room started");

        let tick_duration = Duration::from_millis(self.config.tick_period_ms);
        let mut ticker = interval(tick_duration);
        // An overrun tick proceeds immediately; no burst of catch-up ticks
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if self.stop.load(Ordering::Relaxed) {
                info!(room_id = %self.room_id, "Room stopped externally");
                self.status = RoomStatus::Ended;
                break;
            }

            let timer = Timer::new();
            let now = unix_millis();
            // A fault in one tick must not take the whole match down
            if let Err(panic) =
                std::panic::catch_unwind(AssertUnwindSafe(|| self.tick(now)))
            {
                error!(room_id = %self.room_id, ?panic, "Tick failed, continuing");
                self.events.clear();
            }
            if timer.elapsed_ms() > self.config.tick_period_ms {
                warn!(
                    room_id = %self.room_id,
                    elapsed_ms = timer.elapsed_ms(),
                    "Slow tick"
                );
            }

            if self.status == RoomStatus::Ended {
                info!(room_id = %self.room_id, "Match ended");
                break;
            }
            if self.players.is_empty() {
                info!(room_id = %self.room_id, "All players left, ending match");
                self.status = RoomStatus::Ended;
                break;
            }
        }

        let results = self.build_results();
        let winner = results.first().map(|r| r.user_id);
        let standings = results
            .iter()
            .map(|r| PlayerStanding {
                user_id: r.user_id,
                kills: r.kills,
                deaths: r.deaths,
                ranking: r.ranking,
            })
            .collect();
        let _ = self.broadcast_tx.send(ServerMsg::MatchEnd {
            winner_user_id: winner,
            results: standings,
        });

        reporter.on_game_concluded(self.room_id, results);
    }

    /// Advance the simulation by one tick at the given wall-clock time.
    /// Split out from `run` so tests can drive time deterministically.
    pub fn tick(&mut self, now_ms: u64) {
        if self.status == RoomStatus::Ended {
            return;
        }
        self.tick_number += 1;

        if self.countdown_remaining_ms > 0 {
            self.countdown_remaining_ms = self
                .countdown_remaining_ms
                .saturating_sub(self.config.tick_period_ms);
        }
        if self.countdown_remaining_ms == 0 && self.match_started_at.is_none() {
            self.match_started_at = Some(now_ms);
            info!(room_id = %self.room_id, tick = self.tick_number, "Match started");
        }

        self.reset_transient_actions();
        self.drain_inputs(now_ms);
        self.run_physics(now_ms);
        self.resolve_pickups();
        self.run_respawns(now_ms);
        self.check_conditions(now_ms);
        self.broadcast_snapshot(now_ms);
    }

    fn countdown_active(&self) -> bool {
        self.countdown_remaining_ms > 0
    }

    fn pick_spawn(&mut self) -> (f32, f32) {
        let idx = self.rng.gen_range(0..self.config.spawn_points.len());
        self.config.spawn_points[idx]
    }

    fn add_player(&mut self, player_id: Uuid) {
        let spawn = self.pick_spawn();
        self.store.initialize(player_id);
        self.players
            .insert(player_id, PlayerState::new(player_id, spawn, &self.config));
        self.player_count
            .store(self.players.len(), Ordering::Relaxed);

        let _ = self.broadcast_tx.send(ServerMsg::PlayerJoined {
            user_id: player_id,
            x: spawn.0,
            y: spawn.1,
        });
    }

    /// Drop an action left over from the previous tick so this tick's
    /// inputs decide what the player is doing
    fn reset_transient_actions(&mut self) {
        for player in self.players.values_mut() {
            if player.action != PlayerAction::Dead && player.on_ground {
                player.action = PlayerAction::Idle;
            }
        }
    }

    /// Input phase: drain the command queue without blocking
    fn drain_inputs(&mut self, now_ms: u64) {
        while let Ok(input) = self.input_rx.try_recv() {
            match input {
                RoomInput::Join { player_id } => self.handle_join(player_id),
                RoomInput::Command(command) => self.handle_command(command, now_ms),
                RoomInput::Leave { player_id } => self.handle_leave(player_id),
            }
        }
    }

    fn handle_join(&mut self, player_id: Uuid) {
        if self.players.contains_key(&player_id) {
            return;
        }
        if self.players.len() >= self.config.room_size {
            let _ = self.broadcast_tx.send(ServerMsg::Error {
                code: "room_full".to_string(),
                message: "Room is full".to_string(),
            });
            return;
        }
        self.add_player(player_id);
        info!(
            room_id = %self.room_id,
            user_id = %player_id,
            player_count = self.players.len(),
            "Player joined room"
        );
    }

    fn handle_leave(&mut self, player_id: Uuid) {
        if self.players.remove(&player_id).is_some() {
            self.store.remove(player_id);
            self.player_count
                .store(self.players.len(), Ordering::Relaxed);
            let _ = self
                .broadcast_tx
                .send(ServerMsg::PlayerLeft { user_id: player_id });
            info!(room_id = %self.room_id, user_id = %player_id, "Player left room");
        }
    }

    fn handle_command(&mut self, command: PlayerCommand, now_ms: u64) {
        let player_id = command.player_id;
        if !self.players.contains_key(&player_id) || self.store.is_dead(player_id) {
            return;
        }
        if !self.store.accept_sequence(player_id, command.sequence) {
            return;
        }

        if let Some(player) = self.players.get_mut(&player_id) {
            if command.sequence > player.last_input_seq {
                player.last_input_seq = command.sequence;
            }
            if command.client_timestamp > 0 {
                player.last_client_ts = command.client_timestamp;
            }
        }

        // Inputs are acknowledged but have no effect until the countdown ends
        if self.countdown_active() {
            return;
        }

        let move_input = if command.move_input.is_finite() {
            command.move_input.clamp(-1.0, 1.0)
        } else {
            0.0
        };

        if let Some(player) = self.players.get_mut(&player_id) {
            if move_input != 0.0 {
                player.x += move_input * self.config.move_step;
                player.facing_right = move_input > 0.0;
                if player.on_ground {
                    player.action = PlayerAction::Run;
                }
            }

            if command.wants_jump() {
                if player.on_ground {
                    player.vy = self.config.jump_velocity;
                    player.on_ground = false;
                    player.can_double_jump = true;
                    player.action = PlayerAction::Jump;
                } else if player.can_double_jump {
                    player.vy = self.config.jump_velocity;
                    player.can_double_jump = false;
                    player.action = PlayerAction::Jump;
                }
            }
        }

        if command.wants_fire() {
            if let Some(fire) = command.fire {
                self.handle_fire(player_id, fire, command.server_timestamp, now_ms);
            }
        }
    }

    fn handle_fire(
        &mut self,
        shooter_id: Uuid,
        fire: FireInput,
        shot_server_ts: u64,
        now_ms: u64,
    ) {
        let shooter_facing_right = {
            let Some(shooter) = self.players.get_mut(&shooter_id) else {
                return;
            };
            if shooter.ammo == 0 {
                return;
            }
            shooter.ammo -= 1;
            shooter.action = PlayerAction::Shoot;
            shooter.facing_right
        };

        // A shot cannot claim to be from the future or from beyond the
        // history window
        let earliest = now_ms.saturating_sub(self.config.history_window_ms);
        let shot_ts = if shot_server_ts == 0 {
            now_ms
        } else {
            shot_server_ts.clamp(earliest, now_ms)
        };

        let Some(hit) = self.validator.validate_shot(
            shooter_id,
            shot_ts,
            fire.origin_x,
            fire.origin_y,
            fire.dir_x,
            fire.dir_y,
            fire.range,
        ) else {
            return;
        };

        let (new_health, became_dead) = self.store.apply_damage(
            shooter_id,
            hit.victim_id,
            self.config.weapon_damage,
            now_ms,
        );

        let knockback = self.config.knockback_velocity
            * if shooter_facing_right { 1.0 } else { -1.0 };
        if let Some(victim) = self.players.get_mut(&hit.victim_id) {
            victim.health = new_health;
            victim.vx += knockback;
            victim.on_ground = false;
            victim.action = PlayerAction::Hit;
            self.events.push(GameEvent::PlayerHit {
                shooter_id,
                victim_id: hit.victim_id,
                damage: self.config.weapon_damage,
                x: victim.x,
                y: victim.y,
            });
        }

        if became_dead {
            self.on_player_died(hit.victim_id, Some(shooter_id));
        }
    }

    /// Record a death that the store has already marked: tallies, mirrors
    /// and the event, in that order
    fn on_player_died(&mut self, victim_id: Uuid, killer_id: Option<Uuid>) {
        self.store.record_kill(killer_id, victim_id);

        if let Some(victim) = self.players.get_mut(&victim_id) {
            victim.health = 0.0;
            victim.vx = 0.0;
            victim.vy = 0.0;
            victim.action = PlayerAction::Dead;
        }
        if let Some(stats) = self.store.stats(victim_id) {
            if let Some(victim) = self.players.get_mut(&victim_id) {
                victim.deaths = stats.deaths;
            }
        }
        if let Some(killer_id) = killer_id {
            if let Some(stats) = self.store.stats(killer_id) {
                if let Some(killer) = self.players.get_mut(&killer_id) {
                    killer.kills = stats.kills;
                }
            }
        }

        self.events.push(GameEvent::PlayerDied {
            victim_id,
            killer_id,
        });
    }

    /// Physics phase: integrate motion and apply the death line
    fn run_physics(&mut self, now_ms: u64) {
        let mut deaths: Vec<Uuid> = Vec::new();

        for (id, player) in self.players.iter_mut() {
            if self.store.is_dead(*id) {
                continue;
            }

            let (x, y, vx, vy, on_ground) =
                PhysicsSystem::integrate(player.x, player.y, player.vx, player.vy, &self.config);
            player.x = x;
            player.y = y;
            player.vx = vx;
            player.vy = vy;

            if !on_ground {
                player.action = if vy < 0.0 {
                    PlayerAction::Jump
                } else {
                    PlayerAction::Fall
                };
            } else if !player.on_ground {
                // Just landed
                player.action = PlayerAction::Idle;
                player.can_double_jump = false;
            }
            player.on_ground = on_ground;

            if PhysicsSystem::past_death_line(player.y, &self.config)
                && self.store.force_kill(*id, now_ms)
            {
                deaths.push(*id);
            }
        }

        for victim_id in deaths {
            self.on_player_died(victim_id, None);
        }
    }

    /// Pickup phase: living players collect supply drops in reach
    fn resolve_pickups(&mut self) {
        let radius_sq = self.config.pickup_radius * self.config.pickup_radius;

        for drop in self.drops.in_room(self.room_id) {
            let mut best: Option<(Uuid, f32)> = None;
            for (id, player) in self.players.iter() {
                if self.store.is_dead(*id) {
                    continue;
                }
                let dx = player.x - drop.x;
                let dy = player.y - drop.y;
                let dist_sq = dx * dx + dy * dy;
                if dist_sq > radius_sq {
                    continue;
                }
                let closer = match best {
                    None => true,
                    Some((best_id, best_sq)) => {
                        dist_sq < best_sq || (dist_sq == best_sq && *id < best_id)
                    }
                };
                if closer {
                    best = Some((*id, dist_sq));
                }
            }

            let Some((collector, _)) = best else { continue };
            // take() makes collection exclusive per drop id
            if self.drops.take(drop.drop_id).is_none() {
                continue;
            }

            match drop.kind {
                DropKind::Weapon => {
                    if let Some(player) = self.players.get_mut(&collector) {
                        player.ammo =
                            (player.ammo + self.config.drop_ammo_bonus).min(self.config.initial_ammo);
                    }
                }
                DropKind::Heal => {
                    if let Some(new_health) =
                        self.store.heal(collector, self.config.drop_heal_amount)
                    {
                        if let Some(player) = self.players.get_mut(&collector) {
                            player.health = new_health;
                        }
                    }
                }
            }

            self.events.push(GameEvent::SupplyPickup {
                user_id: collector,
                drop_id: drop.drop_id,
                kind: drop.kind,
            });
        }
    }

    /// Respawn phase: dead players whose timer elapsed come back
    fn run_respawns(&mut self, now_ms: u64) {
        let due: Vec<Uuid> = self
            .players
            .keys()
            .filter(|id| match self.store.death_time(**id) {
                Some(death_time) => now_ms.saturating_sub(death_time) >= self.config.respawn_delay_ms,
                None => false,
            })
            .copied()
            .collect();

        for player_id in due {
            self.store.respawn(player_id);
            let spawn = self.pick_spawn();

            if let Some(player) = self.players.get_mut(&player_id) {
                player.x = spawn.0;
                player.y = spawn.1;
                player.vx = 0.0;
                player.vy = 0.0;
                player.on_ground = true;
                player.can_double_jump = false;
                player.health = self.config.max_health;
                player.ammo = self.config.initial_ammo;
                player.action = PlayerAction::Idle;
            }

            let _ = self.broadcast_tx.send(ServerMsg::Respawn {
                user_id: player_id,
                x: spawn.0,
                y: spawn.1,
                health: self.config.max_health,
                server_time: now_ms,
            });
        }
    }

    /// Condition phase: kill threshold or timeout ends the match
    fn check_conditions(&mut self, now_ms: u64) {
        let Some(started_at) = self.match_started_at else {
            return;
        };

        let threshold_reached = self.players.keys().any(|id| {
            self.store
                .stats(*id)
                .map(|s| s.kills >= self.config.kill_threshold)
                .unwrap_or(false)
        });
        if threshold_reached {
            self.status = RoomStatus::Ended;
            return;
        }

        if now_ms.saturating_sub(started_at) >= self.config.max_match_secs * 1000 {
            self.status = RoomStatus::Ended;
        }
    }

    /// Broadcast phase: record history samples and fan out the snapshot
    fn broadcast_snapshot(&mut self, now_ms: u64) {
        for (id, player) in self.players.iter() {
            if self.store.is_dead(*id) {
                continue;
            }
            self.store.record_snapshot(
                *id,
                StateSnapshot {
                    server_time: now_ms,
                    client_time: player.last_client_ts,
                    x: player.x,
                    y: player.y,
                    vx: player.vx,
                    vy: player.vy,
                    facing_right: player.facing_right,
                    on_ground: player.on_ground,
                },
            );
        }

        let countdown_seconds = self
            .countdown_active()
            .then(|| (self.countdown_remaining_ms + 999) / 1000);
        let time_remaining_seconds = self.match_started_at.map(|started_at| {
            let elapsed = now_ms.saturating_sub(started_at);
            (self.config.max_match_secs * 1000).saturating_sub(elapsed) / 1000
        });

        let events = std::mem::take(&mut self.events);
        let msg = SnapshotBuilder::build(
            self.tick_number,
            &self.players,
            events,
            countdown_seconds,
            time_remaining_seconds,
        );
        let _ = self.broadcast_tx.send(msg);
    }

    /// Final standings: kills descending, deaths ascending, id as the
    /// stable last resort
    fn build_results(&self) -> Vec<PlayerResult> {
        let mut results: Vec<PlayerResult> = self
            .players
            .keys()
            .map(|id| {
                let stats = self.store.stats(*id).unwrap_or_default();
                PlayerResult {
                    user_id: *id,
                    kills: stats.kills,
                    deaths: stats.deaths,
                    ranking: 0,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.kills
                .cmp(&a.kills)
                .then(a.deaths.cmp(&b.deaths))
                .then(a.user_id.cmp(&b.user_id))
        });
        for (idx, result) in results.iter_mut().enumerate() {
            result.ranking = (idx + 1) as u32;
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::drops::SupplyDrop;
    use crate::game::{ACTION_FIRE, ACTION_JUMP};
    use crate::ws::protocol::PlayerSnapshot;

    const T0: u64 = 1_000_000;

    fn test_config() -> GameConfig {
        GameConfig {
            countdown_secs: 0,
            ..GameConfig::default()
        }
    }

    fn make_room(config: GameConfig, players: usize) -> (GameRoom, RoomHandle, Vec<Uuid>) {
        let mut ids: Vec<Uuid> = (0..players).map(|_| Uuid::new_v4()).collect();
        ids.sort();
        let drops = Arc::new(SupplyDropStore::new());
        let (room, handle) = GameRoom::new(Uuid::new_v4(), &ids, Arc::new(config), drops, 7);
        (room, handle, ids)
    }

    fn command(player_id: Uuid, sequence: u32, move_input: f32, action_bits: u8) -> RoomInput {
        RoomInput::Command(PlayerCommand {
            player_id,
            sequence,
            move_input,
            action_bits,
            fire: None,
            client_timestamp: 0,
            server_timestamp: 0,
        })
    }

    fn fire_command(player_id: Uuid, sequence: u32, fire: FireInput, server_ts: u64) -> RoomInput {
        RoomInput::Command(PlayerCommand {
            player_id,
            sequence,
            move_input: 0.0,
            action_bits: ACTION_FIRE,
            fire: Some(fire),
            client_timestamp: server_ts,
            server_timestamp: server_ts,
        })
    }

    fn fire_right(room: &GameRoom, shooter: Uuid) -> FireInput {
        let p = &room.players[&shooter];
        FireInput {
            origin_x: p.x,
            origin_y: p.y,
            dir_x: 1.0,
            dir_y: 0.0,
            range: 800.0,
        }
    }

    /// Place two players on the ground a known distance apart
    fn line_up(room: &mut GameRoom, shooter: Uuid, victim: Uuid) {
        let ground = room.config.ground_y;
        let shooter_state = room.players.get_mut(&shooter).unwrap();
        shooter_state.x = 100.0;
        shooter_state.y = ground;
        shooter_state.facing_right = true;
        let victim_state = room.players.get_mut(&victim).unwrap();
        victim_state.x = 400.0;
        victim_state.y = ground;
    }

    fn snapshot_of(rx: &mut broadcast::Receiver<ServerMsg>) -> (Vec<PlayerSnapshot>, Vec<GameEvent>) {
        loop {
            match rx.try_recv() {
                Ok(ServerMsg::Snapshot {
                    players, events, ..
                }) => return (players, events),
                Ok(_) => continue,
                Err(e) => panic!("no snapshot broadcast: {e}"),
            }
        }
    }

    #[test]
    fn move_command_shifts_player_and_facing() {
        let (mut room, handle, ids) = make_room(test_config(), 1);
        let id = ids[0];
        let x0 = room.players[&id].x;

        handle.input_tx.try_send(command(id, 1, -1.0, 0)).unwrap();
        room.tick(T0);

        let player = &room.players[&id];
        assert_eq!(player.x, x0 - room.config.move_step);
        assert!(!player.facing_right);
        assert_eq!(player.last_input_seq, 1);
    }

    #[test]
    fn duplicate_sequence_is_applied_once() {
        let (mut room, handle, ids) = make_room(test_config(), 1);
        let id = ids[0];
        let x0 = room.players[&id].x;

        handle.input_tx.try_send(command(id, 5, 1.0, 0)).unwrap();
        handle.input_tx.try_send(command(id, 5, 1.0, 0)).unwrap();
        handle.input_tx.try_send(command(id, 3, 1.0, 0)).unwrap();
        room.tick(T0);

        assert_eq!(room.players[&id].x, x0 + room.config.move_step);
    }

    #[test]
    fn unknown_player_command_is_dropped() {
        let (mut room, handle, _) = make_room(test_config(), 1);
        handle
            .input_tx
            .try_send(command(Uuid::new_v4(), 1, 1.0, 0))
            .unwrap();
        room.tick(T0); // must not panic
        assert_eq!(room.status(), RoomStatus::Running);
    }

    #[test]
    fn jump_and_double_jump() {
        let (mut room, handle, ids) = make_room(test_config(), 1);
        let id = ids[0];

        handle.input_tx.try_send(command(id, 1, 0.0, ACTION_JUMP)).unwrap();
        room.tick(T0);
        {
            let player = &room.players[&id];
            assert!(player.vy < 0.0, "jump grants upward velocity");
            assert!(!player.on_ground);
            assert!(player.can_double_jump);
        }

        handle.input_tx.try_send(command(id, 2, 0.0, ACTION_JUMP)).unwrap();
        room.tick(T0 + 50);
        {
            let player = &room.players[&id];
            assert!(player.vy < 0.0);
            assert!(!player.can_double_jump, "double jump consumed");
        }

        // A third jump in the air does nothing
        let vy_before = room.players[&id].vy;
        handle.input_tx.try_send(command(id, 3, 0.0, ACTION_JUMP)).unwrap();
        room.tick(T0 + 100);
        assert!(room.players[&id].vy > vy_before, "gravity only, no new impulse");
    }

    #[test]
    fn validated_shot_emits_one_hit_and_reduces_health() {
        let (mut room, handle, ids) = make_room(test_config(), 2);
        let (shooter, victim) = (ids[0], ids[1]);
        line_up(&mut room, shooter, victim);

        // First tick records history for both players
        room.tick(T0);

        let mut rx = handle.broadcast_tx.subscribe();
        handle
            .input_tx
            .try_send(fire_command(shooter, 1, fire_right(&room, shooter), T0))
            .unwrap();
        room.tick(T0 + 50);

        let (players, events) = snapshot_of(&mut rx);
        let hits: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, GameEvent::PlayerHit { .. }))
            .collect();
        assert_eq!(hits.len(), 1, "exactly one hit event");

        let victim_snap = players.iter().find(|p| p.user_id == victim).unwrap();
        assert_eq!(
            victim_snap.health,
            room.config.max_health - room.config.weapon_damage
        );
        let shooter_snap = players.iter().find(|p| p.user_id == shooter).unwrap();
        assert_eq!(shooter_snap.ammo, room.config.initial_ammo - 1);
    }

    #[test]
    fn lethal_shot_emits_death_and_starts_timer() {
        let config = GameConfig {
            weapon_damage: 200.0,
            ..test_config()
        };
        let (mut room, handle, ids) = make_room(config, 2);
        let (shooter, victim) = (ids[0], ids[1]);
        line_up(&mut room, shooter, victim);
        room.tick(T0);

        let mut rx = handle.broadcast_tx.subscribe();
        handle
            .input_tx
            .try_send(fire_command(shooter, 1, fire_right(&room, shooter), T0))
            .unwrap();
        room.tick(T0 + 50);

        let (_, events) = snapshot_of(&mut rx);
        let deaths: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, GameEvent::PlayerDied { .. }))
            .collect();
        assert_eq!(deaths.len(), 1, "exactly one death event");

        assert!(room.store().is_dead(victim));
        assert_eq!(room.store().death_time(victim), Some(T0 + 50));
        assert_eq!(room.players[&victim].action, PlayerAction::Dead);
        assert_eq!(room.store().stats(shooter).unwrap().kills, 1);
        assert_eq!(room.store().stats(victim).unwrap().deaths, 1);
    }

    #[test]
    fn dead_players_ignore_commands() {
        let (mut room, handle, ids) = make_room(test_config(), 1);
        let id = ids[0];
        room.store().force_kill(id, T0);
        let x0 = room.players[&id].x;

        handle.input_tx.try_send(command(id, 1, 1.0, 0)).unwrap();
        room.tick(T0);

        assert_eq!(room.players[&id].x, x0);
    }

    #[test]
    fn respawn_timing_boundary_is_exact() {
        let (mut room, _, ids) = make_room(test_config(), 1);
        let id = ids[0];
        let delay = room.config.respawn_delay_ms;

        room.store().force_kill(id, T0);
        room.players.get_mut(&id).unwrap().action = PlayerAction::Dead;

        // One millisecond early: still dead
        room.tick(T0 + delay - 1);
        assert!(room.store().is_dead(id));
        assert_eq!(room.players[&id].action, PlayerAction::Dead);

        // Exactly at the delay: respawned with spawn defaults
        room.tick(T0 + delay);
        assert!(!room.store().is_dead(id));
        let player = &room.players[&id];
        assert_eq!(player.health, room.config.max_health);
        assert_eq!(player.ammo, room.config.initial_ammo);
        assert_eq!(player.action, PlayerAction::Idle);
        assert!(room
            .config
            .spawn_points
            .iter()
            .any(|s| s.0 == player.x && s.1 == player.y));
    }

    #[test]
    fn respawn_is_broadcast() {
        let (mut room, handle, ids) = make_room(test_config(), 1);
        let id = ids[0];
        room.store().force_kill(id, T0);

        let mut rx = handle.broadcast_tx.subscribe();
        room.tick(T0 + room.config.respawn_delay_ms);

        let mut saw_respawn = false;
        while let Ok(msg) = rx.try_recv() {
            if let ServerMsg::Respawn { user_id, health, .. } = msg {
                assert_eq!(user_id, id);
                assert_eq!(health, room.config.max_health);
                saw_respawn = true;
            }
        }
        assert!(saw_respawn);
    }

    #[test]
    fn death_line_kills_falling_player() {
        let (mut room, handle, ids) = make_room(test_config(), 1);
        let id = ids[0];
        {
            let player = room.players.get_mut(&id).unwrap();
            player.x = room.config.ground_max_x + 200.0; // past the edge
            player.y = room.config.death_y + 10.0;
            player.on_ground = false;
        }

        let mut rx = handle.broadcast_tx.subscribe();
        room.tick(T0);

        assert!(room.store().is_dead(id));
        assert_eq!(room.store().stats(id).unwrap().deaths, 1);
        let (_, events) = snapshot_of(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::PlayerDied {
                killer_id: None,
                ..
            }
        )));
    }

    #[test]
    fn kill_threshold_ends_the_match() {
        let config = GameConfig {
            kill_threshold: 2,
            ..test_config()
        };
        let (mut room, _, ids) = make_room(config, 2);
        room.tick(T0); // starts the match clock

        room.store().record_kill(Some(ids[0]), ids[1]);
        room.tick(T0 + 50);
        assert_eq!(room.status(), RoomStatus::Running);

        room.store().record_kill(Some(ids[0]), ids[1]);
        room.tick(T0 + 100);
        assert_eq!(room.status(), RoomStatus::Ended);
    }

    #[test]
    fn timeout_ends_the_match() {
        let config = GameConfig {
            max_match_secs: 10,
            ..test_config()
        };
        let (mut room, _, _) = make_room(config, 2);
        room.tick(T0);

        room.tick(T0 + 9_999);
        assert_eq!(room.status(), RoomStatus::Running);

        room.tick(T0 + 10_000);
        assert_eq!(room.status(), RoomStatus::Ended);
    }

    #[test]
    fn countdown_gates_input_and_match_clock() {
        let config = GameConfig {
            countdown_secs: 1,
            ..GameConfig::default()
        };
        let (mut room, handle, ids) = make_room(config, 1);
        let id = ids[0];
        let x0 = room.players[&id].x;

        let mut rx = handle.broadcast_tx.subscribe();
        handle.input_tx.try_send(command(id, 1, 1.0, 0)).unwrap();
        room.tick(T0);

        assert_eq!(room.players[&id].x, x0, "movement suppressed in countdown");
        assert!(room.match_started_at.is_none());
        match rx.try_recv() {
            Ok(ServerMsg::Snapshot {
                countdown_seconds, ..
            }) => assert_eq!(countdown_seconds, Some(1)),
            other => panic!("expected snapshot, got {other:?}"),
        }

        // 1s countdown at 50ms ticks: 19 more ticks to reach zero
        for i in 1..20 {
            room.tick(T0 + i * 50);
        }
        assert!(room.match_started_at.is_some());

        handle.input_tx.try_send(command(id, 2, 1.0, 0)).unwrap();
        room.tick(T0 + 20 * 50);
        assert!(room.players[&id].x > x0, "movement live after countdown");
    }

    #[test]
    fn supply_drop_is_collected_once() {
        let (mut room, handle, ids) = make_room(test_config(), 1);
        let id = ids[0];
        let player_pos = (room.players[&id].x, room.players[&id].y);

        let drop_id = Uuid::new_v4();
        room.drops.insert(SupplyDrop {
            drop_id,
            room_id: room.room_id(),
            kind: DropKind::Weapon,
            x: player_pos.0,
            y: player_pos.1,
        });
        room.players.get_mut(&id).unwrap().ammo = 5;

        let mut rx = handle.broadcast_tx.subscribe();
        room.tick(T0);

        assert_eq!(room.players[&id].ammo, 5 + room.config.drop_ammo_bonus);
        assert!(room.drops.is_empty(), "drop removed on collection");
        let (_, events) = snapshot_of(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::SupplyPickup { .. })));

        // Nothing left to collect next tick
        room.tick(T0 + 50);
        assert_eq!(room.players[&id].ammo, 5 + room.config.drop_ammo_bonus);
    }

    #[test]
    fn heal_pack_restores_capped_health() {
        let (mut room, _, ids) = make_room(test_config(), 1);
        let id = ids[0];
        room.store().apply_damage(Uuid::new_v4(), id, 30.0, T0);
        room.players.get_mut(&id).unwrap().health = 70.0;

        let pos = (room.players[&id].x, room.players[&id].y);
        room.drops.insert(SupplyDrop {
            drop_id: Uuid::new_v4(),
            room_id: room.room_id(),
            kind: DropKind::Heal,
            x: pos.0,
            y: pos.1,
        });
        room.tick(T0 + 50);

        assert_eq!(room.players[&id].health, 100.0);
        assert_eq!(room.store().health(id), Some(100.0));
    }

    #[test]
    fn leave_removes_player_everywhere() {
        let (mut room, handle, ids) = make_room(test_config(), 2);
        handle
            .input_tx
            .try_send(RoomInput::Leave { player_id: ids[0] })
            .unwrap();
        room.tick(T0);

        assert!(!room.players.contains_key(&ids[0]));
        assert!(room.store().stats(ids[0]).is_none());
        assert_eq!(handle.player_count(), 1);
    }

    #[test]
    fn join_is_idempotent_and_capped() {
        let config = GameConfig {
            room_size: 2,
            ..test_config()
        };
        let (mut room, handle, ids) = make_room(config, 2);

        handle
            .input_tx
            .try_send(RoomInput::Join { player_id: ids[0] })
            .unwrap();
        handle
            .input_tx
            .try_send(RoomInput::Join {
                player_id: Uuid::new_v4(),
            })
            .unwrap();
        room.tick(T0);

        assert_eq!(room.players.len(), 2, "duplicate ignored, overflow rejected");
    }

    #[test]
    fn lag_compensated_shot_hits_past_position() {
        let (mut room, handle, ids) = make_room(test_config(), 2);
        let (shooter, victim) = (ids[0], ids[1]);
        line_up(&mut room, shooter, victim);

        // History: victim stood at x=400 at T0...
        room.tick(T0);
        // ...then warped far away
        room.players.get_mut(&victim).unwrap().x = 4_000.0;
        room.tick(T0 + 50);

        // The shot claims the moment the victim was still at x=400
        handle
            .input_tx
            .try_send(fire_command(
                shooter,
                1,
                FireInput {
                    origin_x: 100.0,
                    origin_y: room.config.ground_y,
                    dir_x: 1.0,
                    dir_y: 0.0,
                    range: 800.0,
                },
                T0,
            ))
            .unwrap();

        let mut rx = handle.broadcast_tx.subscribe();
        room.tick(T0 + 100);

        let (_, events) = snapshot_of(&mut rx);
        assert!(
            events.iter().any(|e| matches!(
                e,
                GameEvent::PlayerHit { victim_id, .. } if *victim_id == victim
            )),
            "shot validated against the rewound position"
        );
    }

    #[test]
    fn results_rank_by_kills_then_deaths() {
        let (mut room, _, ids) = make_room(test_config(), 3);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        room.store().record_kill(Some(a), b);
        room.store().record_kill(Some(a), c);
        room.store().record_kill(Some(b), c);
        room.tick(T0);

        let results = room.build_results();
        assert_eq!(results[0].user_id, a);
        assert_eq!(results[0].ranking, 1);
        assert_eq!(results[1].user_id, b);
        assert_eq!(results[2].user_id, c);
        assert_eq!(results[2].deaths, 2);
    }

    #[tokio::test]
    async fn run_reports_results_exactly_once() {
        use parking_lot::Mutex as PlMutex;

        struct RecordingReporter {
            calls: PlMutex<Vec<(Uuid, usize)>>,
        }
        impl ResultsReporter for RecordingReporter {
            fn on_game_concluded(&self, game_id: Uuid, results: Vec<PlayerResult>) {
                self.calls.lock().push((game_id, results.len()));
            }
        }

        let config = GameConfig {
            tick_period_ms: 5,
            ..test_config()
        };
        let (room, handle, _) = make_room(config, 2);
        let room_id = room.room_id();
        let reporter = Arc::new(RecordingReporter {
            calls: PlMutex::new(Vec::new()),
        });

        let task = tokio::spawn(room.run(reporter.clone()));
        handle.stop();
        task.await.unwrap();

        let calls = reporter.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (room_id, 2));
    }
}
