//! Application state shared across routes

use std::sync::Arc;

use crate::config::{Config, GameConfig};
use crate::game::drops::SupplyDropStore;
use crate::game::results::TracingReporter;
use crate::game::RoomRegistry;
use crate::session::SessionService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub game: Arc<GameConfig>,
    pub registry: Arc<RoomRegistry>,
    pub drops: Arc<SupplyDropStore>,
    pub sessions: Arc<SessionService>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let game = Arc::new(config.game.clone());

        // Registries are constructed here and passed down; nothing in the
        // simulation reaches for globals
        let registry = Arc::new(RoomRegistry::new());
        let drops = Arc::new(SupplyDropStore::new());

        let sessions = Arc::new(SessionService::new(
            game.clone(),
            registry.clone(),
            drops.clone(),
            Arc::new(TracingReporter),
        ));

        Self {
            config,
            game,
            registry,
            drops,
            sessions,
        }
    }
}
