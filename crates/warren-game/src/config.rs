//! Session configuration.

use std::time::Duration;

/// Tunables for a maze-race session.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Dungeon width in cells (forced odd, minimum 9, by the generator).
    pub width: usize,
    /// Dungeon height in cells.
    pub height: usize,
    /// Movement speed cap. One accepted move per `1 / speed` seconds.
    pub speed_cells_per_sec: f64,
    /// How long clients should show the victory screen before navigating
    /// back to the lobby. Communicated in every terminal snapshot.
    pub return_delay_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: 31,
            height: 21,
            speed_cells_per_sec: 5.0,
            return_delay_ms: 5000,
        }
    }
}

impl GameConfig {
    /// Clamps out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        if !self.speed_cells_per_sec.is_finite() || self.speed_cells_per_sec <= 0.0 {
            self.speed_cells_per_sec = 5.0;
        }
        self.speed_cells_per_sec = self.speed_cells_per_sec.clamp(0.5, 50.0);
        self
    }

    /// Minimum time between two accepted moves for one player.
    pub fn move_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.speed_cells_per_sec)
    }
}
