//! The move-action vocabulary.
//!
//! Clients send whatever their input layer produces — command names,
//! WASD letters, or DOM arrow-key names — and the server folds them all
//! into the four cardinal directions, case-insensitively.

use serde::{Deserialize, Serialize};

/// A cardinal move direction on the dungeon grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Parses a raw action string into a direction.
    ///
    /// Accepted aliases (case-insensitive):
    /// - up: `moveUp`, `w`, `arrowup`
    /// - down: `moveDown`, `s`, `arrowdown`
    /// - left: `moveLeft`, `a`, `arrowleft`
    /// - right: `moveRight`, `d`, `arrowright`
    ///
    /// Anything else returns `None` and the command fails with
    /// `InvalidAction` upstream.
    pub fn parse(action: &str) -> Option<Self> {
        match action.trim().to_ascii_lowercase().as_str() {
            "moveup" | "w" | "arrowup" => Some(Self::Up),
            "movedown" | "s" | "arrowdown" => Some(Self::Down),
            "moveleft" | "a" | "arrowleft" => Some(Self::Left),
            "moveright" | "d" | "arrowright" => Some(Self::Right),
            _ => None,
        }
    }

    /// The grid delta for this direction. Y grows downward.
    pub fn delta(self) -> (i64, i64) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_every_alias_case_insensitively() {
        for alias in ["moveUp", "W", "ArrowUp", "arrowup"] {
            assert_eq!(Direction::parse(alias), Some(Direction::Up), "{alias}");
        }
        for alias in ["moveDown", "s", "ARROWDOWN"] {
            assert_eq!(Direction::parse(alias), Some(Direction::Down), "{alias}");
        }
        for alias in ["moveLeft", "a", "ArrowLeft"] {
            assert_eq!(Direction::parse(alias), Some(Direction::Left), "{alias}");
        }
        for alias in ["moveRight", "D", "arrowright"] {
            assert_eq!(Direction::parse(alias), Some(Direction::Right), "{alias}");
        }
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert_eq!(Direction::parse("  w "), Some(Direction::Up));
    }

    #[test]
    fn test_parse_rejects_unknown_actions() {
        for bad in ["jump", "", "upleft", "move", "q"] {
            assert_eq!(Direction::parse(bad), None, "{bad:?}");
        }
    }

    #[test]
    fn test_delta_matches_grid_orientation() {
        assert_eq!(Direction::Up.delta(), (0, -1));
        assert_eq!(Direction::Down.delta(), (0, 1));
        assert_eq!(Direction::Left.delta(), (-1, 0));
        assert_eq!(Direction::Right.delta(), (1, 0));
    }
}
