//! Deterministic dungeon generation for Warren's maze race.
//!
//! [`Dungeon::generate`] is a pure function: the same `(seed, width,
//! height)` always produces the same layout, so every client and the
//! server can agree on the world from a single shared seed.
//!
//! The pipeline:
//!
//! ```text
//! seeded RNG → place rooms → connect with L-corridors (+ extra cycles)
//!            → flood-fill repair → pick start → BFS-farthest end
//! ```
//!
//! Guarantees (checked, not assumed):
//! - every floor cell is reachable from `start` by 4-directional
//!   floor-only steps;
//! - `end` is reachable from `start`;
//! - degenerate grids still yield a usable 3×3 fallback room.

mod dungeon;
mod generate;

pub use dungeon::{Dungeon, Point, Rect, Tile};
