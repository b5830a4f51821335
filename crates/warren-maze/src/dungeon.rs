//! Dungeon storage and queries.
//!
//! The grid is immutable once generated; everything here is read-only
//! except for the `pub(crate)` carving helpers the generator uses.

use std::collections::VecDeque;

/// One grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    Wall,
    Floor,
}

/// A grid coordinate. Y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

impl Point {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// A placed rectangular room. `x`/`y` is the top-left floor cell;
/// `w`/`h` are the floor extents (walls live outside the rect).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

impl Rect {
    /// The center cell (rounded down).
    pub fn center(&self) -> Point {
        Point::new(self.x + self.w / 2, self.y + self.h / 2)
    }

    /// `true` if the cell lies inside the room's floor area.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.x + self.w && p.y >= self.y && p.y < self.y + self.h
    }

    /// `true` if this rect and `other`, each grown by `margin`, overlap.
    /// Used to keep a 1-cell wall between neighbouring rooms.
    pub fn intersects_with_margin(&self, other: &Rect, margin: usize) -> bool {
        let ax0 = self.x.saturating_sub(margin);
        let ay0 = self.y.saturating_sub(margin);
        let ax1 = self.x + self.w + margin;
        let ay1 = self.y + self.h + margin;
        ax0 < other.x + other.w + margin
            && other.x.saturating_sub(margin) < ax1
            && ay0 < other.y + other.h + margin
            && other.y.saturating_sub(margin) < ay1
    }

    /// Interior cells: the floor area minus its outer ring, i.e. cells
    /// not adjacent to the room's walls. Row-major order, so iteration
    /// is deterministic. Empty for rooms thinner than 3 cells.
    pub fn interior(&self) -> impl Iterator<Item = Point> + '_ {
        let (x0, x1) = (self.x + 1, (self.x + self.w).saturating_sub(1));
        let (y0, y1) = (self.y + 1, (self.y + self.h).saturating_sub(1));
        (y0..y1).flat_map(move |y| (x0..x1).map(move |x| Point::new(x, y)))
    }

    /// Squared distance between room centers.
    pub fn center_distance_sq(&self, other: &Rect) -> usize {
        let a = self.center();
        let b = other.center();
        let dx = a.x.abs_diff(b.x);
        let dy = a.y.abs_diff(b.y);
        dx * dx + dy * dy
    }
}

/// A generated maze: grid, rooms, and the race's start and end cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dungeon {
    pub(crate) seed: u64,
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) tiles: Vec<Tile>,
    pub(crate) rooms: Vec<Rect>,
    pub(crate) start: Point,
    pub(crate) end: Point,
}

impl Dungeon {
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn start(&self) -> Point {
        self.start
    }

    pub fn end(&self) -> Point {
        self.end
    }

    /// The placed rooms, in placement order.
    pub fn rooms(&self) -> &[Rect] {
        &self.rooms
    }

    pub fn in_bounds(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height
    }

    /// The tile at `(x, y)`. Out-of-bounds reads as `Wall`, which keeps
    /// neighbour checks uniform at the border.
    pub fn tile(&self, x: usize, y: usize) -> Tile {
        if self.in_bounds(x, y) {
            self.tiles[y * self.width + x]
        } else {
            Tile::Wall
        }
    }

    pub fn is_floor(&self, x: usize, y: usize) -> bool {
        self.tile(x, y) == Tile::Floor
    }

    /// The room containing `p`, if any.
    pub fn room_at(&self, p: Point) -> Option<&Rect> {
        self.rooms.iter().find(|r| r.contains(p))
    }

    /// The grid rendered one string per row: `#` wall, `.` floor.
    /// This is the `map_rows` field of the broadcast payload.
    pub fn map_rows(&self) -> Vec<String> {
        (0..self.height)
            .map(|y| {
                (0..self.width)
                    .map(|x| if self.is_floor(x, y) { '.' } else { '#' })
                    .collect()
            })
            .collect()
    }

    /// BFS distance (4-directional, floor-only) from `from` to every
    /// cell. `None` for walls and unreachable floors.
    pub fn distance_map(&self, from: Point) -> Vec<Option<u32>> {
        let mut dist = vec![None; self.width * self.height];
        if !self.is_floor(from.x, from.y) {
            return dist;
        }
        dist[from.y * self.width + from.x] = Some(0);
        let mut queue = VecDeque::from([from]);
        while let Some(p) = queue.pop_front() {
            let here = match dist[p.y * self.width + p.x] {
                Some(d) => d,
                None => continue,
            };
            for (nx, ny) in self.neighbours(p) {
                let idx = ny * self.width + nx;
                if self.tiles[idx] == Tile::Floor && dist[idx].is_none() {
                    dist[idx] = Some(here + 1);
                    queue.push_back(Point::new(nx, ny));
                }
            }
        }
        dist
    }

    /// `true` if every floor cell is reachable from `from`.
    pub fn fully_connected_from(&self, from: Point) -> bool {
        let dist = self.distance_map(from);
        self.tiles
            .iter()
            .zip(&dist)
            .all(|(tile, d)| *tile == Tile::Wall || d.is_some())
    }

    fn neighbours(&self, p: Point) -> impl Iterator<Item = (usize, usize)> + '_ {
        let (x, y, w, h) = (p.x, p.y, self.width, self.height);
        [
            (x > 0).then(|| (x - 1, y)),
            (x + 1 < w).then(|| (x + 1, y)),
            (y > 0).then(|| (x, y - 1)),
            (y + 1 < h).then(|| (x, y + 1)),
        ]
        .into_iter()
        .flatten()
    }

    // -- carving helpers used by the generator ----------------------------

    pub(crate) fn new_filled(seed: u64, width: usize, height: usize) -> Self {
        Self {
            seed,
            width,
            height,
            tiles: vec![Tile::Wall; width * height],
            rooms: Vec::new(),
            start: Point::new(0, 0),
            end: Point::new(0, 0),
        }
    }

    pub(crate) fn carve(&mut self, x: usize, y: usize) {
        if self.in_bounds(x, y) {
            self.tiles[y * self.width + x] = Tile::Floor;
        }
    }

    pub(crate) fn fill(&mut self, x: usize, y: usize) {
        if self.in_bounds(x, y) {
            self.tiles[y * self.width + x] = Tile::Wall;
        }
    }

    pub(crate) fn carve_room(&mut self, rect: Rect) {
        for y in rect.y..rect.y + rect.h {
            for x in rect.x..rect.x + rect.w {
                self.carve(x, y);
            }
        }
        self.rooms.push(rect);
    }
}
