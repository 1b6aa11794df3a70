//! Path requests.
//!
//! The simulation asks a [`PathProvider`] for waypoints whenever a unit
//! starts a move. Providers may answer immediately, report
//! [`PathResult::Pending`] (the unit keeps `Moving` with an empty path and
//! asks again next tick) or fail (the move command is dropped).
//!
//! Two providers ship with the core:
//! - [`DirectPathProvider`] walks straight to the target
//! - [`GridPathProvider`] runs A* over a walkability grid

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::components::Unit;
use crate::math::{tile_center, world_to_grid, Point3, Tile};

/// Answer to a path request.
#[derive(Debug, Clone, PartialEq)]
pub enum PathResult {
    /// Waypoints to follow, ending at (or next to) the target.
    Ready(Vec<Point3>),
    /// Not computed yet; ask again later.
    Pending,
    /// No route exists.
    Failed(String),
}

/// Source of unit paths.
pub trait PathProvider: std::fmt::Debug + Send + Sync {
    /// Compute (or poll for) a path for `unit` to `target`.
    fn request_path(&mut self, unit: &Unit, target: Point3) -> PathResult;
}

/// Straight line to the target.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectPathProvider;

impl PathProvider for DirectPathProvider {
    fn request_path(&mut self, _unit: &Unit, target: Point3) -> PathResult {
        PathResult::Ready(vec![target])
    }
}

/// Walkability grid for [`GridPathProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavGrid {
    width: u32,
    height: u32,
    walkable: Vec<bool>,
}

impl NavGrid {
    /// Grid with every cell walkable.
    #[must_use]
    pub fn open(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            walkable: vec![true; (width as usize) * (height as usize)],
        }
    }

    /// Grid built from a per-tile predicate.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut walkable: impl FnMut(u32, u32) -> bool) -> Self {
        let mut grid = Self::open(width, height);
        for y in 0..height {
            for x in 0..width {
                grid.set_walkable(x, y, walkable(x, y));
            }
        }
        grid
    }

    /// Grid width in tiles.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in tiles.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| (y as usize) * (self.width as usize) + x as usize)
    }

    /// Set a cell. Out-of-range writes are ignored.
    pub fn set_walkable(&mut self, x: u32, y: u32, walkable: bool) {
        if let Some(i) = self.index(x, y) {
            self.walkable[i] = walkable;
        }
    }

    /// Whether a tile is inside the grid and passable.
    #[must_use]
    pub fn is_walkable(&self, tile: Tile) -> bool {
        if tile.x < 0 || tile.y < 0 {
            return false;
        }
        self.index(tile.x as u32, tile.y as u32)
            .is_some_and(|i| self.walkable[i])
    }
}

/// A* over a [`NavGrid`] with 8-way movement and no corner cutting.
#[derive(Debug, Clone)]
pub struct GridPathProvider {
    grid: NavGrid,
}

impl GridPathProvider {
    /// Provider over `grid`.
    #[must_use]
    pub fn new(grid: NavGrid) -> Self {
        Self { grid }
    }

    /// The grid being searched.
    #[must_use]
    pub fn grid(&self) -> &NavGrid {
        &self.grid
    }
}

impl PathProvider for GridPathProvider {
    fn request_path(&mut self, unit: &Unit, target: Point3) -> PathResult {
        let start = unit.grid_pos().tile;
        let goal = world_to_grid(target).tile;
        if !self.grid.is_walkable(goal) {
            return PathResult::Failed(format!("goal ({}, {}) is blocked", goal.x, goal.y));
        }
        if start == goal {
            return PathResult::Ready(vec![target]);
        }
        match find_path(&self.grid, start, goal) {
            Some(tiles) => {
                let mut waypoints: Vec<Point3> = smooth_path(&self.grid, tiles)
                    .into_iter()
                    .skip(1)
                    .map(tile_center)
                    .collect();
                // Finish on the exact target rather than the tile centre.
                waypoints.pop();
                waypoints.push(target);
                PathResult::Ready(waypoints)
            }
            None => PathResult::Failed(format!(
                "no path from ({}, {}) to ({}, {})",
                start.x, start.y, goal.x, goal.y
            )),
        }
    }
}

// ============================================================================
// A*
// ============================================================================

const CARDINAL_COST: u32 = 10;
const DIAGONAL_COST: u32 = 14;

const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct OpenNode {
    tile: Tile,
    f_score: u32,
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on f, then lower coordinates first for determinism.
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.tile.cmp(&self.tile))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn octile(a: Tile, b: Tile) -> u32 {
    let dx = a.x.abs_diff(b.x);
    let dy = a.y.abs_diff(b.y);
    CARDINAL_COST * dx.max(dy) + (DIAGONAL_COST - CARDINAL_COST) * dx.min(dy)
}

/// Tile route from `start` to `goal` inclusive, or `None` if unreachable.
#[must_use]
pub fn find_path(grid: &NavGrid, start: Tile, goal: Tile) -> Option<Vec<Tile>> {
    if !grid.is_walkable(goal) {
        return None;
    }
    let mut open = BinaryHeap::new();
    let mut came_from: HashMap<Tile, Tile> = HashMap::new();
    let mut g_score: HashMap<Tile, u32> = HashMap::new();

    g_score.insert(start, 0);
    open.push(OpenNode {
        tile: start,
        f_score: octile(start, goal),
    });

    while let Some(current) = open.pop() {
        if current.tile == goal {
            let mut path = vec![goal];
            let mut cursor = goal;
            while let Some(&prev) = came_from.get(&cursor) {
                path.push(prev);
                cursor = prev;
            }
            path.reverse();
            return Some(path);
        }
        let current_g = g_score.get(&current.tile).copied().unwrap_or(u32::MAX);

        for &(dx, dy) in &DIRECTIONS {
            let next = Tile::new(current.tile.x + dx, current.tile.y + dy);
            if !grid.is_walkable(next) {
                continue;
            }
            let diagonal = dx != 0 && dy != 0;
            if diagonal
                && !(grid.is_walkable(Tile::new(current.tile.x + dx, current.tile.y))
                    && grid.is_walkable(Tile::new(current.tile.x, current.tile.y + dy)))
            {
                continue;
            }
            let tentative = current_g.saturating_add(if diagonal {
                DIAGONAL_COST
            } else {
                CARDINAL_COST
            });
            if tentative < g_score.get(&next).copied().unwrap_or(u32::MAX) {
                came_from.insert(next, current.tile);
                g_score.insert(next, tentative);
                open.push(OpenNode {
                    tile: next,
                    f_score: tentative + octile(next, goal),
                });
            }
        }
    }
    None
}

/// Drop waypoints that are visible from an earlier one.
#[must_use]
pub fn smooth_path(grid: &NavGrid, path: Vec<Tile>) -> Vec<Tile> {
    if path.len() <= 2 {
        return path;
    }
    let mut smoothed = vec![path[0]];
    let mut current = 0;
    while current < path.len() - 1 {
        let mut furthest = current + 1;
        for candidate in (current + 2)..path.len() {
            if has_line_of_sight(grid, path[current], path[candidate]) {
                furthest = candidate;
            }
        }
        smoothed.push(path[furthest]);
        current = furthest;
    }
    smoothed
}

fn has_line_of_sight(grid: &NavGrid, from: Tile, to: Tile) -> bool {
    let dx = (to.x - from.x).abs();
    let dy = (to.y - from.y).abs();
    let sx = if from.x < to.x { 1 } else { -1 };
    let sy = if from.y < to.y { 1 } else { -1 };
    let mut err = dx - dy;
    let (mut x, mut y) = (from.x, from.y);
    loop {
        if !grid.is_walkable(Tile::new(x, y)) {
            return false;
        }
        if x == to.x && y == to.y {
            return true;
        }
        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }
}
