//! Bulk edits that are drawn a few blocks at a time over many ticks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::map::Origin;
use crate::types::*;

/// Upper bound on positions visited per block actually drawn, so a batch over
/// a mostly-skipped region still returns in bounded time.
const MAX_VISITS_PER_BLOCK: u64 = 64;

/// What a draw operation does to each position it visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    /// Fill a box with one block.
    Cuboid { block: Block },
    /// Swap one block type for another inside a box.
    Replace { from: Block, to: Block },
    /// A straight line of one block.
    Line { block: Block },
}
impl DrawKind {
    fn name(&self) -> &'static str {
        match self {
            DrawKind::Cuboid { .. } => "cuboid",
            DrawKind::Replace { .. } => "replace",
            DrawKind::Line { .. } => "line",
        }
    }
    /// The block this operation wants at a position currently holding `current`,
    /// or `None` if the position is not part of the operation.
    fn target(&self, current: Block) -> Option<Block> {
        match *self {
            DrawKind::Cuboid { block } | DrawKind::Line { block } => Some(block),
            DrawKind::Replace { from, to } => (current == from).then_some(to),
        }
    }
}

/// What happened to one position of a draw operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Updated,
    Skipped,
    Denied,
}

/// Access a draw operation needs to the world it is drawing into.
pub trait Canvas {
    fn block_at(&self, pos: V3<i32>) -> Option<Block>;
    /// Places a block through the regular update path.
    fn place(&mut self, pos: V3<i32>, block: Block, origin: Origin);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawCounters {
    pub updated: u64,
    pub skipped: u64,
    pub denied: u64,
}

/// Reported once an operation leaves the active set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawSummary {
    pub id: u64,
    pub kind: &'static str,
    pub origin: Origin,
    pub counters: DrawCounters,
    pub cancelled: bool,
}
impl std::fmt::Display for DrawSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} #{} {}: {} blocks updated, {} skipped, {} denied",
            self.kind,
            self.id,
            if self.cancelled { "cancelled" } else { "done" },
            self.counters.updated,
            self.counters.skipped,
            self.counters.denied,
        )
    }
}

/// Cancels a draw operation from anywhere. Checked at the start of each batch.
#[derive(Debug, Clone, Default)]
pub struct DrawHandle(Arc<AtomicBool>);
impl DrawHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct DrawOp {
    id: u64,
    kind: DrawKind,
    origin: Origin,
    may_touch_admincrete: bool,
    positions: Positions,
    counters: DrawCounters,
    cancel: DrawHandle,
    cancelled: bool,
}

impl DrawOp {
    pub fn cuboid(id: u64, a: V3<i32>, b: V3<i32>, block: Block, origin: Origin) -> Self {
        Self::new(id, DrawKind::Cuboid { block }, Positions::region(a, b), origin)
    }
    pub fn replace(id: u64, a: V3<i32>, b: V3<i32>, from: Block, to: Block, origin: Origin) -> Self {
        Self::new(id, DrawKind::Replace { from, to }, Positions::region(a, b), origin)
    }
    pub fn line(id: u64, a: V3<i32>, b: V3<i32>, block: Block, origin: Origin) -> Self {
        Self::new(id, DrawKind::Line { block }, Positions::Line(Line::new(a, b)), origin)
    }
    fn new(id: u64, kind: DrawKind, positions: Positions, origin: Origin) -> Self {
        Self {
            id,
            kind,
            origin,
            may_touch_admincrete: origin.player == PlayerId::CONSOLE,
            positions,
            counters: DrawCounters::default(),
            cancel: DrawHandle::default(),
            cancelled: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn origin(&self) -> Origin {
        self.origin
    }
    pub fn handle(&self) -> DrawHandle {
        self.cancel.clone()
    }
    /// The owner disconnected; keep drawing but report to nobody.
    pub(super) fn detach_client(&mut self) {
        self.origin.client = None;
    }
    pub fn counters(&self) -> DrawCounters {
        self.counters
    }
    /// Positions not visited yet.
    pub fn remaining_work(&self) -> u64 {
        self.positions.remaining()
    }
    pub fn is_done(&self) -> bool {
        self.cancelled || self.positions.remaining() == 0
    }

    /// Draws at most `quota` blocks and returns how many were drawn.
    pub fn draw_batch(&mut self, quota: u32, canvas: &mut impl Canvas) -> u32 {
        if self.cancel.is_cancelled() {
            self.cancelled = true;
            return 0;
        }
        let mut drawn = 0;
        let mut visits_left = (quota as u64).saturating_mul(MAX_VISITS_PER_BLOCK);
        while drawn < quota && visits_left > 0 {
            let Some(pos) = self.positions.next() else { break };
            visits_left -= 1;
            match self.draw_one(pos, canvas) {
                Some(Placement::Updated) => {
                    self.counters.updated += 1;
                    drawn += 1;
                }
                Some(Placement::Skipped) => self.counters.skipped += 1,
                Some(Placement::Denied) => self.counters.denied += 1,
                None => {}
            }
        }
        drawn
    }

    fn draw_one(&self, pos: V3<i32>, canvas: &mut impl Canvas) -> Option<Placement> {
        let Some(current) = canvas.block_at(pos) else {
            return Some(Placement::Skipped);
        };
        let target = self.kind.target(current)?;
        if current == target {
            return Some(Placement::Skipped);
        }
        if !self.may_touch_admincrete && (current == Block::ADMINCRETE || target == Block::ADMINCRETE) {
            return Some(Placement::Denied);
        }
        canvas.place(pos, target, self.origin);
        Some(Placement::Updated)
    }

    pub fn summary(&self) -> DrawSummary {
        DrawSummary {
            id: self.id,
            kind: self.kind.name(),
            origin: self.origin,
            counters: self.counters,
            cancelled: self.cancelled,
        }
    }
}

/// The share of `budget` the next of `ops_left` operations may draw.
pub fn fair_share(budget: u32, ops_left: usize) -> u32 {
    if ops_left == 0 {
        0
    } else {
        budget / ops_left as u32
    }
}

#[derive(Debug)]
enum Positions {
    Region {
        min: V3<i32>,
        max: V3<i32>,
        next: V3<i32>,
        remaining: u64,
    },
    Line(Line),
}
impl Positions {
    fn region(a: V3<i32>, b: V3<i32>) -> Self {
        let (min, max) = (a.min(b), a.max(b));
        let span = |lo: i32, hi: i32| (hi as i64 - lo as i64 + 1) as u64;
        Positions::Region {
            min,
            max,
            next: min,
            remaining: span(min.x, max.x).saturating_mul(span(min.y, max.y)).saturating_mul(span(min.z, max.z)),
        }
    }
    fn remaining(&self) -> u64 {
        match self {
            Positions::Region { remaining, .. } => *remaining,
            Positions::Line(line) => line.remaining,
        }
    }
}
impl Iterator for Positions {
    type Item = V3<i32>;
    fn next(&mut self) -> Option<V3<i32>> {
        match self {
            Positions::Region { min, max, next, remaining } => {
                if *remaining == 0 {
                    return None;
                }
                *remaining -= 1;
                let current = *next;
                if next.x < max.x {
                    next.x += 1;
                } else if next.y < max.y {
                    next.x = min.x;
                    next.y += 1;
                } else if next.z < max.z {
                    next.x = min.x;
                    next.y = min.y;
                    next.z += 1;
                }
                Some(current)
            }
            Positions::Line(line) => line.next(),
        }
    }
}

/// 3-D Bresenham line, both ends included. Works in `i64` so any two `i32`
/// endpoints are fine.
#[derive(Debug)]
struct Line {
    current: [i64; 3],
    step: [i64; 3],
    delta: [i64; 3],
    error: [i64; 3],
    major: usize,
    remaining: u64,
}
impl Line {
    fn new(start: V3<i32>, end: V3<i32>) -> Self {
        let start = [start.x as i64, start.y as i64, start.z as i64];
        let end = [end.x as i64, end.y as i64, end.z as i64];
        let delta = [0, 1, 2].map(|a| (end[a] - start[a]).abs());
        let major = (0..3).max_by_key(|&a| delta[a]).unwrap_or(0);
        let length = delta[major];
        Self {
            current: start,
            step: [0, 1, 2].map(|a| (end[a] - start[a]).signum()),
            delta,
            error: [length / 2; 3],
            major,
            remaining: length as u64 + 1,
        }
    }
}
impl Iterator for Line {
    type Item = V3<i32>;
    fn next(&mut self) -> Option<V3<i32>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let [x, y, z] = self.current;
        let length = self.delta[self.major];
        for axis in 0..3 {
            if axis == self.major {
                continue;
            }
            self.error[axis] -= self.delta[axis];
            if self.error[axis] < 0 {
                self.error[axis] += length;
                self.current[axis] += self.step[axis];
            }
        }
        self.current[self.major] += self.step[self.major];
        Some(V3(x as i32, y as i32, z as i32))
    }
}
