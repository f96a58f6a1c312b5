use crossbeam::queue::SegQueue;

use super::draw::DrawOp;
use crate::error::{Error, Result};
use crate::types::*;

/// Who caused a block update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub player: PlayerId,
    /// The connection that sent it. That client already shows the change and
    /// is skipped when broadcasting.
    pub client: Option<usize>,
}
impl Origin {
    pub const CONSOLE: Origin = Origin { player: PlayerId::CONSOLE, client: None };
}

/// A block edit waiting for the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingUpdate {
    pub pos: V3<i32>,
    pub block: Block,
    pub origin: Origin,
}

/// The blocks of a loaded world, the queue of edits not yet applied to them,
/// and the bulk edits in progress.
///
/// `x` and `y` are horizontal, `z` is height. Blocks are stored `x`-fastest,
/// then `y`, then `z`.
#[derive(Debug)]
pub struct Map {
    dims: V3<i32>,
    blocks: Box<[u8]>,
    queue: SegQueue<PendingUpdate>,
    pub(super) draw_ops: Vec<DrawOp>,
}

/// Largest number of blocks in one map. Level data carries the block count
/// as a 32-bit length.
pub const MAX_VOLUME: usize = 1 << 30;

impl Map {
    /// An all-air map. Every dimension must be in `1..=i16::MAX` so that all
    /// coordinates fit in a change record, and the volume at most
    /// [`MAX_VOLUME`].
    pub fn empty(dims: V3<i32>) -> Result<Self> {
        let valid = 1..=i16::MAX as i32;
        if !(valid.contains(&dims.x) && valid.contains(&dims.y) && valid.contains(&dims.z)) {
            return Err(Error::InvalidWorld(format!("map dimensions {dims} out of range")));
        }
        let volume = dims.x as usize * dims.y as usize * dims.z as usize;
        if volume > MAX_VOLUME {
            return Err(Error::InvalidWorld(format!("map of {volume} blocks is too large")));
        }
        Ok(Self {
            dims,
            blocks: vec![Block::AIR.0; volume].into_boxed_slice(),
            queue: SegQueue::new(),
            draw_ops: vec![],
        })
    }

    /// Dirt up to half height, topped with grass.
    pub fn flatgrass(dims: V3<i32>) -> Result<Self> {
        let mut map = Self::empty(dims)?;
        let ground = dims.z / 2;
        let layer = dims.x as usize * dims.y as usize;
        for z in 0..ground {
            let block = if z == ground - 1 { Block::GRASS } else { Block::DIRT };
            let start = z as usize * layer;
            map.blocks[start..start + layer].fill(block.0);
        }
        Ok(map)
    }

    pub fn dims(&self) -> V3<i32> {
        self.dims
    }

    pub fn blocks(&self) -> &[u8] {
        &self.blocks
    }

    pub fn in_bounds(&self, pos: V3<i32>) -> bool {
        (0..self.dims.x).contains(&pos.x) && (0..self.dims.y).contains(&pos.y) && (0..self.dims.z).contains(&pos.z)
    }

    /// The part of the box between corners `a` and `b` that lies inside the
    /// map, as `(min, max)` corners, or `None` if they don't overlap.
    pub fn clip(&self, a: V3<i32>, b: V3<i32>) -> Option<(V3<i32>, V3<i32>)> {
        let min = a.min(b).max(V3(0, 0, 0));
        let max = a.max(b).min(V3(self.dims.x - 1, self.dims.y - 1, self.dims.z - 1));
        (min.x <= max.x && min.y <= max.y && min.z <= max.z).then_some((min, max))
    }

    fn index(&self, pos: V3<i32>) -> Option<usize> {
        self.in_bounds(pos).then(|| {
            ((pos.z as usize * self.dims.y as usize) + pos.y as usize) * self.dims.x as usize + pos.x as usize
        })
    }

    pub fn get(&self, pos: V3<i32>) -> Option<Block> {
        self.index(pos).map(|i| Block(self.blocks[i]))
    }

    /// Overwrites a block and returns what was there, or `None` if `pos` is
    /// outside the map.
    pub fn set(&mut self, pos: V3<i32>, block: Block) -> Option<Block> {
        let i = self.index(pos)?;
        Some(Block(core::mem::replace(&mut self.blocks[i], block.0)))
    }

    /// Safe to call from any thread.
    pub fn queue_update(&self, update: PendingUpdate) {
        self.queue.push(update);
    }

    pub(super) fn next_update(&self) -> Option<PendingUpdate> {
        self.queue.pop()
    }

    pub fn pending_updates(&self) -> usize {
        self.queue.len()
    }

    pub fn draw_ops(&self) -> &[DrawOp] {
        &self.draw_ops
    }
}
