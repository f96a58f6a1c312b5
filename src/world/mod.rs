use crate::prelude::*;

pub mod draw;
pub mod map;

use draw::{fair_share, Canvas, DrawHandle, DrawOp, DrawSummary};
pub use map::{Map, Origin, PendingUpdate};

/// What one tick did to a world.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Queued updates applied.
    pub applied: u32,
    /// Blocks placed by draw operations.
    pub drawn: u32,
    pub finished: Vec<DrawSummary>,
    pub unloaded: bool,
}

// A loaded world and its block history.
//
// Only the tick driver touches the map; anybody may queue updates, which wait
// in the map's queue until the next tick applies them within its budget.
// Every applied update is offered to the change log and broadcast to everyone
// in the world except whoever made it.
//
// While a world is flushing (its whole map is being replaced), updates are
// applied silently and every client gets the full level once the queue is
// empty again.
#[derive(Debug)]
pub struct World {
    id: usize,
    name: String,
    dims: V3<i32>,
    map: Option<Map>,
    log: Arc<ChangeLog>,
    flushing: bool,
    pending_unload: bool,
    out_of_bounds: u64,
    next_draw_id: u64,
}

impl World {
    pub fn new(id: usize, name: &str, map: Map, log: Arc<ChangeLog>) -> Self {
        Self {
            id,
            name: name.to_owned(),
            dims: map.dims(),
            map: Some(map),
            log,
            flushing: false,
            pending_unload: false,
            out_of_bounds: 0,
            next_draw_id: 1,
        }
    }
    pub fn id(&self) -> usize {
        self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn log(&self) -> &Arc<ChangeLog> {
        &self.log
    }
    /// Size of the map, remembered while it is unloaded.
    pub fn dims(&self) -> V3<i32> {
        self.dims
    }
    pub fn map(&self) -> Option<&Map> {
        self.map.as_ref()
    }
    pub fn is_flushing(&self) -> bool {
        self.flushing
    }
    /// Updates thrown away because they fell outside the map.
    pub fn out_of_bounds(&self) -> u64 {
        self.out_of_bounds
    }

    /// Queues a block edit for the next tick. Returns `false` if the map is
    /// not loaded.
    pub fn queue_update(&self, update: PendingUpdate) -> bool {
        match &self.map {
            Some(map) => {
                map.queue_update(update);
                true
            }
            None => false,
        }
    }

    /// Adds a draw operation built with the next free id.
    pub fn start_draw(&mut self, build: impl FnOnce(u64) -> DrawOp) -> Option<DrawHandle> {
        let map = self.map.as_mut()?;
        let op = build(self.next_draw_id);
        self.next_draw_id += 1;
        log::info!("{}: started draw #{} for {:?}", self.name, op.id(), op.origin().player);
        let handle = op.handle();
        map.draw_ops.push(op);
        Some(handle)
    }

    /// Cancels every draw operation `player` started; returns how many.
    pub fn cancel_draws(&self, player: PlayerId) -> usize {
        let Some(map) = &self.map else { return 0 };
        let mut cancelled = 0;
        for op in map.draw_ops().iter().filter(|op| op.origin().player == player) {
            op.handle().cancel();
            cancelled += 1;
        }
        cancelled
    }

    /// Client ids are reused, so operations started by a client that left
    /// must not report to whoever gets its slot next.
    pub fn forget_client(&mut self, client: usize) {
        if let Some(map) = &mut self.map {
            for op in map.draw_ops.iter_mut().filter(|op| op.origin().client == Some(client)) {
                op.detach_client();
            }
        }
    }

    pub fn begin_flush(&mut self) {
        self.flushing = true;
    }

    /// Unloads the map at the end of the first tick that changes nothing.
    pub fn request_unload(&mut self) {
        self.pending_unload = true;
    }

    /// Puts a map back after an unload, or replaces the loaded one.
    pub fn load(&mut self, map: Map) {
        self.dims = map.dims();
        self.map = Some(map);
        self.pending_unload = false;
    }

    pub fn tick(&mut self, budget: u32, clients: &mut impl Clients) -> TickReport {
        let mut report = TickReport::default();
        if self.map.is_none() {
            return report;
        }
        while report.applied < budget {
            let Some(update) = self.map.as_ref().and_then(Map::next_update) else {
                if self.flushing {
                    self.end_flush(clients);
                }
                break;
            };
            if self.apply(update, clients) {
                report.applied += 1;
            }
        }
        self.run_draw_ops(budget - report.applied, clients, &mut report);

        if report.applied == 0 && report.drawn == 0 && self.pending_unload {
            self.unload();
            report.unloaded = true;
        }
        report
    }

    /// The single path every block change takes.
    fn apply(&mut self, update: PendingUpdate, clients: &mut impl Clients) -> bool {
        let Some(map) = self.map.as_mut() else { return false };
        let Some(old) = map.set(update.pos, update.block) else {
            self.out_of_bounds += 1;
            log::debug!("{}: discarding out of bounds update at {}", self.name, update.pos);
            return false;
        };
        if let Some(pos) = update.pos.to_record() {
            self.log.record_change(update.origin.player, pos, old, update.block);
        }
        if !self.flushing {
            clients.submit(
                Recipients::World { world: self.id, except: update.origin.client },
                Response::SetBlock(update.pos, update.block),
            );
        }
        true
    }

    fn run_draw_ops(&mut self, budget: u32, clients: &mut impl Clients, report: &mut TickReport) {
        let mut ops = match &mut self.map {
            Some(map) if !map.draw_ops.is_empty() => core::mem::take(&mut map.draw_ops),
            _ => return,
        };
        let mut drawn = 0;
        let mut i = 0;
        while i < ops.len() {
            let quota = fair_share(budget - drawn, ops.len() - i);
            drawn += ops[i].draw_batch(quota, &mut WorldCanvas { world: self, clients: &mut *clients });
            if ops[i].is_done() {
                let summary = ops.remove(i).summary();
                log::info!("{}: {summary}", self.name);
                if let Some(client) = summary.origin.client {
                    clients.submit(Recipients::Client(client), Response::Message(summary.to_string()));
                }
                report.finished.push(summary);
            } else {
                i += 1;
            }
        }
        if let Some(map) = &mut self.map {
            map.draw_ops = ops;
        }
        report.drawn = drawn;
    }

    fn end_flush(&mut self, clients: &mut impl Clients) {
        self.flushing = false;
        log::debug!("{}: flush finished, resending level", self.name);
        clients.submit(Recipients::World { world: self.id, except: None }, Response::LevelData());
    }

    // The change log outlives the map and is left to the background flusher.
    fn unload(&mut self) {
        self.map = None;
        self.pending_unload = false;
        log::info!("{}: map unloaded", self.name);
    }
}

struct WorldCanvas<'a, C> {
    world: &'a mut World,
    clients: &'a mut C,
}
impl<C: Clients> Canvas for WorldCanvas<'_, C> {
    fn block_at(&self, pos: V3<i32>) -> Option<Block> {
        self.world.map.as_ref()?.get(pos)
    }
    fn place(&mut self, pos: V3<i32>, block: Block, origin: Origin) {
        self.world.apply(PendingUpdate { pos, block, origin }, self.clients);
    }
}
