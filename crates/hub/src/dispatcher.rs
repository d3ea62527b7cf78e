//! Cross-block dispatcher: serializes access to the shared irrigation main.
//!
//! Blocks wait in a FIFO queue (no duplicates) fed by schedule triggers and
//! operator requests. Admission starts the queue head only when no block is
//! watering, at most once per tick. The busy flag is always recomputed from
//! the block table, never cached.

use std::collections::{HashMap, VecDeque};
use time::{Date, PrimitiveDateTime};
use tracing::{debug, info, warn};

use crate::block::{Block, BlockId, Status};
use crate::config::SimulationConfig;
use crate::fertigation;
use crate::volume::{volume_for_valve, Valve};

/// Wall-clock minute a schedule entry fired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Minute {
    date: Date,
    hour: u8,
    minute: u8,
}

impl From<PrimitiveDateTime> for Minute {
    fn from(t: PrimitiveDateTime) -> Self {
        Self {
            date: t.date(),
            hour: t.hour(),
            minute: t.minute(),
        }
    }
}

/// A schedule entry that matched the current minute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleTrigger {
    pub block: BlockId,
    pub entry: String,
    pub minute: Minute,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Promotion {
    pub block: BlockId,
    pub volume_a: f64,
    pub volume_b: f64,
}

/// True iff some block is drawing from the main line.
pub fn global_busy(blocks: &[Block]) -> bool {
    blocks.iter().any(|b| b.fertigation.status.is_active())
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    queue: VecDeque<BlockId>,
    fired: HashMap<(BlockId, String), Minute>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self) -> impl Iterator<Item = &BlockId> {
        self.queue.iter()
    }

    pub fn position(&self, id: &BlockId) -> Option<usize> {
        self.queue.iter().position(|q| q == id)
    }

    /// Append `ids` at the tail in order. Unknown, already queued and active
    /// blocks are skipped. Returns the ids actually added.
    pub fn enqueue<I>(&mut self, ids: I, blocks: &[Block]) -> Vec<BlockId>
    where
        I: IntoIterator<Item = BlockId>,
    {
        let mut added = Vec::new();
        for id in ids {
            let Some(block) = blocks.iter().find(|b| b.id == id) else {
                debug!(block = %id, "enqueue: unknown block ignored");
                continue;
            };
            if block.fertigation.status.is_active() || self.position(&id).is_some() {
                continue;
            }
            self.queue.push_back(id.clone());
            added.push(id);
        }
        added
    }

    /// Remove a waiting block. False if it was not queued.
    pub fn dequeue(&mut self, id: &BlockId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|q| q != id);
        self.queue.len() != before
    }

    /// Drop every trace of a block that left the fleet.
    pub fn forget(&mut self, id: &BlockId) {
        self.dequeue(id);
        self.fired.retain(|(block, _), _| block != id);
    }

    /// Enqueue blocks whose schedule fired this minute for the first time.
    pub fn record_triggers(
        &mut self,
        triggers: Vec<ScheduleTrigger>,
        blocks: &[Block],
    ) -> Vec<BlockId> {
        let mut due = Vec::new();
        for t in triggers {
            let key = (t.block.clone(), t.entry.clone());
            if self.fired.get(&key) == Some(&t.minute) {
                continue;
            }
            self.fired.insert(key, t.minute);
            info!(block = %t.block, entry = %t.entry, "schedule triggered");
            if !due.contains(&t.block) {
                due.push(t.block);
            }
        }
        self.enqueue(due, blocks)
    }

    /// Start the queue head if the main line is free. Stale heads (blocks no
    /// longer in the fleet) are discarded on the way.
    pub fn admit(&mut self, blocks: &mut [Block], sim: &SimulationConfig) -> Option<Promotion> {
        if global_busy(blocks) {
            return None;
        }
        while let Some(id) = self.queue.pop_front() {
            let Some(block) = blocks.iter_mut().find(|b| b.id == id) else {
                warn!(block = %id, "dispatcher: queued block no longer exists, skipping");
                continue;
            };
            if block.fertigation.status != Status::Idle {
                warn!(block = %id, status = ?block.fertigation.status, "dispatcher: queued block not idle, skipping");
                continue;
            }

            let cfg = &block.config.irrigation;
            let volume_a = volume_for_valve(cfg, Valve::A);
            let volume_b = volume_for_valve(cfg, Valve::B);
            if volume_a <= 0.0 && volume_b <= 0.0 {
                info!(block = %id, "dispatcher: nothing to deliver, skipping");
                continue;
            }
            block.fertigation = fertigation::promote(volume_a, volume_b, sim.display_flow_rate);
            fertigation::apply_devices(block.fertigation.status, &mut block.devices);

            info!(
                block = %id,
                volume_a = format!("{volume_a:.1}"),
                volume_b = format!("{volume_b:.1}"),
                "dispatcher: promoted to watering"
            );
            return Some(Promotion {
                block: id,
                volume_a,
                volume_b,
            });
        }
        None
    }
}

// ===========================================================================
// Tests
// ===========================================================================
