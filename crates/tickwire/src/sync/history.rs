use std::collections::VecDeque;

use super::snapshot::SimulationTickSnapshot;
use super::tick::{Tick, TickTime};

/// Bounded, tick-ordered window of sealed snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    snapshots: VecDeque<SimulationTickSnapshot>,
    depth: usize,
}

impl SnapshotHistory {
    pub fn new(depth: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(depth.min(1024)),
            depth,
        }
    }

    /// Appends a snapshot, returning the ones evicted to stay within depth.
    ///
    /// Ticks must be strictly increasing; an out-of-order snapshot is handed back as `Err`.
    pub fn push(
        &mut self,
        snapshot: SimulationTickSnapshot,
    ) -> Result<Vec<SimulationTickSnapshot>, SimulationTickSnapshot> {
        if self.latest().is_some_and(|latest| latest.tick >= snapshot.tick) {
            return Err(snapshot);
        }
        self.snapshots.push_back(snapshot);

        let mut evicted = Vec::new();
        while self.snapshots.len() > self.depth {
            if let Some(oldest) = self.snapshots.pop_front() {
                evicted.push(oldest);
            }
        }
        Ok(evicted)
    }

    pub fn get(&self, tick: Tick) -> Option<&SimulationTickSnapshot> {
        self.index_of(tick).map(|index| &self.snapshots[index])
    }

    /// The retained snapshot captured at `time`.
    pub fn find_by_time(&self, time: TickTime) -> Option<&SimulationTickSnapshot> {
        self.snapshots.iter().find(|s| s.tick_time == time)
    }

    /// Snapshots newer than `tick`, oldest first.
    pub fn after(&self, tick: Tick) -> impl Iterator<Item = &SimulationTickSnapshot> {
        let start = self.snapshots.partition_point(|s| s.tick <= tick);
        self.snapshots.range(start..)
    }

    /// Drops every snapshot up to and including `tick`. Returns how many were dropped.
    pub fn prune_through(&mut self, tick: Tick) -> usize {
        let count = self.snapshots.partition_point(|s| s.tick <= tick);
        self.snapshots.drain(..count);
        count
    }

    pub fn oldest(&self) -> Option<&SimulationTickSnapshot> {
        self.snapshots.front()
    }

    pub fn latest(&self) -> Option<&SimulationTickSnapshot> {
        self.snapshots.back()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    fn index_of(&self, tick: Tick) -> Option<usize> {
        self.snapshots
            .binary_search_by_key(&tick, |s| s.tick)
            .ok()
    }
}
