//  Copyright 2024 bpcache Project Authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! Per-interface cache root.

use std::collections::BTreeMap;
use std::sync::Arc;

use bpcache_common::{CacheConfig, Eid};
use slotmap::SlotMap;
use tracing::{debug, instrument};

use crate::entry::{Entry, EntryHandle, PrimaryList};
use crate::list::{self, DestSlot, DestSlotRef, HashSlot, HashSlotRef, PrimarySlot, TimeSlot, TimeSlotRef};
use crate::queue::{Queue, QueueHandle};
use bpcache_common::{CacheError, Metrics, Result};

/// Per-interface cache root: three tree roots, two lists, this-node
/// address, the DACS sequence counter, and the action-time watermark.
pub struct CacheState {
    pub(crate) entries: SlotMap<EntryHandle, Entry>,

    queues_hash: SlotMap<QueueHandle, Queue<u32>>,
    queues_dest: SlotMap<QueueHandle, Queue<u32>>,
    queues_time: SlotMap<QueueHandle, Queue<u64>>,

    pub(crate) hash_index: BTreeMap<u32, QueueHandle>,
    pub(crate) dest_eid_index: BTreeMap<u32, QueueHandle>,
    pub(crate) time_index: BTreeMap<u64, QueueHandle>,

    pub(crate) pending_list: list::ListHead<EntryHandle>,
    pub(crate) idle_list: list::ListHead<EntryHandle>,

    pub self_addr: Eid,
    pub generated_dacs_seq: u64,
    pub action_time: u64,

    pub config: CacheConfig,
    pub metrics: Arc<Metrics>,
}

/// Summary returned by [`CacheState::debug_stats`]: a diagnostic snapshot of
/// list and index sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugStats {
    pub pending_len: usize,
    pub idle_len: usize,
    pub hash_index_len: usize,
    pub dest_index_len: usize,
    pub time_index_len: usize,
    pub entry_count: usize,
}

impl CacheState {
    pub fn new(self_addr: Eid, config: CacheConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            entries: SlotMap::with_key(),
            queues_hash: SlotMap::with_key(),
            queues_dest: SlotMap::with_key(),
            queues_time: SlotMap::with_key(),
            hash_index: BTreeMap::new(),
            dest_eid_index: BTreeMap::new(),
            time_index: BTreeMap::new(),
            pending_list: list::ListHead::default(),
            idle_list: list::ListHead::default(),
            self_addr,
            generated_dacs_seq: 0,
            action_time: 0,
            config,
            metrics,
        }
    }

    /// Allocates a new entry in the arena. Fails with `OutOfMemory` once the
    /// arena is at `config.arena_capacity` — the safe-Rust stand-in for a
    /// pool's fixed block count.
    pub(crate) fn alloc_entry(&mut self, entry: Entry) -> Result<EntryHandle> {
        if self.entries.len() >= self.config.arena_capacity {
            return Err(CacheError::OutOfMemory);
        }
        Ok(self.entries.insert(entry))
    }

    /// Destroys an entry: removes it from all three indices and whichever
    /// primary list it is in, then frees its arena slot.
    #[instrument(level = "debug", skip(self))]
    pub(crate) fn destroy_entry(&mut self, h: EntryHandle) {
        self.remove_from_hash_index(h);
        self.remove_from_time_index(h);
        self.remove_from_dest_index(h);
        self.remove_from_primary_list(h);
        self.entries.remove(h);
        debug!("entry destroyed");
    }

    // ---- primary list (pending_list / idle_list) -----------------------

    pub(crate) fn move_to_pending(&mut self, h: EntryHandle) {
        self.remove_from_primary_list(h);
        list::push_back(&mut PrimarySlot(&mut self.entries), &mut self.pending_list, h);
        self.entries[h].primary_membership = Some(PrimaryList::Pending);
    }

    pub(crate) fn move_to_idle(&mut self, h: EntryHandle) {
        self.remove_from_primary_list(h);
        list::push_back(&mut PrimarySlot(&mut self.entries), &mut self.idle_list, h);
        self.entries[h].primary_membership = Some(PrimaryList::Idle);
    }

    pub(crate) fn remove_from_primary_list(&mut self, h: EntryHandle) {
        match self.entries[h].primary_membership.take() {
            Some(PrimaryList::Pending) => list::extract(&mut PrimarySlot(&mut self.entries), &mut self.pending_list, h),
            Some(PrimaryList::Idle) => list::extract(&mut PrimarySlot(&mut self.entries), &mut self.idle_list, h),
            None => {}
        }
    }

    // ---- hash_index ------------------------------------------------------

    pub(crate) fn add_to_hash_index(&mut self, key: u32, h: EntryHandle) {
        let qh = match self.hash_index.get(&key).copied() {
            Some(qh) => qh,
            None => {
                let qh = self.queues_hash.insert(Queue::new(key));
                self.hash_index.insert(key, qh);
                qh
            }
        };
        list::push_back(&mut HashSlot(&mut self.entries), &mut self.queues_hash[qh].entries, h);
        self.entries[h].hash_queue = Some(qh);
    }

    pub(crate) fn remove_from_hash_index(&mut self, h: EntryHandle) {
        let Some(qh) = self.entries[h].hash_queue.take() else { return };
        list::extract(&mut HashSlot(&mut self.entries), &mut self.queues_hash[qh].entries, h);
        if self.queues_hash[qh].entries.is_empty() {
            let key = self.queues_hash[qh].key;
            self.queues_hash.remove(qh);
            self.hash_index.remove(&key);
        }
    }

    /// Snapshot of the entries sharing hash-fingerprint `key`, in insertion
    /// (FIFO) order. Empty if no Queue exists for `key`.
    pub(crate) fn hash_bucket(&self, key: u32) -> Vec<EntryHandle> {
        match self.hash_index.get(&key) {
            Some(&qh) => list::snapshot(&HashSlotRef(&self.entries), &self.queues_hash[qh].entries),
            None => Vec::new(),
        }
    }

    // ---- dest_eid_index ----------------------------------------------------

    pub(crate) fn add_to_dest_index(&mut self, key: u32, h: EntryHandle) {
        let qh = match self.dest_eid_index.get(&key).copied() {
            Some(qh) => qh,
            None => {
                let qh = self.queues_dest.insert(Queue::new(key));
                self.dest_eid_index.insert(key, qh);
                qh
            }
        };
        list::push_back(&mut DestSlot(&mut self.entries), &mut self.queues_dest[qh].entries, h);
        self.entries[h].dest_queue = Some(qh);
    }

    pub(crate) fn remove_from_dest_index(&mut self, h: EntryHandle) {
        let Some(qh) = self.entries[h].dest_queue.take() else { return };
        list::extract(&mut DestSlot(&mut self.entries), &mut self.queues_dest[qh].entries, h);
        if self.queues_dest[qh].entries.is_empty() {
            let key = self.queues_dest[qh].key;
            self.queues_dest.remove(qh);
            self.dest_eid_index.remove(&key);
        }
    }

    // ---- time_index ----------------------------------------------------
    //
    // Keyed by u64 (absolute millisecond timestamp) rather than u32, since a
    // 32-bit millisecond clock wraps in about 49 days of uptime.

    pub(crate) fn add_to_time_index(&mut self, key: u64, h: EntryHandle) {
        let qh = match self.time_index.get(&key).copied() {
            Some(qh) => qh,
            None => {
                let qh = self.queues_time.insert(Queue::new(key));
                self.time_index.insert(key, qh);
                qh
            }
        };
        list::push_back(&mut TimeSlot(&mut self.entries), &mut self.queues_time[qh].entries, h);
        self.entries[h].time_queue = Some(qh);
    }

    pub(crate) fn remove_from_time_index(&mut self, h: EntryHandle) {
        let Some(qh) = self.entries[h].time_queue.take() else { return };
        list::extract(&mut TimeSlot(&mut self.entries), &mut self.queues_time[qh].entries, h);
        if self.queues_time[qh].entries.is_empty() {
            let key = self.queues_time[qh].key;
            self.queues_time.remove(qh);
            self.time_index.remove(&key);
        }
    }

    /// The largest time_index key `<= now`, walking downward — the order
    /// `do_poll` visits deadlines in.
    pub(crate) fn time_keys_at_most(&self, now: u64) -> Vec<u64> {
        self.time_index.range(..=now).rev().map(|(k, _)| *k).collect()
    }

    pub(crate) fn time_bucket_entries(&self, key: u64) -> Vec<EntryHandle> {
        match self.time_index.get(&key) {
            Some(&qh) => list::snapshot(&TimeSlotRef(&self.entries), &self.queues_time[qh].entries),
            None => Vec::new(),
        }
    }

    /// Dest keys `>= dest` whose value, masked, still equals `dest`
    /// (`do_route_up`), in ascending order.
    pub(crate) fn dest_keys_from(&self, dest: u32, mask: u32) -> Vec<u32> {
        self.dest_eid_index
            .range(dest..)
            .take_while(|(k, _)| (**k & mask) == dest)
            .map(|(k, _)| *k)
            .collect()
    }

    pub(crate) fn dest_bucket_entries(&self, key: u32) -> Vec<EntryHandle> {
        match self.dest_eid_index.get(&key) {
            Some(&qh) => list::snapshot(&DestSlotRef(&self.entries), &self.queues_dest[qh].entries),
            None => Vec::new(),
        }
    }

    /// Every Queue in a tree has a non-empty list, and every non-empty list
    /// has exactly one Queue in the tree. Exposed for tests.
    #[cfg(test)]
    pub(crate) fn check_queue_lifecycle_invariant(&self) -> bool {
        self.queues_hash.values().all(|q| !q.entries.is_empty())
            && self.queues_dest.values().all(|q| !q.entries.is_empty())
            && self.queues_time.values().all(|q| !q.entries.is_empty())
            && self.hash_index.len() == self.queues_hash.len()
            && self.dest_eid_index.len() == self.queues_dest.len()
            && self.time_index.len() == self.queues_time.len()
    }

    /// An entry is in at most one of pending_list/idle_list. Always true by
    /// construction (`remove_from_primary_list` is called before any
    /// `move_to_*`), kept as an explicit check for tests.
    #[cfg(test)]
    pub(crate) fn check_single_list_invariant(&self) -> bool {
        use std::collections::HashSet;

        use crate::list::PrimarySlotRef;

        let pending: HashSet<_> = list::snapshot(&PrimarySlotRef(&self.entries), &self.pending_list).into_iter().collect();
        let idle: HashSet<_> = list::snapshot(&PrimarySlotRef(&self.entries), &self.idle_list).into_iter().collect();
        pending.is_disjoint(&idle)
    }

    pub fn debug_stats(&self) -> DebugStats {
        DebugStats {
            pending_len: self.pending_list.len(),
            idle_len: self.idle_list.len(),
            hash_index_len: self.hash_index.len(),
            dest_index_len: self.dest_eid_index.len(),
            time_index_len: self.time_index.len(),
            entry_count: self.entries.len(),
        }
    }

    /// Teardown precondition: refused (asserted) unless every index and
    /// both lists are empty.
    pub fn assert_empty_for_teardown(&self) {
        assert!(self.hash_index.is_empty(), "hash_index not empty at teardown");
        assert!(self.dest_eid_index.is_empty(), "dest_eid_index not empty at teardown");
        assert!(self.time_index.is_empty(), "time_index not empty at teardown");
        assert!(self.pending_list.is_empty(), "pending_list not empty at teardown");
        assert!(self.idle_list.is_empty(), "idle_list not empty at teardown");
    }
}
