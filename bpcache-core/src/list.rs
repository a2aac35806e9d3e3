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

//! Intrusive doubly-linked list over arena handles.
//!
//! A C-style pool embeds the link node directly in each block header; a
//! safe reimplementation has no block header to embed a link into, so
//! [`Link`] and [`ListHead`] instead store the arena handles of the
//! neighboring nodes directly. An [`Entry`](crate::entry::Entry) carries
//! four independent [`Link`] fields — one for `pending_list`/`idle_list`
//! membership and one per secondary index — so four small wrapper types
//! below pick out which field a given list operation should read and write.

use slotmap::SlotMap;

use crate::entry::{Entry, EntryHandle};

/// A node's neighbors within one particular list. `None` means unattached.
#[derive(Debug, Clone, Copy)]
pub struct Link<H> {
    pub prev: Option<H>,
    pub next: Option<H>,
}

impl<H> Default for Link<H> {
    fn default() -> Self {
        Self { prev: None, next: None }
    }
}

/// Head/tail/length bookkeeping for one list.
#[derive(Debug, Clone, Copy)]
pub struct ListHead<H> {
    pub head: Option<H>,
    pub tail: Option<H>,
    len: usize,
}

impl<H> Default for ListHead<H> {
    fn default() -> Self {
        Self { head: None, tail: None, len: 0 }
    }
}

impl<H: Copy + Eq> ListHead<H> {
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

/// Read-only access to one of an arena-stored node's link fields. Separated
/// from [`LinkedEntries`] so a pure traversal (`snapshot`) only needs a
/// shared borrow of the arena, not an exclusive one.
pub trait ReadLinks {
    fn link(&self, h: EntryHandle) -> Link<EntryHandle>;
}

/// Selects which of an arena-stored node's link fields a list mutation
/// should use. Implemented by the small wrapper types below, never by
/// application code directly.
pub trait LinkedEntries: ReadLinks {
    fn set_link(&mut self, h: EntryHandle, link: Link<EntryHandle>);
}

macro_rules! entry_link_slot {
    ($name:ident, $name_ref:ident, $field:ident) => {
        pub struct $name<'a>(pub &'a mut SlotMap<EntryHandle, Entry>);

        impl ReadLinks for $name<'_> {
            fn link(&self, h: EntryHandle) -> Link<EntryHandle> {
                self.0[h].$field
            }
        }

        impl LinkedEntries for $name<'_> {
            fn set_link(&mut self, h: EntryHandle, link: Link<EntryHandle>) {
                self.0[h].$field = link;
            }
        }

        /// Shared-borrow counterpart of `$name`, for read-only traversal.
        pub struct $name_ref<'a>(pub &'a SlotMap<EntryHandle, Entry>);

        impl ReadLinks for $name_ref<'_> {
            fn link(&self, h: EntryHandle) -> Link<EntryHandle> {
                self.0[h].$field
            }
        }
    };
}

entry_link_slot!(PrimarySlot, PrimarySlotRef, primary_link);
entry_link_slot!(HashSlot, HashSlotRef, hash_link);
entry_link_slot!(TimeSlot, TimeSlotRef, time_link);
entry_link_slot!(DestSlot, DestSlotRef, destination_link);

/// Appends `h` to the tail of `list` (FIFO order preserved).
pub fn push_back<S: LinkedEntries>(store: &mut S, list: &mut ListHead<EntryHandle>, h: EntryHandle) {
    let prev = list.tail;
    store.set_link(h, Link { prev, next: None });
    match prev {
        Some(p) => {
            let mut pl = store.link(p);
            pl.next = Some(h);
            store.set_link(p, pl);
        }
        None => list.head = Some(h),
    }
    list.tail = Some(h);
    list.len += 1;
}

/// Removes `h` from `list`, wherever in the chain it sits. No-op (beyond
/// clearing the link) if `h` happens not to be linked anywhere — callers are
/// expected to know `h` is a member of `list` before calling.
pub fn extract<S: LinkedEntries>(store: &mut S, list: &mut ListHead<EntryHandle>, h: EntryHandle) {
    let link = store.link(h);
    match link.prev {
        Some(p) => {
            let mut pl = store.link(p);
            pl.next = link.next;
            store.set_link(p, pl);
        }
        None => list.head = link.next,
    }
    match link.next {
        Some(n) => {
            let mut nl = store.link(n);
            nl.prev = link.prev;
            store.set_link(n, nl);
        }
        None => list.tail = link.prev,
    }
    store.set_link(h, Link::default());
    list.len = list.len.saturating_sub(1);
}

/// Materializes the current list order into a `Vec`.
///
/// `do_poll`/`flush_pending`/`do_route_up` all walk a list while extracting
/// (or otherwise reclassifying) the node they are currently visiting, which
/// would otherwise invalidate an in-place cursor. Snapshotting the handle
/// sequence first lets each walk advance past a node that gets removed or
/// reclassified mid-traversal, without unsafe cursor games.
pub fn snapshot<S: ReadLinks>(store: &S, list: &ListHead<EntryHandle>) -> Vec<EntryHandle> {
    let mut out = Vec::with_capacity(list.len());
    let mut cur = list.head;
    while let Some(h) = cur {
        out.push(h);
        cur = store.link(h).next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryData;
    use bpcache_common::EntryFlags;
    use std::sync::Arc;

    fn new_entry(map: &mut SlotMap<EntryHandle, Entry>) -> EntryHandle {
        map.insert(Entry {
            flags: EntryFlags::empty(),
            data: EntryData::Bundle,
            refptr: None,
            action_time: 0,
            retry_interval_ms: 0,
            primary_link: Link::default(),
            primary_membership: None,
            hash_link: Link::default(),
            hash_queue: None,
            time_link: Link::default(),
            time_queue: None,
            destination_link: Link::default(),
            dest_queue: None,
        })
    }

    #[test_log::test]
    fn push_back_preserves_fifo_order() {
        let mut map: SlotMap<EntryHandle, Entry> = SlotMap::with_key();
        let a = new_entry(&mut map);
        let b = new_entry(&mut map);
        let c = new_entry(&mut map);

        let mut list = ListHead::default();
        push_back(&mut PrimarySlot(&mut map), &mut list, a);
        push_back(&mut PrimarySlot(&mut map), &mut list, b);
        push_back(&mut PrimarySlot(&mut map), &mut list, c);

        assert_eq!(snapshot(&PrimarySlot(&mut map), &list), vec![a, b, c]);
        assert_eq!(list.len(), 3);
    }

    #[test_log::test]
    fn extract_from_middle_reconnects_neighbors() {
        let mut map: SlotMap<EntryHandle, Entry> = SlotMap::with_key();
        let a = new_entry(&mut map);
        let b = new_entry(&mut map);
        let c = new_entry(&mut map);

        let mut list = ListHead::default();
        push_back(&mut PrimarySlot(&mut map), &mut list, a);
        push_back(&mut PrimarySlot(&mut map), &mut list, b);
        push_back(&mut PrimarySlot(&mut map), &mut list, c);

        extract(&mut PrimarySlot(&mut map), &mut list, b);

        assert_eq!(snapshot(&PrimarySlot(&mut map), &list), vec![a, c]);
        assert_eq!(list.len(), 2);
        assert_eq!(list.head, Some(a));
        assert_eq!(list.tail, Some(c));
    }

    #[test_log::test]
    fn extract_head_and_tail_updates_bounds() {
        let mut map: SlotMap<EntryHandle, Entry> = SlotMap::with_key();
        let a = new_entry(&mut map);
        let mut list = ListHead::default();
        push_back(&mut PrimarySlot(&mut map), &mut list, a);
        extract(&mut PrimarySlot(&mut map), &mut list, a);
        assert!(list.is_empty());
        assert_eq!(list.head, None);
        assert_eq!(list.tail, None);
    }

    #[test_log::test]
    fn independent_link_slots_do_not_interfere() {
        // The same entry can be linked via two different axes simultaneously
        // (e.g. present in both hash_index and dest_eid_index at once).
        let mut map: SlotMap<EntryHandle, Entry> = SlotMap::with_key();
        let a = new_entry(&mut map);
        let b = new_entry(&mut map);

        let mut hash_list = ListHead::default();
        let mut dest_list = ListHead::default();
        push_back(&mut HashSlot(&mut map), &mut hash_list, a);
        push_back(&mut HashSlot(&mut map), &mut hash_list, b);
        push_back(&mut DestSlot(&mut map), &mut dest_list, a);

        assert_eq!(snapshot(&HashSlot(&mut map), &hash_list), vec![a, b]);
        assert_eq!(snapshot(&DestSlot(&mut map), &dest_list), vec![a]);

        extract(&mut HashSlot(&mut map), &mut hash_list, a);
        assert_eq!(snapshot(&HashSlot(&mut map), &hash_list), vec![b]);
        // dest_list membership untouched by the hash_list extraction
        assert_eq!(snapshot(&DestSlot(&mut map), &dest_list), vec![a]);
    }
}
