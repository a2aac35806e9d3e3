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

//! Sub-index node: an ordered-tree leaf keyed by a `u32`/`u64` value, owning
//! a list of entries sharing that key.
//!
//! `BTreeMap` backs each index (the ordered-map contract the `do_poll`/
//! `do_route_up` traversals need); [`Queue`] is the tree's value type,
//! carrying its own key back (needed to remove itself from the tree once
//! its list empties) plus the intrusive list head of member entries.

use slotmap::new_key_type;

use crate::list::ListHead;
use crate::entry::EntryHandle;

new_key_type! {
    /// Arena handle for a [`Queue`]. One `SlotMap<QueueHandle, Queue<K>>`
    /// backs each of the three indices; handles are never compared or used
    /// across indices.
    pub struct QueueHandle;
}

/// A sub-index node: created lazily on first insert for a key, destroyed
/// the moment its list becomes empty.
#[derive(Debug, Clone)]
pub struct Queue<K> {
    pub key: K,
    pub entries: ListHead<EntryHandle>,
}

impl<K> Queue<K> {
    pub fn new(key: K) -> Self {
        Self { key, entries: ListHead::default() }
    }
}
