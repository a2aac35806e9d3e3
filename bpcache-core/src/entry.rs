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

//! The per-bundle/per-DACS cache record.

use std::sync::Arc;

use bpcache_common::{EntryFlags, Eid};
use slotmap::new_key_type;

use crate::bundle::Bundle;
use crate::list::Link;
use crate::queue::QueueHandle;

new_key_type! {
    /// Arena handle for an [`Entry`]: a generational arena index used as the
    /// bundle's storage identifier, rather than a raw pointer.
    pub struct EntryHandle;
}

/// Which of the two primary lists an entry currently sits in, if either.
/// An entry is in at most one of `pending_list`/`idle_list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrimaryList {
    Pending,
    Idle,
}

/// The kind-specific payload an entry carries. Matching on `data` tells the
/// FSM whether it is looking at a stored bundle or a DACS under
/// accumulation, so there is no redundant parallel `state` field.
#[derive(Debug, Clone)]
pub enum EntryData {
    Bundle,
    DacsPending {
        prev_custodian: Eid,
        /// The DACS bundle under construction. `Some` while accumulating
        /// sequence numbers (refcount is still exactly one: nothing else
        /// can be holding a clone while it is still being mutated);
        /// taken out and moved into `Entry::refptr` once finalized
        /// (`custody::finalize_dacs`).
        pending: Option<Bundle>,
    },
}

/// The per-bundle or per-DACS cache record.
#[derive(Debug, Clone)]
pub struct Entry {
    pub flags: EntryFlags,
    pub data: EntryData,
    /// Shared handle to the bundle payload. `None` only transiently, for a
    /// `DacsPending` entry still being accumulated (see [`EntryData`]).
    pub refptr: Option<Arc<Bundle>>,
    /// Absolute millisecond deadline: next retransmit for a bundle entry, or
    /// DACS close-out time for a `generate_dacs` entry.
    pub action_time: u64,
    /// Current retransmit backoff interval, in milliseconds. Only
    /// meaningful for `EntryData::Bundle` entries; starts at
    /// `config.fast_retry_time_ms` and doubles (bounded by
    /// `config.max_retry_time_ms`) each time a retransmit fires.
    pub(crate) retry_interval_ms: u64,

    pub(crate) primary_link: Link<EntryHandle>,
    pub(crate) primary_membership: Option<PrimaryList>,

    pub(crate) hash_link: Link<EntryHandle>,
    pub(crate) hash_queue: Option<QueueHandle>,

    pub(crate) time_link: Link<EntryHandle>,
    pub(crate) time_queue: Option<QueueHandle>,

    pub(crate) destination_link: Link<EntryHandle>,
    pub(crate) dest_queue: Option<QueueHandle>,
}

impl Entry {
    pub(crate) fn new_bundle(bundle: Arc<Bundle>) -> Self {
        Self {
            flags: EntryFlags::empty(),
            data: EntryData::Bundle,
            refptr: Some(bundle),
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
        }
    }

    pub(crate) fn new_dacs(prev_custodian: Eid, bundle: Bundle) -> Self {
        Self {
            flags: EntryFlags::empty(),
            data: EntryData::DacsPending { prev_custodian, pending: Some(bundle) },
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
        }
    }

    pub fn is_dacs(&self) -> bool {
        matches!(self.data, EntryData::DacsPending { .. })
    }

    /// An entry's secondary links are attached iff it is in the
    /// corresponding index.
    pub(crate) fn in_hash_index(&self) -> bool {
        self.hash_queue.is_some()
    }

    pub(crate) fn in_time_index(&self) -> bool {
        self.time_queue.is_some()
    }

    pub(crate) fn in_dest_index(&self) -> bool {
        self.dest_queue.is_some()
    }
}
