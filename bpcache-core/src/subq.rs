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

//! Bounded ingress/egress sub-queues plus the recycle notification used to
//! reclassify an entry once the fabric is done with a queued reference.
//!
//! `SubQueue` is the ingress (fabric → cache) queue the fabric pushes
//! bundles onto and [`crate::event::egress_impl`] drains; [`OutboundQueue`]
//! is this cache's own egress (cache → fabric) queue, the one
//! `fsm_execute` pushes retransmits and finalized DACS onto.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use crate::bundle::Bundle;
use crate::entry::EntryHandle;

/// fabric → cache: plain bundle handles, non-blocking pull (`timeout = 0`
/// throughout this crate — the event loop is single-threaded cooperative
/// and never blocks).
#[derive(Debug, Default)]
pub struct SubQueue {
    items: VecDeque<Arc<Bundle>>,
    pub current_depth_limit: usize,
}

impl SubQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn may_push(&self) -> bool {
        self.current_depth_limit > 0 && self.items.len() < self.current_depth_limit
    }

    /// The fabric delivering a bundle into this interface. Rejected once
    /// `current_depth_limit` is hit or zero.
    pub fn push(&mut self, bundle: Arc<Bundle>) -> bool {
        if !self.may_push() {
            return false;
        }
        self.items.push_back(bundle);
        true
    }

    pub fn try_pull(&mut self) -> Option<Arc<Bundle>> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A queued hand-off to the fabric. Holds the owning entry so its `Drop`
/// can report back once the fabric is done with it — the reference itself
/// carries no other behavior; it exists only to be held and, eventually,
/// dropped.
pub struct OutboundRef {
    pub entry: EntryHandle,
    bundle: Arc<Bundle>,
    recycled: Rc<RefCell<VecDeque<EntryHandle>>>,
}

impl OutboundRef {
    pub fn bundle(&self) -> &Arc<Bundle> {
        &self.bundle
    }
}

impl Drop for OutboundRef {
    fn drop(&mut self) {
        self.recycled.borrow_mut().push_back(self.entry);
    }
}

/// cache → fabric: each pulled reference is an [`OutboundRef`] whose `Drop`
/// records a recycle notification, so a caller holding one and eventually
/// letting it go is indistinguishable from the fabric recycling a queued
/// reference — a refcount-to-zero callback becomes an ordinary Rust
/// destructor here.
#[derive(Default)]
pub struct OutboundQueue {
    items: VecDeque<OutboundRef>,
    recycled: Rc<RefCell<VecDeque<EntryHandle>>>,
    pub current_depth_limit: usize,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn may_push(&self) -> bool {
        self.current_depth_limit > 0 && self.items.len() < self.current_depth_limit
    }

    pub fn push(&mut self, entry: EntryHandle, bundle: Arc<Bundle>) -> bool {
        if !self.may_push() {
            return false;
        }
        self.items.push_back(OutboundRef { entry, bundle, recycled: self.recycled.clone() });
        true
    }

    pub fn try_pull(&mut self) -> Option<OutboundRef> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drains the entries whose queued reference has been dropped since the
    /// last call. The event loop folds these back through
    /// [`crate::fsm::make_pending`] with `LOCALLY_QUEUED` cleared.
    pub fn drain_recycled(&self) -> Vec<EntryHandle> {
        self.recycled.borrow_mut().drain(..).collect()
    }
}
