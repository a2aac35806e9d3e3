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

//! Attach/detach and initialization.
//!
//! A fixed-block pool typically needs an explicit registration step telling
//! it how to construct/destruct each block kind it will hand out; this
//! crate's arenas (the `SlotMap`s behind [`crate::entry::EntryHandle`] and
//! [`crate::queue::QueueHandle`]) need no such registration — a `SlotMap`
//! simply owns its values directly. What remains in scope for this module
//! is the route-table attach/detach contract and the `Interface` handle the
//! rest of the agent drives afterward.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use bpcache_common::{CacheConfig, CacheError, Eid, Metrics, Result};
use tracing::{info, instrument};

use crate::bundle::Bundle;
use crate::event::{self, Event};
use crate::state::{CacheState, DebugStats};
use crate::subq::{OutboundQueue, OutboundRef, SubQueue};

/// External data-service routing collaborator. Only this interface matters
/// to the core — a real implementation lives in the enclosing agent,
/// outside this crate.
pub trait RouteTable {
    /// Registers `handle` as the storage data service for `service_addr`.
    /// `Err(())` models an attach against a service address the route table
    /// rejects.
    fn attach_data_service(
        &mut self,
        service_addr: Eid,
        handle: Rc<RefCell<CacheState>>,
    ) -> std::result::Result<(), ()>;

    /// Reverses `attach_data_service`. Returns the handle that was
    /// registered there, if any, so the caller can drop its own clone and
    /// let the state tear down once nothing else holds it.
    fn detach_data_service(&mut self, service_addr: Eid) -> Option<Rc<RefCell<CacheState>>>;
}

/// One storage-and-custody cache instance, bound to a single interface.
/// Owns the cache state plus the bounded ingress/egress subqueues the event
/// loop drains and fills.
///
/// A self-referential cache state (the owning data structure holding a
/// handle back to itself to keep an interface alive until detach) is
/// instead modeled with ordinary shared ownership: the route table and the
/// `Interface` each hold their own `Rc` clone of the same [`CacheState`],
/// not a true reference cycle. [`Interface::detach`] drops the route
/// table's clone; the state is freed once the `Interface` itself is
/// dropped too.
pub struct Interface {
    pub self_intf_id: u64,
    pub service_addr: Eid,
    state: Rc<RefCell<CacheState>>,
    pub inbound: SubQueue,
    pub outbound: OutboundQueue,
}

impl Interface {
    /// Allocates the cache state, attaches it to the route table as a
    /// storage data service at `service_addr`, and returns the handle the
    /// agent drives via
    /// [`Interface::egress`]/[`Interface::event`]/[`Interface::route_up`].
    /// The interface starts with both subqueue depth limits at zero — the
    /// same "down until told otherwise" state `do_intf_statechange` would
    /// leave it in — so callers deliver an initial `Event::Up` once the
    /// link is actually ready.
    #[instrument(level = "info", skip(routing_table, metrics), fields(%service_addr))]
    pub fn attach<R: RouteTable>(
        routing_table: &mut R,
        self_intf_id: u64,
        service_addr: Eid,
        config: CacheConfig,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let state = Rc::new(RefCell::new(CacheState::new(service_addr, config, metrics)));
        routing_table
            .attach_data_service(service_addr, state.clone())
            .map_err(|_| CacheError::InvalidHandle)?;

        info!("interface attached");
        Ok(Self {
            self_intf_id,
            service_addr,
            state,
            inbound: SubQueue::new(),
            outbound: OutboundQueue::new(),
        })
    }

    /// Releases the route table's handle on this interface. Refuses (via
    /// assertion) to tear down a cache state that still holds entries or
    /// non-empty indices, rather than silently discarding them.
    #[instrument(level = "info", skip(self, routing_table), fields(service_addr = %self.service_addr))]
    pub fn detach<R: RouteTable>(self, routing_table: &mut R) {
        routing_table.detach_data_service(self.service_addr);
        self.state.borrow().assert_empty_for_teardown();
        info!("interface detached");
    }

    /// Drains `inbound`, admitting or acking each bundle. Returns the number
    /// of bundles drained.
    pub fn egress(&mut self, now: u64) -> usize {
        event::egress_impl(&mut self.state.borrow_mut(), &mut self.inbound, self.self_intf_id, now)
    }

    /// Dispatches one event through the cache, always ending with a flush of
    /// the pending list.
    pub fn event(&mut self, ev: Event, now: u64) {
        event::event_impl(
            &mut self.state.borrow_mut(),
            &mut self.inbound,
            &mut self.outbound,
            self.self_intf_id,
            ev,
            now,
        )
    }

    /// Re-evaluates entries destined for a newly reachable `dest`/`mask`,
    /// driven by the enclosing routing decision rather than folded into the
    /// tagged `Event` union.
    pub fn route_up(&mut self, dest: u32, mask: u32, now: u64) {
        event::route_up(&mut self.state.borrow_mut(), &mut self.outbound, dest, mask, now)
    }

    /// Pulls the next bundle reference the cache has offered to the fabric,
    /// if any is queued.
    pub fn try_pull_outbound(&mut self) -> Option<OutboundRef> {
        self.outbound.try_pull()
    }

    /// Pushes a bundle delivered by the fabric into this interface's ingress
    /// subqueue. `false` if rejected by backpressure.
    pub fn push_inbound(&mut self, bundle: Arc<Bundle>) -> bool {
        self.inbound.push(bundle)
    }

    /// Diagnostic dump of list/index sizes, logged at `info` and returned
    /// for callers (tests, an operator console) that want the numbers
    /// directly.
    pub fn debug_scan(&self) -> DebugStats {
        let stats = self.state.borrow().debug_stats();
        info!(?stats, "debug scan");
        stats
    }
}
