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

//! `bpcache-core`: the per-interface cache state, its three secondary
//! indices, the entry finite-state machine, the custody-transfer engine
//! (DACS open/append/finalize and inbound-ack matching), the single-
//! threaded event loop, and attach/detach. This is where the
//! handle/refcount/indexer machinery lives.
//!
//! Bundle encoding/decoding, the memory-pool/refcount allocator, the route
//! table, and OS abstractions (time, locks, logging) are out of scope;
//! this crate models only the in-memory shapes and contracts those
//! collaborators would otherwise provide (see [`bundle`] and
//! [`interface::RouteTable`]).

pub mod bundle;
pub mod custody;
pub mod entry;
pub mod event;
pub mod fsm;
pub mod interface;
pub mod list;
pub mod queue;
pub mod state;
pub mod subq;

pub mod prelude;

pub use entry::{Entry, EntryData, EntryHandle};
pub use event::Event;
pub use interface::{Interface, RouteTable};
pub use queue::{Queue, QueueHandle};
pub use state::{CacheState, DebugStats};
pub use subq::{OutboundQueue, OutboundRef, SubQueue};
