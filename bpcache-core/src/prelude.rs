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

//! Convenience re-export of this crate's public surface.

pub use crate::bundle::{
    Bundle, CanonicalBlock, CreationTimestamp, CrcType, CustodyAcceptPayloadBlock, CustodyTrackingBlock,
    DeliveryData, DeliveryPolicy, PrimaryBlock,
};
pub use crate::entry::{Entry, EntryData, EntryHandle};
pub use crate::event::Event;
pub use crate::interface::{Interface, RouteTable};
pub use crate::queue::{Queue, QueueHandle};
pub use crate::state::{CacheState, DebugStats};
pub use crate::subq::{OutboundQueue, OutboundRef, SubQueue};

pub use bpcache_common::{CacheConfig, CacheError, Eid, EntryFlags, Metrics, NodeNumber, Result};
