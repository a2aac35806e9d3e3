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

//! Components shared by the cache core and its facade crate: endpoint
//! identifiers, the per-entry flag bits, the salted fingerprint functions,
//! the error taxonomy, tunable configuration, and metrics counters.
//!
//! Small, dependency-light types that both `bpcache-core` and `bpcache`
//! build on.

pub mod config;
pub mod eid;
pub mod error;
pub mod fingerprint;
pub mod flags;
pub mod metrics;

pub use config::CacheConfig;
pub use eid::{Eid, NodeNumber};
pub use error::{CacheError, Result};
pub use flags::EntryFlags;
pub use metrics::Metrics;
