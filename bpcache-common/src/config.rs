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

//! Tunable constants.

/// Configuration recognized by a cache [`Interface`](crate): a plain data
/// struct with a `Default` impl supplying simulation-scale defaults, passed
/// by value at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Milliseconds until a generated DACS bundle expires.
    pub dacs_lifetime_ms: u64,
    /// Milliseconds after a DACS is opened before a non-full payload is
    /// finalized and offered to the fabric.
    pub dacs_open_time_ms: u64,
    /// Initial retransmission interval for a bundle still under local
    /// custody.
    pub fast_retry_time_ms: u64,
    /// Upper bound on the retransmit backoff.
    pub max_retry_time_ms: u64,
    /// Hard cap on sequence numbers per DACS payload.
    pub dacs_max_seq_per_payload: usize,
    /// Subqueue capacity used while the interface is up; 0 while down.
    pub max_subq_depth: usize,
    /// Fixed capacity of the entry/queue arenas, standing in for the
    /// external pool's fixed block-count registration. Unlike the
    /// `Vec`-backed arenas a from-scratch Rust cache might reach for, this
    /// cap is what actually makes `CacheError::OutOfMemory` a reachable,
    /// testable outcome instead of an unexercised enum variant.
    pub arena_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dacs_lifetime_ms: 86_400_000,
            dacs_open_time_ms: 5_000,
            fast_retry_time_ms: 10_000,
            max_retry_time_ms: 600_000,
            dacs_max_seq_per_payload: 64,
            max_subq_depth: 256,
            arena_capacity: 65_536,
        }
    }
}

/// Salt distinguishing the DACS-fingerprint population from the
/// bundle-fingerprint population within the single shared `hash_index`.
pub const SALT_DACS: u32 = 0x3126_c0cf;
pub const SALT_BUNDLE: u32 = 0x7739_ae76;
