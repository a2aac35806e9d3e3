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

//! Error taxonomy.
//!
//! Errors never propagate across the event-loop boundary: every handler in
//! `bpcache-core` returns a plain status and the dispatcher moves on to the
//! next event. [`CacheError`] is used only by the handful of fallible
//! constructors (arena exhaustion, `attach` against a bad service address)
//! whose callers branch on the variant directly; it is not threaded through
//! the event loop itself.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// The backing arena is at capacity. The operation that triggered this is
    /// abandoned; any block it had partially allocated is recycled and no
    /// partial index update remains.
    #[error("cache pool exhausted")]
    OutOfMemory,

    /// A handle was dereferenced against the wrong block kind (or a stale
    /// generation — the handle's slot has since been recycled for something
    /// else).
    #[error("block type mismatch or stale handle")]
    TypeMismatch,

    /// `attach` was called against a service address the route table
    /// (out of scope here) rejected.
    #[error("invalid service attach handle")]
    InvalidHandle,
}

pub type Result<T> = std::result::Result<T, CacheError>;
