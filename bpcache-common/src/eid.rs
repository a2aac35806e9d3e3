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

//! Endpoint identifiers and node numbers.
//!
//! Bundle encoding/decoding is out of scope for this crate; an [`Eid`] here
//! is the already-decoded in-memory form of an `ipn:node.service` endpoint
//! identifier, not a wire-format type.

use std::fmt;

/// A 64-bit DTN node number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeNumber(pub u64);

impl NodeNumber {
    /// Truncates the node number to the 32-bit key used by `dest_eid_index`.
    ///
    /// `time_index`'s key is widened to `u64` instead (see `state.rs`), since
    /// a 32-bit millisecond clock wraps in about 49 days of uptime.
    pub fn as_index_key(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for NodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// An `ipn:node.service` endpoint identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Eid {
    pub node: NodeNumber,
    pub service: u64,
}

impl Eid {
    pub const fn new(node: u64, service: u64) -> Self {
        Self {
            node: NodeNumber(node),
            service,
        }
    }

    /// The raw bytes fed into the custody fingerprint CRCs: node || service,
    /// both little-endian.
    pub fn fingerprint_bytes(&self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&self.node.0.to_le_bytes());
        buf[8..].copy_from_slice(&self.service.to_le_bytes());
        buf
    }
}

impl fmt::Display for Eid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ipn:{}.{}", self.node, self.service)
    }
}
