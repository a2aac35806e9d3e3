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

//! In-memory bundle model.
//!
//! Bundle encoding/decoding is explicitly out of scope for this crate: a
//! real agent hands the cache already-decoded primary/canonical blocks and
//! takes already-built ones back for re-encoding. What follows is the
//! minimal in-memory shape the custody engine actually reads and writes —
//! not a codec, and not a full BPv7 block catalog.

use bpcache_common::Eid;

use crate::entry::EntryHandle;

/// Block type codes for the two custody-related canonical blocks this cache
/// cares about. These are private extension block types, not registered
/// BPv7 block types.
pub const BLOCK_TYPE_CUSTODY_TRACKING: u64 = 192;
pub const BLOCK_TYPE_CUSTODY_ACCEPT_PAYLOAD: u64 = 193;
pub const BLOCK_TYPE_PAYLOAD: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcType {
    None,
    Crc16,
    Crc32,
}

/// Per-bundle delivery bookkeeping threaded through by the forwarding
/// fabric; the cache reads and rewrites `policy` and fills in the storage
/// identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// No custody signal expected; fire-and-forget.
    BestEffort,
    /// Full custody-transfer service: generate/relay DACS as custodians hand
    /// the bundle off.
    CustodyTracking,
    /// Only a local acknowledgement is expected (used for bundles this node
    /// is the final destination for, and for the DACS bundles this cache
    /// itself generates).
    LocalAck,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryData {
    pub policy: Option<DeliveryPolicy>,
    pub local_retx_interval_ms: u64,
    pub ingress_intf_id: u64,
    pub storage_intf_id: u64,
    pub ingress_time_ms: u64,
    /// Storage identifier of the entry committed to holding this bundle,
    /// modeled as the entry's arena handle rather than a raw block pointer.
    pub committed_storage_id: Option<EntryHandle>,
}

#[derive(Debug, Clone, Copy)]
pub struct CreationTimestamp {
    pub sequence_num: u64,
    pub time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct PrimaryBlock {
    pub version: u8,
    pub source: Eid,
    pub report_to: Eid,
    pub destination: Eid,
    pub creation: CreationTimestamp,
    pub lifetime_ms: u64,
    pub is_admin_record: bool,
    pub must_not_fragment: bool,
    pub crc_type: CrcType,
    pub delivery_data: DeliveryData,
}

#[derive(Debug, Clone, Default)]
pub struct CustodyTrackingBlock {
    pub current_custodian: Option<Eid>,
}

#[derive(Debug, Clone, Default)]
pub struct CustodyAcceptPayloadBlock {
    pub flow_source_eid: Eid,
    pub sequence_nums: Vec<u64>,
}

#[derive(Debug, Clone)]
pub enum CanonicalBlock {
    CustodyTracking(CustodyTrackingBlock),
    CustodyAcceptPayload(CustodyAcceptPayloadBlock),
    Payload(Vec<u8>),
    Other { block_type: u64, data: Vec<u8> },
}

impl CanonicalBlock {
    pub fn block_type(&self) -> u64 {
        match self {
            Self::CustodyTracking(_) => BLOCK_TYPE_CUSTODY_TRACKING,
            Self::CustodyAcceptPayload(_) => BLOCK_TYPE_CUSTODY_ACCEPT_PAYLOAD,
            Self::Payload(_) => BLOCK_TYPE_PAYLOAD,
            Self::Other { block_type, .. } => *block_type,
        }
    }
}

/// An already-decoded bundle: primary block plus its canonical blocks.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub primary: PrimaryBlock,
    pub canonical_blocks: Vec<CanonicalBlock>,
}

impl Bundle {
    pub fn final_dest_node(&self) -> u64 {
        self.primary.destination.node.0
    }

    pub fn custody_tracking_block(&self) -> Option<&CustodyTrackingBlock> {
        self.canonical_blocks.iter().find_map(|b| match b {
            CanonicalBlock::CustodyTracking(c) => Some(c),
            _ => None,
        })
    }

    pub fn custody_tracking_block_mut(&mut self) -> Option<&mut CustodyTrackingBlock> {
        self.canonical_blocks.iter_mut().find_map(|b| match b {
            CanonicalBlock::CustodyTracking(c) => Some(c),
            _ => None,
        })
    }

    pub fn custody_accept_payload(&self) -> Option<&CustodyAcceptPayloadBlock> {
        self.canonical_blocks.iter().find_map(|b| match b {
            CanonicalBlock::CustodyAcceptPayload(p) => Some(p),
            _ => None,
        })
    }

    pub fn custody_accept_payload_mut(&mut self) -> Option<&mut CustodyAcceptPayloadBlock> {
        self.canonical_blocks.iter_mut().find_map(|b| match b {
            CanonicalBlock::CustodyAcceptPayload(p) => Some(p),
            _ => None,
        })
    }

    /// An admin record carrying a custody-accept payload.
    pub fn is_dacs(&self) -> bool {
        self.primary.is_admin_record && self.custody_accept_payload().is_some()
    }

    pub fn insert_custody_tracking_block(&mut self) {
        self.canonical_blocks
            .push(CanonicalBlock::CustodyTracking(CustodyTrackingBlock::default()));
    }
}
