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

//! Salted CRC-32C fingerprints used as `hash_index` keys.
//!
//! Two populations share one tree: a DACS-accumulation fingerprint keyed on
//! `(flow, custodian)` and a bundle-duplicate/ack-matching fingerprint keyed
//! on `(flow, sequence_num)`. The two input tuples are disjoint in shape, but
//! the salts are what actually keep collisions between the populations
//! negligible — each salt is folded in as its own CRC update span, not
//! XORed together.

use crate::config::{SALT_BUNDLE, SALT_DACS};
use crate::eid::Eid;

fn crc_with_salt(parts: &[&[u8]], salt: u32) -> u32 {
    let mut crc = crc32c::Crc32cHasher::default();
    for part in parts {
        crc.update(part);
    }
    crc.update(&salt.to_le_bytes());
    crc.finalize()
}

/// Fingerprint for locating an *open* DACS accumulating acks from
/// `custodian` for bundles on `flow`. Deliberately excludes sequence number:
/// a single DACS entry accumulates many of them.
pub fn dacs_fingerprint(flow: &Eid, custodian: &Eid) -> u32 {
    crc_with_salt(&[&flow.fingerprint_bytes(), &custodian.fingerprint_bytes()], SALT_DACS)
}

/// Fingerprint for a specific bundle, used both to detect duplicate
/// admission and to match an incoming DACS's acknowledged sequence numbers
/// back to stored entries. Deliberately excludes custodian (which, from this
/// node's perspective, is always itself while the entry is stored).
pub fn bundle_fingerprint(flow: &Eid, sequence_num: u64) -> u32 {
    crc_with_salt(&[&flow.fingerprint_bytes(), &sequence_num.to_le_bytes()], SALT_BUNDLE)
}

/// Minimal CRC-32C (Castagnoli) hasher wrapper kept local to this module so
/// callers never reach for a different polynomial by mistake; `crc32c`
/// itself only exposes a one-shot `crc32c(&[u8])` function, so this adds the
/// incremental `update`/`finalize` shape the fingerprint builder above wants.
mod crc32c {
    #[derive(Default)]
    pub struct Crc32cHasher {
        buf: Vec<u8>,
    }

    impl Crc32cHasher {
        pub fn update(&mut self, bytes: &[u8]) {
            self.buf.extend_from_slice(bytes);
        }

        pub fn finalize(&self) -> u32 {
            ::crc32c::crc32c(&self.buf)
        }
    }
}
