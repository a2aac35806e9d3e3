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

//! Per-entry flag bits.

use bitflags::bitflags;

bitflags! {
    /// Flags carried by a cache [`Entry`](crate) (the type itself lives in
    /// `bpcache-core`; the bit layout is common so tests in both crates agree
    /// on it).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntryFlags: u32 {
        /// This cache is still the custodian of record for the bundle.
        const LOCAL_CUSTODY = 1 << 0;
        /// The entry was touched recently (duplicate admission, inbound ack,
        /// route-up match). Drives the age-out grace period.
        const ACTIVITY = 1 << 1;
        /// A reference to this entry's bundle is currently sitting in the
        /// outbound (`ingress`) subqueue waiting to be drained by the fabric.
        const LOCALLY_QUEUED = 1 << 2;
        /// The entry (a DACS being accumulated) is waiting out its
        /// close-out deadline before being finalized.
        const ACTION_TIME_WAIT = 1 << 3;
        /// The entry has been marked for destruction by the FSM's age-out
        /// rule; it will not be re-admitted to any index again.
        const DELETE = 1 << 4;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn mask_apply_matches_set_then_clear() {
        let mut flags = EntryFlags::LOCAL_CUSTODY | EntryFlags::ACTIVITY;
        flags = (flags | EntryFlags::LOCALLY_QUEUED) & !EntryFlags::ACTIVITY;
        assert_eq!(flags, EntryFlags::LOCAL_CUSTODY | EntryFlags::LOCALLY_QUEUED);
    }
}
