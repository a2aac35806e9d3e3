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

//! Entry state machine.
//!
//! Every transition funnels through [`make_pending`], which reclassifies an
//! entry and queues it for [`fsm_execute`] on the next `flush_pending` pass
//! rather than acting immediately, so a handler never has to reason about
//! re-entrant list mutation while it is itself mid-traversal.

use bpcache_common::EntryFlags;
use tracing::{instrument, trace};

use crate::custody;
use crate::entry::EntryHandle;
use crate::state::CacheState;
use crate::subq::OutboundQueue;

/// Applies a flag delta and moves the entry onto `pending_list`, pulling it
/// out of `idle_list`/the time_index if it was there.
pub fn make_pending(state: &mut CacheState, h: EntryHandle, set_flags: EntryFlags, clear_flags: EntryFlags) {
    let entry = &mut state.entries[h];
    entry.flags = (entry.flags | set_flags) & !clear_flags;
    state.remove_from_time_index(h);
    state.move_to_pending(h);
}

/// Runs one entry through the FSM. Called once per `pending_list` member,
/// per `flush_pending` pass; never re-entrant on the same handle within one
/// pass (the entry has already been extracted from `pending_list` by the
/// caller before this runs).
#[instrument(level = "trace", skip(state, outbound))]
pub fn fsm_execute(state: &mut CacheState, outbound: &mut OutboundQueue, h: EntryHandle, now: u64) {
    if state.entries[h].is_dacs() {
        fsm_execute_dacs(state, outbound, h, now);
    } else {
        fsm_execute_bundle(state, outbound, h, now);
    }
}

fn fsm_execute_dacs(state: &mut CacheState, outbound: &mut OutboundQueue, h: EntryHandle, now: u64) {
    let entry = &state.entries[h];
    if entry.flags.contains(EntryFlags::ACTION_TIME_WAIT) && entry.action_time > now {
        // Reached via a route that didn't already filter by deadline; go
        // back to sleep until it actually expires.
        let deadline = entry.action_time;
        state.add_to_time_index(deadline, h);
        return;
    }

    custody::finalize_dacs(state, h);
    let bundle = state.entries[h].refptr.clone();
    let Some(bundle) = bundle else {
        trace!("dacs entry finalized with no payload to offer");
        return;
    };
    if outbound.push(h, bundle) {
        state.entries[h].flags.insert(EntryFlags::LOCALLY_QUEUED);
    }
}

fn fsm_execute_bundle(state: &mut CacheState, outbound: &mut OutboundQueue, h: EntryHandle, now: u64) {
    let local_custody = state.entries[h].flags.contains(EntryFlags::LOCAL_CUSTODY);

    if !local_custody {
        // Age-out grace rule: a bundle that lost local custody is kept one
        // extra pass if it was touched since the last time it passed
        // through here, so a duplicate admission or inbound ack racing
        // with the final retry doesn't destroy an entry something else
        // just looked at. ACTIVITY is consumed on use.
        if state.entries[h].flags.contains(EntryFlags::ACTIVITY) {
            state.entries[h].flags.remove(EntryFlags::ACTIVITY);
            state.move_to_idle(h);
        } else {
            state.metrics.record_aged_out();
            state.destroy_entry(h);
        }
        return;
    }

    let due = state.entries[h].action_time;
    if now >= due {
        if let Some(bundle) = state.entries[h].refptr.clone() {
            if outbound.push(h, bundle) {
                state.entries[h].flags.insert(EntryFlags::LOCALLY_QUEUED);
                state.metrics.record_retransmit();
            }
        }
        let next = advance_retry(state, h, now);
        state.add_to_time_index(next, h);
    } else {
        state.add_to_time_index(due, h);
    }
}

/// Doubles the backoff interval (bounded by `max_retry_time_ms`) and returns
/// the new absolute deadline.
fn advance_retry(state: &mut CacheState, h: EntryHandle, now: u64) -> u64 {
    let config = state.config;
    let entry = &mut state.entries[h];
    let interval = if entry.retry_interval_ms == 0 {
        config.fast_retry_time_ms
    } else {
        (entry.retry_interval_ms * 2).min(config.max_retry_time_ms)
    };
    entry.retry_interval_ms = interval;
    entry.action_time = now + interval;
    entry.action_time
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{CreationTimestamp, CrcType, DeliveryData, PrimaryBlock};
    use crate::bundle::Bundle;
    use crate::entry::Entry;
    use bpcache_common::{CacheConfig, Eid, Metrics};
    use std::sync::Arc;

    fn state() -> CacheState {
        CacheState::new(Eid::new(1, 0), CacheConfig::default(), Arc::new(Metrics::new()))
    }

    fn bundle() -> Arc<Bundle> {
        Arc::new(Bundle {
            primary: PrimaryBlock {
                version: 7,
                source: Eid::new(2, 1),
                report_to: Eid::new(2, 1),
                destination: Eid::new(1, 0),
                creation: CreationTimestamp { sequence_num: 1, time_ms: 0 },
                lifetime_ms: 1_000_000,
                is_admin_record: false,
                must_not_fragment: false,
                crc_type: CrcType::None,
                delivery_data: DeliveryData::default(),
            },
            canonical_blocks: Vec::new(),
        })
    }

    #[test_log::test]
    fn bundle_without_local_custody_and_no_activity_is_destroyed() {
        let mut st = state();
        let h = st.alloc_entry(Entry::new_bundle(bundle())).unwrap();
        st.move_to_pending(h);
        let mut outbound = OutboundQueue::new();
        fsm_execute(&mut st, &mut outbound, h, 0);
        assert!(!st.entries.contains_key(h));
    }

    #[test_log::test]
    fn bundle_without_local_custody_but_with_activity_goes_idle_once() {
        let mut st = state();
        let h = st.alloc_entry(Entry::new_bundle(bundle())).unwrap();
        st.entries[h].flags.insert(EntryFlags::ACTIVITY);
        st.move_to_pending(h);
        let mut outbound = OutboundQueue::new();
        fsm_execute(&mut st, &mut outbound, h, 0);
        assert!(st.entries.contains_key(h));
        assert!(!st.entries[h].flags.contains(EntryFlags::ACTIVITY));

        st.move_to_pending(h);
        fsm_execute(&mut st, &mut outbound, h, 0);
        assert!(!st.entries.contains_key(h));
    }

    #[test_log::test]
    fn due_retry_pushes_to_outbound_and_reschedules_with_backoff() {
        let mut st = state();
        let h = st.alloc_entry(Entry::new_bundle(bundle())).unwrap();
        st.entries[h].flags.insert(EntryFlags::LOCAL_CUSTODY);
        st.move_to_pending(h);
        let mut outbound = OutboundQueue::new();
        outbound.current_depth_limit = 8;

        fsm_execute(&mut st, &mut outbound, h, 0);
        assert_eq!(outbound.len(), 1);
        assert!(st.entries[h].flags.contains(EntryFlags::LOCALLY_QUEUED));
        assert_eq!(st.entries[h].retry_interval_ms, st.config.fast_retry_time_ms);
        assert!(st.entries[h].in_time_index());
    }

    #[test_log::test]
    fn not_yet_due_retry_just_reschedules_at_same_deadline() {
        let mut st = state();
        let h = st.alloc_entry(Entry::new_bundle(bundle())).unwrap();
        st.entries[h].flags.insert(EntryFlags::LOCAL_CUSTODY);
        st.entries[h].action_time = 5_000;
        st.move_to_pending(h);
        let mut outbound = OutboundQueue::new();

        fsm_execute(&mut st, &mut outbound, h, 100);
        assert!(outbound.is_empty());
        assert!(st.entries[h].in_time_index());
        assert_eq!(st.time_keys_at_most(10_000), vec![5_000]);
    }
}
