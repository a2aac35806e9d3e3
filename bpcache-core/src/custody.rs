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

//! Custody transfer engine: duplicate detection, DACS open/append/finalize,
//! the inbound-ack path, and the custodian handoff a bundle goes through on
//! admission.

use std::sync::Arc;

use bpcache_common::{fingerprint, Eid, EntryFlags, NodeNumber};
use tracing::{debug, instrument};

use crate::bundle::{
    Bundle, CanonicalBlock, CreationTimestamp, CrcType, CustodyAcceptPayloadBlock, DeliveryData, DeliveryPolicy,
    PrimaryBlock,
};
use crate::entry::{Entry, EntryData, EntryHandle};
use crate::fsm;
use crate::state::CacheState;

fn custodian_from_tracking_block(bundle: &Bundle) -> Option<Eid> {
    bundle.custody_tracking_block().and_then(|c| c.current_custodian)
}

/// Linear scan of the hash bucket for an open DACS accumulating acks from
/// `custodian` on `flow`. Collisions within one bucket are expected to be
/// rare and short, so sequential search is not a burden.
fn find_pending_dacs(state: &CacheState, flow: &Eid, custodian: &Eid) -> Option<EntryHandle> {
    let key = fingerprint::dacs_fingerprint(flow, custodian);
    for h in state.hash_bucket(key) {
        if let EntryData::DacsPending { prev_custodian, pending: Some(bundle) } = &state.entries[h].data {
            if prev_custodian == custodian && bundle.custody_accept_payload().map(|p| p.flow_source_eid) == Some(*flow) {
                return Some(h);
            }
        }
    }
    None
}

/// Linear scan of the hash bucket for the stored bundle matching
/// `(flow, sequence_num)`. Marks the match's `ACTIVITY` flag — this is part
/// of the age-out grace period, not incidental.
pub(crate) fn find_existing_bundle(state: &mut CacheState, flow: &Eid, sequence_num: u64) -> Option<EntryHandle> {
    let key = fingerprint::bundle_fingerprint(flow, sequence_num);
    let bucket = state.hash_bucket(key);
    for h in bucket {
        let entry = &state.entries[h];
        if entry.is_dacs() {
            continue;
        }
        let matches = entry
            .refptr
            .as_ref()
            .is_some_and(|b| b.primary.source == *flow && b.primary.creation.sequence_num == sequence_num);
        if matches {
            state.entries[h].flags.insert(EntryFlags::ACTIVITY);
            return Some(h);
        }
    }
    None
}

/// Builds the DACS bundle shell addressed back to `custodian`. The payload
/// starts with an empty sequence list; [`append_dacs`] fills it in.
fn create_dacs(state: &mut CacheState, flow: Eid, custodian: Eid, self_intf_id: u64, now: u64) -> Bundle {
    let sequence_num = state.generated_dacs_seq;
    state.generated_dacs_seq += 1;

    Bundle {
        primary: PrimaryBlock {
            version: 7,
            source: state.self_addr,
            report_to: state.self_addr,
            destination: custodian,
            creation: CreationTimestamp { sequence_num, time_ms: now },
            lifetime_ms: state.config.dacs_lifetime_ms,
            is_admin_record: true,
            must_not_fragment: true,
            crc_type: CrcType::Crc16,
            delivery_data: DeliveryData {
                policy: Some(DeliveryPolicy::LocalAck),
                local_retx_interval_ms: state.config.fast_retry_time_ms,
                ingress_intf_id: self_intf_id,
                storage_intf_id: self_intf_id,
                ingress_time_ms: now,
                committed_storage_id: None,
            },
        },
        canonical_blocks: vec![CanonicalBlock::CustodyAcceptPayload(CustodyAcceptPayloadBlock {
            flow_source_eid: flow,
            sequence_nums: Vec::new(),
        })],
    }
}

/// Opens a new DACS entry bound for `custodian`, indexes it by
/// `(flow, custodian)`, and moves it onto `pending_list` with
/// `ACTION_TIME_WAIT` set — the FSM re-indexes it by its close-out deadline
/// on the next `flush_pending` pass.
#[instrument(level = "debug", skip(state))]
fn open_dacs(state: &mut CacheState, flow: Eid, custodian: Eid, self_intf_id: u64, now: u64) -> Option<EntryHandle> {
    let bundle = create_dacs(state, flow, custodian, self_intf_id, now);
    let h = state.alloc_entry(Entry::new_dacs(custodian, bundle)).ok()?;

    if let EntryData::DacsPending { pending: Some(b), .. } = &mut state.entries[h].data {
        b.primary.delivery_data.committed_storage_id = Some(h);
    }

    let eid_hash = fingerprint::dacs_fingerprint(&flow, &custodian);
    state.add_to_hash_index(eid_hash, h);
    state.entries[h].action_time = now + state.config.dacs_open_time_ms;

    fsm::make_pending(
        state,
        h,
        EntryFlags::ACTIVITY | EntryFlags::LOCAL_CUSTODY | EntryFlags::ACTION_TIME_WAIT,
        EntryFlags::empty(),
    );
    state.metrics.record_dacs_opened();
    debug!("dacs opened");
    Some(h)
}

/// Appends `sequence_num` to the open DACS at `h`, ignoring an already-present
/// value (a duplicate bundle admission can ack the same sequence twice).
/// Finalizes immediately once the payload hits `dacs_max_seq_per_payload`.
fn append_dacs(state: &mut CacheState, h: EntryHandle, sequence_num: u64) {
    let max_seq = state.config.dacs_max_seq_per_payload;
    let full = {
        let entry = &mut state.entries[h];
        let EntryData::DacsPending { pending: Some(bundle), .. } = &mut entry.data else {
            return;
        };
        let Some(payload) = bundle.custody_accept_payload_mut() else {
            return;
        };
        if !payload.sequence_nums.contains(&sequence_num) && payload.sequence_nums.len() < max_seq {
            payload.sequence_nums.push(sequence_num);
        }
        payload.sequence_nums.len() >= max_seq
    };

    state.metrics.record_dacs_appended();

    if full {
        finalize_dacs(state, h);
        fsm::make_pending(state, h, EntryFlags::empty(), EntryFlags::ACTION_TIME_WAIT);
    }
}

/// Finds (or opens) the DACS accumulating acks for `(flow, prev_custodian)`
/// and appends `sequence_num` to it.
pub(crate) fn ack_tracking_block(
    state: &mut CacheState,
    flow: &Eid,
    prev_custodian: &Eid,
    sequence_num: u64,
    self_intf_id: u64,
    now: u64,
) {
    let h = match find_pending_dacs(state, flow, prev_custodian) {
        Some(h) => h,
        None => match open_dacs(state, *flow, *prev_custodian, self_intf_id, now) {
            Some(h) => h,
            None => return,
        },
    };
    append_dacs(state, h, sequence_num);
}

fn update_tracking_block(bundle: &mut Bundle, self_addr: Eid) {
    if let Some(c) = bundle.custody_tracking_block_mut() {
        c.current_custodian = Some(self_addr);
    }
}

/// The three-way branch admission runs a custody-tracked bundle through:
/// acknowledge an existing custodian, install a fresh tracking block as the
/// first custodian of a locally-originated bundle, or do neither because
/// this node is both the final destination and the point of origin.
#[instrument(level = "debug", skip(state, bundle))]
pub(crate) fn process_bundle(state: &mut CacheState, bundle: &mut Bundle, self_intf_id: u64, now: u64) {
    let is_local = bundle.final_dest_node() == state.self_addr.node.0;
    let flow = bundle.primary.source;
    let sequence_num = bundle.primary.creation.sequence_num;
    let prev_custodian = custodian_from_tracking_block(bundle);

    match (prev_custodian, is_local) {
        (Some(custodian), _) => {
            ack_tracking_block(state, &flow, &custodian, sequence_num, self_intf_id, now);
            if is_local {
                bundle.primary.delivery_data.policy = Some(DeliveryPolicy::LocalAck);
            }
        }
        (None, false) => bundle.insert_custody_tracking_block(),
        (None, true) => {}
    }

    update_tracking_block(bundle, state.self_addr);
}

/// Removes the (now complete) DACS from `hash_index` — future appends are
/// blocked simply by it no longer being reachable there — and promotes its
/// accumulated bundle into the shared `refptr` slot, the same a stored
/// bundle entry carries.
pub(crate) fn finalize_dacs(state: &mut CacheState, h: EntryHandle) {
    state.remove_from_hash_index(h);
    let entry = &mut state.entries[h];
    if let EntryData::DacsPending { pending, .. } = &mut entry.data {
        if let Some(bundle) = pending.take() {
            entry.refptr = Some(Arc::new(bundle));
        }
        // Once finalized a DACS entry carries a plain bundle payload from
        // here on: it ages out and retransmits through the same FSM path a
        // stored bundle does, instead of re-entering this function forever.
        entry.data = EntryData::Bundle;
        state.metrics.record_dacs_finalized();
    }
}

/// Walks an inbound DACS's acknowledged sequence numbers, clearing
/// `LOCAL_CUSTODY` on each matching stored entry so the FSM re-evaluates it
/// on the next pass.
fn process_remote_dacs_bundle(state: &mut CacheState, bundle: &Bundle) {
    let Some(payload) = bundle.custody_accept_payload() else { return };
    let flow = payload.flow_source_eid;
    for &sequence_num in &payload.sequence_nums {
        if let Some(h) = find_existing_bundle(state, &flow, sequence_num) {
            state.metrics.record_custody_ack_processed();
            fsm::make_pending(state, h, EntryFlags::empty(), EntryFlags::LOCAL_CUSTODY);
        }
    }
}

/// True (and processed) iff `bundle` is an admin record carrying a
/// custody-accept payload.
pub fn check_dacs(state: &mut CacheState, bundle: &Bundle) -> bool {
    if bundle.is_dacs() {
        process_remote_dacs_bundle(state, bundle);
        true
    } else {
        false
    }
}

/// Admission path. Returns the new entry's handle, or `None` for a
/// duplicate (acked but not re-stored) or arena exhaustion (no index update
/// happens before the allocation succeeds, so nothing leaks).
#[instrument(level = "debug", skip(state, bundle), fields(flow = %bundle.primary.source))]
pub fn store_bundle(state: &mut CacheState, mut bundle: Bundle, self_intf_id: u64, now: u64) -> Option<EntryHandle> {
    let flow = bundle.primary.source;
    let sequence_num = bundle.primary.creation.sequence_num;

    if find_existing_bundle(state, &flow, sequence_num).is_some() {
        state.metrics.record_duplicate();
        debug!("duplicate bundle admission");
        if let Some(custodian) = custodian_from_tracking_block(&bundle) {
            ack_tracking_block(state, &flow, &custodian, sequence_num, self_intf_id, now);
        }
        return None;
    }

    let final_dest_key = NodeNumber::from(bundle.final_dest_node()).as_index_key();
    bundle.primary.delivery_data.storage_intf_id = self_intf_id;

    if bundle.primary.delivery_data.policy == Some(DeliveryPolicy::CustodyTracking) {
        process_bundle(state, &mut bundle, self_intf_id, now);
    }

    let eid_hash = fingerprint::bundle_fingerprint(&flow, sequence_num);
    let h = state.alloc_entry(Entry::new_bundle(Arc::new(bundle))).ok()?;

    // The Arc was just constructed above and nothing else has cloned it yet,
    // so get_mut is guaranteed to succeed.
    if let Some(b) = Arc::get_mut(state.entries[h].refptr.as_mut().expect("bundle entry always has a refptr")) {
        b.primary.delivery_data.committed_storage_id = Some(h);
    }

    state.entries[h].flags.insert(EntryFlags::LOCAL_CUSTODY | EntryFlags::ACTIVITY);
    state.add_to_dest_index(final_dest_key, h);
    state.add_to_hash_index(eid_hash, h);
    fsm::make_pending(state, h, EntryFlags::empty(), EntryFlags::empty());
    state.metrics.record_admitted();
    Some(h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::CustodyTrackingBlock;
    use bpcache_common::{CacheConfig, Metrics};
    use std::sync::Arc as StdArc;

    fn state() -> CacheState {
        CacheState::new(Eid::new(1, 0), CacheConfig::default(), StdArc::new(Metrics::new()))
    }

    fn bundle(source: Eid, destination: Eid, seq: u64, policy: Option<DeliveryPolicy>) -> Bundle {
        Bundle {
            primary: PrimaryBlock {
                version: 7,
                source,
                report_to: source,
                destination,
                creation: CreationTimestamp { sequence_num: seq, time_ms: 0 },
                lifetime_ms: 1_000_000,
                is_admin_record: false,
                must_not_fragment: false,
                crc_type: CrcType::None,
                delivery_data: DeliveryData { policy, ..Default::default() },
            },
            canonical_blocks: Vec::new(),
        }
    }

    #[test_log::test]
    fn store_then_duplicate_is_rejected_and_does_not_grow_entry_count() {
        let mut st = state();
        let b = bundle(Eid::new(2, 1), Eid::new(1, 0), 1, Some(DeliveryPolicy::BestEffort));
        let h1 = store_bundle(&mut st, b.clone(), 7, 0);
        assert!(h1.is_some());
        assert_eq!(st.debug_stats().entry_count, 1);

        let dup = store_bundle(&mut st, b, 7, 100);
        assert!(dup.is_none());
        assert_eq!(st.debug_stats().entry_count, 1);
        assert_eq!(st.metrics.duplicates.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test_log::test]
    fn custody_tracked_bundle_with_no_prior_custodian_gets_tracking_block_inserted() {
        let mut st = state();
        let b = bundle(Eid::new(2, 1), Eid::new(3, 0), 1, Some(DeliveryPolicy::CustodyTracking));
        let h = store_bundle(&mut st, b, 7, 0).expect("stored");
        let stored = st.entries[h].refptr.as_ref().unwrap();
        assert!(stored.custody_tracking_block().is_some());
        assert_eq!(stored.custody_tracking_block().unwrap().current_custodian, Some(st.self_addr));
    }

    #[test_log::test]
    fn ack_with_no_open_dacs_opens_one_and_appends() {
        let mut st = state();
        let flow = Eid::new(2, 1);
        let custodian = Eid::new(5, 0);
        ack_tracking_block(&mut st, &flow, &custodian, 42, 7, 0);

        assert_eq!(st.debug_stats().entry_count, 1);
        let h = find_pending_dacs(&st, &flow, &custodian).expect("dacs entry indexed");
        if let EntryData::DacsPending { pending: Some(b), .. } = &st.entries[h].data {
            assert_eq!(b.custody_accept_payload().unwrap().sequence_nums, vec![42]);
        } else {
            panic!("expected an open dacs entry");
        }
    }

    #[test_log::test]
    fn appending_past_the_payload_cap_finalizes_and_clears_action_time_wait() {
        let mut st = state();
        st.config.dacs_max_seq_per_payload = 2;
        let flow = Eid::new(2, 1);
        let custodian = Eid::new(5, 0);

        ack_tracking_block(&mut st, &flow, &custodian, 1, 7, 0);
        ack_tracking_block(&mut st, &flow, &custodian, 2, 7, 0);

        assert!(find_pending_dacs(&st, &flow, &custodian).is_none(), "finalized dacs leaves the hash index");
    }

    #[test_log::test]
    fn remote_dacs_clears_local_custody_on_matching_entry() {
        let mut st = state();
        let flow = Eid::new(2, 1);
        let b = bundle(flow, Eid::new(1, 0), 9, Some(DeliveryPolicy::BestEffort));
        let h = store_bundle(&mut st, b, 7, 0).expect("stored");
        assert!(st.entries[h].flags.contains(EntryFlags::LOCAL_CUSTODY));

        let mut dacs = bundle(Eid::new(1, 0), flow, 0, None);
        dacs.primary.is_admin_record = true;
        dacs.canonical_blocks.push(CanonicalBlock::CustodyAcceptPayload(CustodyAcceptPayloadBlock {
            flow_source_eid: flow,
            sequence_nums: vec![9],
        }));

        assert!(check_dacs(&mut st, &dacs));
        assert!(!st.entries[h].flags.contains(EntryFlags::LOCAL_CUSTODY));
    }

    #[test_log::test]
    fn duplicate_with_existing_custodian_acks_without_restoring() {
        let mut st = state();
        let flow = Eid::new(2, 1);
        let mut b = bundle(flow, Eid::new(1, 0), 3, Some(DeliveryPolicy::BestEffort));
        b.canonical_blocks.push(CanonicalBlock::CustodyTracking(CustodyTrackingBlock {
            current_custodian: Some(Eid::new(9, 0)),
        }));
        store_bundle(&mut st, b.clone(), 7, 0);
        let before = st.debug_stats().entry_count;

        store_bundle(&mut st, b, 7, 0);
        assert_eq!(st.debug_stats().entry_count, before + 1, "only the new dacs entry was added");
        assert!(find_pending_dacs(&st, &flow, &Eid::new(9, 0)).is_some());
    }

    /// Admits several thousand bundles across a handful of flows and
    /// custodians with randomized sequence numbers — enough churn on
    /// `hash_index` and `dest_eid_index` to turn up any Queue-lifecycle or
    /// link-consistency bug that a handful of hand-written cases wouldn't
    /// reach, including the rare CRC-32C collision between two distinct
    /// `(flow, seq)` pairs within one bucket.
    #[test_log::test]
    fn random_admission_preserves_queue_lifecycle_and_index_consistency() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        let mut st = state();
        let mut rng = SmallRng::seed_from_u64(0xB9CACE);
        let flows: Vec<Eid> = (0..8).map(|n| Eid::new(100 + n, 1)).collect();
        let custodians: Vec<Eid> = (0..4).map(|n| Eid::new(50 + n, 0)).collect();

        for i in 0..5_000u64 {
            let flow = flows[rng.gen_range(0..flows.len())];
            let dest = Eid::new(200 + rng.gen_range(0..16), 0);
            let seq = rng.gen_range(0..2_000u64);
            let policy = if rng.gen_bool(0.5) { Some(DeliveryPolicy::CustodyTracking) } else { None };
            let mut b = bundle(flow, dest, seq, policy);
            if rng.gen_bool(0.3) {
                let custodian = custodians[rng.gen_range(0..custodians.len())];
                b.canonical_blocks.push(CanonicalBlock::CustodyTracking(CustodyTrackingBlock {
                    current_custodian: Some(custodian),
                }));
            }
            store_bundle(&mut st, b, 7, i);

            assert!(st.check_queue_lifecycle_invariant(), "queue lifecycle violated after admission {i}");
            assert!(st.check_single_list_invariant(), "single-list membership violated after admission {i}");
            for h in st.entries.keys() {
                let entry = &st.entries[h];
                assert_eq!(entry.in_hash_index(), true, "every stored entry is indexed by hash_index");
                assert_eq!(entry.in_dest_index(), !entry.is_dacs(), "dacs entries never enter dest_eid_index");
            }
        }
    }
}
