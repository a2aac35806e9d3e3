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

//! Cache metrics: atomic counters bumped inline, exposed read-only to
//! callers, and mirrored into the global `metrics` registry.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub admitted: AtomicU64,
    pub duplicates: AtomicU64,
    pub dacs_opened: AtomicU64,
    pub dacs_appended: AtomicU64,
    pub dacs_finalized: AtomicU64,
    pub custody_acks_processed: AtomicU64,
    pub retransmits: AtomicU64,
    pub aged_out: AtomicU64,
    pub polls: AtomicU64,
    pub route_ups: AtomicU64,
    pub events: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admitted(&self) {
        Self::bump(&self.admitted);
        metrics::counter!("bpcache_admitted_total").increment(1);
    }

    pub fn record_duplicate(&self) {
        Self::bump(&self.duplicates);
        metrics::counter!("bpcache_duplicates_total").increment(1);
    }

    pub fn record_dacs_opened(&self) {
        Self::bump(&self.dacs_opened);
        metrics::counter!("bpcache_dacs_opened_total").increment(1);
    }

    pub fn record_dacs_appended(&self) {
        Self::bump(&self.dacs_appended);
        metrics::counter!("bpcache_dacs_appended_total").increment(1);
    }

    pub fn record_dacs_finalized(&self) {
        Self::bump(&self.dacs_finalized);
        metrics::counter!("bpcache_dacs_finalized_total").increment(1);
    }

    pub fn record_custody_ack_processed(&self) {
        Self::bump(&self.custody_acks_processed);
        metrics::counter!("bpcache_custody_acks_processed_total").increment(1);
    }

    pub fn record_retransmit(&self) {
        Self::bump(&self.retransmits);
        metrics::counter!("bpcache_retransmits_total").increment(1);
    }

    pub fn record_aged_out(&self) {
        Self::bump(&self.aged_out);
        metrics::counter!("bpcache_aged_out_total").increment(1);
    }

    pub fn record_poll(&self) {
        Self::bump(&self.polls);
        metrics::counter!("bpcache_polls_total").increment(1);
    }

    pub fn record_route_up(&self) {
        Self::bump(&self.route_ups);
        metrics::counter!("bpcache_route_ups_total").increment(1);
    }

    pub fn record_event(&self) {
        Self::bump(&self.events);
        metrics::counter!("bpcache_events_total").increment(1);
    }
}
