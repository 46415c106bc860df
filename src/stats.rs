//! Optional instrumentation counters.
//!
//! Counters have no effect on table semantics; they exist purely for
//! diagnosing probe behavior. When the `stats` feature is disabled, `Stats`
//! is a zero-sized no-op so the counting calls threaded through `table.rs`
//! compile away entirely.
//!
//! The reference implementation mutates counters through a const-cast on a
//! `const` table inside `find` -- a deliberate "logical const" pattern. This
//! crate's equivalent is interior mutability via `Cell`, so `find` can stay
//! `&self` while still recording probe statistics.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "stats")] {
        use std::cell::Cell;

        #[derive(Default)]
        pub(crate) struct Stats {
            find_probe_total: Cell<u64>,
            find_probe_max: Cell<u64>,
            insert_probe_total: Cell<u64>,
            insert_probe_max: Cell<u64>,
            comparisons: Cell<u64>,
            equalities: Cell<u64>,
            hint_byte_sum: Cell<u64>,
            hint_byte_count: Cell<u64>,
        }

        impl Stats {
            #[inline]
            pub(crate) fn record_find_probe(&self, groups_visited: u64) {
                self.find_probe_total.set(self.find_probe_total.get() + groups_visited);
                if groups_visited > self.find_probe_max.get() {
                    self.find_probe_max.set(groups_visited);
                }
            }

            #[inline]
            pub(crate) fn record_insert_probe(&self, groups_visited: u64) {
                self.insert_probe_total.set(self.insert_probe_total.get() + groups_visited);
                if groups_visited > self.insert_probe_max.get() {
                    self.insert_probe_max.set(groups_visited);
                }
            }

            #[inline]
            pub(crate) fn record_comparison(&self) {
                self.comparisons.set(self.comparisons.get() + 1);
            }

            #[inline]
            pub(crate) fn record_equality(&self, equal: bool) {
                if equal {
                    self.equalities.set(self.equalities.get() + 1);
                }
            }

            #[inline]
            pub(crate) fn record_hint_byte(&self, hint: u8) {
                self.hint_byte_sum.set(self.hint_byte_sum.get() + hint as u64);
                self.hint_byte_count.set(self.hint_byte_count.get() + 1);
            }

            /// Emits a textual dump of the accumulated counters. Diagnostic
            /// only -- the format is not a stable interface.
            pub(crate) fn dump(&self, op: &str) {
                log::debug!(
                    "flatset stats after {op}: find_probes(total={}, max={}) insert_probes(total={}, max={}) comparisons={} equalities={} avg_hint_byte={:.1}",
                    self.find_probe_total.get(),
                    self.find_probe_max.get(),
                    self.insert_probe_total.get(),
                    self.insert_probe_max.get(),
                    self.comparisons.get(),
                    self.equalities.get(),
                    if self.hint_byte_count.get() == 0 {
                        0.0
                    } else {
                        self.hint_byte_sum.get() as f64 / self.hint_byte_count.get() as f64
                    },
                );
            }
        }
    } else {
        #[derive(Default)]
        pub(crate) struct Stats;

        impl Stats {
            #[inline(always)]
            pub(crate) fn record_find_probe(&self, _groups_visited: u64) {}
            #[inline(always)]
            pub(crate) fn record_insert_probe(&self, _groups_visited: u64) {}
            #[inline(always)]
            pub(crate) fn record_comparison(&self) {}
            #[inline(always)]
            pub(crate) fn record_equality(&self, _equal: bool) {}
            #[inline(always)]
            pub(crate) fn record_hint_byte(&self, _hint: u8) {}
            #[inline(always)]
            pub(crate) fn dump(&self, _op: &str) {}
        }
    }
}

#[cfg(all(test, feature = "stats"))]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = Stats::default();
        stats.record_find_probe(3);
        stats.record_find_probe(5);
        assert_eq!(stats.find_probe_total.get(), 8);
        assert_eq!(stats.find_probe_max.get(), 5);
    }
}
