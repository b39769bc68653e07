use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

/// An ordered set of uniquely named counters, fixed at construction.
///
/// Every counter is an independent atomic integer. Increments never block, and a drain swaps
/// each counter to zero in one indivisible step, so no increment is ever lost or counted twice.
/// Drains are atomic per counter only: two counters may be read at slightly different instants
/// relative to concurrent increments.
///
/// The bank is shared by reference, usually wrapped in an `Arc`.
pub struct CounterBank {
    counters: IndexMap<String, AtomicU64>,
}

impl CounterBank {
    /// Creates a bank with one zeroed counter per name.
    ///
    /// Duplicate names are collapsed into a single counter at the position of their first
    /// occurrence.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut counters = IndexMap::new();
        for name in names {
            counters
                .entry(name.into())
                .or_insert_with(|| AtomicU64::new(0));
        }

        Self { counters }
    }

    /// Adds one to the named counter.
    ///
    /// Unknown names are ignored.
    pub fn increment(&self, name: &str) {
        self.increment_by(name, 1);
    }

    /// Adds `value` to the named counter.
    ///
    /// Unknown names are ignored.
    pub fn increment_by(&self, name: &str, value: u64) {
        match self.counters.get(name) {
            Some(counter) => {
                counter.fetch_add(value, Ordering::Relaxed);
            }
            None => capacity_log::trace!(bucket = name, "ignoring increment of unknown counter"),
        }
    }

    /// Reads and resets every counter, in construction order.
    pub fn drain_all(&self) -> IndexMap<&str, u64> {
        self.counters
            .iter()
            .map(|(name, counter)| (name.as_str(), counter.swap(0, Ordering::AcqRel)))
            .collect()
    }

    /// Returns the current value of the named counter without resetting it.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.counters
            .get(name)
            .map(|counter| counter.load(Ordering::Relaxed))
    }
}

impl fmt::Debug for CounterBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.counters
                    .iter()
                    .map(|(name, counter)| (name, counter.load(Ordering::Relaxed))),
            )
            .finish()
    }
}
