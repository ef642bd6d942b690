use std::collections::BTreeMap;
use std::ops::Range;

/// Ordered map from half-open byte ranges `[lo, hi)` to values.
///
/// Entries never overlap; `replace` is the only mutator and removes whatever
/// intersects the incoming range before inserting it. Backed by a `BTreeMap`
/// keyed by interval start, so point and sub-range lookups are O(log n).
#[derive(Debug)]
pub struct RangeMap<V> {
    entries: BTreeMap<u64, Entry<V>>,
}

#[derive(Debug)]
struct Entry<V> {
    end: u64,
    value: V,
}

impl<V> RangeMap<V> {
    pub fn new() -> RangeMap<V> {
        RangeMap {
            entries: BTreeMap::new(),
        }
    }

    /// Returns the entry whose range contains `point`, if any.
    pub fn get(&self, point: u64) -> Option<(Range<u64>, &V)> {
        let (start, entry) = self.entries.range(..=point).next_back()?;
        if point < entry.end {
            Some((*start..entry.end, &entry.value))
        } else {
            None
        }
    }

    /// All entries whose range intersects `[lo, hi)`, in ascending order.
    pub fn overlapping(&self, lo: u64, hi: u64) -> Vec<(Range<u64>, &V)> {
        if lo >= hi {
            return Vec::new();
        }
        let mut found = Vec::new();
        // An entry starting before `lo` can still reach into the range.
        if let Some((start, entry)) = self.entries.range(..lo).next_back() {
            if entry.end > lo {
                found.push((*start..entry.end, &entry.value));
            }
        }
        for (start, entry) in self.entries.range(lo..hi) {
            found.push((*start..entry.end, &entry.value));
        }
        found
    }

    /// Removes every entry intersecting `[lo, hi)` and inserts
    /// `[lo, hi) -> value`, returning the displaced entries.
    pub fn replace(&mut self, lo: u64, hi: u64, value: V) -> Vec<(Range<u64>, V)> {
        debug_assert!(lo < hi, "replace requires a non-empty range");
        let stale: Vec<u64> = self
            .overlapping(lo, hi)
            .into_iter()
            .map(|(range, _)| range.start)
            .collect();
        let mut displaced = Vec::with_capacity(stale.len());
        for start in stale {
            if let Some(entry) = self.entries.remove(&start) {
                displaced.push((start..entry.end, entry.value));
            }
        }
        self.entries.insert(lo, Entry { end: hi, value });
        displaced
    }

    /// Entries in ascending range order.
    pub fn iter(&self) -> impl Iterator<Item = (Range<u64>, &V)> + '_ {
        self.entries
            .iter()
            .map(|(start, entry)| (*start..entry.end, &entry.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for RangeMap<V> {
    fn default() -> Self {
        RangeMap::new()
    }
}
