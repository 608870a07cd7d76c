use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::hash::Hash;

/// Fixed-capacity buffer of the latest raw classifications for one channel.
#[derive(Debug, Clone)]
pub struct SmoothingWindow<T> {
    values: VecDeque<T>,
    capacity: usize,
}

impl<T> SmoothingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `value`, evicting the oldest entry when full.
    pub fn push(&mut self, value: T) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<T: Clone + Eq + Hash> SmoothingWindow<T> {
    /// Most frequent value. Ties go to whichever tied value was pushed last.
    pub fn majority(&self) -> Option<T> {
        let mut counts: HashMap<&T, (usize, usize)> = HashMap::new();
        for (position, value) in self.values.iter().enumerate() {
            let entry = counts.entry(value).or_insert((0, position));
            entry.0 += 1;
            entry.1 = position;
        }
        counts
            .into_iter()
            .max_by_key(|(_, (count, last_seen))| (*count, *last_seen))
            .map(|(value, _)| value.clone())
    }
}

impl<T: Ord + Clone> SmoothingWindow<BTreeSet<T>> {
    /// Members present in at least half of the buffered frames.
    pub fn stable_members(&self) -> BTreeSet<T> {
        let mut counts: BTreeMap<&T, usize> = BTreeMap::new();
        for set in &self.values {
            for member in set {
                *counts.entry(member).or_default() += 1;
            }
        }
        let total = self.values.len();
        counts
            .into_iter()
            .filter(|(_, count)| count * 2 >= total)
            .map(|(member, _)| member.clone())
            .collect()
    }
}
