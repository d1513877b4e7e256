use std::collections::{HashSet, VecDeque};

/// Default capacity of the dedup cache.
pub const DEDUP_MAX: usize = 10_000;

/// Bounded set of recently applied event ids.
///
/// Eviction is FIFO truncation: once the set reaches its capacity only the
/// most recently inserted half is kept. Losing an id only costs a redundant
/// handler call, which the guarded writes turn into a no-op.
#[derive(Debug)]
pub struct DedupCache {
    max: usize,
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEDUP_MAX)
    }
}

impl DedupCache {
    pub fn new(max: usize) -> Self {
        Self {
            max: max.max(2),
            order: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.ids.contains(event_id)
    }

    pub fn add(&mut self, event_id: &str) {
        if !self.ids.insert(event_id.to_string()) {
            return;
        }
        self.order.push_back(event_id.to_string());

        if self.order.len() >= self.max {
            let keep = self.max / 2;
            while self.order.len() > keep {
                if let Some(oldest) = self.order.pop_front() {
                    self.ids.remove(&oldest);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_added_ids() {
        let mut cache = DedupCache::default();
        assert!(!cache.contains("e1"));
        cache.add("e1");
        cache.add("e1");
        assert!(cache.contains("e1"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn never_exceeds_capacity_and_keeps_newest_half() {
        let max = DEDUP_MAX;
        let mut cache = DedupCache::new(max);
        let total = max + 1_234;

        for i in 0..total {
            cache.add(&format!("e{i}"));
            assert!(cache.len() <= max);
        }

        for i in (total - max / 2)..total {
            assert!(cache.contains(&format!("e{i}")), "e{i} should be retained");
        }
        assert!(!cache.contains("e0"));
    }

    #[test]
    fn truncates_exactly_at_capacity() {
        let mut cache = DedupCache::new(10);
        for i in 0..9 {
            cache.add(&format!("e{i}"));
        }
        assert_eq!(cache.len(), 9);

        cache.add("e9");
        assert_eq!(cache.len(), 5);
        let kept: Vec<bool> = (5..10).map(|i| cache.contains(&format!("e{i}"))).collect();
        assert_eq!(kept, vec![true; 5]);
        assert!(!cache.contains("e4"));
    }
}
