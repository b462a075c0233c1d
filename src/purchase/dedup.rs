use std::collections::{HashMap, VecDeque};

/// How many transactions are remembered before the oldest is forgotten.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// First time this transaction is seen. Verify it.
    First,
    /// Seen before; carries the delivery count including this one.
    Repeat(u32),
}

/// Transactions the purchase listener has already handled.
///
/// Bounded: once `capacity` keys are stored, the oldest key is evicted first.
#[derive(Debug)]
pub struct ProcessedSet {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashMap<String, u32>,
}

impl Default for ProcessedSet {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ProcessedSet {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashMap::with_capacity(capacity),
        }
    }

    /// Records a delivery of `key`.
    pub fn observe(&mut self, key: &str) -> Delivery {
        if let Some(count) = self.seen.get_mut(key) {
            *count += 1;
            return Delivery::Repeat(*count);
        }

        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }

        self.order.push_back(key.to_string());
        self.seen.insert(key.to_string(), 1);
        Delivery::First
    }

    /// Drops `key` so its next delivery counts as the first one again.
    pub fn forget(&mut self, key: &str) {
        if self.seen.remove(key).is_some() {
            self.order.retain(|entry| entry != key);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}
