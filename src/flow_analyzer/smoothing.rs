use std::collections::VecDeque;

/// Fixed-capacity FIFO of the most recent raw green durations.
///
/// Once full, each push evicts the oldest sample; the buffer never grows
/// past the capacity it was created with.
#[derive(Debug, Clone)]
pub struct SmoothingHistory {
    capacity: usize,
    samples: VecDeque<u32>,
}

impl SmoothingHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, green: u32) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(green);
    }

    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().map(|&g| g as u64).sum();
        Some(sum as f64 / self.samples.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &u32> {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_once_full() {
        let mut history = SmoothingHistory::new(3);
        for green in [10, 20, 30, 40] {
            history.push(green);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![20, 30, 40]);
        assert_eq!(history.average(), Some(30.0));
    }

    #[test]
    fn empty_history_has_no_average() {
        let mut history = SmoothingHistory::new(2);
        assert_eq!(history.average(), None);
        history.push(15);
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.average(), None);
    }
}
