/// Fixed-capacity rolling mean over the most recently pushed samples
///
/// Capacity is set once at construction. Once full, each push overwrites the
/// oldest sample. The running sum is kept alongside the ring so `mean` is O(1).
#[derive(Debug, Clone)]
pub struct RollingAverage {
    buffer: Vec<f32>,
    sum: f32,
    position: usize,
    count: usize,
}

impl RollingAverage {
    /// Create an empty window holding at most `capacity` samples
    ///
    /// A zero capacity is bumped to one; configuration rejects it earlier.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            sum: 0.0,
            position: 0,
            count: 0,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.count == self.buffer.len() {
            self.sum -= self.buffer[self.position];
        } else {
            self.count += 1;
        }

        self.buffer[self.position] = value;
        self.sum += value;
        self.position = (self.position + 1) % self.buffer.len();
    }

    pub fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|v| *v = 0.0);
        self.sum = 0.0;
        self.position = 0;
        self.count = 0;
    }

    /// Arithmetic mean of the held samples, or `None` if nothing was pushed
    /// since construction or the last `clear`
    pub fn mean(&self) -> Option<f32> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum / self.count as f32)
    }

    pub fn len(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_has_no_mean() {
        let window = RollingAverage::new(4);
        assert_eq!(window.len(), 0);
        assert_eq!(window.mean(), None);
    }

    #[test]
    fn mean_of_partial_window() {
        let mut window = RollingAverage::new(5);
        window.push(2.0);
        window.push(4.0);
        assert_eq!(window.len(), 2);
        assert_eq!(window.mean(), Some(3.0));
    }

    #[test]
    fn overflow_keeps_only_latest_values() {
        let mut window = RollingAverage::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            window.push(v);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.mean(), Some(3.0));

        window.push(8.0);
        // holds 3, 4, 8
        assert_eq!(window.mean(), Some(5.0));
    }

    #[test]
    fn clear_behaves_like_fresh_window() {
        let mut window = RollingAverage::new(3);
        for v in [10.0, 20.0, 30.0, 40.0] {
            window.push(v);
        }
        window.clear();
        assert_eq!(window.mean(), None);
        assert_eq!(window.len(), 0);

        window.push(1.0);
        window.push(2.0);
        assert_eq!(window.mean(), Some(1.5));

        // capacity survives a clear
        window.push(3.0);
        window.push(4.0);
        assert_eq!(window.len(), 3);
        assert_eq!(window.mean(), Some(3.0));
    }

    #[test]
    fn count_never_exceeds_capacity() {
        let mut window = RollingAverage::new(25);
        for i in 0..100 {
            window.push(i as f32);
            assert!(window.len() <= 25);
        }
        // last 25 values are 75..=99
        assert_eq!(window.mean(), Some(87.0));
    }
}
