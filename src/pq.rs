//! Binary min-heap priority queue
//!
//! A dense array heap keyed by an ordered priority, carrying an arbitrary
//! payload. Empty-queue and not-found cases return `None` instead of failing.

/// A min-priority queue stored as a dense binary heap.
///
/// The root (index 0) always holds the minimum priority. Ties between equal
/// priorities are resolved by heap structure only; callers that need FIFO
/// behaviour should fold a sequence number into the priority.
#[derive(Clone, Debug)]
pub struct PriorityQueue<P, V> {
    heap: Vec<(P, V)>,
}

impl<P: Ord, V> Default for PriorityQueue<P, V> {
    fn default() -> Self {
        Self::new()
    }
}

fn parent(i: usize) -> usize {
    (i - 1) / 2
}

impl<P: Ord, V> PriorityQueue<P, V> {
    pub fn new() -> Self {
        Self { heap: Vec::new() }
    }

    /// Number of entries in the queue.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Peek the minimum entry without removing it.
    pub fn peek(&self) -> Option<(&P, &V)> {
        self.heap.first().map(|(p, v)| (p, v))
    }

    /// Iterate entries in heap (not priority) order.
    pub fn iter(&self) -> impl Iterator<Item = (&P, &V)> {
        self.heap.iter().map(|(p, v)| (p, v))
    }

    /// Insert an entry. O(log n).
    pub fn add(&mut self, priority: P, value: V) {
        self.heap.push((priority, value));
        let last = self.heap.len() - 1;
        self.sift_up(last);
    }

    /// Remove and return the minimum entry. O(log n).
    pub fn remove(&mut self) -> Option<(P, V)> {
        if self.heap.is_empty() {
            return None;
        }
        let min = self.heap.swap_remove(0);
        self.sift_down(0);
        Some(min)
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let p = parent(i);
            if self.heap[i].0 >= self.heap[p].0 {
                break;
            }
            self.heap.swap(i, p);
            i = p;
        }
    }

    /// Move the entry at `i` to the root regardless of its priority.
    /// Leaves the heap valid everywhere except possibly at the root.
    fn sift_to_root(&mut self, mut i: usize) {
        while i > 0 {
            let p = parent(i);
            self.heap.swap(i, p);
            i = p;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let n = self.heap.len();
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            if left >= n {
                break;
            }
            // Left child wins ties.
            let child = if right < n && self.heap[right].0 < self.heap[left].0 {
                right
            } else {
                left
            };
            if self.heap[child].0 >= self.heap[i].0 {
                break;
            }
            self.heap.swap(i, child);
            i = child;
        }
    }
}

impl<P: Ord, V: PartialEq> PriorityQueue<P, V> {
    /// Linear scan for the first entry matching both priority and value.
    pub fn search(&self, priority: &P, value: &V) -> Option<usize> {
        self.heap
            .iter()
            .position(|(p, v)| p == priority && v == value)
    }

    /// Delete one matching entry. Returns its original priority and value.
    ///
    /// The match is hoisted to the root along its ancestor path (every
    /// ancestor is <= the entry, so shifting them down one level keeps the
    /// subtree property) and then removed like the minimum.
    pub fn delete(&mut self, priority: &P, value: &V) -> Option<(P, V)> {
        let i = self.search(priority, value)?;
        self.sift_to_root(i);
        self.remove()
    }
}
