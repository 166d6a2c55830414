//! Indexing Queue (C5): a deduplicating priority queue of work items.
//!
//! Dedup covers two disjoint sets: paths sitting on the ready heap, and
//! paths that have been handed out by `get` but not yet `mark_complete`d
//! (the "in-flight" set). A path can be in at most one of the two at a
//! time; that's what prevents the watcher and the startup resume sweep
//! from double-processing the same file (spec §4.5's invariant).

use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use chunk_model::{Priority, QueueItem};

struct QueueState {
    heap: BinaryHeap<QueueItem>,
    queued_paths: HashSet<String>,
    in_flight: HashSet<String>,
    paused: bool,
}

/// C5: see module docs. `get` blocks (with a timeout, to allow periodic
/// cancellation checks per spec §5) while the queue is empty or paused.
pub struct IndexingQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_paused: Condvar,
    next_seq: AtomicU64,
}

impl IndexingQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                queued_paths: HashSet::new(),
                in_flight: HashSet::new(),
                paused: false,
            }),
            not_empty: Condvar::new(),
            not_paused: Condvar::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Admits `path` unless it is already on the ready heap or already
    /// in-flight. `force` does not bypass dedup; it only propagates into
    /// the `QueueItem` so later pipeline stages can bypass their own skip
    /// checks (spec §4.5).
    pub fn add(&self, path: impl Into<String>, priority: Priority, force: bool) -> bool {
        let path = path.into();
        let mut state = self.state.lock().expect("queue lock poisoned");
        if state.queued_paths.contains(&path) || state.in_flight.contains(&path) {
            return false;
        }
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        state.queued_paths.insert(path.clone());
        state.heap.push(QueueItem::new(path, priority, force, seq));
        drop(state);
        self.not_empty.notify_one();
        true
    }

    /// Dequeues the highest-priority item (FIFO among equal priorities),
    /// blocking up to `timeout` while the queue is empty or paused. Moves
    /// the path into the in-flight set; callers must eventually call
    /// `mark_complete`.
    pub fn get(&self, timeout: Duration) -> Option<QueueItem> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().expect("queue lock poisoned");
        loop {
            if state.paused {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return None;
                }
                let (guard, _) = self.not_paused.wait_timeout(state, remaining).expect("queue lock poisoned");
                state = guard;
                continue;
            }
            if let Some(item) = state.heap.pop() {
                state.queued_paths.remove(&item.path);
                state.in_flight.insert(item.path.clone());
                return Some(item);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, result) = self.not_empty.wait_timeout(state, remaining).expect("queue lock poisoned");
            state = guard;
            if result.timed_out() && state.heap.is_empty() {
                continue;
            }
        }
    }

    /// Removes `path` from the in-flight set, making it eligible for a
    /// future `add` again.
    pub fn mark_complete(&self, path: &str) {
        let mut state = self.state.lock().expect("queue lock poisoned");
        state.in_flight.remove(path);
    }

    pub fn size(&self) -> usize {
        self.state.lock().expect("queue lock poisoned").heap.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.lock().expect("queue lock poisoned").in_flight.len()
    }

    pub fn pause(&self) {
        self.state.lock().expect("queue lock poisoned").paused = true;
    }

    pub fn resume(&self) {
        self.state.lock().expect("queue lock poisoned").paused = false;
        self.not_paused.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().expect("queue lock poisoned").paused
    }

    /// Drops every ready (not yet dequeued) item. Used by `POST
    /// /indexing/clear`; in-flight items are unaffected since they are
    /// already owned by a worker.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock().expect("queue lock poisoned");
        let n = state.heap.len();
        state.heap.clear();
        state.queued_paths.clear();
        n
    }
}

impl Default for IndexingQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn add_dedupes_against_ready_heap() {
        let q = IndexingQueue::new();
        assert!(q.add("a.txt", Priority::Normal, false));
        assert!(!q.add("a.txt", Priority::Normal, false));
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn add_dedupes_against_in_flight_set() {
        let q = IndexingQueue::new();
        assert!(q.add("a.txt", Priority::Normal, false));
        let item = q.get(Duration::from_millis(100)).unwrap();
        assert_eq!(item.path, "a.txt");
        assert!(!q.add("a.txt", Priority::Normal, false), "in-flight path must not be re-admitted");
        q.mark_complete("a.txt");
        assert!(q.add("a.txt", Priority::Normal, false), "completed path is eligible again");
    }

    #[test]
    fn get_returns_high_priority_first_then_fifo() {
        let q = IndexingQueue::new();
        q.add("normal-1", Priority::Normal, false);
        q.add("normal-2", Priority::Normal, false);
        q.add("high-1", Priority::High, false);

        assert_eq!(q.get(Duration::from_millis(50)).unwrap().path, "high-1");
        assert_eq!(q.get(Duration::from_millis(50)).unwrap().path, "normal-1");
        assert_eq!(q.get(Duration::from_millis(50)).unwrap().path, "normal-2");
    }

    #[test]
    fn get_times_out_on_empty_queue() {
        let q = IndexingQueue::new();
        assert!(q.get(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn pause_blocks_get_until_resume() {
        let q = Arc::new(IndexingQueue::new());
        q.add("a.txt", Priority::Normal, false);
        q.pause();

        let q2 = q.clone();
        let handle = thread::spawn(move || q2.get(Duration::from_secs(2)));

        thread::sleep(Duration::from_millis(50));
        assert!(q.is_paused());
        q.resume();

        let item = handle.join().unwrap();
        assert_eq!(item.unwrap().path, "a.txt");
    }

    #[test]
    fn clear_drops_ready_items_but_not_in_flight() {
        let q = IndexingQueue::new();
        q.add("a.txt", Priority::Normal, false);
        q.add("b.txt", Priority::Normal, false);
        let _in_flight = q.get(Duration::from_millis(50)).unwrap();
        assert_eq!(q.clear(), 1);
        assert_eq!(q.size(), 0);
        assert_eq!(q.in_flight_count(), 1);
    }
}
