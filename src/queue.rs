//! Bounded, blocking FIFO queue with completion tracking.
//!
//! `BoundedQueue` is a `Mutex<VecDeque<T>>` paired with condition variables:
//! producers wait on `not_full`, consumers wait on `not_empty`, and anyone
//! calling [`BoundedQueue::join`] waits on `all_done` until every item that
//! was ever put has been retrieved *and* marked done.
//!
//! A queue of [`Message<T>`] doubles as a closable queue: [`close`] enqueues
//! a shutdown sentinel and [`consume`] iterates real items until it sees one.
//!
//! [`close`]: BoundedQueue::close
//! [`consume`]: BoundedQueue::consume

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::QueueError;

/// An item travelling through a closable queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<T> {
    Item(T),
    /// Sentinel telling exactly one consumer that no more work will arrive.
    Shutdown,
}

struct State<T> {
    items: VecDeque<T>,
    // Items put but not yet marked done (queued + in flight).
    unfinished: usize,
}

pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    all_done: Condvar,
    capacity: Option<usize>,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ZeroCapacity`] when `capacity` is 0, since such a
    /// queue could never accept an item.
    pub fn new(capacity: usize) -> Result<Self, QueueError<T>> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        Ok(Self::with_limit(Some(capacity)))
    }

    /// Create a queue whose `put` never blocks.
    pub fn unbounded() -> Self {
        Self::with_limit(None)
    }

    fn with_limit(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity.unwrap_or(0)),
                unfinished: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            all_done: Condvar::new(),
            capacity,
        }
    }

    // Every mutation finishes before the guard drops, so a poisoned lock
    // still holds a consistent queue.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_full(&self, state: &State<T>) -> bool {
        self.capacity
            .is_some_and(|capacity| state.items.len() >= capacity)
    }

    fn push(&self, mut state: MutexGuard<'_, State<T>>, item: T) {
        state.items.push_back(item);
        state.unfinished += 1;
        drop(state);
        self.not_empty.notify_one();
    }

    fn pop(&self, state: &mut State<T>) -> Option<T> {
        let item = state.items.pop_front()?;
        self.not_full.notify_one();
        Some(item)
    }

    /// Append `item`, blocking while the queue is at capacity.
    pub fn put(&self, item: T) {
        let mut state = self.lock();
        // Loop: condvars allow spurious wakeups.
        while self.is_full(&state) {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.push(state, item);
    }

    /// Append `item` only if there is room right now.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] carrying the item back when the queue is
    /// at capacity.
    pub fn try_put(&self, item: T) -> Result<(), QueueError<T>> {
        let state = self.lock();
        if self.is_full(&state) {
            return Err(QueueError::Full(item));
        }
        self.push(state, item);
        Ok(())
    }

    /// Remove and return the head item, blocking while the queue is empty.
    pub fn get(&self) -> T {
        let mut state = self.lock();
        loop {
            if let Some(item) = self.pop(&mut state) {
                return item;
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn try_get(&self) -> Option<T> {
        self.pop(&mut self.lock())
    }

    /// Like [`get`](Self::get), but gives up after `timeout`.
    pub fn get_timeout(&self, timeout: Duration) -> Option<T> {
        // a deadline past what `Instant` can represent is no deadline at all
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.get());
        };
        let mut state = self.lock();
        loop {
            if let Some(item) = self.pop(&mut state) {
                return Some(item);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            state = self
                .not_empty
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Record that one retrieved item has been fully processed.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::MarkDoneUnderflow`] if every item put so far has
    /// already been marked done.
    pub fn mark_done(&self) -> Result<(), QueueError<T>> {
        let mut state = self.lock();
        if state.unfinished == 0 {
            return Err(QueueError::MarkDoneUnderflow);
        }
        state.unfinished -= 1;
        if state.unfinished == 0 {
            self.all_done.notify_all();
        }
        Ok(())
    }

    /// Block until every item ever put has been marked done.
    pub fn join(&self) {
        let mut state = self.lock();
        while state.unfinished > 0 {
            state = self
                .all_done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`join`](Self::join) but bounded. Returns `false` on timeout.
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.join();
            return true;
        };
        let mut state = self.lock();
        while state.unfinished > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            state = self
                .all_done
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Remove every queued item, marking each one done.
    pub fn drain(&self) -> Vec<T> {
        let mut state = self.lock();
        let items: Vec<T> = state.items.drain(..).collect();
        state.unfinished -= items.len();
        if state.unfinished == 0 {
            self.all_done.notify_all();
        }
        drop(state);
        self.not_full.notify_all();
        items
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// `None` for an unbounded queue.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Items put but not yet marked done.
    pub fn outstanding(&self) -> usize {
        self.lock().unfinished
    }
}

impl<T> BoundedQueue<Message<T>> {
    /// Enqueue one shutdown sentinel. Call once per consumer.
    pub fn close(&self) {
        self.put(Message::Shutdown);
    }

    pub fn put_item(&self, item: T) {
        self.put(Message::Item(item));
    }

    /// Iterate real items until a shutdown sentinel arrives.
    ///
    /// Each yielded item is marked done when the iterator is advanced again,
    /// i.e. after the caller has finished with it. The sentinel is marked done
    /// before iteration ends. Dropping the iterator while holding an item
    /// leaves that item outstanding, so a pending `join` keeps waiting.
    pub fn consume(&self) -> Consume<'_, T> {
        Consume {
            queue: self,
            holding: false,
            finished: false,
            polled: 0,
        }
    }
}

pub struct Consume<'a, T> {
    queue: &'a BoundedQueue<Message<T>>,
    holding: bool,
    finished: bool,
    polled: usize,
}

impl<T> Consume<'_, T> {
    /// Number of `get` calls made so far, sentinel included.
    pub fn polled(&self) -> usize {
        self.polled
    }

    fn settle(&self) {
        if let Err(err) = self.queue.mark_done() {
            log::error!("consumer could not settle an item: {err}");
        }
    }
}

impl<T> Iterator for Consume<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.finished {
            return None;
        }
        if self.holding {
            self.settle();
            self.holding = false;
        }

        self.polled += 1;
        match self.queue.get() {
            Message::Item(item) => {
                self.holding = true;
                Some(item)
            }
            Message::Shutdown => {
                self.settle();
                self.finished = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            BoundedQueue::<u8>::new(0),
            Err(QueueError::ZeroCapacity)
        ));
    }

    #[test]
    fn fifo_order() {
        let queue = BoundedQueue::new(4).unwrap();
        for i in 0..4 {
            queue.put(i);
        }
        let got: Vec<_> = (0..4).map(|_| queue.get()).collect();
        assert_eq!(got, vec![0, 1, 2, 3]);
    }

    #[test]
    fn try_put_hands_item_back_when_full() {
        let queue = BoundedQueue::new(1).unwrap();
        queue.try_put("a").unwrap();
        let err = queue.try_put("b").unwrap_err();
        assert_eq!(err.into_inner(), Some("b"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn unbounded_never_blocks() {
        let queue = BoundedQueue::unbounded();
        for i in 0..10_000 {
            queue.try_put(i).unwrap();
        }
        assert_eq!(queue.len(), 10_000);
        assert_eq!(queue.capacity(), None);
    }

    #[test]
    fn try_get_and_timeout_on_empty() {
        let queue = BoundedQueue::<u8>::new(2).unwrap();
        assert_eq!(queue.try_get(), None);
        let start = Instant::now();
        assert_eq!(queue.get_timeout(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn get_timeout_wakes_on_put() {
        let queue = Arc::new(BoundedQueue::new(1).unwrap());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.put(7);
            })
        };
        assert_eq!(queue.get_timeout(Duration::from_secs(5)), Some(7));
        producer.join().unwrap();
    }

    #[test]
    fn mark_done_underflow() {
        let queue = BoundedQueue::new(1).unwrap();
        queue.put(1);
        queue.get();
        queue.mark_done().unwrap();
        assert!(matches!(
            queue.mark_done(),
            Err(QueueError::MarkDoneUnderflow)
        ));
    }

    #[test]
    fn outstanding_counts_in_flight_items() {
        let queue = BoundedQueue::new(3).unwrap();
        queue.put('a');
        queue.put('b');
        queue.get();
        // one queued, one retrieved but not done
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.outstanding(), 2);
        queue.mark_done().unwrap();
        assert_eq!(queue.outstanding(), 1);
    }

    #[test]
    fn join_returns_immediately_when_idle() {
        let queue = BoundedQueue::<u8>::new(1).unwrap();
        queue.join();
        assert!(queue.join_timeout(Duration::ZERO));
    }

    #[test]
    fn join_timeout_expires_with_pending_work() {
        let queue = BoundedQueue::new(1).unwrap();
        queue.put(());
        assert!(!queue.join_timeout(Duration::from_millis(20)));
        queue.get();
        queue.mark_done().unwrap();
        assert!(queue.join_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn unrepresentable_timeout_waits_without_deadline() {
        let queue = Arc::new(BoundedQueue::new(2).unwrap());
        assert!(queue.join_timeout(Duration::MAX));

        queue.put(7);
        assert_eq!(queue.get_timeout(Duration::MAX), Some(7));

        let settler = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.mark_done().unwrap();
            })
        };
        assert!(queue.join_timeout(Duration::MAX));
        assert_eq!(queue.outstanding(), 0);
        settler.join().unwrap();
    }

    #[test]
    fn drain_settles_everything() {
        let queue = BoundedQueue::new(5).unwrap();
        for i in 0..5 {
            queue.put(i);
        }
        assert_eq!(queue.drain(), vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
        assert_eq!(queue.outstanding(), 0);
    }

    #[test]
    fn consume_stops_at_sentinel_and_settles() {
        let queue: BoundedQueue<Message<i32>> = BoundedQueue::new(8).unwrap();
        queue.put_item(1);
        queue.put_item(2);
        queue.close();
        queue.put_item(3);

        let mut consume = queue.consume();
        let seen: Vec<_> = consume.by_ref().collect();
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(consume.polled(), 3);
        assert_eq!(consume.next(), None);

        // item 3 is still queued and outstanding
        assert_eq!(queue.outstanding(), 1);
        assert_eq!(queue.get(), Message::Item(3));
    }

    #[test]
    fn consume_marks_done_only_on_resume() {
        let queue: BoundedQueue<Message<&str>> = BoundedQueue::new(2).unwrap();
        queue.put_item("x");
        queue.close();

        let mut consume = queue.consume();
        assert_eq!(consume.next(), Some("x"));
        assert_eq!(queue.outstanding(), 2);
        assert_eq!(consume.next(), None);
        assert_eq!(queue.outstanding(), 0);
    }

    #[test]
    fn abandoned_item_stays_outstanding() {
        let queue: BoundedQueue<Message<u8>> = BoundedQueue::new(2).unwrap();
        queue.put_item(1);
        {
            let mut consume = queue.consume();
            assert_eq!(consume.next(), Some(1));
        }
        assert_eq!(queue.outstanding(), 1);
        assert!(!queue.join_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let queue = Arc::new(BoundedQueue::new(2).unwrap());
        queue.put(1);
        let poisoner = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let _guard = queue.state.lock().unwrap();
                panic!("poison the queue lock");
            })
        };
        assert!(poisoner.join().is_err());

        queue.put(2);
        assert_eq!(queue.get(), 1);
        assert_eq!(queue.get(), 2);
    }
}
