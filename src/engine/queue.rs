//! Handshake queue between producer and worker.
//!
//! A fixed ring of `depth` slots plus a token channel. The producer fills the
//! slot at `write_index` and sends one token; the worker receives a token, takes
//! the slot at `read_index` and clears it. `pending` is the number of filled
//! slots and never exceeds `depth`.
//!
//! The ring lock is never held while receiving. Closing drops the only sender,
//! so tokens already sent are still received before the worker sees the close.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::engine::record::QueueRecord;
use crate::errors::{FatalError, QueueError};

/// Outcome of waiting for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    Work,
    Closed,
}

#[derive(Debug)]
struct Ring {
    slots: Vec<Option<QueueRecord>>,
    write_index: usize,
    read_index: usize,
    pending: usize,
}

#[derive(Debug)]
pub struct HandshakeQueue {
    ring: Mutex<Ring>,
    tokens: Mutex<Option<Sender<()>>>,
    wake: Receiver<()>,
    available: AtomicBool,
    depth: usize,
}

impl HandshakeQueue {
    /// New queue with `depth` slots (at least one). Unavailable until a worker marks it.
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        let (tx, rx) = bounded(depth);
        Self {
            ring: Mutex::new(Ring {
                slots: (0..depth).map(|_| None).collect(),
                write_index: 0,
                read_index: 0,
                pending: 0,
            }),
            tokens: Mutex::new(Some(tx)),
            wake: rx,
            available: AtomicBool::new(false),
            depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn pending(&self) -> usize {
        self.ring.lock().map(|r| r.pending).unwrap_or(0)
    }

    /// `(write_index, read_index)`.
    pub fn indices(&self) -> (usize, usize) {
        self.ring
            .lock()
            .map(|r| (r.write_index, r.read_index))
            .unwrap_or((0, 0))
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    pub(crate) fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Place `record` in the next free slot and signal the worker.
    pub fn enqueue(&self, record: QueueRecord) -> Result<(), QueueError> {
        if !self.is_available() {
            return Err(QueueError::Disabled);
        }
        {
            let mut ring = self.ring.lock().map_err(|_| QueueError::Broken)?;
            if ring.pending == self.depth {
                return Err(QueueError::Full);
            }
            let w = ring.write_index;
            if ring.pending > self.depth || w >= self.depth || ring.slots[w].is_some() {
                return Err(QueueError::Broken);
            }
            ring.slots[w] = Some(record);
            ring.write_index = (w + 1) % self.depth;
            ring.pending += 1;
        }
        self.post()
    }

    fn post(&self) -> Result<(), QueueError> {
        let tokens = self.tokens.lock().map_err(|_| QueueError::Broken)?;
        let tx = tokens.as_ref().ok_or(QueueError::Disabled)?;
        tx.try_send(()).map_err(|e| match e {
            // More tokens than slots means the ring and channel disagree.
            TrySendError::Full(()) => QueueError::Broken,
            TrySendError::Disconnected(()) => QueueError::Disabled,
        })
    }

    /// Block until a token arrives, or until the queue is closed and drained.
    pub(crate) fn wait_for_work(&self) -> Result<Wake, FatalError> {
        match self.wake.recv() {
            Ok(()) => Ok(Wake::Work),
            Err(_) => Ok(Wake::Closed),
        }
    }

    /// Remove the record at `read_index`. Called once per successful wait.
    pub(crate) fn take_next(&self) -> Result<QueueRecord, FatalError> {
        let mut ring = self.ring.lock().map_err(|_| FatalError::WaitFailed)?;
        if ring.pending == 0 {
            return Err(FatalError::EmptyOnSignal);
        }
        let r = ring.read_index;
        if r >= self.depth {
            return Err(FatalError::ReadIndexCorrupt {
                index: r,
                depth: self.depth,
            });
        }
        let record = ring.slots[r].take().ok_or(FatalError::EmptySlot(r))?;
        ring.read_index = (r + 1) % self.depth;
        ring.pending -= 1;
        Ok(record)
    }

    /// Stop accepting work and wake the worker once the sent tokens are used up.
    pub(crate) fn close(&self) {
        self.set_available(false);
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    #[cfg(test)]
    pub(crate) fn post_without_record(&self) {
        let _ = self.post();
    }

    #[cfg(test)]
    pub(crate) fn corrupt_write_index(&self, index: usize) {
        if let Ok(mut ring) = self.ring.lock() {
            ring.write_index = index;
        }
    }

    #[cfg(test)]
    pub(crate) fn corrupt_read_index(&self, index: usize) {
        if let Ok(mut ring) = self.ring.lock() {
            ring.read_index = index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::record::Operation;

    fn rec(seq: u64) -> QueueRecord {
        QueueRecord {
            sequence: seq,
            operation: Operation::Delete {
                path: format!("/ram/f{seq}").into(),
            },
        }
    }

    fn open_queue(depth: usize) -> HandshakeQueue {
        let q = HandshakeQueue::new(depth);
        q.set_available(true);
        q
    }

    fn dequeue(q: &HandshakeQueue) -> QueueRecord {
        assert_eq!(q.wait_for_work().unwrap(), Wake::Work);
        q.take_next().unwrap()
    }

    #[test]
    fn fifo_order() {
        let q = open_queue(3);
        for i in 0..3 {
            q.enqueue(rec(i)).unwrap();
        }
        for i in 0..3 {
            assert_eq!(dequeue(&q).sequence, i);
        }
        assert_eq!(q.pending(), 0);
    }

    #[test]
    fn full_queue_rejects_without_side_effects() {
        let q = open_queue(2);
        q.enqueue(rec(0)).unwrap();
        q.enqueue(rec(1)).unwrap();
        let before = q.indices();
        assert_eq!(q.enqueue(rec(2)), Err(QueueError::Full));
        assert_eq!(q.indices(), before);
        assert_eq!(q.pending(), 2);
        assert_eq!(dequeue(&q).sequence, 0);
        assert_eq!(dequeue(&q).sequence, 1);
    }

    #[test]
    fn unavailable_queue_is_disabled() {
        let q = HandshakeQueue::new(3);
        assert_eq!(q.enqueue(rec(0)), Err(QueueError::Disabled));
        assert_eq!(q.pending(), 0);
    }

    #[test]
    fn indices_meet_after_wraparound() {
        let q = open_queue(3);
        for i in 0..6 {
            q.enqueue(rec(i)).unwrap();
            assert_eq!(dequeue(&q).sequence, i);
        }
        let (w, r) = q.indices();
        assert_eq!(w, r);
        assert_eq!(w, 0);
    }

    #[test]
    fn occupied_write_slot_is_broken() {
        let q = open_queue(3);
        q.enqueue(rec(0)).unwrap();
        q.corrupt_write_index(0);
        assert_eq!(q.enqueue(rec(1)), Err(QueueError::Broken));
        assert_eq!(q.pending(), 1);
    }

    #[test]
    fn reading_an_empty_slot_is_fatal() {
        let q = open_queue(3);
        q.enqueue(rec(0)).unwrap();
        q.corrupt_read_index(2);
        assert_eq!(dequeue_err(&q), FatalError::EmptySlot(2));
    }

    fn dequeue_err(q: &HandshakeQueue) -> FatalError {
        assert_eq!(q.wait_for_work().unwrap(), Wake::Work);
        q.take_next().unwrap_err()
    }

    #[test]
    fn spurious_signal_is_fatal() {
        let q = open_queue(3);
        q.post_without_record();
        assert_eq!(dequeue_err(&q), FatalError::EmptyOnSignal);
    }

    #[test]
    fn read_index_out_of_range_is_fatal() {
        let q = open_queue(3);
        q.enqueue(rec(0)).unwrap();
        q.corrupt_read_index(7);
        assert_eq!(
            dequeue_err(&q),
            FatalError::ReadIndexCorrupt { index: 7, depth: 3 }
        );
    }

    #[test]
    fn close_drains_sent_tokens_first() {
        let q = open_queue(3);
        q.enqueue(rec(0)).unwrap();
        q.close();
        assert_eq!(q.wait_for_work().unwrap(), Wake::Work);
        assert_eq!(q.take_next().unwrap().sequence, 0);
        assert_eq!(q.wait_for_work().unwrap(), Wake::Closed);
        assert_eq!(q.enqueue(rec(1)), Err(QueueError::Disabled));
    }

    #[test]
    fn close_wakes_a_blocked_worker() {
        let q = std::sync::Arc::new(open_queue(2));
        let waiter = {
            let q = q.clone();
            std::thread::spawn(move || q.wait_for_work().unwrap())
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        q.close();
        assert_eq!(waiter.join().unwrap(), Wake::Closed);
    }
}
