//! # Packet Queue
//!
//! Bounded FIFO of owned packet buffers shared between a device and the
//! external delivery callback feeding it. Every operation takes the mutex
//! once and returns immediately; full and empty are reported, never waited on.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Returned by [`PacketQueue::push`] when the queue is at capacity.
/// Hands the rejected packet back to the caller.
#[derive(Debug, PartialEq, Eq)]
pub struct QueueFull(pub Vec<u8>);

/// Returned by [`PacketQueue::pop_within`] when the head packet does not
/// fit. The packet stays queued.
#[derive(Debug, PartialEq, Eq)]
pub struct Oversized(pub usize);

#[derive(Debug)]
pub struct PacketQueue {
    inner: Mutex<VecDeque<Vec<u8>>>,
    capacity: usize,
}

impl PacketQueue {
    pub fn new(capacity: usize) -> Self {
        PacketQueue {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn push(&self, packet: Vec<u8>) -> Result<(), QueueFull> {
        let mut queue = self.lock();
        if queue.len() >= self.capacity {
            return Err(QueueFull(packet));
        }
        queue.push_back(packet);
        Ok(())
    }

    pub fn pop(&self) -> Option<Vec<u8>> {
        self.lock().pop_front()
    }

    /// Dequeue the head packet only if it is at most `limit` bytes.
    pub fn pop_within(&self, limit: usize) -> Result<Option<Vec<u8>>, Oversized> {
        let mut queue = self.lock();
        match queue.front() {
            None => Ok(None),
            Some(head) if head.len() > limit => Err(Oversized(head.len())),
            Some(_) => Ok(queue.pop_front()),
        }
    }

    /// Drop every queued packet, returning how many were freed.
    pub fn clear(&self) -> usize {
        let mut queue = self.lock();
        let n = queue.len();
        queue.clear();
        n
    }

    // No critical section spans more than one deque call; poison is ignored.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
