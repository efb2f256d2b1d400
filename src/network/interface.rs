use crate::error::InterfaceError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// Bounded FIFO of raw wire bytes. A capacity of 0 means unbounded.
#[derive(Debug)]
pub struct LinkQueue {
    items: Mutex<VecDeque<Vec<u8>>>,
    capacity: usize,
    arrived: Arc<Notify>,
    drained: Notify,
}

impl LinkQueue {
    pub fn new(capacity: usize, arrived: Arc<Notify>) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity,
            arrived,
            drained: Notify::new(),
        }
    }

    pub fn try_push(&self, bytes: Vec<u8>) -> Result<(), InterfaceError> {
        {
            let mut items = self.items.lock();
            if self.capacity > 0 && items.len() >= self.capacity {
                return Err(InterfaceError::Full);
            }
            items.push_back(bytes);
        }
        self.arrived.notify_one();
        Ok(())
    }

    pub async fn push(&self, mut bytes: Vec<u8>) {
        loop {
            let drained = self.drained.notified();
            {
                let mut items = self.items.lock();
                if self.capacity == 0 || items.len() < self.capacity {
                    items.push_back(std::mem::take(&mut bytes));
                    break;
                }
            }
            drained.await;
        }
        self.arrived.notify_one();
    }

    pub fn pop(&self) -> Option<Vec<u8>> {
        let item = self.items.lock().pop_front();
        if item.is_some() {
            self.drained.notify_one();
        }
        item
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Signal raised on every successful push.
    pub fn arrivals(&self) -> Arc<Notify> {
        self.arrived.clone()
    }
}

/// One link endpoint: an inbound and an outbound queue.
///
/// The owning node drains `In` and fills `Out`; whatever link is attached does
/// the opposite. Both sides may sit on different tasks.
#[derive(Debug)]
pub struct Interface {
    inbound: LinkQueue,
    outbound: LinkQueue,
}

impl Interface {
    pub fn new(capacity: usize) -> Self {
        Self::with_wake(capacity, Arc::new(Notify::new()))
    }

    /// Builds an interface whose inbound arrivals raise `wake`, so a node
    /// with several interfaces can sleep on one signal.
    pub fn with_wake(capacity: usize, wake: Arc<Notify>) -> Self {
        Self {
            inbound: LinkQueue::new(capacity, wake),
            outbound: LinkQueue::new(capacity, Arc::new(Notify::new())),
        }
    }

    pub fn queue(&self, direction: Direction) -> &LinkQueue {
        match direction {
            Direction::In => &self.inbound,
            Direction::Out => &self.outbound,
        }
    }

    /// Enqueue `bytes`. With `block` set this waits for room, otherwise a
    /// full queue yields [`InterfaceError::Full`] and nothing is enqueued.
    pub async fn put(
        &self,
        direction: Direction,
        bytes: Vec<u8>,
        block: bool,
    ) -> Result<(), InterfaceError> {
        let queue = self.queue(direction);
        if block {
            queue.push(bytes).await;
            Ok(())
        } else {
            queue.try_push(bytes)
        }
    }

    pub fn try_put(&self, direction: Direction, bytes: Vec<u8>) -> Result<(), InterfaceError> {
        self.queue(direction).try_push(bytes)
    }

    /// Oldest queued item, if any. Never waits.
    pub fn get(&self, direction: Direction) -> Option<Vec<u8>> {
        self.queue(direction).pop()
    }
}
