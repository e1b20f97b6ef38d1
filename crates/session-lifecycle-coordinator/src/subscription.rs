//! Ordered delivery of state transitions to subscribers.
//!
//! Every subscriber owns an unbounded queue. The coordinator publishes while
//! holding its state lock, so each queue receives transitions in exactly the
//! order they happened and nothing is coalesced.

use crate::AuthState;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Default)]
struct Registry {
    next_id: u64,
    senders: Vec<(u64, mpsc::UnboundedSender<AuthState>)>,
}

/// Fan-out point for state snapshots.
#[derive(Default)]
pub(crate) struct Broadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl Broadcaster {
    /// Open a new queue.
    pub(crate) fn channel(&self) -> (u64, mpsc::UnboundedReceiver<AuthState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.senders.push((id, tx));
        (id, rx)
    }

    /// Deliver `state` to every open queue, forgetting closed ones.
    pub(crate) fn publish(&self, state: &AuthState) {
        self.registry
            .lock()
            .senders
            .retain(|(_, tx)| tx.send(state.clone()).is_ok());
    }

    /// Run `listener` for every published state until unsubscribed.
    pub(crate) fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        let (id, mut rx) = self.channel();
        let task = tokio::spawn(async move {
            while let Some(state) = rx.recv().await {
                listener(&state);
            }
        });
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
            task,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.registry.lock().senders.len()
    }
}

/// Handle returned by [`SessionCoordinator::subscribe`](crate::SessionCoordinator::subscribe).
///
/// Transitions published before [`unsubscribe`](Self::unsubscribe) are still
/// delivered. Dropping the handle keeps the listener registered.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop receiving transitions.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().senders.retain(|(id, _)| *id != self.id);
        }
    }

    /// True once the listener has received everything it ever will.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
