use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};

/// Graphics context lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextEvent {
    /// Every GPU object created so far is gone.
    Lost { reason: String },
    /// A fresh context is available; owners rebuild programs and textures.
    Restored,
}

/// Fan-out channel for context lifecycle events.
///
/// Cloning shares the subscriber list. Broadcasting is safe from any thread
/// (wgpu may report device loss from a driver thread); subscribers drain on
/// the render thread.
#[derive(Debug, Clone, Default)]
pub struct ContextEvents {
    subscribers: Arc<Mutex<Vec<Sender<ContextEvent>>>>,
}

impl ContextEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> ContextSubscription {
        let (tx, rx) = mpsc::channel();
        match self.subscribers.lock() {
            Ok(mut subs) => subs.push(tx),
            Err(poisoned) => poisoned.into_inner().push(tx),
        }
        ContextSubscription { rx }
    }

    /// Delivers `event` to every live subscriber; dropped subscribers are pruned.
    pub fn broadcast(&self, event: ContextEvent) {
        let mut subs = match self.subscribers.lock() {
            Ok(subs) => subs,
            Err(poisoned) => poisoned.into_inner(),
        };
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        match self.subscribers.lock() {
            Ok(subs) => subs.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Receiving end of a [`ContextEvents`] subscription.
#[derive(Debug)]
pub struct ContextSubscription {
    rx: Receiver<ContextEvent>,
}

impl ContextSubscription {
    /// Next pending event, without blocking.
    pub fn poll(&self) -> Option<ContextEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Drains all pending events in arrival order.
    pub fn drain(&self) -> Vec<ContextEvent> {
        std::iter::from_fn(|| self.poll()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_reaches_every_subscriber() {
        let events = ContextEvents::new();
        let a = events.subscribe();
        let b = events.subscribe();

        events.broadcast(ContextEvent::Lost { reason: "test".into() });

        assert_eq!(a.drain(), vec![ContextEvent::Lost { reason: "test".into() }]);
        assert_eq!(b.poll(), Some(ContextEvent::Lost { reason: "test".into() }));
        assert_eq!(b.poll(), None);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let events = ContextEvents::new();
        let kept = events.subscribe();
        drop(events.subscribe());
        assert_eq!(events.subscriber_count(), 2);

        events.broadcast(ContextEvent::Restored);
        assert_eq!(events.subscriber_count(), 1);
        assert_eq!(kept.drain(), vec![ContextEvent::Restored]);
    }

    #[test]
    fn broadcast_from_another_thread() {
        let events = ContextEvents::new();
        let sub = events.subscribe();
        let remote = events.clone();

        std::thread::spawn(move || remote.broadcast(ContextEvent::Restored))
            .join()
            .unwrap();

        assert_eq!(sub.poll(), Some(ContextEvent::Restored));
    }
}
