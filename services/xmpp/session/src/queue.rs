//! Event queue between transports and the owning thread.
//!
//! Transports never touch the connection: they get a [`TransportSink`] that
//! can only enqueue. The owning thread drains the queue in FIFO order on
//! every tick. Each sink is stamped with the session generation that created
//! it, so events from a torn-down transport are dropped instead of leaking
//! into the next session.

use crate::state::ConnectionEvent;
use tokio::sync::mpsc;
use tracing::trace;
use xmpp_stanza::Stanza;

/// One item waiting for the owning thread
#[derive(Debug, Clone, PartialEq)]
pub enum QueuedEvent {
    /// Connection state change
    State(ConnectionEvent),
    /// Inbound stanza
    Stanza(Stanza),
}

#[derive(Debug)]
struct Tagged {
    generation: u64,
    event: QueuedEvent,
}

/// Enqueue-only handle given to a transport
#[derive(Debug, Clone)]
pub struct TransportSink {
    generation: u64,
    tx: mpsc::UnboundedSender<Tagged>,
}

impl TransportSink {
    /// Report a connection state change
    pub fn connection_event(&self, event: ConnectionEvent) -> bool {
        trace!("Queueing {:?} (generation {})", event, self.generation);
        self.push(QueuedEvent::State(event))
    }

    /// Deliver an inbound stanza
    pub fn stanza(&self, stanza: Stanza) -> bool {
        self.push(QueuedEvent::Stanza(stanza))
    }

    /// Session generation this sink belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn push(&self, event: QueuedEvent) -> bool {
        self.tx
            .send(Tagged {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Owning-thread side of the queue
#[derive(Debug)]
pub(crate) struct EventQueue {
    tx: mpsc::UnboundedSender<Tagged>,
    rx: mpsc::UnboundedReceiver<Tagged>,
    generation: u64,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx, generation: 0 }
    }

    /// Start a new generation and hand out its sink
    pub(crate) fn begin_session(&mut self) -> TransportSink {
        self.generation += 1;
        TransportSink {
            generation: self.generation,
            tx: self.tx.clone(),
        }
    }

    /// Invalidate every sink handed out so far
    pub(crate) fn end_session(&mut self) {
        self.generation += 1;
    }

    /// Enqueue from the owning thread under the current generation
    pub(crate) fn push(&self, event: QueuedEvent) {
        let _ = self.tx.send(Tagged {
            generation: self.generation,
            event,
        });
    }

    /// Next event of the current generation, or `None` once empty
    pub(crate) fn next(&mut self) -> Option<QueuedEvent> {
        while let Ok(tagged) = self.rx.try_recv() {
            if tagged.generation == self.generation {
                return Some(tagged.event);
            }
            trace!(
                "Discarding stale event from generation {} (current {})",
                tagged.generation,
                self.generation
            );
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_across_kinds() {
        let mut queue = EventQueue::new();
        let sink = queue.begin_session();
        let stanza = Stanza::builder("message").build();

        sink.connection_event(ConnectionEvent::Connect);
        sink.stanza(stanza.clone());
        sink.connection_event(ConnectionEvent::Disconnect);

        assert_eq!(queue.next(), Some(QueuedEvent::State(ConnectionEvent::Connect)));
        assert_eq!(queue.next(), Some(QueuedEvent::Stanza(stanza)));
        assert_eq!(queue.next(), Some(QueuedEvent::State(ConnectionEvent::Disconnect)));
        assert_eq!(queue.next(), None);
    }

    #[test]
    fn test_stale_generation_discarded() {
        let mut queue = EventQueue::new();
        let old = queue.begin_session();
        old.connection_event(ConnectionEvent::Connect);
        queue.end_session();
        let new = queue.begin_session();
        old.connection_event(ConnectionEvent::Fail("late".to_string()));
        new.connection_event(ConnectionEvent::RawConnect);

        assert_eq!(queue.next(), Some(QueuedEvent::State(ConnectionEvent::RawConnect)));
        assert_eq!(queue.next(), None);
        assert_eq!(new.generation(), old.generation() + 2);
    }

    #[test]
    fn test_sink_from_other_thread() {
        let mut queue = EventQueue::new();
        let sink = queue.begin_session();
        let worker = std::thread::spawn(move || {
            for _ in 0..100 {
                sink.stanza(Stanza::builder("presence").build());
            }
        });
        worker.join().unwrap();

        let mut count = 0;
        while queue.next().is_some() {
            count += 1;
        }
        assert_eq!(count, 100);
    }
}
