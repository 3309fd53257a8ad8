use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::midi::midi::MidiMessage;

/// Inbound messages buffered for the active exclusive action, oldest first.
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    inner: Arc<(Mutex<VecDeque<MidiMessage>>, Condvar)>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: MidiMessage) {
        let (queue, condvar) = &*self.inner;
        queue.lock().push_back(message);
        condvar.notify_one();
    }

    pub fn pop(&self) -> Option<MidiMessage> {
        self.inner.0.lock().pop_front()
    }

    /// Wait up to `timeout` for the next message.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<MidiMessage> {
        let (queue, condvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut queue = queue.lock();
        while queue.is_empty() {
            if condvar.wait_until(&mut queue, deadline).timed_out() {
                break;
            }
        }
        queue.pop_front()
    }

    /// Take everything currently buffered.
    pub fn drain(&self) -> Vec<MidiMessage> {
        self.inner.0.lock().drain(..).collect()
    }

    pub fn clear(&self) {
        self.inner.0.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.0.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = PendingQueue::new();
        queue.push(MidiMessage::NoteOn(11, 1));
        queue.push(MidiMessage::NoteOff(11));
        queue.push(MidiMessage::NoteOn(12, 1));

        assert_eq!(queue.pop(), Some(MidiMessage::NoteOn(11, 1)));
        assert_eq!(
            queue.drain(),
            vec![MidiMessage::NoteOff(11), MidiMessage::NoteOn(12, 1)]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_timeout_wakes_on_push() {
        let queue = PendingQueue::new();
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                queue.push(MidiMessage::NoteOn(44, 9));
            })
        };
        let message = queue.pop_timeout(Duration::from_secs(5));
        producer.join().unwrap();
        assert_eq!(message, Some(MidiMessage::NoteOn(44, 9)));
        assert_eq!(queue.pop_timeout(Duration::from_millis(5)), None);
    }
}
