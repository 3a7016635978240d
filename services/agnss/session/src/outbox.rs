//! Effects collected under the engine lock and delivered after it is released.

use crate::event::{EventInterface, ProgressEvent};
use bytes::Bytes;

/// One deferred effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    /// Bytes for the receiver
    Write(Bytes),
    /// Event for the host
    Progress(ProgressEvent),
}

/// Ordered list of writes and events produced by one engine call
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    actions: Vec<Action>,
}

impl Outbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the receiver
    pub(crate) fn write(&mut self, bytes: Bytes) {
        self.actions.push(Action::Write(bytes));
    }

    /// Queue a progress event
    pub(crate) fn emit(&mut self, event: ProgressEvent) {
        self.actions.push(Action::Progress(event));
    }

    #[cfg(test)]
    pub(crate) fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Hand everything to the event interface, in order
    pub(crate) fn deliver(self, events: &EventInterface) {
        for action in self.actions {
            match action {
                Action::Write(bytes) => events.writer.write_to_device(&bytes),
                Action::Progress(event) => events.progress.on_progress(&event),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_deliver_preserves_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let w = log.clone();
        let p = log.clone();
        let events = EventInterface::new(
            move |bytes: &[u8]| w.lock().unwrap().push(format!("write {}", bytes.len())),
            move |event: &ProgressEvent| p.lock().unwrap().push(format!("{:?}", event)),
        );

        let mut out = Outbox::new();
        out.emit(ProgressEvent::Start { total: 1 });
        out.write(Bytes::from_static(&[1, 2, 3]));
        out.emit(ProgressEvent::Finish);
        out.deliver(&events);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["Start { total: 1 }", "write 3", "Finish"]
        );
    }
}
