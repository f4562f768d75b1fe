//! Dispatches [`Notification`]s to the host's [`EngineDelegate`]. The only
//! thread allowed to call into host code; may block on whatever the
//! delegate does.

use crate::event::EventReceiver;

use super::{EngineDelegate, ShutdownPoll, WORKER_IDLE_SLEEP};

pub(super) fn run(
    receiver: EventReceiver,
    mut delegate: Box<dyn EngineDelegate>,
    shutdown: ShutdownPoll,
) {
    loop {
        match receiver.try_recv() {
            Some(event) => delegate.on_notification(event),
            None => {
                if shutdown.requested() {
                    return;
                }
                std::thread::sleep(WORKER_IDLE_SLEEP);
            }
        }
    }
}
