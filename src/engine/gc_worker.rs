//! Frees retired decoders off the realtime and decoding threads.

use std::time::Duration;

use crate::event::{EventSender, Notification};
use crate::gc::GcReceiver;

use super::{ShutdownPoll, WORKER_IDLE_SLEEP};

/// Drain `receiver`, calling `close()` on each retired decoder and dropping
/// it, until `shutdown` is requested and the queue is empty.
pub(super) fn run(receiver: GcReceiver, events: EventSender, shutdown: ShutdownPoll) {
    loop {
        match receiver.try_recv() {
            Some(state) => {
                if let Err(err) = state.close() {
                    tracing::error!(sequence = state.sequence, error = %err, "decoder close failed");
                    events.publish(Notification::Error {
                        sequence: Some(state.sequence),
                        message: err.to_string(),
                    });
                }
            }
            None => {
                if shutdown.requested() {
                    return;
                }
                std::thread::sleep(WORKER_IDLE_SLEEP);
            }
        }
    }
}
