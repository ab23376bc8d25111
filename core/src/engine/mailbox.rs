use crate::engine::messages::{ActorMessage, CommandReply, ControlCommand};
use crate::ingest::DetectionFrame;
use crate::prelude::{CountingConfig, EngineError, EngineResult};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// Outcome of offering a detection frame to a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePush {
    Accepted,
    ReplacedOldest,
    Discarded,
}

/// Serialized inbound queue for one source actor.
///
/// Frames and commands share a single FIFO, so zone edits are totally
/// ordered against detection processing. Frames are bounded with
/// drop-oldest overflow; commands are bounded with an explicit `Busy`.
pub struct Mailbox {
    frame_cap: usize,
    command_cap: usize,
    state: Mutex<MailboxState>,
    notify: Notify,
}

struct MailboxState {
    queue: VecDeque<ActorMessage>,
    frames: usize,
    commands: usize,
    draining: bool,
}

impl Mailbox {
    pub fn new(config: &CountingConfig) -> Self {
        Self {
            frame_cap: config.frame_queue_cap.max(1),
            command_cap: config.command_queue_cap.max(1),
            state: Mutex::new(MailboxState {
                queue: VecDeque::new(),
                frames: 0,
                commands: 0,
                draining: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Never blocks the producer. A full frame queue evicts the oldest
    /// undelivered frame: stale detections are worthless for live counts.
    pub fn push_frame(&self, frame: DetectionFrame) -> FramePush {
        let outcome = {
            let mut state = self.state.lock().expect("mailbox lock");
            if state.draining {
                return FramePush::Discarded;
            }
            let outcome = if state.frames >= self.frame_cap {
                if let Some(pos) = state
                    .queue
                    .iter()
                    .position(|message| matches!(message, ActorMessage::Frame(_)))
                {
                    state.queue.remove(pos);
                    state.frames -= 1;
                }
                FramePush::ReplacedOldest
            } else {
                FramePush::Accepted
            };
            state.queue.push_back(ActorMessage::Frame(frame));
            state.frames += 1;
            outcome
        };
        self.notify.notify_one();
        outcome
    }

    /// Commands are never silently discarded: a full queue fails `Busy`.
    pub(crate) fn push_command(
        &self,
        op: ControlCommand,
        reply: CommandReply,
    ) -> EngineResult<()> {
        {
            let mut state = self.state.lock().expect("mailbox lock");
            if state.commands >= self.command_cap {
                return Err(EngineError::Busy("command queue full".to_string()));
            }
            state.queue.push_back(ActorMessage::Command { op, reply });
            state.commands += 1;
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Stops frame intake and discards queued frames while keeping the
    /// command backlog, preserving command-ordering through teardown.
    pub fn drain(&self) {
        {
            let mut state = self.state.lock().expect("mailbox lock");
            state.draining = true;
            state
                .queue
                .retain(|message| matches!(message, ActorMessage::Command { .. }));
            state.frames = 0;
        }
        self.notify.notify_one();
    }

    /// Next message in strict arrival order; `None` once the mailbox is
    /// draining and the command backlog has been consumed.
    pub(crate) async fn recv(&self) -> Option<ActorMessage> {
        loop {
            {
                let mut state = self.state.lock().expect("mailbox lock");
                if let Some(message) = state.queue.pop_front() {
                    match &message {
                        ActorMessage::Frame(_) => state.frames -= 1,
                        ActorMessage::Command { .. } => state.commands -= 1,
                    }
                    return Some(message);
                }
                if state.draining {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    #[cfg(test)]
    fn queued(&self) -> (usize, usize) {
        let state = self.state.lock().expect("mailbox lock");
        (state.frames, state.commands)
    }
}
