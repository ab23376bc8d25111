pub mod actor;
pub mod coordinator;
pub mod mailbox;
pub mod messages;

pub use coordinator::CountingEngine;
pub use mailbox::FramePush;
pub use messages::{CommandOutcome, ControlCommand, SourcePhase, ZoneSeed};
