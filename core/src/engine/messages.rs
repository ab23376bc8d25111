use crate::counting::{ZoneStateView, ZoneTable};
use crate::geometry::Boundary;
use crate::ingest::DetectionFrame;
use crate::prelude::EngineResult;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Zone-mutation and query operations accepted by a source actor.
#[derive(Debug, Clone)]
pub enum ControlCommand {
    CreateOrUpdateZone { zone_id: String, boundary: Boundary },
    DeleteZone { zone_id: String },
    ResetZone { zone_id: String },
    QueryState,
}

/// Result payload returned once a control command has been applied.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Zone(ZoneStateView),
    Removed { zone_id: String },
    Source(Vec<ZoneStateView>),
}

/// Lifecycle phase of one source. `Stopped` is terminal for the actor
/// instance; re-registration spawns a fresh actor over the retained
/// zone table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePhase {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// Zone applied to a source the first time it is seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneSeed {
    pub zone_id: String,
    pub boundary: Boundary,
}

pub(crate) type CommandReply = oneshot::Sender<EngineResult<CommandOutcome>>;

/// Message kinds carried by the serialized actor mailbox.
pub(crate) enum ActorMessage {
    Frame(DetectionFrame),
    Command {
        op: ControlCommand,
        reply: CommandReply,
    },
}

/// Single implementation of the command set, shared by the actor and by
/// the coordinator's retained-table path so both apply identical
/// semantics.
pub(crate) fn apply_to_table(
    table: &mut ZoneTable,
    op: ControlCommand,
) -> EngineResult<CommandOutcome> {
    match op {
        ControlCommand::CreateOrUpdateZone { zone_id, boundary } => table
            .create_or_update(&zone_id, boundary)
            .map(CommandOutcome::Zone),
        ControlCommand::DeleteZone { zone_id } => table
            .delete(&zone_id)
            .map(|_| CommandOutcome::Removed { zone_id }),
        ControlCommand::ResetZone { zone_id } => {
            table.reset(&zone_id).map(CommandOutcome::Zone)
        }
        ControlCommand::QueryState => Ok(CommandOutcome::Source(table.views())),
    }
}
