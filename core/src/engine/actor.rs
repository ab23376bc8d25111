use crate::counting::{epoch_seconds, CountUpdate, ZoneTable};
use crate::engine::mailbox::Mailbox;
use crate::engine::messages::{apply_to_table, ActorMessage, CommandOutcome, ControlCommand};
use crate::ingest::DetectionFrame;
use crate::prelude::EngineResult;
use crate::telemetry::{LogManager, MetricsRecorder};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(25);
const MAX_SWEEP_PERIOD: Duration = Duration::from_millis(250);

/// Serialized owner of one source's zone table.
///
/// Every mutation flows through the mailbox in arrival order. The sweep
/// tick only adds forced exits, which remove their occupant and so can
/// fire at most once per disappearance.
pub(crate) struct SourceActor {
    table: ZoneTable,
    mailbox: Arc<Mailbox>,
    events: broadcast::Sender<CountUpdate>,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl SourceActor {
    /// Runs the actor to completion and hands the zone table back for
    /// retention when the mailbox drains.
    pub(crate) fn spawn(
        table: ZoneTable,
        mailbox: Arc<Mailbox>,
        events: broadcast::Sender<CountUpdate>,
        metrics: Arc<MetricsRecorder>,
    ) -> JoinHandle<ZoneTable> {
        let logger = LogManager::scoped(format!("actor {}", table.source_id()));
        let actor = Self {
            table,
            mailbox,
            events,
            metrics,
            logger,
        };
        tokio::spawn(actor.run())
    }

    fn sweep_period(&self) -> Duration {
        match self.table.config().exit_grace() {
            Some(grace) => (grace / 2).clamp(MIN_SWEEP_PERIOD, MAX_SWEEP_PERIOD),
            None => MAX_SWEEP_PERIOD,
        }
    }

    async fn run(mut self) -> ZoneTable {
        self.logger.record("started");
        let mailbox = self.mailbox.clone();
        let mut tick = tokio::time::interval(self.sweep_period());
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                message = mailbox.recv() => match message {
                    Some(ActorMessage::Frame(frame)) => self.handle_frame(frame),
                    Some(ActorMessage::Command { op, reply }) => {
                        let outcome = self.handle_command(op);
                        let _ = reply.send(outcome);
                    }
                    None => break,
                },
                _ = tick.tick() => self.handle_sweep(),
            }
        }
        self.logger.record("drained");
        self.table
    }

    fn handle_frame(&mut self, frame: DetectionFrame) {
        let updates = self.table.apply_frame(&frame, Instant::now());
        self.metrics.record_frame();
        self.publish(updates);
    }

    fn handle_command(&mut self, op: ControlCommand) -> EngineResult<CommandOutcome> {
        self.metrics.record_command();
        let outcome = apply_to_table(&mut self.table, op);
        if outcome.is_err() {
            self.metrics.record_error();
        }
        outcome
    }

    fn handle_sweep(&mut self) {
        let updates = self.table.sweep(Instant::now(), epoch_seconds());
        self.publish(updates);
    }

    fn publish(&self, updates: Vec<CountUpdate>) {
        for update in updates {
            if update
                .last_event
                .as_ref()
                .map_or(false, |event| event.forced)
            {
                self.metrics.record_forced_exit();
            }
            // No live subscribers is fine; the count state itself is
            // queryable at any time.
            let _ = self.events.send(update);
        }
    }
}
