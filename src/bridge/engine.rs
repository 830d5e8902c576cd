//! Thread wiring and the poll-diff-publish loop.
//!
//! ```text
//! transport <- bus thread <- poll loop -> differ -> publisher -> link thread -> console
//!                        ^                                             |
//!                        +---- command worker <- command queue <-------+
//! ```

use flume::{Receiver, Sender};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use super::{
    command::{command_channel, CommandQueue, CommandRequest, CommandWorker, RetryPolicy},
    differ::Differ,
    heartbeat::HeartbeatSync,
    poller::Poller,
    publisher::Publisher,
    reconciler::reconcile,
    snapshot::Snapshot,
    state::{IntentTracker, Lifecycle, LinkState, TipActiveFlags},
};
use crate::{
    core::{HeatingParam, Shutdown, TIP_COUNT},
    error::{BridgeError, Result},
    protocol::{
        modbus::{spawn_bus, ModbusTransport},
        ws::{run_link, Inbound, MessageSocket, Outbound},
    },
};

/// Messages that may wait for the console link before the console counts as
/// stalled. A full dump is 37 messages.
const OUTBOUND_CAPACITY: usize = 1024;

/// Timing and addressing of the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub slave_id: u8,
    pub poll_interval: Duration,
    /// Cycles between tip-active rewrites; 0 disables them
    pub heartbeat_cycles: u64,
    /// Cycles between forced manual-controls updates; 0 disables them
    pub manual_refresh_cycles: u64,
    pub retry: RetryPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            slave_id: 1,
            poll_interval: Duration::from_millis(20),
            heartbeat_cycles: 100,
            manual_refresh_cycles: 5,
            retry: RetryPolicy::default(),
        }
    }
}

/// Console requests answered from the next freshly polled snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollRequest {
    DumpAll,
    WorkPositionState,
    HeatingValues,
}

/// Where an inbound console message ends up
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Routed {
    Command(CommandRequest),
    Poll(PollRequest),
}

pub fn route(message: Inbound) -> Routed {
    let command = match message {
        Inbound::RequestAllValues => return Routed::Poll(PollRequest::DumpAll),
        Inbound::RequestWorkPositionState => return Routed::Poll(PollRequest::WorkPositionState),
        Inbound::RequestHeatingValues => return Routed::Poll(PollRequest::HeatingValues),
        Inbound::ButtonPress { button, state } => CommandRequest::Jog {
            button,
            pressed: state,
        },
        Inbound::SetSpeedMode { mode } => CommandRequest::SetSpeedMode(mode),
        Inbound::SetWorkPosition => CommandRequest::SetWorkPosition,
        Inbound::UpdateTipActive { tip, active } => CommandRequest::TipActive { tip, active },
        Inbound::UpdateHeatingEnergy { tip, value } => CommandRequest::HeatingSetpoint {
            tip,
            param: HeatingParam::Energy,
            value,
        },
        Inbound::UpdateHeatingDistance { tip, value } => CommandRequest::HeatingSetpoint {
            tip,
            param: HeatingParam::Distance,
            value,
        },
        Inbound::UpdateHeatStartDelay { tip, value } => CommandRequest::HeatingSetpoint {
            tip,
            param: HeatingParam::HeatStartDelay,
            value,
        },
        Inbound::UpdateConfiguration { key, value } => CommandRequest::Configuration { key, value },
        Inbound::ManualHeatButton { tip, state } => CommandRequest::ManualHeat {
            tip,
            pressed: state,
        },
        Inbound::ManualCooling { state } => CommandRequest::ManualCooling(state),
    };
    Routed::Command(command)
}

/// Runs on the link thread for every valid console message
struct InboundHandler {
    commands: CommandQueue,
    polls: Sender<PollRequest>,
    tip_flags: TipActiveFlags,
}

impl InboundHandler {
    fn handle(&self, message: Inbound) {
        if let Inbound::UpdateTipActive { tip, active } = message {
            self.tip_flags.set(tip, active);
        }
        let delivered = match route(message) {
            Routed::Command(command) => self.commands.submit(command).is_ok(),
            Routed::Poll(request) => self.polls.send(request).is_ok(),
        };
        if !delivered {
            log::warn!("Bridge is stopping, dropped console message");
        }
    }
}

/// The state synchronization engine between one Modbus slave and one console.
pub struct Bridge {
    settings: SyncSettings,
    tip_flags: TipActiveFlags,
    lifecycle: Lifecycle,
    shutdown: Shutdown,
}

impl Bridge {
    /// `tip_states` seeds the local tip-active flags, normally from the
    /// persisted tip-state file
    pub fn new(settings: SyncSettings, tip_states: [bool; TIP_COUNT], shutdown: Shutdown) -> Self {
        Self {
            settings,
            tip_flags: TipActiveFlags::new(tip_states),
            lifecycle: Lifecycle::new(),
            shutdown,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    /// Run until shutdown is requested (`Ok`) or the console link is lost
    /// (`Err(Disconnected)`).
    pub fn run<T, S>(self, transport: T, socket: S) -> Result<()>
    where
        T: ModbusTransport + 'static,
        S: MessageSocket + 'static,
    {
        let Bridge {
            settings,
            tip_flags,
            lifecycle,
            shutdown,
        } = self;

        let (bus, bus_thread) = spawn_bus(transport)?;
        let tracker = Arc::new(IntentTracker::new());
        let mut worker = CommandWorker::new(
            bus.clone(),
            settings.slave_id,
            settings.retry,
            tracker.clone(),
        );

        log::info!("Writing persisted tip states to the controller");
        if let Err(err) = worker.execute(&CommandRequest::SyncTipFlags(tip_flags.get())) {
            log::warn!("Startup tip sync failed: {err}");
        }

        let (commands, command_rx) = command_channel(tracker.clone());
        let (poll_tx, poll_rx) = flume::unbounded();
        let (outbound_tx, outbound_rx) = flume::bounded(OUTBOUND_CAPACITY);

        let link_thread = spawn_link(
            socket,
            outbound_rx,
            InboundHandler {
                commands: commands.clone(),
                polls: poll_tx,
                tip_flags: tip_flags.clone(),
            },
            lifecycle.clone(),
            shutdown.clone(),
        )?;

        let worker_shutdown = shutdown.clone();
        let worker_thread = thread::Builder::new()
            .name("command-worker".into())
            .spawn(move || worker.run(command_rx, worker_shutdown))?;

        let poll_loop = PollLoop {
            poller: Poller::new(bus, settings.slave_id).with_intent(tracker.clone()),
            differ: Differ::new(settings.manual_refresh_cycles),
            heartbeat: HeartbeatSync::new(settings.heartbeat_cycles),
            publisher: Publisher::new(outbound_tx, lifecycle.clone()),
            commands,
            requests: poll_rx,
            tracker,
            tip_flags,
            lifecycle: lifecycle.clone(),
            interval: settings.poll_interval,
        };
        poll_loop.run(&shutdown);

        let link_result = link_thread
            .join()
            .unwrap_or_else(|_| Err(BridgeError::Disconnected("link thread panicked".into())));
        if worker_thread.join().is_err() {
            log::error!("Command worker panicked");
        }
        if bus_thread.join().is_err() {
            log::error!("Modbus bus thread panicked");
        }

        match link_result {
            Err(err) => Err(err),
            Ok(()) if lifecycle.is_disconnected() => Err(BridgeError::Disconnected(
                "console stopped accepting messages".into(),
            )),
            Ok(()) => {
                log::info!("Bridge stopped");
                Ok(())
            }
        }
    }
}

fn spawn_link<S: MessageSocket + 'static>(
    socket: S,
    outbound: Receiver<Outbound>,
    handler: InboundHandler,
    lifecycle: Lifecycle,
    shutdown: Shutdown,
) -> Result<JoinHandle<Result<()>>> {
    let join = thread::Builder::new()
        .name("console-link".into())
        .spawn(move || {
            let result = run_link(
                socket,
                outbound,
                |message| handler.handle(message),
                shutdown.clone(),
            );
            if result.is_err() {
                lifecycle.mark_disconnected();
                shutdown.trigger();
            }
            result
        })?;
    Ok(join)
}

struct PollLoop<T> {
    poller: Poller<T>,
    differ: Differ,
    heartbeat: HeartbeatSync,
    publisher: Publisher<Sender<Outbound>>,
    commands: CommandQueue,
    requests: Receiver<PollRequest>,
    tracker: Arc<IntentTracker>,
    tip_flags: TipActiveFlags,
    lifecycle: Lifecycle,
    interval: Duration,
}

impl<T: ModbusTransport> PollLoop<T> {
    fn run(mut self, shutdown: &Shutdown) {
        log::info!("Polling every {:?}", self.interval);
        let mut snapshot = Snapshot::default();
        while !shutdown.is_triggered() {
            let started = Instant::now();
            snapshot = match self.cycle(&snapshot) {
                Ok(next) => next,
                Err(err) => {
                    log::error!("Stopping poll loop: {err}");
                    break;
                }
            };
            if let Some(rest) = self.interval.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
        // before the outbound sender drops, so the link sees a shutdown
        // rather than a closed queue
        shutdown.trigger();
    }

    fn cycle(&mut self, previous: &Snapshot) -> Result<Snapshot> {
        // only requests that arrived before this read are answered from it
        let requests: Vec<PollRequest> = self.requests.drain().collect();

        let outcome = self.poller.poll(previous);
        let state = if outcome.is_degraded() {
            log::debug!("Stale blocks this cycle: {}", outcome.failed_blocks.join(", "));
            LinkState::Degraded
        } else {
            LinkState::Connected
        };
        if self.lifecycle.set(state) == LinkState::Disconnected {
            return Err(BridgeError::Disconnected("console link is gone".into()));
        }
        let snapshot = outcome.snapshot;

        let changed = self.differ.diff(&snapshot);
        self.publisher.publish_changes(&changed, &snapshot)?;

        for request in requests {
            match request {
                PollRequest::DumpAll => self.publisher.publish_all(&snapshot)?,
                PollRequest::WorkPositionState => self.publisher.publish_work_position(&snapshot)?,
                PollRequest::HeatingValues => self.publisher.publish_heating(&snapshot)?,
            }
        }

        if let Some(token) = outcome.work_position_token {
            if self.tracker.is_quiet_since(token) {
                for command in reconcile(self.tracker.intent(), &snapshot.work_position) {
                    log::info!("Device disagrees with last jog command, re-sending {command:?}");
                    self.commands.submit(command)?;
                }
            }
        }

        if self.heartbeat.tick() {
            log::debug!("Heartbeat tip-state rewrite");
            self.commands
                .submit(CommandRequest::SyncTipFlags(self.tip_flags.get()))?;
        }

        Ok(snapshot)
    }
}
