//! Operator commands: the FIFO between the console and the bus, and the
//! single worker that turns each request into register writes.

use flume::{Receiver, RecvTimeoutError, Sender};
use std::{sync::Arc, thread, time::Duration};

use super::state::{IntentTracker, IntentUpdate};
use crate::{
    core::{ConfigKey, HeatingParam, JogButton, Shutdown, SpeedMode, TipIndex, TIP_COUNT},
    error::{BridgeError, Result},
    protocol::{modbus::ModbusTransport, register_map::RegisterMap},
};

/// How often the worker wakes up to look at the shutdown flag
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Fixed-delay retry shared by command writes and the startup tip sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or the attempts are used up. The last error
    /// is reported as [`BridgeError::CommandWrite`].
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= attempts => {
                    return Err(BridgeError::CommandWrite {
                        attempts,
                        reason: format!("{what}: {err}"),
                    })
                }
                Err(err) => {
                    log::debug!("{what}: attempt {attempt}/{attempts} failed: {err}");
                    attempt += 1;
                    thread::sleep(self.backoff);
                }
            }
        }
    }
}

/// One contiguous register write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterWrite {
    pub address: u16,
    pub values: Vec<u16>,
}

impl RegisterWrite {
    fn flag(map: &RegisterMap, field: &str, on: bool) -> Result<Self> {
        let spec = map.field(field)?;
        Ok(Self {
            address: spec.address,
            values: vec![u16::from(on)],
        })
    }

    fn number(map: &RegisterMap, field: &str, value: f64) -> Result<Self> {
        let spec = map.field(field)?;
        Ok(Self {
            address: spec.address,
            values: spec.encode_number(value)?,
        })
    }

    fn apply<T: ModbusTransport>(&self, transport: &mut T, slave_id: u8) -> Result<()> {
        match self.values.as_slice() {
            [value] => transport.write_register(self.address, *value, slave_id),
            values => transport.write_registers(self.address, values, slave_id),
        }
    }
}

/// A write the worker performs on behalf of the console, the reconciler or
/// the heartbeat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandRequest {
    SetSpeedMode(SpeedMode),
    Jog {
        button: JogButton,
        pressed: bool,
    },
    /// Latch the current position as the new setpoint
    SetWorkPosition,
    TipActive {
        tip: TipIndex,
        active: bool,
    },
    HeatingSetpoint {
        tip: TipIndex,
        param: HeatingParam,
        value: f64,
    },
    Configuration {
        key: ConfigKey,
        value: f64,
    },
    ManualHeat {
        tip: TipIndex,
        pressed: bool,
    },
    ManualCooling(bool),
    /// Rewrite every tip-active register from local flags
    SyncTipFlags([bool; TIP_COUNT]),
}

impl CommandRequest {
    /// Register writes in the order they are issued
    pub fn writes(&self, map: &RegisterMap) -> Result<Vec<RegisterWrite>> {
        let write = match *self {
            CommandRequest::SetSpeedMode(mode) => RegisterWrite {
                address: map.field("work_position.speed_mode")?.address,
                values: vec![mode.to_register()],
            },
            CommandRequest::Jog { button, pressed } => {
                RegisterWrite::flag(map, button.field(), pressed)?
            }
            CommandRequest::SetWorkPosition => {
                RegisterWrite::flag(map, "work_position.set_cmd", true)?
            }
            CommandRequest::TipActive { tip, active } => {
                RegisterWrite::flag(map, &format!("tip{tip}.active"), active)?
            }
            CommandRequest::HeatingSetpoint { tip, param, value } => {
                RegisterWrite::number(map, &format!("heating.{}.{tip}", param.name()), value)?
            }
            CommandRequest::Configuration { key, value } => {
                RegisterWrite::number(map, &format!("configuration.{}", key.name()), value)?
            }
            CommandRequest::ManualHeat { tip, pressed } => {
                RegisterWrite::flag(map, &format!("manual.heating_button.{tip}"), pressed)?
            }
            CommandRequest::ManualCooling(on) => RegisterWrite::flag(map, "manual.cooling", on)?,
            CommandRequest::SyncTipFlags(flags) => {
                return TipIndex::all()
                    .map(|tip| {
                        RegisterWrite::flag(map, &format!("tip{tip}.active"), flags[tip.slot()])
                    })
                    .collect();
            }
        };
        Ok(vec![write])
    }

    /// Change to the intended jog state once this command has been written
    pub fn intent_update(&self) -> Option<IntentUpdate> {
        match *self {
            CommandRequest::SetSpeedMode(mode) => Some(IntentUpdate::SpeedMode(mode)),
            CommandRequest::Jog {
                button: JogButton::Up,
                pressed,
            } => Some(IntentUpdate::Up(pressed)),
            CommandRequest::Jog {
                button: JogButton::Down,
                pressed,
            } => Some(IntentUpdate::Down(pressed)),
            _ => None,
        }
    }
}

/// Producer side of the command FIFO. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    tx: Sender<CommandRequest>,
    tracker: Arc<IntentTracker>,
}

/// Create the command FIFO; the receiver belongs to the [`CommandWorker`]
pub fn command_channel(tracker: Arc<IntentTracker>) -> (CommandQueue, Receiver<CommandRequest>) {
    let (tx, rx) = flume::unbounded();
    (CommandQueue { tx, tracker }, rx)
}

impl CommandQueue {
    pub fn submit(&self, request: CommandRequest) -> Result<()> {
        self.tracker.on_enqueued();
        self.tx.send(request).map_err(|_| {
            self.tracker.on_rejected();
            BridgeError::Disconnected("command worker has stopped".to_string())
        })
    }
}

/// Drains the command FIFO one request at a time.
pub struct CommandWorker<T> {
    transport: T,
    slave_id: u8,
    retry: RetryPolicy,
    map: &'static RegisterMap,
    tracker: Arc<IntentTracker>,
}

impl<T: ModbusTransport> CommandWorker<T> {
    pub fn new(
        transport: T,
        slave_id: u8,
        retry: RetryPolicy,
        tracker: Arc<IntentTracker>,
    ) -> Self {
        Self {
            transport,
            slave_id,
            retry,
            map: RegisterMap::global(),
            tracker,
        }
    }

    /// Write every register of `request`, each with the retry policy. The
    /// first write that exhausts its attempts abandons the rest.
    pub fn execute(&mut self, request: &CommandRequest) -> Result<()> {
        let slave_id = self.slave_id;
        for write in request.writes(self.map)? {
            let what = format!("write {:?} at {}", write.values, write.address);
            let transport = &mut self.transport;
            self.retry.run(&what, || write.apply(transport, slave_id))?;
        }
        Ok(())
    }

    /// Execute one dequeued request and settle its bookkeeping
    pub fn process(&mut self, request: CommandRequest) -> Result<()> {
        self.tracker.on_started();
        let result = self.execute(&request);
        match &result {
            Ok(()) => {
                log::debug!("Command done: {request:?}");
                self.tracker.on_finished(request.intent_update());
            }
            Err(err) => {
                log::error!("Dropping command {request:?}: {err}");
                self.tracker.on_finished(None);
            }
        }
        result
    }

    /// Serve the FIFO until shutdown or until every [`CommandQueue`] is gone
    pub fn run(mut self, rx: Receiver<CommandRequest>, shutdown: Shutdown) {
        log::info!("Command worker started");
        while !shutdown.is_triggered() {
            match rx.recv_timeout(IDLE_WAIT) {
                Ok(request) => {
                    let _ = self.process(request);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        log::info!("Command worker stopped");
    }
}
