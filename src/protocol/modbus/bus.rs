use flume::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use super::ModbusTransport;
use crate::error::{BridgeError, Result};

enum BusRequest {
    Read {
        start: u16,
        count: u16,
        slave_id: u8,
        reply: oneshot::Sender<Result<Vec<u16>>>,
    },
    WriteOne {
        address: u16,
        value: u16,
        slave_id: u8,
        reply: oneshot::Sender<Result<()>>,
    },
    WriteMany {
        start: u16,
        values: Vec<u16>,
        slave_id: u8,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Cloneable handle to the thread that owns the bus.
///
/// Each call is queued to the owner and blocks until its reply arrives, so
/// the poll loop and the command worker never interleave frames on the
/// half-duplex line.
#[derive(Debug, Clone)]
pub struct BusHandle {
    tx: Sender<BusRequest>,
}

/// Move `transport` onto its own thread and return a handle to it.
///
/// The thread exits once every [`BusHandle`] has been dropped.
pub fn spawn_bus<T>(transport: T) -> Result<(BusHandle, JoinHandle<()>)>
where
    T: ModbusTransport + 'static,
{
    let (tx, rx) = flume::unbounded();
    let join = thread::Builder::new()
        .name("modbus-bus".into())
        .spawn(move || run_loop(transport, rx))?;
    Ok((BusHandle { tx }, join))
}

fn run_loop<T: ModbusTransport>(mut transport: T, rx: Receiver<BusRequest>) {
    while let Ok(request) = rx.recv() {
        // A dropped reply receiver means the caller gave up; nothing to do.
        match request {
            BusRequest::Read {
                start,
                count,
                slave_id,
                reply,
            } => {
                let _ = reply.send(transport.read_holding_registers(start, count, slave_id));
            }
            BusRequest::WriteOne {
                address,
                value,
                slave_id,
                reply,
            } => {
                let _ = reply.send(transport.write_register(address, value, slave_id));
            }
            BusRequest::WriteMany {
                start,
                values,
                slave_id,
                reply,
            } => {
                let _ = reply.send(transport.write_registers(start, &values, slave_id));
            }
        }
    }
    log::debug!("Modbus bus owner stopped");
}

impl BusHandle {
    fn submit<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<R>>) -> BusRequest,
    ) -> Result<R> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .map_err(|_| BridgeError::Transport("bus owner has stopped".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| BridgeError::Transport("bus owner dropped the request".to_string()))?
    }
}

impl ModbusTransport for BusHandle {
    fn read_holding_registers(
        &mut self,
        start: u16,
        count: u16,
        slave_id: u8,
    ) -> Result<Vec<u16>> {
        self.submit(|reply| BusRequest::Read {
            start,
            count,
            slave_id,
            reply,
        })
    }

    fn write_register(&mut self, address: u16, value: u16, slave_id: u8) -> Result<()> {
        self.submit(|reply| BusRequest::WriteOne {
            address,
            value,
            slave_id,
            reply,
        })
    }

    fn write_registers(&mut self, start: u16, values: &[u16], slave_id: u8) -> Result<()> {
        let values = values.to_vec();
        self.submit(|reply| BusRequest::WriteMany {
            start,
            values,
            slave_id,
            reply,
        })
    }
}
