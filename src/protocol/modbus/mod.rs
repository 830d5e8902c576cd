mod bus;
mod memory;
mod pull_get_holdings;
mod pull_set_holdings;
mod rtu;

use crate::error::{BridgeError, Result};

pub use bus::{spawn_bus, BusHandle};
pub use memory::MemoryTransport;
pub use pull_get_holdings::{
    expected_get_holdings_len, generate_pull_get_holdings_request, parse_pull_get_holdings,
};
pub use pull_set_holdings::{
    generate_pull_set_holding_request, generate_pull_set_holdings_request,
    parse_pull_set_holdings, WRITE_RESPONSE_LEN,
};
pub use rtu::{RtuTransport, SerialConfig};

/// Holding-register access to one slave on the bus.
///
/// Implementations are driven from a single thread at a time; sharing goes
/// through [`BusHandle`], which funnels every request to the one thread that
/// owns the transport.
pub trait ModbusTransport: Send {
    fn read_holding_registers(&mut self, start: u16, count: u16, slave_id: u8)
        -> Result<Vec<u16>>;

    fn write_register(&mut self, address: u16, value: u16, slave_id: u8) -> Result<()>;

    fn write_registers(&mut self, start: u16, values: &[u16], slave_id: u8) -> Result<()>;
}

impl<T: ModbusTransport + ?Sized> ModbusTransport for Box<T> {
    fn read_holding_registers(
        &mut self,
        start: u16,
        count: u16,
        slave_id: u8,
    ) -> Result<Vec<u16>> {
        (**self).read_holding_registers(start, count, slave_id)
    }

    fn write_register(&mut self, address: u16, value: u16, slave_id: u8) -> Result<()> {
        (**self).write_register(address, value, slave_id)
    }

    fn write_registers(&mut self, start: u16, values: &[u16], slave_id: u8) -> Result<()> {
        (**self).write_registers(start, values, slave_id)
    }
}

fn rmodbus_error(context: &str, err: rmodbus::ErrorKind) -> BridgeError {
    BridgeError::Transport(format!("{context}: {err:?}"))
}

/// CRC-16/MODBUS over `data`, sent low byte first on the wire.
pub(crate) fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in data {
        crc ^= u16::from(b);
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xA001 } else { crc >> 1 };
        }
    }
    crc
}
