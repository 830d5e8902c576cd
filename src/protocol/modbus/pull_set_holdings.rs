use rmodbus::{client::ModbusRequest, ModbusProto};

use super::rmodbus_error;
use crate::error::Result;

/// Length of the echo a slave sends back for 0x06 and 0x10
pub const WRITE_RESPONSE_LEN: usize = 8;

/// Build a frame to write a single holding register (function 0x06)
pub fn generate_pull_set_holding_request(
    id: u8,
    address: u16,
    value: u16,
) -> Result<(ModbusRequest, Vec<u8>)> {
    let mut request = ModbusRequest::new(id, ModbusProto::Rtu);
    let mut raw = Vec::new();
    request
        .generate_set_holding(address, value, &mut raw)
        .map_err(|err| rmodbus_error("build single write", err))?;
    Ok((request, raw))
}

/// Build a frame to write consecutive holding registers (function 0x10)
pub fn generate_pull_set_holdings_request(
    id: u8,
    start_address: u16,
    values: &[u16],
) -> Result<(ModbusRequest, Vec<u8>)> {
    let mut request = ModbusRequest::new(id, ModbusProto::Rtu);
    let mut raw = Vec::new();
    request
        .generate_set_holdings_bulk(start_address, values, &mut raw)
        .map_err(|err| rmodbus_error("build bulk write", err))?;
    Ok((request, raw))
}

pub fn parse_pull_set_holdings(request: &ModbusRequest, response: &[u8]) -> Result<()> {
    request
        .parse_ok(response)
        .map_err(|err| rmodbus_error("parse write response", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_write_frame() {
        let (_, raw) = generate_pull_set_holding_request(1, 1305, 1).unwrap();
        assert_eq!(&raw[..6], &[0x01, 0x06, 0x05, 0x19, 0x00, 0x01]);
    }

    #[test]
    fn test_bulk_write_frame() {
        let (_, raw) = generate_pull_set_holdings_request(2, 1500, &[0, 425]).unwrap();
        // id, fn, addr, qty, byte count, 4 data bytes, CRC
        assert_eq!(raw.len(), 7 + 4 + 2);
        assert_eq!(&raw[..7], &[0x02, 0x10, 0x05, 0xDC, 0x00, 0x02, 0x04]);
        assert_eq!(&raw[7..11], &[0x00, 0x00, 0x01, 0xA9]);
    }
}
