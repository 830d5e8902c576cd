use rmodbus::{client::ModbusRequest, ModbusProto};

use super::rmodbus_error;
use crate::error::Result;

/// Build a read-holding-registers frame (function 0x03)
pub fn generate_pull_get_holdings_request(
    id: u8,
    start_address: u16,
    count: u16,
) -> Result<(ModbusRequest, Vec<u8>)> {
    let mut request = ModbusRequest::new(id, ModbusProto::Rtu);
    let mut raw = Vec::new();
    request
        .generate_get_holdings(start_address, count, &mut raw)
        .map_err(|err| rmodbus_error("build read request", err))?;
    Ok((request, raw))
}

/// Validate a 0x03 response (CRC, station, function) and unpack its registers.
pub fn parse_pull_get_holdings(request: &ModbusRequest, response: &[u8]) -> Result<Vec<u16>> {
    request
        .parse_ok(response)
        .map_err(|err| rmodbus_error("parse read response", err))?;

    let values = response[3..response.len() - 2]
        .chunks_exact(2)
        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
        .collect::<Vec<_>>();
    log::trace!("Received holding registers: {values:?}");

    Ok(values)
}

/// Bytes in a successful response for `count` registers
pub fn expected_get_holdings_len(count: u16) -> usize {
    3 + 2 * usize::from(count) + 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::modbus::crc16;

    #[test]
    fn test_request_frame_layout() {
        let (_, raw) = generate_pull_get_holdings_request(1, 1300, 8).unwrap();
        assert_eq!(raw.len(), 8);
        assert_eq!(&raw[..6], &[0x01, 0x03, 0x05, 0x14, 0x00, 0x08]);
    }

    #[test]
    fn test_parse_response_registers() {
        let (request, _) = generate_pull_get_holdings_request(1, 0, 2).unwrap();
        // 01 03 04 00 0A 01 02 + CRC
        let mut response = vec![0x01, 0x03, 0x04, 0x00, 0x0A, 0x01, 0x02];
        let crc = crc16(&response);
        response.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(response.len(), expected_get_holdings_len(2));
        assert_eq!(
            parse_pull_get_holdings(&request, &response).unwrap(),
            vec![0x000A, 0x0102]
        );

        let last = response.len() - 1;
        response[last] ^= 0xFF;
        assert!(parse_pull_get_holdings(&request, &response).is_err());
    }
}
