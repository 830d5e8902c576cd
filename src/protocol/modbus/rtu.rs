use std::{
    io::{Read, Write},
    time::Duration,
};

use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};

use super::{
    crc16, expected_get_holdings_len, generate_pull_get_holdings_request,
    generate_pull_set_holding_request, generate_pull_set_holdings_request,
    parse_pull_get_holdings, parse_pull_set_holdings, ModbusTransport, WRITE_RESPONSE_LEN,
};
use crate::error::{BridgeError, Result};

/// Length of a Modbus exception response: id, fn | 0x80, code, CRC
const EXCEPTION_RESPONSE_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            timeout: Duration::from_millis(100),
        }
    }
}

impl SerialConfig {
    pub fn apply_builder(&self, b: serialport::SerialPortBuilder) -> serialport::SerialPortBuilder {
        b.data_bits(match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        })
        .stop_bits(match self.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        })
        .parity(self.parity)
        .timeout(self.timeout)
    }
}

/// Modbus RTU master on a serial port.
///
/// Frames are built and checked by `rmodbus`; this type only moves bytes and
/// waits for the expected response length (or an exception frame).
pub struct RtuTransport {
    port: Box<dyn SerialPort>,
    port_name: String,
}

impl std::fmt::Debug for RtuTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtuTransport")
            .field("port_name", &self.port_name)
            .finish_non_exhaustive()
    }
}

impl RtuTransport {
    pub fn open(port_name: &str, config: &SerialConfig) -> Result<Self> {
        let builder = config.apply_builder(serialport::new(port_name, config.baud));
        let port = builder.open().map_err(|err| {
            BridgeError::Transport(format!("failed to open {port_name}: {err}"))
        })?;
        log::info!(
            "Opened {port_name} at {} baud ({} data bits, {} stop bits, parity {:?})",
            config.baud,
            config.data_bits,
            config.stop_bits,
            config.parity
        );
        Ok(Self::from_port(port, port_name))
    }

    /// Wrap a port that is already open and configured.
    pub fn from_port(port: Box<dyn SerialPort>, port_name: impl Into<String>) -> Self {
        Self {
            port,
            port_name: port_name.into(),
        }
    }

    /// Send `request` and collect the reply.
    ///
    /// Returns as soon as `expected_len` bytes arrived, or earlier when the
    /// header marks an exception, in which case the exception is the error.
    fn exchange(&mut self, request: &[u8], expected_len: usize, slave_id: u8) -> Result<Vec<u8>> {
        if let Err(err) = self.port.clear(ClearBuffer::Input) {
            log::debug!("Could not clear input buffer of {}: {err}", self.port_name);
        }

        self.port
            .write_all(request)
            .and_then(|_| self.port.flush())
            .map_err(|err| BridgeError::Transport(format!("write to {}: {err}", self.port_name)))?;

        let mut response = Vec::with_capacity(expected_len);
        let mut buffer = [0u8; 256];
        while response.len() < expected_len {
            match self.port.read(&mut buffer) {
                Ok(0) => {
                    return Err(BridgeError::Transport(format!(
                        "{} returned no data ({} of {expected_len} bytes)",
                        self.port_name,
                        response.len()
                    )))
                }
                Ok(n) => response.extend_from_slice(&buffer[..n]),
                Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(BridgeError::Transport(format!(
                        "timed out waiting for slave {slave_id} on {} ({} of {expected_len} bytes)",
                        self.port_name,
                        response.len()
                    )))
                }
                Err(err) => {
                    return Err(BridgeError::Transport(format!(
                        "read from {}: {err}",
                        self.port_name
                    )))
                }
            }

            if response.len() >= EXCEPTION_RESPONSE_LEN && response[1] & 0x80 != 0 {
                break;
            }
        }

        if response[0] != slave_id {
            return Err(BridgeError::Transport(format!(
                "station id mismatch: expected {slave_id}, got {}",
                response[0]
            )));
        }
        if response[1] & 0x80 != 0 {
            let (body, crc) = response[..EXCEPTION_RESPONSE_LEN].split_at(3);
            if u16::from_le_bytes([crc[0], crc[1]]) != crc16(body) {
                return Err(BridgeError::Transport(format!(
                    "exception frame from slave {slave_id} failed CRC check"
                )));
            }
            return Err(BridgeError::Protocol {
                function: response[1] & 0x7F,
                code: response[2],
            });
        }
        response.truncate(expected_len);
        Ok(response)
    }
}

impl ModbusTransport for RtuTransport {
    fn read_holding_registers(
        &mut self,
        start: u16,
        count: u16,
        slave_id: u8,
    ) -> Result<Vec<u16>> {
        let (request, frame) = generate_pull_get_holdings_request(slave_id, start, count)?;
        let response = self.exchange(&frame, expected_get_holdings_len(count), slave_id)?;
        let values = parse_pull_get_holdings(&request, &response)?;
        if values.len() != usize::from(count) {
            return Err(BridgeError::Transport(format!(
                "value count mismatch: expected {count}, got {}",
                values.len()
            )));
        }
        Ok(values)
    }

    fn write_register(&mut self, address: u16, value: u16, slave_id: u8) -> Result<()> {
        let (request, frame) = generate_pull_set_holding_request(slave_id, address, value)?;
        let response = self.exchange(&frame, WRITE_RESPONSE_LEN, slave_id)?;
        parse_pull_set_holdings(&request, &response)
    }

    fn write_registers(&mut self, start: u16, values: &[u16], slave_id: u8) -> Result<()> {
        let (request, frame) = generate_pull_set_holdings_request(slave_id, start, values)?;
        let response = self.exchange(&frame, WRITE_RESPONSE_LEN, slave_id)?;
        parse_pull_set_holdings(&request, &response)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serialport::TTYPort;
    use std::thread;

    /// Answer one request on the controller side of a pty pair with `reply`.
    fn transport_answering(
        request_len: usize,
        reply: Vec<u8>,
    ) -> (RtuTransport, thread::JoinHandle<Vec<u8>>) {
        let (mut controller, mut bridge_side) = TTYPort::pair().unwrap();
        bridge_side.set_timeout(Duration::from_millis(100)).unwrap();
        controller.set_timeout(Duration::from_secs(2)).unwrap();

        let device = thread::spawn(move || {
            let mut request = vec![0u8; request_len];
            controller.read_exact(&mut request).unwrap();
            controller.write_all(&reply).unwrap();
            // keep the master open until the bridge side gave up reading
            thread::sleep(Duration::from_millis(300));
            request
        });
        (RtuTransport::from_port(Box::new(bridge_side), "pty"), device)
    }

    fn with_crc(mut frame: Vec<u8>) -> Vec<u8> {
        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    #[test]
    fn test_reads_registers() {
        let reply = with_crc(vec![0x01, 0x03, 0x04, 0x00, 0x2A, 0x01, 0x00]);
        let (mut transport, device) = transport_answering(8, reply);
        assert_eq!(
            transport.read_holding_registers(100, 2, 1).unwrap(),
            vec![42, 256]
        );
        let request = device.join().unwrap();
        assert_eq!(&request[..6], &[0x01, 0x03, 0x00, 0x64, 0x00, 0x02]);
    }

    #[test]
    fn test_exception_frame_maps_to_protocol_error() {
        let reply = with_crc(vec![0x01, 0x83, 0x02]);
        let (mut transport, device) = transport_answering(8, reply);
        let err = transport.read_holding_registers(9000, 4, 1).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Protocol {
                function: 3,
                code: 2
            }
        ));
        device.join().unwrap();
    }

    #[test]
    fn test_exception_frame_with_bad_crc_is_transport_error() {
        let mut reply = with_crc(vec![0x01, 0x86, 0x04]);
        reply[4] ^= 0xFF;
        let (mut transport, device) = transport_answering(8, reply);
        let err = transport.write_register(1305, 1, 1).unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)), "{err:?}");
        device.join().unwrap();
    }

    #[test]
    fn test_wrong_station_is_transport_error() {
        let reply = with_crc(vec![0x02, 0x03, 0x02, 0x00, 0x01]);
        let (mut transport, device) = transport_answering(8, reply);
        let err = transport.read_holding_registers(100, 1, 1).unwrap_err();
        match err {
            BridgeError::Transport(reason) => assert!(reason.contains("station id"), "{reason}"),
            other => panic!("unexpected {other:?}"),
        }
        device.join().unwrap();
    }

    #[test]
    fn test_truncated_reply_times_out() {
        // three of the seven bytes a one-register read answers with
        let (mut transport, device) = transport_answering(8, vec![0x01, 0x03, 0x02]);
        let err = transport.read_holding_registers(100, 1, 1).unwrap_err();
        match err {
            BridgeError::Transport(reason) => {
                assert!(reason.contains("3 of 7 bytes"), "{reason}")
            }
            other => panic!("unexpected {other:?}"),
        }
        device.join().unwrap();
    }
}
