//! Scalar and string codec for holding registers.
//!
//! 32-bit values span two consecutive registers, high word first, and carry a
//! fixed decimal scale (`value * scale` rounded to an integer). The integer is
//! a two's-complement `i32`: negative values round-trip and anything outside
//! the `i32` range saturates instead of wrapping.
//!
//! Strings are packed two ASCII bytes per register, first character in the
//! high byte, NUL padded up to a fixed length.

use crate::error::{BridgeError, Result};

/// Encode `value` with the given decimal scale into `[high, low]`.
pub fn encode_scaled(value: f64, scale: u32) -> [u16; 2] {
    let scaled = (value * f64::from(scale)).round();
    let clamped = if scaled.is_nan() {
        0
    } else {
        scaled.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
    };
    let bits = clamped as u32;
    [(bits >> 16) as u16, (bits & 0xFFFF) as u16]
}

/// Decode a `[high, low]` register pair written by [`encode_scaled`].
pub fn decode_scaled(registers: &[u16], scale: u32) -> Result<f64> {
    if scale == 0 {
        return Err(BridgeError::Decode("scale must be non-zero".to_string()));
    }
    match registers {
        [high, low] => {
            let bits = (u32::from(*high) << 16) | u32::from(*low);
            Ok(f64::from(bits as i32) / f64::from(scale))
        }
        other => Err(BridgeError::Decode(format!(
            "scaled value needs 2 registers, got {}",
            other.len()
        ))),
    }
}

/// Pack `text` into registers, truncated or NUL padded to `max_len` bytes.
///
/// Non-ASCII characters are replaced with `?` since the controller display
/// only renders 7-bit text.
pub fn encode_text(text: &str, max_len: usize) -> Vec<u16> {
    let mut bytes: Vec<u8> = text
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .take(max_len)
        .collect();
    bytes.resize(max_len, 0);
    if bytes.len() % 2 == 1 {
        bytes.push(0);
    }

    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// Unpack registers produced by [`encode_text`], dropping NUL bytes.
pub fn decode_text(registers: &[u16]) -> Result<String> {
    let mut text = String::with_capacity(registers.len() * 2);
    for (index, register) in registers.iter().enumerate() {
        for byte in register.to_be_bytes() {
            match byte {
                0 => {}
                b if b.is_ascii() => text.push(b as char),
                b => {
                    return Err(BridgeError::Decode(format!(
                        "non-ASCII byte 0x{b:02X} in text register {index}"
                    )))
                }
            }
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scaled_example() {
        assert_eq!(encode_scaled(42.5, 10), [0, 425]);
        assert_eq!(decode_scaled(&[0, 425], 10).unwrap(), 42.5);
    }

    #[test]
    fn test_scaled_spans_high_word() {
        // 123.456 mm at scale 1000 does not fit in one register
        let regs = encode_scaled(123.456, 1000);
        assert_eq!(regs, [0x0001, 0xE240]);
        assert_eq!(decode_scaled(&regs, 1000).unwrap(), 123.456);
    }

    #[test]
    fn test_scaled_round_trip_within_one_unit() {
        for (value, scale) in [(0.0, 10), (3.14159, 100), (999.9994, 1000), (-12.34, 100)] {
            let decoded = decode_scaled(&encode_scaled(value, scale), scale).unwrap();
            assert!(
                (decoded - value).abs() <= 1.0 / f64::from(scale),
                "{value} at scale {scale} decoded as {decoded}"
            );
        }
    }

    #[test]
    fn test_negative_values_use_twos_complement() {
        let regs = encode_scaled(-1.5, 100);
        assert_eq!(regs, [0xFFFF, 0xFF6A]);
        assert_eq!(decode_scaled(&regs, 100).unwrap(), -1.5);
    }

    #[test]
    fn test_out_of_range_saturates() {
        assert_eq!(encode_scaled(1e12, 1000), [0x7FFF, 0xFFFF]);
        assert_eq!(encode_scaled(-1e12, 1000), [0x8000, 0x0000]);
    }

    #[test]
    fn test_decode_scaled_rejects_wrong_length() {
        assert!(matches!(
            decode_scaled(&[1], 10),
            Err(BridgeError::Decode(_))
        ));
        assert!(matches!(
            decode_scaled(&[1, 2], 0),
            Err(BridgeError::Decode(_))
        ));
    }

    #[test]
    fn test_text_example() {
        let regs = encode_text("OK", 4);
        assert_eq!(regs, vec![0x4F4B, 0x0000]);
        assert_eq!(decode_text(&regs).unwrap(), "OK");
    }

    #[test]
    fn test_text_truncates_and_pads() {
        let regs = encode_text("System Is Ready", 40);
        assert_eq!(regs.len(), 20);
        assert_eq!(decode_text(&regs).unwrap(), "System Is Ready");

        let regs = encode_text("ABCDEFG", 4);
        assert_eq!(regs, vec![0x4142, 0x4344]);
    }

    #[test]
    fn test_decode_text_rejects_non_ascii() {
        assert!(matches!(
            decode_text(&[0x41C3]),
            Err(BridgeError::Decode(_))
        ));
    }
}
