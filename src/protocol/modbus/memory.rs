use parking_lot::Mutex;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use super::ModbusTransport;
use crate::error::{BridgeError, Result};

/// Size of the controller's holding-register space
pub const REGISTER_SPACE: usize = 2000;

#[derive(Debug, Default)]
struct MemoryState {
    registers: Vec<u16>,
    failing_reads: HashSet<u16>,
    failing_writes: u32,
    writes: Vec<(u16, Vec<u16>)>,
    reads: usize,
}

/// A register bank standing in for the controller.
///
/// Clones share the same bank, so a test can keep one handle to inspect or
/// poke registers while the bridge owns another. Reads starting at an address
/// registered with [`MemoryTransport::fail_reads_at`] and the next N writes
/// after [`MemoryTransport::fail_next_writes`] return transport errors.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    latency: Duration,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                registers: vec![0; REGISTER_SPACE],
                ..Default::default()
            })),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            latency: Duration::ZERO,
        }
    }

    /// Simulated time each bus transaction takes
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set(&self, address: u16, values: &[u16]) {
        let mut state = self.state.lock();
        let start = usize::from(address);
        state.registers[start..start + values.len()].copy_from_slice(values);
    }

    pub fn get(&self, address: u16, count: u16) -> Vec<u16> {
        let state = self.state.lock();
        let start = usize::from(address);
        state.registers[start..start + usize::from(count)].to_vec()
    }

    pub fn fail_reads_at(&self, start: u16) {
        self.state.lock().failing_reads.insert(start);
    }

    pub fn clear_read_failures(&self) {
        self.state.lock().failing_reads.clear();
    }

    pub fn fail_next_writes(&self, count: u32) {
        self.state.lock().failing_writes = count;
    }

    /// Successful writes so far as `(start, values)`, oldest first
    pub fn writes(&self) -> Vec<(u16, Vec<u16>)> {
        self.state.lock().writes.clone()
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().reads
    }

    /// Highest number of transactions that were ever executing at once
    pub fn max_concurrent_transactions(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn transaction<T>(&self, op: impl FnOnce(&mut MemoryState) -> Result<T>) -> Result<T> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        let result = op(&mut self.state.lock());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn check_range(start: u16, count: usize) -> Result<usize> {
    let start = usize::from(start);
    if count == 0 || start + count > REGISTER_SPACE {
        return Err(BridgeError::Protocol {
            function: 0x03,
            code: 0x02,
        });
    }
    Ok(start)
}

impl ModbusTransport for MemoryTransport {
    fn read_holding_registers(
        &mut self,
        start: u16,
        count: u16,
        _slave_id: u8,
    ) -> Result<Vec<u16>> {
        self.transaction(|state| {
            if state.failing_reads.contains(&start) {
                return Err(BridgeError::Transport(format!(
                    "simulated read failure at {start}"
                )));
            }
            let first = check_range(start, usize::from(count))?;
            state.reads += 1;
            Ok(state.registers[first..first + usize::from(count)].to_vec())
        })
    }

    fn write_register(&mut self, address: u16, value: u16, slave_id: u8) -> Result<()> {
        self.write_registers(address, &[value], slave_id)
    }

    fn write_registers(&mut self, start: u16, values: &[u16], _slave_id: u8) -> Result<()> {
        self.transaction(|state| {
            if state.failing_writes > 0 {
                state.failing_writes -= 1;
                return Err(BridgeError::Transport(format!(
                    "simulated write failure at {start}"
                )));
            }
            let first = check_range(start, values.len())?;
            state.registers[first..first + values.len()].copy_from_slice(values);
            state.writes.push((start, values.to_vec()));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_registers() {
        let probe = MemoryTransport::new();
        let mut bus = probe.clone();
        bus.write_registers(1500, &[0, 425], 1).unwrap();
        assert_eq!(probe.get(1500, 2), vec![0, 425]);
        assert_eq!(probe.writes(), vec![(1500, vec![0, 425])]);
    }

    #[test]
    fn test_injected_failures() {
        let probe = MemoryTransport::new();
        let mut bus = probe.clone();
        probe.fail_reads_at(100);
        assert!(matches!(
            bus.read_holding_registers(100, 5, 1),
            Err(BridgeError::Transport(_))
        ));
        assert!(bus.read_holding_registers(200, 5, 1).is_ok());

        probe.fail_next_writes(1);
        assert!(bus.write_register(1305, 1, 1).is_err());
        assert!(bus.write_register(1305, 1, 1).is_ok());
        assert_eq!(probe.get(1305, 1), vec![1]);
    }

    #[test]
    fn test_out_of_range_is_illegal_address() {
        let mut bus = MemoryTransport::new();
        assert!(matches!(
            bus.read_holding_registers(1999, 2, 1),
            Err(BridgeError::Protocol { code: 0x02, .. })
        ));
    }
}
