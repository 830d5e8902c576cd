/// Counts poll cycles and fires on every multiple of the interval.
///
/// An interval of 0 never fires.
#[derive(Debug, Clone)]
pub struct HeartbeatSync {
    interval: u64,
    cycles: u64,
}

impl HeartbeatSync {
    pub fn new(interval: u64) -> Self {
        Self {
            interval,
            cycles: 0,
        }
    }

    /// Record one finished cycle; true on cycles N, 2N, ...
    pub fn tick(&mut self) -> bool {
        self.cycles += 1;
        self.interval > 0 && self.cycles % self.interval == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_twice_in_250_cycles() {
        let mut heartbeat = HeartbeatSync::new(100);
        let fired: Vec<u64> = (1..=250).filter(|_| heartbeat.tick()).collect();
        assert_eq!(fired, vec![100, 200]);
    }

    #[test]
    fn test_zero_interval_is_disabled() {
        let mut heartbeat = HeartbeatSync::new(0);
        assert!((0..500).all(|_| !heartbeat.tick()));
    }
}
