use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use crate::core::{SpeedMode, TipIndex, TIP_COUNT};

/// Connection state of the bridge as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Connecting = 0,
    Connected = 1,
    /// The last poll cycle lost at least one block
    Degraded = 2,
    /// Terminal: the console link is gone
    Disconnected = 3,
}

impl LinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LinkState::Connecting,
            1 => LinkState::Connected,
            2 => LinkState::Degraded,
            _ => LinkState::Disconnected,
        }
    }
}

/// Shared [`LinkState`] cell. Once disconnected it never changes again.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: Arc<AtomicU8>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(LinkState::Connecting as u8)),
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Move to `next` unless already disconnected; returns the state in effect
    pub fn set(&self, next: LinkState) -> LinkState {
        let previous = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current != LinkState::Disconnected as u8).then_some(next as u8)
            });
        match previous {
            Ok(previous) => {
                let previous = LinkState::from_u8(previous);
                if previous != next {
                    log::info!("Bridge state {previous:?} -> {next:?}");
                }
                next
            }
            Err(_) => LinkState::Disconnected,
        }
    }

    pub fn mark_disconnected(&self) {
        self.set(LinkState::Disconnected);
    }

    pub fn is_disconnected(&self) -> bool {
        self.get() == LinkState::Disconnected
    }
}

/// Jog state this process last wrote successfully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntendedState {
    pub up: bool,
    pub down: bool,
    pub speed_mode: SpeedMode,
}

/// Change to [`IntendedState`] carried by a jog or speed command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentUpdate {
    Up(bool),
    Down(bool),
    SpeedMode(SpeedMode),
}

impl IntendedState {
    pub fn apply(&mut self, update: IntentUpdate) {
        match update {
            IntentUpdate::Up(pressed) => self.up = pressed,
            IntentUpdate::Down(pressed) => self.down = pressed,
            IntentUpdate::SpeedMode(mode) => self.speed_mode = mode,
        }
    }
}

#[derive(Debug, Default)]
struct IntentInner {
    intent: IntendedState,
    pending: usize,
    generation: u64,
}

/// Marker taken just before the work-position block is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadToken {
    generation: u64,
    busy: bool,
}

/// Intended jog state plus bookkeeping of commands between enqueue and
/// completion.
///
/// Every command start and finish bumps a generation counter. A poll cycle
/// takes a [`ReadToken`] before reading the work-position block; if the
/// generation moved or anything was pending, the read may have raced a write
/// and must not be used to correct the device.
#[derive(Debug, Default)]
pub struct IntentTracker {
    inner: Mutex<IntentInner>,
}

impl IntentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intent(&self) -> IntendedState {
        self.inner.lock().intent
    }

    pub fn on_enqueued(&self) {
        self.inner.lock().pending += 1;
    }

    /// The command was never queued after all (channel closed)
    pub fn on_rejected(&self) {
        let mut inner = self.inner.lock();
        inner.pending = inner.pending.saturating_sub(1);
    }

    pub fn on_started(&self) {
        self.inner.lock().generation += 1;
    }

    /// Record completion; `update` is applied only for a successful write
    pub fn on_finished(&self, update: Option<IntentUpdate>) {
        let mut inner = self.inner.lock();
        if let Some(update) = update {
            inner.intent.apply(update);
        }
        inner.pending = inner.pending.saturating_sub(1);
        inner.generation += 1;
    }

    pub fn read_token(&self) -> ReadToken {
        let inner = self.inner.lock();
        ReadToken {
            generation: inner.generation,
            busy: inner.pending > 0,
        }
    }

    /// True when no command was queued or running since `token` was taken
    pub fn is_quiet_since(&self, token: ReadToken) -> bool {
        let inner = self.inner.lock();
        !token.busy && inner.pending == 0 && inner.generation == token.generation
    }
}

/// Local tip-active flags, the source of truth for the heartbeat rewrite.
#[derive(Debug, Clone, Default)]
pub struct TipActiveFlags {
    flags: Arc<Mutex<[bool; TIP_COUNT]>>,
}

impl TipActiveFlags {
    pub fn new(initial: [bool; TIP_COUNT]) -> Self {
        Self {
            flags: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn set(&self, tip: TipIndex, active: bool) {
        self.flags.lock()[tip.slot()] = active;
    }

    pub fn get(&self) -> [bool; TIP_COUNT] {
        *self.flags.lock()
    }
}
