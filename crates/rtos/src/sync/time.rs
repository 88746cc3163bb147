use std::num::NonZeroU32;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::config::{MAX_TIMEOUT_TICKS, TICKS_PER_SEC};

use super::interrupts::assert_may_block;

static BOOT: OnceLock<Instant> = OnceLock::new();

fn boot() -> Instant {
    *BOOT.get_or_init(Instant::now)
}

pub fn ms_to_ticks(ms: u32) -> u32 {
    (u64::from(ms) * u64::from(TICKS_PER_SEC) / 1000) as u32
}

pub fn ticks_to_ms(ticks: u32) -> u32 {
    // truncation wraps like the tick counter itself
    (u64::from(ticks) * 1000 / u64::from(TICKS_PER_SEC)) as u32
}

pub fn ticks_to_duration(ticks: u32) -> Duration {
    Duration::from_micros(u64::from(ticks) * 1_000_000 / u64::from(TICKS_PER_SEC))
}

/// Ticks since the first call into the time base. Wraps.
pub fn now_ticks() -> u32 {
    let elapsed = boot().elapsed().as_micros();
    (elapsed * u128::from(TICKS_PER_SEC) / 1_000_000) as u32
}

pub fn now_ms() -> u32 {
    ticks_to_ms(now_ticks())
}

/// How long a blocking call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Forever,
    Ticks(NonZeroU32),
}

impl Timeout {
    /// `0` means wait forever; anything else is rounded to whole ticks and
    /// clamped to `1..=MAX_TIMEOUT_TICKS`.
    pub fn from_ms(ms: u32) -> Self {
        if ms == 0 {
            return Timeout::Forever;
        }
        let ticks = ms_to_ticks(ms).clamp(1, MAX_TIMEOUT_TICKS);
        Timeout::Ticks(NonZeroU32::new(ticks).unwrap_or(NonZeroU32::MIN))
    }

    pub fn ticks(self) -> Option<u32> {
        match self {
            Timeout::Forever => None,
            Timeout::Ticks(ticks) => Some(ticks.get()),
        }
    }

    pub(crate) fn deadline(self) -> Option<Instant> {
        self.ticks()
            .map(|ticks| Instant::now() + ticks_to_duration(ticks))
    }
}

/// Suspend the calling task for `ticks` scheduler ticks.
pub fn delay(ticks: u32) {
    assert_may_block();
    let deadline = Instant::now() + ticks_to_duration(ticks);
    loop {
        if crate::thread::termination_requested() {
            crate::thread::exit();
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::park_timeout(deadline - now);
    }
}

pub fn delay_ms(ms: u32) {
    if ms > 0 {
        delay(ms_to_ticks(ms).max(1));
    }
}
