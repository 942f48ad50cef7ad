//! Millisecond clock advanced by the periodic tick interrupt.
//!
//! `NOW` starts at 0 at boot and is never reset. The tick handler is the
//! only writer; everyone else reads through [`now`].

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::config::DEFAULT_STEP_MS;

/// Milliseconds since startup. Written only by [`tick`].
static MS_SINCE_STARTUP: AtomicU64 = AtomicU64::new(0);

/// Milliseconds added per tick, set once by [`configure`].
static STEP_MS: AtomicU32 = AtomicU32::new(DEFAULT_STEP_MS);

/// Set the tick step. Called by `Kernel::init_clock` alongside the HAL
/// timer setup; the step must match the programmed tick period.
pub fn configure(step_ms: u32) {
    STEP_MS.store(step_ms.max(1), Ordering::Relaxed);
}

/// Advance the clock by one tick. Call from the periodic timer interrupt.
pub fn tick() {
    MS_SINCE_STARTUP.fetch_add(u64::from(STEP_MS.load(Ordering::Relaxed)), Ordering::Relaxed);
}

/// Current time in milliseconds since startup.
pub fn now() -> u64 {
    MS_SINCE_STARTUP.load(Ordering::Relaxed)
}
