//! Compile-time configuration for the scheduler core.
//!
//! All limits are fixed at compile time. The embedding application picks
//! its own module UIDs; the core only reserves `KERNEL_UID` for itself.

/// Number of module UID slots in the callback registry. UIDs are valid
/// in `0..MAX_MODULES`.
pub const MAX_MODULES: usize = 16;

/// Per-task argument buffer capacity in bytes. Appends that would exceed
/// this cap fail with `ArgOverflow`.
pub const MAX_TASK_ARGS: usize = 64;

/// Event log capacity. Once full, further events are dropped and counted.
pub const EVENT_LOG_CAP: usize = 128;

/// UID under which the scheduler registers its own services.
pub const KERNEL_UID: u8 = 0;

/// Kernel service: enable/disable dispatching. One `u8` argument,
/// nonzero enables.
pub const SVC_KERNEL_ENABLE: u8 = 0;

/// Kernel service: kill a scheduled task. One little-endian `u16`
/// argument holding the PID.
pub const SVC_KERNEL_KILL: u8 = 1;

/// Default tick step in milliseconds (finest scheduling resolution).
pub const DEFAULT_STEP_MS: u32 = 1;
