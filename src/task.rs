//! Task entries and their argument/performance bookkeeping.
//!
//! A task is a future invocation of `(module, service, args)` at an
//! absolute millisecond timestamp, optionally repeating. Entries live in
//! the task queue from `schedule_*` until they fire for the last time or
//! are removed.

use arrayvec::ArrayVec;

use crate::config::MAX_TASK_ARGS;

/// Pass as `repeats` for a periodic task that is never retired by its
/// repeat count.
pub const REPEAT_FOREVER: i32 = -1;

/// Pass as `time` to run a task as soon as the dispatch loop gets to it.
pub const ASAP: i64 = 0;

// ─── PID ─────────────────────────────────────────────────────────

/// Scheduler-assigned task identifier, unique within a process lifetime.
/// Reschedules of a periodic task keep the original PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pid(u16);

impl Pid {
    /// Rebuild a PID from its wire form (e.g. a kill-task argument).
    pub fn from_raw(raw: u16) -> Self {
        Pid(raw)
    }

    /// Raw numeric value, as marshaled into argument buffers.
    pub fn raw(&self) -> u16 {
        self.0
    }
}

impl core::fmt::Display for Pid {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "Pid#{}", self.0)
    }
}

// ─── Argument marshaling ─────────────────────────────────────────

/// Fixed-size value that can be appended to a task's argument buffer and
/// decoded back out by the target service. Encoding is little-endian.
pub trait ArgValue: Copy {
    const SIZE: usize;

    /// Encode into `out`, which is exactly `SIZE` bytes.
    fn write_le(self, out: &mut [u8]);

    /// Decode from `buf`, which is exactly `SIZE` bytes.
    fn read_le(buf: &[u8]) -> Self;
}

macro_rules! arg_value_impl {
    ($($t:ty),*) => {$(
        impl ArgValue for $t {
            const SIZE: usize = core::mem::size_of::<$t>();

            fn write_le(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }

            fn read_le(buf: &[u8]) -> Self {
                let mut raw = [0u8; core::mem::size_of::<$t>()];
                raw.copy_from_slice(buf);
                <$t>::from_le_bytes(raw)
            }
        }
    )*};
}

arg_value_impl!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl ArgValue for Pid {
    const SIZE: usize = 2;

    fn write_le(self, out: &mut [u8]) {
        self.0.write_le(out);
    }

    fn read_le(buf: &[u8]) -> Self {
        Pid(u16::read_le(buf))
    }
}

/// Decode a value at a byte offset of an argument buffer. `None` if the
/// buffer is too short.
pub fn arg_at<T: ArgValue>(args: &[u8], offset: usize) -> Option<T> {
    let end = offset.checked_add(T::SIZE)?;
    args.get(offset..end).map(T::read_le)
}

// ─── Performance counters ────────────────────────────────────────

/// Per-task execution statistics, updated by the dispatch loop and read
/// by reporter modules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskPerf {
    /// Completed runs.
    pub runs: u32,
    /// Accumulated runtime, whole seconds.
    pub acc_secs: u32,
    /// Accumulated runtime, sub-second remainder in microseconds.
    pub acc_micros: u32,
    /// Runs whose start time was missed.
    pub start_miss_count: u32,
    /// Total milliseconds of start lateness.
    pub start_miss_total: u64,
}

impl TaskPerf {
    pub const fn new() -> Self {
        TaskPerf {
            runs: 0,
            acc_secs: 0,
            acc_micros: 0,
            start_miss_count: 0,
            start_miss_total: 0,
        }
    }

    /// Account one completed run of `elapsed_ms`.
    pub fn record_run(&mut self, elapsed_ms: u64) {
        self.runs += 1;
        let micros = self.acc_micros as u64 + elapsed_ms * 1_000;
        self.acc_secs += (micros / 1_000_000) as u32;
        self.acc_micros = (micros % 1_000_000) as u32;
    }

    /// Account a start that was `miss_ms` late.
    pub fn record_miss(&mut self, miss_ms: u64) {
        self.start_miss_count += 1;
        self.start_miss_total += miss_ms;
    }

    /// Average runtime per run in milliseconds, 0.0 when the task has
    /// not yet run.
    pub fn avg_runtime_ms(&self) -> f32 {
        if self.runs == 0 {
            return 0.0;
        }
        let total_ms = self.acc_secs as f32 * 1_000.0 + self.acc_micros as f32 / 1_000.0;
        total_ms / self.runs as f32
    }

    /// Average start lateness in milliseconds over the missed runs, 0.0
    /// when no start was missed.
    pub fn avg_miss_ms(&self) -> f32 {
        if self.start_miss_count == 0 {
            return 0.0;
        }
        self.start_miss_total as f32 / self.start_miss_count as f32
    }
}

// ─── Task entry ──────────────────────────────────────────────────

/// One scheduled invocation in the task queue.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEntry {
    /// Target module.
    pub module_uid: u8,
    /// Service within the module.
    pub service_id: u8,
    /// Scheduler-assigned identifier.
    pub pid: Pid,
    /// Absolute millisecond time at which the task becomes due.
    pub timestamp: i64,
    /// 0 for one-shot; > 0 reschedules every `period` ms after the
    /// scheduled (not actual) fire time.
    pub period: i32,
    /// Remaining repeats after the current run; [`REPEAT_FOREVER`] never
    /// retires from the repeat count.
    pub repeats_remaining: i32,
    /// Opaque argument bytes, appended by callers until the entry is
    /// popped.
    pub args: ArrayVec<u8, MAX_TASK_ARGS>,
    /// Execution statistics.
    pub perf: TaskPerf,
}

impl TaskEntry {
    pub(crate) fn new(
        module_uid: u8,
        service_id: u8,
        pid: Pid,
        timestamp: i64,
        period: i32,
        repeats_remaining: i32,
    ) -> Self {
        TaskEntry {
            module_uid,
            service_id,
            pid,
            timestamp,
            period,
            repeats_remaining,
            args: ArrayVec::new(),
            perf: TaskPerf::new(),
        }
    }
}
