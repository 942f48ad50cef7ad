//! Kernel root object: scheduling API, dispatch loop, self-services.
//!
//! One `Kernel` owns the task queue, the callback registry and the event
//! log. It is driven from the main loop by calling [`Kernel::dispatch`]
//! repeatedly; interrupt handlers may schedule and remove tasks
//! concurrently because every mutation of shared state happens inside an
//! interrupt-masked critical section. Service callbacks themselves run
//! unmasked, so a long-running service delays later tasks but never
//! blocks the tick.

use core::sync::atomic::{AtomicBool, Ordering};

use alloc::vec::Vec;
use spin::Mutex;

use crate::clock;
use crate::config::{KERNEL_UID, MAX_MODULES, MAX_TASK_ARGS, SVC_KERNEL_ENABLE, SVC_KERNEL_KILL};
use crate::eventlog::{EventKind, EventLog, EventRecord};
use crate::hal::{self, Hal};
use crate::queue::TaskQueue;
use crate::registry::{Registry, ServiceCall, ServiceFn, STATUS_ARG_ERR, STATUS_ERR, STATUS_OK};
use crate::task::{ArgValue, Pid, TaskEntry};

// ─── Errors ──────────────────────────────────────────────────────

/// Scheduling API errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Module UID outside the registry range.
    InvalidModule,
    /// Removal matched no queued task.
    NoSuchTask,
    /// Argument append would exceed the per-task cap.
    ArgOverflow,
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            KernelError::InvalidModule => write!(f, "invalid module UID"),
            KernelError::NoSuchTask => write!(f, "no such task"),
            KernelError::ArgOverflow => write!(f, "argument buffer full"),
        }
    }
}

// ─── Kernel ──────────────────────────────────────────────────────

/// The scheduler core. Owns all shared state; the only process-wide
/// value it relies on is the clock in [`crate::clock`].
pub struct Kernel<H: Hal> {
    hal: H,
    queue: Mutex<TaskQueue>,
    registry: Mutex<Registry<H>>,
    log: Mutex<EventLog>,
    enabled: AtomicBool,
}

impl<H: Hal> Kernel<H> {
    /// Build a kernel and register its own services at
    /// [`KERNEL_UID`](crate::config::KERNEL_UID).
    pub fn new(hal: H) -> Self {
        let mut registry = Registry::new();
        // KERNEL_UID is in range by construction.
        let _ = registry.register(KERNEL_UID, kernel_service::<H>);
        Kernel {
            hal,
            queue: Mutex::new(TaskQueue::new()),
            registry: Mutex::new(registry),
            log: Mutex::new(EventLog::new()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// Configure the clock step and start the HAL tick source.
    pub fn init_clock(&self, step_ms: u32) {
        clock::configure(step_ms);
        self.hal.clock_init(step_ms);
    }

    /// Milliseconds since startup.
    pub fn now(&self) -> u64 {
        clock::now()
    }

    /// Mask interrupts around a critical section. Lock acquisition always
    /// happens inside the mask so an ISR can never spin on a lock the
    /// main loop holds.
    fn masked<R>(&self, f: impl FnOnce() -> R) -> R {
        hal::masked(&self.hal, f)
    }

    // ─── Module registration ─────────────────────────────────────

    /// Install `func` as the callback for `uid`. Re-registering
    /// overwrites the previous record.
    pub fn register_module(&self, uid: u8, func: ServiceFn<H>) -> Result<(), KernelError> {
        self.masked(|| self.registry.lock().register(uid, func))
    }

    /// Remove the callback for `uid`. Returns whether one was installed.
    pub fn unregister_module(&self, uid: u8) -> bool {
        self.masked(|| self.registry.lock().unregister(uid))
    }

    /// Whether `uid` names a registered module.
    pub fn validate(&self, uid: u8) -> bool {
        self.masked(|| self.registry.lock().validate(uid))
    }

    // ─── Scheduling ──────────────────────────────────────────────

    /// Schedule a one-shot task. `time >= 0` is absolute milliseconds
    /// since startup; `time < 0` is relative, resolved as `now + |time|`.
    pub fn schedule_once(&self, uid: u8, service_id: u8, time: i64) -> Result<Pid, KernelError> {
        self.schedule(uid, service_id, time, 0, 0)
    }

    /// Schedule a periodic task firing first at `first_time` (same
    /// convention as [`Kernel::schedule_once`]) and every `period_ms`
    /// thereafter. `repeats` is the count remaining after each run;
    /// [`REPEAT_FOREVER`](crate::task::REPEAT_FOREVER) never retires.
    /// A non-positive period degrades to a one-shot.
    pub fn schedule_periodic(
        &self,
        uid: u8,
        service_id: u8,
        first_time: i64,
        period_ms: i32,
        repeats: i32,
    ) -> Result<Pid, KernelError> {
        self.schedule(uid, service_id, first_time, period_ms.max(0), repeats)
    }

    fn schedule(
        &self,
        uid: u8,
        service_id: u8,
        time: i64,
        period: i32,
        repeats: i32,
    ) -> Result<Pid, KernelError> {
        if uid as usize >= MAX_MODULES {
            return Err(KernelError::InvalidModule);
        }
        let timestamp = resolve_time(time);
        Ok(self.masked(|| {
            self.queue
                .lock()
                .insert(uid, service_id, timestamp, period, repeats)
        }))
    }

    /// Append raw bytes to the most recently scheduled task's arguments.
    /// Silently ignored once that task has been popped or removed.
    pub fn add_args(&self, bytes: &[u8]) -> Result<(), KernelError> {
        self.masked(|| self.queue.lock().append_args(bytes))
    }

    /// Append one fixed-size value, little-endian.
    pub fn add_arg<T: ArgValue>(&self, value: T) -> Result<(), KernelError> {
        if T::SIZE > MAX_TASK_ARGS {
            return Err(KernelError::ArgOverflow);
        }
        let mut buf = [0u8; MAX_TASK_ARGS];
        value.write_le(&mut buf[..T::SIZE]);
        self.add_args(&buf[..T::SIZE])
    }

    /// Remove the first queued task matching `(uid, sid)` and, when
    /// given, exact argument bytes.
    pub fn remove_task(
        &self,
        uid: u8,
        service_id: u8,
        args: Option<&[u8]>,
    ) -> Result<(), KernelError> {
        if self.masked(|| self.queue.lock().remove_matching(uid, service_id, args)) {
            Ok(())
        } else {
            Err(KernelError::NoSuchTask)
        }
    }

    /// Remove the queued task with the given PID.
    pub fn remove_task_by_pid(&self, pid: Pid) -> Result<(), KernelError> {
        if self.masked(|| self.queue.lock().remove_by_pid(pid)) {
            Ok(())
        } else {
            Err(KernelError::NoSuchTask)
        }
    }

    // ─── Introspection ───────────────────────────────────────────

    /// Number of queued tasks.
    pub fn task_count(&self) -> usize {
        self.masked(|| self.queue.lock().len())
    }

    /// Snapshot of all queued tasks in scheduled order. Taken inside the
    /// mask, so it is consistent against concurrent mutation.
    pub fn tasks(&self) -> Vec<TaskEntry> {
        self.masked(|| self.queue.lock().iter().cloned().collect())
    }

    /// Snapshot of the queued task with the given PID.
    pub fn task(&self, pid: Pid) -> Option<TaskEntry> {
        self.masked(|| self.queue.lock().find(pid).cloned())
    }

    // ─── Dispatch gate ───────────────────────────────────────────

    /// Enable or disable dispatching. The clock keeps running while
    /// disabled; due tasks accumulate and their start misses are
    /// accounted when dispatching resumes.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    // ─── Event log ───────────────────────────────────────────────

    /// Gate event recording on or off.
    pub fn log_start(&self, enabled: bool) {
        self.masked(|| self.log.lock().start(enabled));
    }

    /// Record an event stamped with the current time.
    pub fn emit(&self, uid: u8, service_id: u8, kind: EventKind) {
        let timestamp = clock::now();
        self.masked(|| self.log.lock().emit(timestamp, uid, service_id, kind));
    }

    /// Snapshot of the event log, oldest first.
    pub fn events(&self) -> Vec<EventRecord> {
        self.masked(|| self.log.lock().iter().copied().collect())
    }

    /// Events lost to a full log.
    pub fn events_dropped(&self) -> u32 {
        self.masked(|| self.log.lock().dropped())
    }

    // ─── Dispatch ────────────────────────────────────────────────

    /// One dispatch iteration: run at most one due task. Returns whether
    /// a task fired. The outer `loop` belongs to the caller.
    pub fn dispatch(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let now = clock::now() as i64;
        let popped = self.masked(|| {
            let mut queue = self.queue.lock();
            let due = queue.peek_head().map_or(false, |head| head.timestamp <= now);
            if due {
                queue.pop_head()
            } else {
                None
            }
        });
        let Some(mut entry) = popped else {
            return false;
        };

        let miss = now - entry.timestamp;
        if miss > 0 {
            entry.perf.record_miss(miss as u64);
        }

        let marshaled = self.masked(|| {
            self.registry
                .lock()
                .marshal(entry.module_uid, entry.service_id, &entry.args)
        });
        let Some((func, call)) = marshaled else {
            // Unknown target: report and retire without rescheduling.
            self.emit(entry.module_uid, entry.service_id, EventKind::Error);
            return true;
        };

        let started = clock::now();
        let ret_val = func(self, &call);
        let elapsed = clock::now() - started;

        entry.perf.record_run(elapsed);
        self.masked(|| self.registry.lock().store_ret(entry.module_uid, ret_val));
        self.emit(
            entry.module_uid,
            entry.service_id,
            if ret_val == STATUS_OK {
                EventKind::Ok
            } else {
                EventKind::Error
            },
        );

        if entry.period > 0 && !retire_after_run(&mut entry.repeats_remaining) {
            // Next fire time derives from the scheduled timestamp, not
            // from now, so cadence survives late starts.
            entry.timestamp += i64::from(entry.period);
            let now = clock::now() as i64;
            while entry.timestamp < now {
                entry.timestamp += i64::from(entry.period);
            }
            self.masked(|| self.queue.lock().reinsert(entry));
        }

        true
    }
}

/// Resolve the public time convention to an absolute timestamp.
fn resolve_time(time: i64) -> i64 {
    if time >= 0 {
        time
    } else {
        (clock::now() as i64).saturating_add(time.saturating_neg())
    }
}

/// Repeat bookkeeping for a periodic task that just ran. Returns whether
/// the task retires. `repeats` counts runs remaining after the current
/// one; negative means indefinite.
fn retire_after_run(repeats: &mut i32) -> bool {
    match *repeats {
        0 => true,
        n if n > 0 => {
            *repeats = n - 1;
            *repeats == 0
        }
        _ => false,
    }
}

// ─── Kernel self-services ────────────────────────────────────────

/// Services the scheduler offers under its own UID, so remote modules
/// can disable dispatching or kill tasks by scheduling a task targeting
/// the scheduler itself.
fn kernel_service<H: Hal>(kernel: &Kernel<H>, call: &ServiceCall) -> i32 {
    match call.service_id() {
        SVC_KERNEL_ENABLE => {
            let Some(flag) = call.arg_at::<u8>(0) else {
                return STATUS_ARG_ERR;
            };
            kernel.set_enabled(flag != 0);
            STATUS_OK
        }
        SVC_KERNEL_KILL => {
            let Some(raw) = call.arg_at::<u16>(0) else {
                return STATUS_ARG_ERR;
            };
            match kernel.remove_task_by_pid(Pid::from_raw(raw)) {
                Ok(()) => STATUS_OK,
                Err(_) => STATUS_ERR,
            }
        }
        _ => STATUS_ERR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing;
    use crate::hal::HostHal;
    use std::sync::Mutex as StdMutex;

    /// `(now_at_fire, module_uid, service_id, args)` per invocation.
    static FIRED: StdMutex<Vec<(u64, u8, u8, Vec<u8>)>> = StdMutex::new(Vec::new());

    fn recorder(kernel: &Kernel<HostHal>, call: &ServiceCall) -> i32 {
        FIRED
            .lock()
            .unwrap()
            .push((kernel.now(), 3, call.service_id(), call.args().to_vec()));
        STATUS_OK
    }

    fn failing(_: &Kernel<HostHal>, _: &ServiceCall) -> i32 {
        STATUS_ERR
    }

    fn kernel() -> Kernel<HostHal> {
        let kernel = Kernel::new(HostHal::new());
        kernel.register_module(3, recorder).unwrap();
        FIRED.lock().unwrap().clear();
        kernel
    }

    /// Advance the clock `ms` milliseconds, draining due tasks each tick.
    fn run_for(kernel: &Kernel<HostHal>, ms: u64) {
        for _ in 0..ms {
            clock::tick();
            while kernel.dispatch() {}
        }
    }

    #[test]
    fn scheduled_task_is_findable_by_pid() {
        let _clk = testing::lock();
        let kernel = kernel();

        let pid = kernel.schedule_once(3, 2, -500).unwrap();
        let entry = kernel.task(pid).unwrap();
        assert_eq!(entry.module_uid, 3);
        assert_eq!(entry.service_id, 2);
        assert_eq!(entry.timestamp, clock::now() as i64 + 500);
    }

    #[test]
    fn out_of_range_uid_leaves_queue_unchanged() {
        let _clk = testing::lock();
        let kernel = kernel();

        assert_eq!(
            kernel.schedule_once(MAX_MODULES as u8, 0, 100),
            Err(KernelError::InvalidModule)
        );
        assert_eq!(kernel.task_count(), 0);
    }

    #[test]
    fn one_shot_fires_once_at_its_time() {
        let _clk = testing::lock();
        let kernel = kernel();
        let base = clock::now();

        kernel.schedule_once(3, 2, -100).unwrap();
        kernel.add_arg(127.58f32).unwrap();

        run_for(&kernel, 99);
        assert!(FIRED.lock().unwrap().is_empty());

        run_for(&kernel, 1);
        let fired = FIRED.lock().unwrap();
        assert_eq!(fired.len(), 1);
        let (at, _, sid, args) = &fired[0];
        assert_eq!(*at, base + 100);
        assert_eq!(*sid, 2);
        assert_eq!(crate::task::arg_at::<f32>(args, 0), Some(127.58));
        drop(fired);
        assert_eq!(kernel.task_count(), 0);
    }

    #[test]
    fn task_due_now_waits_for_next_iteration() {
        let _clk = testing::lock();
        let kernel = kernel();

        // Nothing due: dispatch is a no-op.
        assert!(!kernel.dispatch());

        kernel.schedule_once(3, 0, 0).unwrap();
        assert!(kernel.dispatch());
        assert!(!kernel.dispatch());
        assert_eq!(FIRED.lock().unwrap().len(), 1);
    }

    #[test]
    fn periodic_runs_repeats_times_with_punctual_cadence() {
        let _clk = testing::lock();
        let kernel = kernel();
        let base = clock::now();

        kernel.schedule_periodic(3, 0, -200, 500, 4).unwrap();
        run_for(&kernel, 2500);

        let fired = FIRED.lock().unwrap();
        let times: Vec<u64> = fired.iter().map(|f| f.0).collect();
        assert_eq!(
            times,
            vec![base + 200, base + 700, base + 1200, base + 1700]
        );
        drop(fired);
        assert_eq!(kernel.task_count(), 0);
    }

    #[test]
    fn periodic_zero_repeats_runs_exactly_once() {
        let _clk = testing::lock();
        let kernel = kernel();

        kernel.schedule_periodic(3, 0, -10, 100, 0).unwrap();
        run_for(&kernel, 500);
        assert_eq!(FIRED.lock().unwrap().len(), 1);
        assert_eq!(kernel.task_count(), 0);
    }

    #[test]
    fn periodic_catches_up_without_bursting() {
        let _clk = testing::lock();
        let kernel = kernel();
        let base = clock::now();

        kernel
            .schedule_periodic(3, 0, -100, 100, crate::task::REPEAT_FOREVER)
            .unwrap();

        // Let three periods elapse without dispatching.
        for _ in 0..350 {
            clock::tick();
        }
        while kernel.dispatch() {}
        // Only the overdue head fired; the reschedule lands in the future.
        assert_eq!(FIRED.lock().unwrap().len(), 1);

        let tasks = kernel.tasks();
        let entry = &tasks[0];
        assert_eq!(entry.timestamp, base as i64 + 400);
        assert_eq!(entry.perf.start_miss_count, 1);
        assert_eq!(entry.perf.start_miss_total, 250);

        kernel.remove_task(3, 0, None).unwrap();
    }

    #[test]
    fn unregistered_target_logs_error_and_retires() {
        let _clk = testing::lock();
        let kernel = kernel();
        kernel.log_start(true);

        // UID 9 is in range but never registered: scheduling succeeds,
        // dispatch reports it.
        kernel
            .schedule_periodic(9, 4, -10, 100, crate::task::REPEAT_FOREVER)
            .unwrap();
        run_for(&kernel, 300);

        let events = kernel.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].module_uid, 9);
        assert_eq!(events[0].service_id, 4);
        assert_eq!(events[0].kind, EventKind::Error);
        assert_eq!(kernel.task_count(), 0);
    }

    #[test]
    fn failing_callback_is_an_error_event() {
        let _clk = testing::lock();
        let kernel = kernel();
        kernel.register_module(5, failing).unwrap();
        kernel.log_start(true);

        kernel.schedule_once(5, 1, 0).unwrap();
        kernel.dispatch();

        let events = kernel.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Error);
    }

    #[test]
    fn disable_gates_dispatch_until_reenabled() {
        let _clk = testing::lock();
        let kernel = kernel();

        kernel.schedule_once(3, 0, 0).unwrap();
        kernel.set_enabled(false);
        assert!(!kernel.dispatch());
        assert_eq!(kernel.task_count(), 1);

        kernel.set_enabled(true);
        assert!(kernel.dispatch());
        assert_eq!(kernel.task_count(), 0);
    }

    #[test]
    fn kill_service_removes_task_by_pid() {
        let _clk = testing::lock();
        let kernel = kernel();

        let victim = kernel.schedule_once(3, 0, -5_000).unwrap();
        kernel
            .schedule_once(KERNEL_UID, SVC_KERNEL_KILL, 0)
            .unwrap();
        kernel.add_arg(victim).unwrap();

        assert!(kernel.dispatch());
        assert_eq!(kernel.task_count(), 0);
        assert_eq!(
            kernel.remove_task_by_pid(victim),
            Err(KernelError::NoSuchTask)
        );
    }

    #[test]
    fn disable_service_stops_the_loop() {
        let _clk = testing::lock();
        let kernel = kernel();

        kernel
            .schedule_once(KERNEL_UID, SVC_KERNEL_ENABLE, 0)
            .unwrap();
        kernel.add_arg(0u8).unwrap();
        kernel.schedule_once(3, 0, 0).unwrap();

        assert!(kernel.dispatch());
        assert!(!kernel.is_enabled());
        assert!(!kernel.dispatch());
        assert_eq!(kernel.task_count(), 1);

        kernel.set_enabled(true);
        assert!(kernel.dispatch());
    }

    #[test]
    fn perf_counts_runs_and_misses() {
        let _clk = testing::lock();
        let kernel = kernel();

        kernel
            .schedule_periodic(3, 0, -100, 100, crate::task::REPEAT_FOREVER)
            .unwrap();
        run_for(&kernel, 450);

        let tasks = kernel.tasks();
        let entry = &tasks[0];
        assert_eq!(entry.perf.runs, 4);
        assert!(entry.perf.start_miss_count <= entry.perf.runs);

        kernel.remove_task(3, 0, None).unwrap();
    }
}
