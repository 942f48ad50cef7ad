//! tickos
//!
//! The core of a minimal cooperative operating environment for
//! single-core targets:
//! - a task queue ordered by absolute millisecond timestamps
//! - a dispatch loop that runs due tasks to completion, one per iteration
//! - a UID-keyed module callback registry with byte-marshaled arguments
//! - a bounded event log shared by the scheduler and its modules
//!
//! There is no preemption and no context switching; "scheduling" means
//! giving a task a start time, an optional period and a repeat count.
//! Interrupt handlers may still schedule and remove tasks concurrently
//! with the main loop: every mutation of shared state happens inside an
//! interrupt-masked critical section obtained through the [`hal::Hal`]
//! trait, and the mask guard restores the prior state on every exit path.
//!
//! ```
//! use tickos::{Kernel, HostHal, ServiceCall, ASAP, STATUS_OK};
//!
//! fn blink(_: &Kernel<HostHal>, call: &ServiceCall) -> i32 {
//!     let _times: u8 = call.arg_at(0).unwrap_or(1);
//!     STATUS_OK
//! }
//!
//! let kernel = Kernel::new(HostHal::new());
//! kernel.register_module(3, blink).unwrap();
//! kernel.schedule_once(3, 0, ASAP).unwrap();
//! kernel.add_arg(2u8).unwrap();
//! assert!(kernel.dispatch());
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod clock;
pub mod config;
pub mod debug;
pub mod eventlog;
pub mod hal;
pub mod kernel;
pub mod queue;
pub mod registry;
pub mod report;
pub mod task;

pub use clock::now;
pub use eventlog::{EventKind, EventLog, EventRecord};
pub use hal::{Hal, HostHal, MaskGuard};
pub use kernel::{Kernel, KernelError};
pub use queue::TaskQueue;
pub use registry::{ServiceCall, ServiceFn, STATUS_ARG_ERR, STATUS_ERR, STATUS_OK};
pub use task::{ArgValue, Pid, TaskEntry, TaskPerf, ASAP, REPEAT_FOREVER};
