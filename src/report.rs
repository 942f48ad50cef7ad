//! Reporter module: task statistics and event log dump.
//!
//! A minimal kernel module built entirely on the public scheduler API.
//! Service 0 prints per-task performance for everything currently
//! queued; service 1 prints the event log. Both write through the
//! debug sink, so they cost nothing when no sink is installed.

use crate::debug_write;
use crate::hal::Hal;
use crate::kernel::{Kernel, KernelError};
use crate::registry::{ServiceCall, STATUS_ERR, STATUS_OK};

/// Print run/miss statistics for all queued tasks. No arguments.
pub const SVC_TASK_STATS: u8 = 0;

/// Print the event log, oldest first. No arguments.
pub const SVC_EVENT_DUMP: u8 = 1;

/// Register the reporter under `uid`, chosen by the embedder.
pub fn register<H: Hal>(kernel: &Kernel<H>, uid: u8) -> Result<(), KernelError> {
    kernel.register_module(uid, service::<H>)
}

fn service<H: Hal>(kernel: &Kernel<H>, call: &ServiceCall) -> i32 {
    match call.service_id() {
        SVC_TASK_STATS => {
            print_task_stats(kernel);
            STATUS_OK
        }
        SVC_EVENT_DUMP => {
            print_event_log(kernel);
            STATUS_OK
        }
        _ => STATUS_ERR,
    }
}

fn print_task_stats<H: Hal>(kernel: &Kernel<H>) {
    for task in kernel.tasks() {
        debug_write!(
            "[{}] performance for service {} of module {}:\n",
            kernel.now(),
            task.service_id,
            task.module_uid
        );
        debug_write!(
            "\trunning under {}, period {} ms, next start at {} ms\n",
            task.pid,
            task.period,
            task.timestamp
        );
        debug_write!(
            "\tcompleted {} runs, average runtime {:.3} ms\n",
            task.perf.runs,
            task.perf.avg_runtime_ms()
        );
        debug_write!(
            "\tstart missed on {} runs by {:.3} ms on average\n",
            task.perf.start_miss_count,
            task.perf.avg_miss_ms()
        );
    }
}

fn print_event_log<H: Hal>(kernel: &Kernel<H>) {
    debug_write!("[{}] event log dump:\n", kernel.now());
    for record in kernel.events() {
        debug_write!(
            "\t[{}] module {} raised {} during service {}\n",
            record.timestamp,
            record.module_uid,
            record.kind,
            record.service_id
        );
    }
    let dropped = kernel.events_dropped();
    if dropped > 0 {
        debug_write!("\t({} events dropped)\n", dropped);
    }
}
