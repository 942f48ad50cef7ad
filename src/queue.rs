//! Time-ordered task queue.
//!
//! Entries are kept sorted by timestamp; among equal timestamps insertion
//! order is preserved, so due tasks fire in `(timestamp, insertion-order)`
//! order. The queue itself knows nothing about interrupts; the kernel
//! wraps it in a `spin::Mutex` and masks interrupts around every call.

use alloc::collections::VecDeque;

use crate::kernel::KernelError;
use crate::task::{Pid, TaskEntry};

/// Ordered multiset of task entries keyed by timestamp, plus the
/// "last inserted" anchor that argument appends attach to.
pub struct TaskQueue {
    entries: VecDeque<TaskEntry>,
    /// Entry that [`TaskQueue::append_args`] targets. Armed by
    /// [`TaskQueue::insert`], cleared by any pop. Held as a PID rather
    /// than a position so entry removal can never leave it dangling.
    last_inserted: Option<Pid>,
    next_pid: u16,
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue {
            entries: VecDeque::new(),
            last_inserted: None,
            next_pid: 1,
        }
    }

    /// Create and insert a new entry, arming the append anchor.
    /// Returns the assigned PID.
    pub fn insert(
        &mut self,
        module_uid: u8,
        service_id: u8,
        timestamp: i64,
        period: i32,
        repeats: i32,
    ) -> Pid {
        let pid = Pid::from_raw(self.next_pid);
        self.next_pid = self.next_pid.wrapping_add(1);

        let entry = TaskEntry::new(module_uid, service_id, pid, timestamp, period, repeats);
        self.insert_sorted(entry);
        self.last_inserted = Some(pid);
        pid
    }

    /// Re-insert a periodic entry popped by the dispatch loop. Keeps the
    /// entry's PID and does not arm the append anchor, so appends issued
    /// after a pop stay no-ops.
    pub fn reinsert(&mut self, entry: TaskEntry) {
        self.insert_sorted(entry);
    }

    fn insert_sorted(&mut self, entry: TaskEntry) {
        // Equal timestamps go after existing entries (FIFO within a tick).
        let pos = self
            .entries
            .iter()
            .rposition(|e| e.timestamp <= entry.timestamp)
            .map_or(0, |i| i + 1);
        self.entries.insert(pos, entry);
    }

    /// Earliest entry, if any.
    pub fn peek_head(&self) -> Option<&TaskEntry> {
        self.entries.front()
    }

    /// Remove and return the earliest entry. Any pop invalidates the
    /// append anchor.
    pub fn pop_head(&mut self) -> Option<TaskEntry> {
        self.last_inserted = None;
        self.entries.pop_front()
    }

    /// Append bytes to the most recently inserted entry. A cleared or
    /// stale anchor makes this a silent no-op; exceeding the per-task
    /// argument cap is an error and leaves the buffer unchanged.
    pub fn append_args(&mut self, bytes: &[u8]) -> Result<(), KernelError> {
        let Some(pid) = self.last_inserted else {
            return Ok(());
        };
        let Some(entry) = self.entries.iter_mut().rev().find(|e| e.pid == pid) else {
            return Ok(());
        };
        entry
            .args
            .try_extend_from_slice(bytes)
            .map_err(|_| KernelError::ArgOverflow)
    }

    /// Remove the first entry matching `(uid, sid)` and, when given,
    /// exactly matching argument bytes. Returns whether one was found.
    pub fn remove_matching(&mut self, module_uid: u8, service_id: u8, args: Option<&[u8]>) -> bool {
        let found = self.entries.iter().position(|e| {
            e.module_uid == module_uid
                && e.service_id == service_id
                && args.map_or(true, |a| e.args.as_slice() == a)
        });
        match found {
            Some(pos) => {
                self.remove_at(pos);
                true
            }
            None => false,
        }
    }

    /// Remove the first entry with the given PID. Returns whether one was
    /// found.
    pub fn remove_by_pid(&mut self, pid: Pid) -> bool {
        match self.entries.iter().position(|e| e.pid == pid) {
            Some(pos) => {
                self.remove_at(pos);
                true
            }
            None => false,
        }
    }

    fn remove_at(&mut self, pos: usize) {
        if let Some(removed) = self.entries.remove(pos) {
            if self.last_inserted == Some(removed.pid) {
                self.last_inserted = None;
            }
        }
    }

    /// Look up an entry by PID.
    pub fn find(&self, pid: Pid) -> Option<&TaskEntry> {
        self.entries.iter().find(|e| e.pid == pid)
    }

    /// Traverse entries in scheduled order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The armed append anchor, if any.
    pub fn last_inserted(&self) -> Option<Pid> {
        self.last_inserted
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
