//! Module callback registry.
//!
//! Each kernel module registers one callback record under its UID. When a
//! task fires, the dispatch loop marshals the task's argument bytes and
//! service ID into the record, then invokes the callback with a copy of
//! the marshaled call so no lock is held while the service runs. The
//! callback's return value lands back in the record's slot; 0 means OK.

use arrayvec::ArrayVec;

use crate::config::{MAX_MODULES, MAX_TASK_ARGS};
use crate::hal::Hal;
use crate::kernel::{Kernel, KernelError};
use crate::task::{arg_at, ArgValue};

/// Conventional service return values.
pub const STATUS_OK: i32 = 0;
pub const STATUS_ERR: i32 = -1;
pub const STATUS_ARG_ERR: i32 = -2;

/// A marshaled service invocation: which service, and the raw argument
/// bytes the scheduling caller appended. How the bytes are interpreted is
/// known only to the target service.
#[derive(Debug, Clone, Default)]
pub struct ServiceCall {
    service_id: u8,
    args: ArrayVec<u8, MAX_TASK_ARGS>,
}

impl ServiceCall {
    pub fn service_id(&self) -> u8 {
        self.service_id
    }

    pub fn args(&self) -> &[u8] {
        &self.args
    }

    /// Decode a fixed-size value at a byte offset of the argument buffer.
    pub fn arg_at<T: ArgValue>(&self, offset: usize) -> Option<T> {
        arg_at(&self.args, offset)
    }
}

/// Module service entry point. Receives the kernel so services can
/// schedule, remove, and report; returns a `STATUS_*` value.
pub type ServiceFn<H> = fn(&Kernel<H>, &ServiceCall) -> i32;

/// Callback record for one module: the entry point, the marshaling slot
/// the dispatch loop fills before each invocation, and the return value
/// of the last invocation.
pub struct CallbackRecord<H: Hal> {
    func: ServiceFn<H>,
    call: ServiceCall,
    ret_val: i32,
}

/// UID-indexed table of callback records. At most one record per UID;
/// re-registering overwrites.
pub struct Registry<H: Hal> {
    slots: [Option<CallbackRecord<H>>; MAX_MODULES],
}

impl<H: Hal> Registry<H> {
    pub fn new() -> Self {
        Registry {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Install a callback record for `uid`.
    pub fn register(&mut self, uid: u8, func: ServiceFn<H>) -> Result<(), KernelError> {
        let slot = self
            .slots
            .get_mut(uid as usize)
            .ok_or(KernelError::InvalidModule)?;
        *slot = Some(CallbackRecord {
            func,
            call: ServiceCall::default(),
            ret_val: STATUS_OK,
        });
        Ok(())
    }

    /// Drop the record for `uid`, if any. Returns whether one existed.
    pub fn unregister(&mut self, uid: u8) -> bool {
        self.slots
            .get_mut(uid as usize)
            .and_then(Option::take)
            .is_some()
    }

    /// A UID is valid iff it is in range and a callback is registered.
    pub fn validate(&self, uid: u8) -> bool {
        self.slots
            .get(uid as usize)
            .map_or(false, Option::is_some)
    }

    /// Marshal a pending invocation into the module's record and hand
    /// back the entry point with a copy of the call. `None` if the UID
    /// is invalid.
    pub fn marshal(
        &mut self,
        uid: u8,
        service_id: u8,
        args: &[u8],
    ) -> Option<(ServiceFn<H>, ServiceCall)> {
        let record = self.slots.get_mut(uid as usize)?.as_mut()?;
        record.call.service_id = service_id;
        record.call.args.clear();
        // Task argument buffers share the marshaling slot's capacity, so
        // this copy cannot overflow.
        record.call.args.try_extend_from_slice(args).ok()?;
        record.ret_val = STATUS_OK;
        Some((record.func, record.call.clone()))
    }

    /// Store a completed invocation's return value in the record slot.
    pub fn store_ret(&mut self, uid: u8, ret_val: i32) {
        if let Some(Some(record)) = self.slots.get_mut(uid as usize) {
            record.ret_val = ret_val;
        }
    }

    /// Return value of the module's most recent invocation.
    pub fn last_ret(&self, uid: u8) -> Option<i32> {
        self.slots.get(uid as usize)?.as_ref().map(|r| r.ret_val)
    }
}

impl<H: Hal> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::HostHal;

    fn nop(_: &Kernel<HostHal>, _: &ServiceCall) -> i32 {
        STATUS_OK
    }

    fn other(_: &Kernel<HostHal>, _: &ServiceCall) -> i32 {
        STATUS_ERR
    }

    #[test]
    fn register_unregister_flips_validate() {
        let mut reg: Registry<HostHal> = Registry::new();
        assert!(!reg.validate(3));

        reg.register(3, nop).unwrap();
        assert!(reg.validate(3));

        assert!(reg.unregister(3));
        assert!(!reg.validate(3));
        assert!(!reg.unregister(3));

        reg.register(3, nop).unwrap();
        assert!(reg.validate(3));
    }

    #[test]
    fn out_of_range_uid_is_rejected() {
        let mut reg: Registry<HostHal> = Registry::new();
        assert_eq!(
            reg.register(MAX_MODULES as u8, nop),
            Err(KernelError::InvalidModule)
        );
        assert!(!reg.validate(u8::MAX));
        assert!(reg.marshal(u8::MAX, 0, &[]).is_none());
    }

    #[test]
    fn reregister_overwrites() {
        let mut reg: Registry<HostHal> = Registry::new();
        reg.register(2, nop).unwrap();
        reg.register(2, other).unwrap();

        let expected: ServiceFn<HostHal> = other;
        let (func, _) = reg.marshal(2, 0, &[]).unwrap();
        assert!(func == expected);
    }

    #[test]
    fn marshal_fills_call_and_resets_ret() {
        let mut reg: Registry<HostHal> = Registry::new();
        reg.register(5, nop).unwrap();
        reg.store_ret(5, STATUS_ERR);

        let (_, call) = reg.marshal(5, 7, &[1, 2, 3]).unwrap();
        assert_eq!(call.service_id(), 7);
        assert_eq!(call.args(), &[1, 2, 3]);
        assert_eq!(reg.last_ret(5), Some(STATUS_OK));

        reg.store_ret(5, 42);
        assert_eq!(reg.last_ret(5), Some(42));
    }

    #[test]
    fn marshal_unregistered_is_none() {
        let mut reg: Registry<HostHal> = Registry::new();
        assert!(reg.marshal(1, 0, &[]).is_none());
    }
}
