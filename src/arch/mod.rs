//! Architecture ports. Each port implements [`crate::hal::Hal`] plus the
//! glue the core consumes but does not own (tick entry point, debug
//! writer). Only built for the matching bare-metal target; hosted builds
//! use [`crate::hal::HostHal`].

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub mod x86_pc;
