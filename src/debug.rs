//! Pluggable debug output.
//!
//! The core never prints; reporter modules do, through [`debug_write!`].
//! The embedding application installs the actual writer once at startup
//! (the x86 PC port provides a COM1 writer). With no sink installed,
//! output is discarded.

use spin::Mutex;

static SINK: Mutex<Option<fn(core::fmt::Arguments)>> = Mutex::new(None);

/// Install the process-wide debug writer.
pub fn set_sink(sink: fn(core::fmt::Arguments)) {
    *SINK.lock() = Some(sink);
}

#[doc(hidden)]
pub fn _write(args: core::fmt::Arguments) {
    // Copy the pointer out so the sink runs without the lock held and
    // may itself use debug_write!.
    let sink = *SINK.lock();
    if let Some(sink) = sink {
        sink(args);
    }
}

/// Write formatted text to the installed debug sink.
#[macro_export]
macro_rules! debug_write {
    ($($arg:tt)*) => ($crate::debug::_write(format_args!($($arg)*)));
}
