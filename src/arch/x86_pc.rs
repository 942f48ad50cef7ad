//! Bare-metal x86 PC port: PIT tick source, interrupt masking, COM1
//! debug writer.
//!
//! The embedding kernel owns the IDT and PIC setup. It routes IRQ0 to
//! [`timer_tick`] and calls [`init_serial`] if it wants reporter output
//! on the serial console.

use core::fmt;

use lazy_static::lazy_static;
use spin::Mutex;
use uart_16550::SerialPort;
use x86_64::instructions::interrupts;
use x86_64::instructions::port::Port;

use crate::clock;
use crate::hal::Hal;

/// PIT input clock in Hz.
const PIT_HZ: u32 = 1_193_182;

/// HAL for a single-core x86 PC.
pub struct PcHal;

impl Hal for PcHal {
    fn clock_init(&self, step_ms: u32) {
        clock::configure(step_ms);
        let divisor = (PIT_HZ.saturating_mul(step_ms) / 1_000).clamp(1, 65_535) as u16;
        unsafe {
            // Channel 0, lo/hi access, rate generator.
            Port::<u8>::new(0x43).write(0x34);
            Port::<u8>::new(0x40).write(divisor as u8);
            Port::<u8>::new(0x40).write((divisor >> 8) as u8);
        }
    }

    fn interrupts_set(&self, enabled: bool) -> bool {
        let prior = interrupts::are_enabled();
        if enabled {
            interrupts::enable();
        } else {
            interrupts::disable();
        }
        prior
    }
}

/// Timer interrupt entry point (IRQ0). Advances the clock and sends EOI
/// directly via port I/O so the handler never takes a lock.
pub fn timer_tick() {
    clock::tick();
    unsafe {
        Port::<u8>::new(0x20).write(0x20);
    }
}

lazy_static! {
    static ref SERIAL1: Mutex<SerialPort> = {
        let mut port = unsafe { SerialPort::new(0x3F8) };
        port.init();
        Mutex::new(port)
    };
}

/// Debug writer for COM1. Masks interrupts while holding the port lock
/// so a print from an ISR cannot deadlock.
pub fn serial_sink(args: fmt::Arguments) {
    use core::fmt::Write;
    interrupts::without_interrupts(|| {
        let _ = SERIAL1.lock().write_fmt(args);
    });
}

/// Initialize COM1 and install [`serial_sink`] as the debug sink.
pub fn init_serial() {
    lazy_static::initialize(&SERIAL1);
    crate::debug::set_sink(serial_sink);
}
