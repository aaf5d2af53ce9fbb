//! 8253 Programmable Interval Timer: configured once at boot to fire IRQ0 at
//! a fixed rate, driving the scheduler's time-slice tick.
//!
//! An external collaborator in spirit (the hardware programming sequence is
//! boilerplate with no kernel policy), kept small and in one place because
//! [`crate::process::scheduler`] needs to know the exact tick rate.

use crate::io::outb;

const CHANNEL0_DATA: u16 = 0x40;
const COMMAND: u16 = 0x43;
const BASE_FREQUENCY: u32 = 1_193_182;

/// Timer ticks per second. The scheduler's time slice and every `sleep`
/// duration are expressed in units of this tick.
pub const HZ: u32 = 100;

/// Programs channel 0 in mode 3 (square wave) for a divisor that yields
/// [`HZ`] ticks per second, and unmasks IRQ0 on the PIC.
pub fn init() {
	let divisor = BASE_FREQUENCY / HZ;
	unsafe {
		outb(COMMAND, 0x36); // channel 0, lobyte/hibyte, mode 3
		outb(CHANNEL0_DATA, (divisor & 0xff) as u8);
		outb(CHANNEL0_DATA, ((divisor >> 8) & 0xff) as u8);
	}
	crate::idt::pic::unmask(0);
}

/// Converts a millisecond duration to a tick count, rounding up so a
/// `sleep(1)` never returns before at least one tick boundary.
pub fn ms_to_ticks(ms: u32) -> u32 {
	(ms * HZ + 999) / 1000
}
