//! Interrupt Descriptor Table: installs handlers for the CPU exception
//! vectors and the remapped hardware IRQ vectors.
//!
//! The syscall call gate (component 6's entry point) lives in the GDT, not
//! the IDT, and is installed by [`crate::gdt::init`]; [`gate`] holds the
//! dispatch glue the call gate's target runs.

pub mod gate;
pub mod pic;

use core::arch::asm;
use core::mem::size_of;

/// Number of IDT entries (all 256 CPU vectors, even though only the
/// exceptions and the 16 remapped IRQs are ever populated).
const IDT_ENTRIES: usize = 256;

#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
pub(crate) struct Entry {
	offset_low: u16,
	selector: u16,
	zero: u8,
	type_attr: u8,
	offset_high: u16,
}

impl Entry {
	fn new(handler: u32, selector: u16, type_attr: u8) -> Self {
		Self {
			offset_low: (handler & 0xffff) as u16,
			selector,
			zero: 0,
			type_attr,
			offset_high: (handler >> 16) as u16,
		}
	}

	const fn empty() -> Self {
		Self {
			offset_low: 0,
			selector: 0,
			zero: 0,
			type_attr: 0,
			offset_high: 0,
		}
	}
}

static mut TABLE: [Entry; IDT_ENTRIES] = [Entry::empty(); IDT_ENTRIES];

#[repr(C, packed)]
struct IdtDescriptor {
	limit: u16,
	base: u32,
}

/// Installs exception handlers (vectors 0..31), remaps the PIC, installs
/// IRQ handlers (vectors 0x20..0x2F), and loads the IDT register (`lidt`).
/// Interrupts remain disabled on return; the caller enables them once the
/// scheduler has an idle task ready to run.
pub fn init() {
	pic::remap();
	gate::install(unsafe { &mut *core::ptr::addr_of_mut!(TABLE) });
	load();
}

/// Writes a single gate entry. Exposed to [`gate`] so it can install each
/// handler with its own ABI-correct function pointer without this module
/// needing to enumerate every handler type.
pub(crate) fn set_gate(table: &mut [Entry; IDT_ENTRIES], vector: usize, handler: u32) {
	table[vector] = Entry::new(handler, crate::gdt::KERNEL_CS as u16, 0x8e);
}

fn load() {
	let desc = IdtDescriptor {
		limit: (size_of::<[Entry; IDT_ENTRIES]>() - 1) as u16,
		base: unsafe { core::ptr::addr_of!(TABLE) as u32 },
	};
	unsafe {
		asm!("lidt [{0}]", in(reg) &desc, options(nostack));
	}
}
