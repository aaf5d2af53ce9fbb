//! Exception and IRQ handler bodies, and the syscall call-gate entry point.

use super::pic;
use super::{set_gate, Entry};
use crate::process::scheduler;

/// Minimal interrupt stack frame the CPU pushes before entering a handler
/// compiled with the `x86-interrupt` ABI.
#[repr(C)]
pub struct InterruptFrame {
	pub eip: u32,
	pub cs: u32,
	pub eflags: u32,
	pub esp: u32,
	pub ss: u32,
}

/// Populates every exception and IRQ vector in `table`.
pub fn install(table: &mut [Entry; 256]) {
	set_gate(table, 0, divide_error as u32);
	set_gate(table, 6, invalid_opcode as u32);
	set_gate(table, 8, double_fault as u32);
	set_gate(table, 13, general_protection_fault as u32);
	set_gate(table, 14, page_fault as u32);

	set_gate(table, pic::IRQ0_VECTOR as usize, irq0_timer as u32);
	set_gate(table, pic::IRQ0_VECTOR as usize + 1, irq1_keyboard as u32);
	set_gate(table, pic::IRQ0_VECTOR as usize + 14, irq14_disk as u32);
}

/// Kills the currently running task with a synthetic fault exit status,
/// matching the design decision that user-space faults are fatal (there is
/// no demand paging or signal delivery to recover through).
fn fault_kill_current(reason: &str) {
	log::error!("fatal fault in task {}: {}", scheduler::current_pid(), reason);
	scheduler::exit_current(-1);
}

extern "x86-interrupt" fn divide_error(_frame: InterruptFrame) {
	fault_kill_current("divide error");
}

extern "x86-interrupt" fn invalid_opcode(_frame: InterruptFrame) {
	fault_kill_current("invalid opcode");
}

extern "x86-interrupt" fn double_fault(_frame: InterruptFrame, _err: u32) -> ! {
	crate::kernel_panic!("double fault");
}

extern "x86-interrupt" fn general_protection_fault(_frame: InterruptFrame, _err: u32) {
	fault_kill_current("general protection fault");
}

extern "x86-interrupt" fn page_fault(_frame: InterruptFrame, _err: u32) {
	let addr: u32;
	unsafe {
		core::arch::asm!("mov {0}, cr2", out(reg) addr, options(nostack, nomem));
	}
	fault_kill_current("page fault");
	let _ = addr;
}

extern "x86-interrupt" fn irq0_timer(_frame: InterruptFrame) {
	scheduler::tick();
	pic::send_eoi(0);
}

extern "x86-interrupt" fn irq1_keyboard(_frame: InterruptFrame) {
	crate::device::keyboard::handle_irq();
	pic::send_eoi(1);
}

extern "x86-interrupt" fn irq14_disk(_frame: InterruptFrame) {
	crate::device::storage::pata::handle_irq();
	pic::send_eoi(14);
}

/// The five-word argument frame `{id, arg0..arg3}` the call gate's stack
/// switch leaves on the new kernel stack.
#[repr(C)]
pub struct SyscallFrame {
	pub id: u32,
	pub arg0: u32,
	pub arg1: u32,
	pub arg2: u32,
	pub arg3: u32,
}

/// Entry point the call gate transfers control to. Reads the argument
/// frame, dispatches through the syscall table, and writes the return value
/// back into `eax` for the `retf` to hand back to user space.
///
/// # Safety
///
/// Only ever reached via the call gate's privilege-level transition; `frame`
/// must point at a frame laid out exactly as the gate's stack switch
/// produces.
#[no_mangle]
pub extern "C" fn syscall_entry() {
	let frame = unsafe { &*(get_arg_frame_ptr() as *const SyscallFrame) };
	let ret = crate::syscall::dispatch(frame.id, frame.arg0, frame.arg1, frame.arg2, frame.arg3);
	set_return_value(ret);
}

/// Reads the pointer to the argument frame left on the kernel stack by the
/// call-gate's automatic parameter copy.
fn get_arg_frame_ptr() -> u32 {
	let esp: u32;
	unsafe {
		core::arch::asm!("mov {0}, esp", out(reg) esp, options(nostack, nomem));
	}
	esp
}

fn set_return_value(v: isize) {
	unsafe {
		core::arch::asm!("mov eax, {0}", in(reg) v as u32, options(nostack, nomem));
	}
}
