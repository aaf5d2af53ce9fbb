//! Kestrel: a small preemptive-multitasking x86 kernel.
//!
//! Built as a library so the self-test harness exercises the exact code
//! linked into the bootable image; [`bin.rs`](../src/bin.rs.html) is the
//! thin `no_main` shim that actually produces a runnable kernel binary.

#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]
#![feature(custom_test_frameworks)]
#![test_runner(crate::selftest::runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

#[macro_use]
pub mod print;
#[macro_use]
pub mod debug;

pub mod device;
pub mod errno;
pub mod fs;
pub mod gdt;
pub mod idt;
pub mod init;
pub mod io;
pub mod logger;
pub mod memory;
pub mod multiboot;
pub mod pit;
pub mod process;
pub mod selftest;
pub mod sync;
pub mod syscall;
pub mod tty;

use multiboot::BootInfo;

/// Entry point handed off to from [`bin.rs`](../src/bin.rs.html)'s `_start`.
/// `boot_info_ptr` points at the structure the second-stage loader leaves
/// in place before jumping here; the CPU is already in protected mode with
/// a temporary identity-mapped page directory installed by the boot stub,
/// which [`init::start`] replaces with the real one.
///
/// # Safety
///
/// Must be called exactly once, with `boot_info_ptr` valid for the contract
/// documented on [`BootInfo::from_ptr`].
#[no_mangle]
pub unsafe extern "C" fn kernel_main(boot_info_ptr: *const BootInfo) -> ! {
	#[cfg(test)]
	test_main();

	unsafe { init::start(boot_info_ptr) }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
	log::error!("kernel panic: {}", info);
	debug::halt_forever();
}
