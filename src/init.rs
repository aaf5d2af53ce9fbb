//! Boot sequence: brings every component up in dependency order and hands
//! off to the scheduler. This is component 14 — the only module that knows
//! the full ordering, so every other module's init function can stay
//! ignorant of what runs before or after it.
//!
//! Runs entirely in ring 0, before any task exists, which is also why the
//! per-tty shells are seeded directly through
//! [`crate::process::exec::spawn_initial`] rather than by a "real" init
//! task issuing `fork`/`execve` through the call gate — there is nothing
//! dispatched yet to issue those syscalls from.

use crate::memory::{frame, heap, vmem, PAGE_SIZE};
use crate::multiboot::BootInfo;
use crate::process::{scheduler, KERNEL_STACK_PAGES};

/// Path of the program every virtual terminal starts a shell from.
const SHELL_PATH: &str = "/shell.elf";

/// Brings the kernel up and dispatches the first task. Never returns.
///
/// # Safety
///
/// Must be called exactly once, immediately on entry to [`crate::kernel_main`],
/// with `boot_info_ptr` pointing at the structure the loader left in place.
pub unsafe fn start(boot_info_ptr: *const BootInfo) -> ! {
	crate::logger::init();
	log::info!("booting");

	let boot_info = BootInfo::from_ptr(boot_info_ptr);

	frame::init(boot_info);
	vmem::init();
	heap::init();
	log::info!("memory: {} pages total", frame::total_pages());

	crate::gdt::init(crate::idt::gate::syscall_entry);
	crate::idt::init();
	crate::pit::init();
	crate::idt::pic::unmask(1); // keyboard

	mount_filesystems();

	crate::tty::console::init();
	log::info!("console ready, {} virtual terminals", crate::tty::NUM_TTYS);

	// `ljmp`/`lcall` to a TSS selector only ever *saves* the outgoing task's
	// live state — into whichever TSS the task register currently names —
	// so TR must point at some valid, disposable TSS before the very first
	// `dispatch()` runs. This anchor is never enqueued and never targeted
	// again; the first real task switch simply abandons it.
	let bootstrap_slot = slot_from_selector(crate::gdt::alloc_kernel_tss(0, 0, 0));
	crate::gdt::load_initial_tr(bootstrap_slot);

	let idle_slot = spawn_idle_task();
	scheduler::set_idle_tss_slot(idle_slot);

	spawn_shells();

	crate::device::storage::pata::notify_scheduler_running();

	core::arch::asm!("sti", options(nomem, nostack));
	scheduler::dispatch();
	crate::debug::breach(format_args!("dispatch returned to init"));
}

/// Detects the first FAT16 partition on the primary ATA drive, mounts it at
/// the tree's root, and mounts the device filesystem at `/dev`.
fn mount_filesystems() {
	let partition = crate::device::storage::mbr::detect_fat16()
		.expect("MBR read failed")
		.expect("no FAT16 partition found");
	let fs = crate::fs::fat16::mount(partition.lba_start)
		.expect("failed to mount root filesystem");
	crate::fs::fat16::install(fs);
	crate::fs::mount("/", crate::fs::MountKind::Fat16);
	crate::fs::mount("/dev", crate::fs::MountKind::Dev);
	log::info!("mounted FAT16 root at lba {}", partition.lba_start);
}

/// Allocates a kernel stack and a ring-0 TSS for the idle task and returns
/// its TSS slot index. The idle task never appears in any scheduler queue;
/// [`scheduler::dispatch`] falls back to it whenever the ready queue is
/// empty.
fn spawn_idle_task() -> usize {
	let kstack_phys = frame::alloc_frames(KERNEL_STACK_PAGES).expect("no memory for idle stack");
	let kstack_top = (kstack_phys + KERNEL_STACK_PAGES * PAGE_SIZE) as u32;
	let selector = crate::gdt::alloc_kernel_tss(kstack_top, vmem::kernel_pd_phys(), idle_loop as u32);
	slot_from_selector(selector)
}

/// Recovers a TSS pool slot index from the GDT selector [`crate::gdt::alloc_tss`]-family
/// functions return.
fn slot_from_selector(selector: u16) -> usize {
	((selector as usize) - crate::gdt::TSS_BASE_OFFSET) / 8
}

/// Body of the idle task: halts until the next interrupt, forever. Runs in
/// ring 0 with interrupts enabled, so the timer tick can always preempt it
/// once a real task becomes ready.
extern "C" fn idle_loop() -> ! {
	loop {
		unsafe {
			core::arch::asm!("sti; hlt", options(nostack, nomem));
		}
	}
}

/// Spawns one shell task per virtual terminal, each execing
/// [`SHELL_PATH`] with `argv = ["/shell.elf", "tty:<minor>"]`.
///
/// `NUM_TTYS` is small enough that minors are always single digits, so the
/// argument is built by hand rather than pulling in `alloc::format!` this
/// early in boot.
fn spawn_shells() {
	for minor in 0..crate::tty::NUM_TTYS {
		let buf = [b't', b't', b'y', b':', b'0' + minor as u8];
		let arg = core::str::from_utf8(&buf).unwrap();
		match crate::process::exec::spawn_initial(SHELL_PATH, &[SHELL_PATH, arg]) {
			Ok(pid) => log::info!("spawned shell pid {} on tty:{}", pid, minor),
			Err(e) => log::error!("failed to spawn shell for tty:{}: {}", minor, e),
		}
	}
}
