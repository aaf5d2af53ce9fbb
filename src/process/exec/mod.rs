//! `execve` orchestration: replaces the calling task's program image and
//! address space in place, following the nine-step sequence the core
//! specifies — including "on any failure after step 2, release the new
//! directory and keep the old" so a failed exec never corrupts a running
//! task.

pub mod elf;

use crate::errno::{Errno, EINVAL};
use crate::fs::vfs;
use crate::memory::vmem::x86::EntryFlags;
use crate::memory::vmem::AddressSpace;
use crate::process::{switch, Pid};

/// Top of the user-mode virtual address range, one page short of 4 GiB so
/// the stack's top pointer itself never overflows `u32`.
const USER_TOP: u32 = 0xffff_f000;
/// Size of the initial user stack mapping.
const STACK_SIZE: usize = 64 * 1024;

/// Replaces `pid`'s program image with the ELF executable at `path`,
/// seeding `argv` on the new stack. On success this never returns to the
/// caller — like POSIX `execve`, it only comes back on failure; success
/// transfers control straight to the new entry point via
/// [`crate::gdt::enter_user_mode`].
pub fn execve(pid: Pid, path: &str, argv: &[&str]) -> Result<(), Errno> {
	let basename = path.rsplit('/').next().unwrap_or(path);

	let new_space = AddressSpace::create_uvm()?;

	let result = load_and_seed(&new_space, path, argv);
	let (entry_eip, stack_top) = match result {
		Ok(v) => v,
		Err(e) => {
			new_space.destroy_uvm();
			return Err(e);
		}
	};

	let old_space = crate::process::with_task(pid, |t| {
		t.set_name(basename.as_bytes());
		t.heap_start = 0;
		t.heap_end = 0;
		t.addr_space.replace(new_space)
	})?;
	let cr3 = crate::process::with_task(pid, |t| t.addr_space.as_ref().unwrap().pd_phys())?;
	switch::rewrite_cr3(pid, cr3);

	// Switch the live directory before freeing the old one: its frames must
	// not be reclaimed while `cr3` still points at them.
	unsafe { crate::memory::vmem::x86::load_cr3(cr3) };
	if let Some(old) = old_space {
		old.destroy_uvm();
	}

	// SAFETY: `cr3` is the freshly built address space mapping `entry_eip`
	// executable and `stack_top` as a writable user stack; no lock is held.
	unsafe { crate::gdt::enter_user_mode(cr3, entry_eip, stack_top) }
}

/// Loads `path` into a brand new address space and puts it straight on the
/// ready queue as a fresh task, with no parent and no running caller —
/// `init` uses this to seed the per-tty shells directly, since at boot
/// there is no dispatched task yet to issue a `fork`+`execve` pair through
/// the call gate.
pub fn spawn_initial(path: &str, argv: &[&str]) -> Result<Pid, Errno> {
	let basename = path.rsplit('/').next().unwrap_or(path);
	let new_space = AddressSpace::create_uvm()?;
	let (entry_eip, stack_top) = match load_and_seed(&new_space, path, argv) {
		Ok(v) => v,
		Err(e) => {
			new_space.destroy_uvm();
			return Err(e);
		}
	};
	crate::process::spawn_with(basename.as_bytes(), None, new_space, entry_eip, stack_top)
}

/// Opens the ELF file, loads its `PT_LOAD` segments into `new_space`, and
/// seeds argv on a fresh stack window. Returns the entry point and initial
/// stack pointer on success. Used both by `execve` (replacing a running
/// task's image) and by `init`'s boot-time spawn of the per-tty shells,
/// neither of which needs a task identity to do this.
pub(crate) fn load_and_seed(new_space: &AddressSpace, path: &str, argv: &[&str]) -> Result<(u32, u32), Errno> {
	let fd = vfs::open_for_exec(path)?;
	let mut header_buf = [0u8; 256];
	let n = vfs::pread(&fd, 0, &mut header_buf)?;
	let image = elf::parse_header(&header_buf[..n])?;

	for i in 0..image.phnum {
		let phdr = elf::parse_phdr(&header_buf, i, image.phentsize).or_else(|_| {
			let mut buf = [0u8; 32];
			let off = image.phoff as usize + i as usize * image.phentsize as usize;
			vfs::pread(&fd, off, &mut buf)?;
			elf::parse_phdr(&buf, 0, image.phentsize)
		})?;
		if !elf::is_loadable(&phdr)? {
			continue;
		}
		new_space.alloc_for(
			phdr.p_vaddr,
			phdr.p_memsz as usize,
			EntryFlags::WRITABLE | EntryFlags::USER,
		)?;
		let mut remaining = phdr.p_filesz as usize;
		let mut file_off = phdr.p_offset as usize;
		let mut vaddr = phdr.p_vaddr;
		let mut chunk = [0u8; 512];
		while remaining > 0 {
			let n = remaining.min(chunk.len());
			vfs::pread(&fd, file_off, &mut chunk[..n])?;
			new_space.copy_uvm_data(vaddr, chunk.as_ptr() as u32, n)?;
			remaining -= n;
			file_off += n;
			vaddr += n as u32;
		}
	}
	vfs::close_exec_fd(fd);

	let stack_base = USER_TOP - STACK_SIZE as u32;
	new_space.alloc_for(stack_base, STACK_SIZE, EntryFlags::WRITABLE | EntryFlags::USER)?;

	let stack_top = seed_argv(new_space, argv)?;
	Ok((image.entry, stack_top))
}

/// Lays out `argc`, an `argv` pointer array, and the argument strings
/// themselves at the top of the new stack, in the layout the C start-up
/// code expects: strings first (growing down), then the pointer array,
/// then argc, with `esp` left pointing at argc.
fn seed_argv(new_space: &AddressSpace, argv: &[&str]) -> Result<u32, Errno> {
	let mut sp = USER_TOP - 16; // leave a small red zone
	let mut ptrs = [0u32; 32];
	if argv.len() > ptrs.len() {
		return Err(EINVAL);
	}
	for (i, s) in argv.iter().enumerate() {
		let bytes = s.as_bytes();
		sp -= (bytes.len() + 1) as u32;
		sp &= !0x3; // keep 4-byte aligned
		new_space.copy_uvm_data(sp, bytes.as_ptr() as u32, bytes.len())?;
		let nul = 0u8;
		new_space.copy_uvm_data(sp + bytes.len() as u32, &nul as *const u8 as u32, 1)?;
		ptrs[i] = sp;
	}
	// argv pointer array, NULL-terminated
	sp -= 4;
	let zero = 0u32;
	new_space.copy_uvm_data(sp, &zero as *const u32 as u32, 4)?;
	for i in (0..argv.len()).rev() {
		sp -= 4;
		new_space.copy_uvm_data(sp, &ptrs[i] as *const u32 as u32, 4)?;
	}
	let argv_ptr = sp;
	sp -= 4;
	new_space.copy_uvm_data(sp, &argv_ptr as *const u32 as u32, 4)?;
	let argc = argv.len() as u32;
	sp -= 4;
	new_space.copy_uvm_data(sp, &argc as *const u32 as u32, 4)?;
	Ok(sp)
}
