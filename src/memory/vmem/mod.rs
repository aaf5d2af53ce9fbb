//! Per-process address space: two-level x86 page tables, with user space
//! private to each process and kernel space shared verbatim across all of
//! them.
//!
//! This is component 4 of the core. The canonical kernel page directory is
//! built once at boot by [`init`] and every subsequent [`AddressSpace`] is a
//! copy of it in the kernel half plus a private, initially-empty user half.

use super::x86::{pd_index, pt_index, Entry, EntryFlags, ENTRIES_PER_TABLE};
use crate::errno::{Errno, ENOMEM};
use crate::memory::{frame, kern_to_virt, pages_for, PAGE_SIZE, USER_BASE};
use spin::Once;

pub mod x86 {
	pub use super::super::x86::*;
}

/// Physical address of the VGA text-mode buffer, mapped kernel-writable at
/// its own (non-identity) virtual address below user space.
pub const VGA_PHYS: u32 = 0x000b_8000;
/// Size of the video memory region reserved for all virtual terminals.
pub const VGA_REGION_SIZE: u32 = 32 * 1024;

fn pd_ptr(pd_phys: u32) -> *mut Entry {
	kern_to_virt(pd_phys) as *mut Entry
}

fn pt_ptr(pt_phys: u32) -> *mut Entry {
	kern_to_virt(pt_phys) as *mut Entry
}

/// Allocates and zeroes one frame, returning its physical address.
fn alloc_zeroed_frame() -> Result<u32, Errno> {
	let addr = frame::alloc_frame()? as u32;
	unsafe {
		core::ptr::write_bytes(kern_to_virt(addr) as *mut u8, 0, PAGE_SIZE);
	}
	Ok(addr)
}

/// Owns a page directory physical address. Kernel-space entries are always
/// identical (in value, not in frame ownership) to [`KERNEL_PD`]'s.
pub struct AddressSpace {
	pd_phys: u32,
}

static KERNEL_PD: Once<u32> = Once::new();

/// Builds the canonical kernel page directory: identity-maps all physical
/// memory the frame allocator knows about (so kernel code can reach any
/// frame regardless of which address space is bound), plus the VGA text
/// buffer window. Must run after [`frame::init`].
pub fn init() {
	let pd_phys = alloc_zeroed_frame().expect("no memory for kernel page directory");
	// Mapped region by region rather than as one span starting at
	// KERNEL_PHYS_BASE spanning total_pages(): the boot memory map can
	// report several disjoint usable ranges (a gap for reserved/MMIO
	// memory), and treating their combined page count as one contiguous
	// block would identity-map physical addresses that were never reported
	// as usable.
	let (regions, region_count) = frame::regions();
	for r in &regions[..region_count] {
		map_range_into(
			pd_phys,
			r.base as u32,
			r.base as u32,
			r.page_count(),
			EntryFlags::PRESENT | EntryFlags::WRITABLE,
			true,
		)
		.expect("failed to identity-map physical memory");
	}
	map_range_into(
		pd_phys,
		VGA_PHYS,
		VGA_PHYS,
		(VGA_REGION_SIZE / PAGE_SIZE as u32) as usize,
		EntryFlags::PRESENT | EntryFlags::WRITABLE,
		true,
	)
	.expect("failed to map VGA buffer");
	KERNEL_PD.call_once(|| pd_phys);
	unsafe {
		x86::load_cr3(pd_phys);
	}
}

/// Returns the physical address of the canonical kernel directory.
fn kernel_pd() -> u32 {
	*KERNEL_PD.get().expect("vmem::init not yet called")
}

/// Returns the physical address of the canonical kernel directory. Exposed
/// for the idle task, which runs entirely in ring 0 and so binds the shared
/// kernel directory directly rather than owning an [`AddressSpace`] of its
/// own.
pub fn kernel_pd_phys() -> u32 {
	kernel_pd()
}

/// Core of `map`: walks/creates the page table for each page in
/// `[vstart, vstart + n*PAGE_SIZE)` and installs a leaf entry pointing at
/// the matching physical page, `allow_identity_setup` bypasses the
/// already-present check (only used while building the kernel directory,
/// where mapping the same frame twice across overlapping regions can't
/// happen by construction).
fn map_range_into(
	pd_phys: u32,
	vstart: u32,
	pstart: u32,
	n: usize,
	perm: EntryFlags,
	allow_identity_setup: bool,
) -> Result<(), Errno> {
	let pd = pd_ptr(pd_phys);
	for i in 0..n {
		let vaddr = vstart + (i as u32) * PAGE_SIZE as u32;
		let paddr = pstart + (i as u32) * PAGE_SIZE as u32;
		let pde_idx = pd_index(vaddr);
		let pde = unsafe { &mut *pd.add(pde_idx) };
		if !pde.is_present() {
			let pt_frame = alloc_zeroed_frame()?;
			*pde = Entry::new(pt_frame, EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER);
		}
		let pt = pt_ptr(pde.frame_addr());
		let pte_idx = pt_index(vaddr);
		let entry = unsafe { &mut *pt.add(pte_idx) };
		if entry.is_present() && !allow_identity_setup {
			crate::kernel_panic!("mapping already-present leaf at {:#x}", vaddr);
		}
		*entry = Entry::new(paddr, perm);
		x86::invlpg(vaddr);
	}
	Ok(())
}

impl AddressSpace {
	/// Allocates a fresh page directory, zeroes it, then copies every
	/// kernel-space directory entry verbatim from the canonical kernel
	/// directory. User space starts empty.
	pub fn create_uvm() -> Result<Self, Errno> {
		let pd_phys = alloc_zeroed_frame()?;
		let kpd = pd_ptr(kernel_pd());
		let upd = pd_ptr(pd_phys);
		let kernel_entries = pd_index(USER_BASE);
		for i in 0..kernel_entries {
			unsafe {
				*upd.add(i) = *kpd.add(i);
			}
		}
		Ok(Self { pd_phys })
	}

	/// Physical address of this address space's page directory.
	pub fn pd_phys(&self) -> u32 {
		self.pd_phys
	}

	/// Binds this address space, i.e. loads its directory into `cr3`.
	///
	/// # Safety
	///
	/// Must only be called as part of a task switch or similarly controlled
	/// transition; the caller is responsible for interrupts being disabled.
	pub unsafe fn bind(&self) {
		x86::load_cr3(self.pd_phys);
	}

	/// Maps `n` pages starting at `vstart` to physical frames starting at
	/// `pstart`, with permission `perm`. Fails if any leaf in the range is
	/// already present.
	pub fn map(&self, vstart: u32, pstart: u32, n: usize, perm: EntryFlags) -> Result<(), Errno> {
		map_range_into(self.pd_phys, vstart, pstart, n, perm | EntryFlags::PRESENT, false)
	}

	/// Allocates `ceil(size / PAGE_SIZE)` fresh frames and maps them
	/// starting at `vaddr`. On any failure partway through, frees the
	/// frames already allocated by this call and returns the error,
	/// leaving no partial mapping behind.
	pub fn alloc_for(&self, vaddr: u32, size: usize, perm: EntryFlags) -> Result<(), Errno> {
		let n = pages_for(size);
		let mut allocated: alloc::vec::Vec<u32> = alloc::vec::Vec::with_capacity(n);
		let result = (|| {
			for i in 0..n {
				let f = frame::alloc_frame()? as u32;
				unsafe {
					core::ptr::write_bytes(kern_to_virt(f) as *mut u8, 0, PAGE_SIZE);
				}
				allocated.push(f);
				self.map(vaddr + (i as u32) * PAGE_SIZE as u32, f, 1, perm)?;
			}
			Ok(())
		})();
		if result.is_err() {
			for f in allocated {
				frame::free_frame(f as usize);
			}
		}
		result
	}

	/// Returns the physical address backing `vaddr` in this address space,
	/// or `None` if unmapped.
	pub fn get_paddr(&self, vaddr: u32) -> Option<u32> {
		let pd = pd_ptr(self.pd_phys);
		let pde = unsafe { *pd.add(pd_index(vaddr)) };
		if !pde.is_present() {
			return None;
		}
		let pt = pt_ptr(pde.frame_addr());
		let pte = unsafe { *pt.add(pt_index(vaddr)) };
		if !pte.is_present() {
			return None;
		}
		Some(pte.frame_addr() | (vaddr & 0xfff))
	}

	/// Creates a new address space and, for every present user-space leaf
	/// in `self`, allocates a fresh frame, copies the page's contents via
	/// the kernel's identity map, and maps it into the child with the
	/// parent's permission bits preserved.
	pub fn copy_uvm(&self) -> Result<Self, Errno> {
		let child = Self::create_uvm()?;
		let user_start = pd_index(USER_BASE);
		let pd = pd_ptr(self.pd_phys);
		let result = (|| {
			for pdi in user_start..ENTRIES_PER_TABLE {
				let pde = unsafe { *pd.add(pdi) };
				if !pde.is_present() {
					continue;
				}
				let pt = pt_ptr(pde.frame_addr());
				for pti in 0..ENTRIES_PER_TABLE {
					let pte = unsafe { *pt.add(pti) };
					if !pte.is_present() {
						continue;
					}
					let vaddr = ((pdi as u32) << 22) | ((pti as u32) << 12);
					let new_frame = alloc_zeroed_frame()?;
					unsafe {
						core::ptr::copy_nonoverlapping(
							kern_to_virt(pte.frame_addr()) as *const u8,
							kern_to_virt(new_frame) as *mut u8,
							PAGE_SIZE,
						);
					}
					child.map(vaddr, new_frame, 1, pte.flags())?;
				}
			}
			Ok(())
		})();
		if let Err(e) = result {
			child.destroy_uvm();
			return Err(e);
		}
		Ok(child)
	}

	/// Frees every user-space leaf frame, every user-space page-table
	/// frame, and the directory frame itself. Consumes `self`.
	pub fn destroy_uvm(self) {
		let user_start = pd_index(USER_BASE);
		let pd = pd_ptr(self.pd_phys);
		for pdi in user_start..ENTRIES_PER_TABLE {
			let pde = unsafe { *pd.add(pdi) };
			if !pde.is_present() {
				continue;
			}
			let pt = pt_ptr(pde.frame_addr());
			for pti in 0..ENTRIES_PER_TABLE {
				let pte = unsafe { *pt.add(pti) };
				if pte.is_present() {
					frame::free_frame(pte.frame_addr() as usize);
				}
			}
			frame::free_frame(pde.frame_addr() as usize);
		}
		frame::free_frame(self.pd_phys as usize);
		core::mem::forget(self);
	}

	/// Copies `n` bytes from `src_vaddr` in the *currently bound* address
	/// space to `dst_vaddr` in `self`, which need not be bound. Used at
	/// exec time to seed argv into a not-yet-active directory.
	///
	/// Copies page-by-page, resolving each destination page's physical
	/// address via [`Self::get_paddr`] and writing through the kernel's
	/// identity map.
	pub fn copy_uvm_data(&self, dst_vaddr: u32, src_vaddr: u32, n: usize) -> Result<(), Errno> {
		let mut copied = 0usize;
		while copied < n {
			let dva = dst_vaddr + copied as u32;
			let sva = src_vaddr + copied as u32;
			let page_off = (dva & 0xfff) as usize;
			let chunk = (PAGE_SIZE - page_off).min(n - copied);
			let dpaddr = self.get_paddr(dva & !0xfff).ok_or(crate::errno::EFAULT)?;
			unsafe {
				core::ptr::copy_nonoverlapping(
					sva as *const u8,
					(kern_to_virt(dpaddr) + page_off as u32) as *mut u8,
					chunk,
				);
			}
			copied += chunk;
		}
		Ok(())
	}
}

/// Kernel heap bounds, mapped once at boot by [`crate::memory::heap`].
pub fn map_kernel_range(vstart: u32, pstart: u32, n: usize, perm: EntryFlags) -> Result<(), Errno> {
	map_range_into(kernel_pd(), vstart, pstart, n, perm | EntryFlags::PRESENT, false)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test_case]
	fn create_uvm_has_empty_user_space() {
		let Some(_) = KERNEL_PD.get() else {
			return; // requires boot-time init; skipped outside full boot
		};
		let uvm = AddressSpace::create_uvm().unwrap();
		assert!(uvm.get_paddr(USER_BASE).is_none());
	}
}
