//! Kernel heap: a fixed virtual window backed by frames drawn from the
//! physical allocator, managed by a free-list allocator and exposed as the
//! crate's `#[global_allocator]` so `alloc::{vec, boxed, collections}` work
//! throughout the kernel.

use super::vmem::x86::EntryFlags;
use super::{pages_for, vmem, PAGE_SIZE};
use linked_list_allocator::LockedHeap;

/// Virtual base of the kernel heap, chosen well above the kernel image and
/// below the identity-mapped physical window so the two never collide.
pub const HEAP_BASE: u32 = 0x4000_0000;
/// Initial heap size. Growth beyond this is not implemented; the frame
/// allocator's pool is small enough on the target machines this kernel
/// supports that a fixed heap is sufficient.
pub const HEAP_SIZE: usize = 4 * 1024 * 1024;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Maps the heap window and hands it to the global allocator. Must run
/// after [`vmem::init`].
pub fn init() {
	let pages = pages_for(HEAP_SIZE);
	for i in 0..pages {
		let frame = super::frame::alloc_frame().expect("no memory for kernel heap");
		vmem::map_kernel_range(
			HEAP_BASE + (i * PAGE_SIZE) as u32,
			frame as u32,
			1,
			EntryFlags::WRITABLE,
		)
		.expect("failed to map kernel heap page");
	}
	unsafe {
		ALLOCATOR.lock().init(HEAP_BASE as *mut u8, HEAP_SIZE);
	}
}
