//! Owns all usable RAM above the 1 MiB mark in page-size chunks.
//!
//! This is component 3 of the core: a single global allocator, seeded once
//! from the boot memory map, that every page-table frame, kernel stack, and
//! user page is drawn from.

use super::bitmap_alloc::Bitmap;
use super::memmap::{usable_regions, Region};
use crate::errno::{Errno, ENOMEM};
use crate::multiboot::BootInfo;
use crate::sync::IntMutex;
use spin::Once;

struct FrameAllocator {
	regions: [Region; super::memmap::MAX_REGIONS],
	region_count: usize,
	bitmap: Bitmap,
}

impl FrameAllocator {
	fn region_of_bit(&self, bit: usize) -> (usize, usize) {
		let mut remaining = bit;
		for (i, r) in self.regions[..self.region_count].iter().enumerate() {
			let pages = r.page_count();
			if remaining < pages {
				return (i, remaining);
			}
			remaining -= pages;
		}
		unreachable!("bit out of range of any region");
	}

	fn bit_to_addr(&self, bit: usize) -> usize {
		let (region_idx, offset) = self.region_of_bit(bit);
		self.regions[region_idx].base + offset * super::PAGE_SIZE
	}

	fn addr_to_bit(&self, addr: usize) -> Option<usize> {
		let mut base_bit = 0usize;
		for r in &self.regions[..self.region_count] {
			if addr >= r.base && addr < r.base + r.size {
				return Some(base_bit + (addr - r.base) / super::PAGE_SIZE);
			}
			base_bit += r.page_count();
		}
		None
	}

	fn total_pages(&self) -> usize {
		self.regions[..self.region_count]
			.iter()
			.map(|r| r.page_count())
			.sum()
	}

	/// Finds a run of `n` clear bits entirely within one region — a run
	/// spanning two regions would decode (via [`Self::bit_to_addr`]) to an
	/// address range that isn't actually physically contiguous. Regions are
	/// tried in index order, so the lowest-address fit is still preferred.
	fn alloc_run(&mut self, n: usize) -> Option<usize> {
		let mut base_bit = 0usize;
		for r in &self.regions[..self.region_count] {
			let pages = r.page_count();
			if let Some(bit) = self.bitmap.alloc_run_in_range(base_bit, base_bit + pages, n) {
				return Some(bit);
			}
			base_bit += pages;
		}
		None
	}
}

static FRAME_ALLOC: Once<IntMutex<FrameAllocator>> = Once::new();

/// Initializes the global frame allocator from the boot info's memory map.
/// Must be called exactly once, early in kernel init, before any other
/// memory subsystem runs.
pub fn init(info: &BootInfo) {
	let (regions, region_count) = usable_regions(info);
	let total_pages: usize = regions[..region_count].iter().map(|r| r.page_count()).sum();
	FRAME_ALLOC.call_once(|| {
		IntMutex::new(FrameAllocator {
			regions,
			region_count,
			bitmap: Bitmap::new(total_pages),
		})
	});
}

fn alloc() -> &'static IntMutex<FrameAllocator> {
	FRAME_ALLOC
		.get()
		.expect("frame allocator used before memory::frame::init")
}

/// Allocates `n` contiguous physical page frames, first-fit, lowest index.
/// Returns the base physical address of the run.
pub fn alloc_frames(n: usize) -> Result<usize, Errno> {
	let mut a = alloc().lock();
	let bit = a.alloc_run(n).ok_or(ENOMEM)?;
	Ok(a.bit_to_addr(bit))
}

/// Allocates a single page frame.
pub fn alloc_frame() -> Result<usize, Errno> {
	alloc_frames(1)
}

/// Frees `n` contiguous page frames starting at physical address `addr`.
pub fn free_frames(addr: usize, n: usize) {
	let mut a = alloc().lock();
	let Some(bit) = a.addr_to_bit(addr) else {
		crate::kernel_panic!("freeing frame outside any usable region: {:#x}", addr);
	};
	a.bitmap.free_run(bit, n);
}

/// Frees a single page frame.
pub fn free_frame(addr: usize) {
	free_frames(addr, 1);
}

/// Total number of usable page frames known to the allocator.
pub fn total_pages() -> usize {
	alloc().lock().total_pages()
}

/// Returns the disjoint regions backing the allocator, for callers (the
/// boot-time identity map) that must not assume physical contiguity across
/// them — the boot memory map can report several regions with gaps between
/// them (reserved/MMIO ranges), and only bits within one region are ever
/// physically contiguous.
pub fn regions() -> ([Region; super::memmap::MAX_REGIONS], usize) {
	let a = alloc().lock();
	(a.regions, a.region_count)
}

/// Number of page frames currently allocated.
pub fn used_pages() -> usize {
	alloc().lock().bitmap.count_set()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::multiboot::test_boot_info;

	#[test_case]
	fn alloc_run_never_crosses_a_region_boundary() {
		let mut regions = [Region { base: 0, size: 0 }; super::super::memmap::MAX_REGIONS];
		// Region 0 has only one free page; region 1 starts at an unrelated
		// physical address right after it in bit-index space. A flat,
		// region-unaware first-fit would happily return a 2-page run
		// starting at region 0's only bit, decoding (via `bit_to_addr`) to
		// an address whose second page is not actually `base + PAGE_SIZE`.
		regions[0] = Region {
			base: 0x1000,
			size: super::super::PAGE_SIZE,
		};
		regions[1] = Region {
			base: 0x10000,
			size: 3 * super::super::PAGE_SIZE,
		};
		let mut a = FrameAllocator {
			regions,
			region_count: 2,
			bitmap: Bitmap::new(4),
		};
		let bit = a.alloc_run(2).unwrap();
		let addr = a.bit_to_addr(bit);
		assert_eq!(addr, 0x10000, "2-page run must land entirely in region 1");
	}

	#[test_case]
	fn reports_total_minus_reserved() {
		let (regions, count) = usable_regions(&test_boot_info(&[
			(0, 64 * 1024 * 1024),
			(64 * 1024 * 1024, 64 * 1024 * 1024),
		]));
		let pages: usize = regions[..count].iter().map(|r| r.page_count()).sum();
		let expected = (128 * 1024 * 1024 - super::super::KERNEL_PHYS_BASE) / super::super::PAGE_SIZE;
		assert_eq!(pages, expected);
	}
}
