//! Root directory entry scan/create/unlink. FAT16 as implemented here has
//! a single fixed-size root directory (no subdirectories) — matching the
//! spec's "FAT16 scans root directory entries" scope.

use super::{Fs, DIRENT_SIZE};
use crate::device::storage::{self, SECTOR_SIZE};
use crate::errno::{Errno, EEXIST, ENOENT, ENOSPC};

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LONG_NAME: u8 = ATTR_READ_ONLY | ATTR_HIDDEN | ATTR_SYSTEM | ATTR_VOLUME_ID;

const FREE_MARK: u8 = 0x00;
const DELETED_MARK: u8 = 0xe5;

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct RawDirent {
	pub name: [u8; 8],
	pub ext: [u8; 3],
	pub attr: u8,
	pub _reserved: u8,
	pub _create_time_tenth: u8,
	pub _create_time: u16,
	pub _create_date: u16,
	pub _access_date: u16,
	pub _cluster_hi: u16,
	pub _write_time: u16,
	pub _write_date: u16,
	pub cluster_lo: u16,
	pub size: u32,
}

impl RawDirent {
	fn is_free(&self) -> bool {
		self.name[0] == FREE_MARK || self.name[0] == DELETED_MARK
	}

	fn is_long_name(&self) -> bool {
		self.attr & ATTR_LONG_NAME == ATTR_LONG_NAME
	}

	/// The space-padded 8.3 name as stored on disk, `name` + `ext`
	/// concatenated (11 bytes total, no dot).
	pub fn short_name(&self) -> [u8; 11] {
		let mut out = [b' '; 11];
		out[..8].copy_from_slice(&self.name);
		out[8..].copy_from_slice(&self.ext);
		out
	}
}

/// Packs a human path component (e.g. `"hello.txt"`) into the space-padded
/// 8.3 on-disk form, upper-cased. Truncates components that overflow.
pub fn pack_short_name(human: &str) -> [u8; 11] {
	let mut out = [b' '; 11];
	let (base, ext) = match human.rsplit_once('.') {
		Some((b, e)) => (b, e),
		None => (human, ""),
	};
	for (i, b) in base.bytes().take(8).enumerate() {
		out[i] = b.to_ascii_uppercase();
	}
	for (i, b) in ext.bytes().take(3).enumerate() {
		out[8 + i] = b.to_ascii_uppercase();
	}
	out
}

fn dirent_sector_and_offset(fs: &Fs, index: u32) -> (u32, usize) {
	let byte_off = index * DIRENT_SIZE;
	let sector = fs.root_start_lba + byte_off / fs.bytes_per_sector;
	let within = (byte_off % fs.bytes_per_sector) as usize;
	(sector, within)
}

fn read_dirent(fs: &Fs, index: u32) -> Result<RawDirent, Errno> {
	let (sector, within) = dirent_sector_and_offset(fs, index);
	let mut buf = [0u8; SECTOR_SIZE];
	storage::read_sectors(sector, &mut buf)?;
	Ok(unsafe { core::ptr::read_unaligned(buf[within..].as_ptr() as *const RawDirent) })
}

fn write_dirent(fs: &Fs, index: u32, entry: &RawDirent) -> Result<(), Errno> {
	let (sector, within) = dirent_sector_and_offset(fs, index);
	let mut buf = [0u8; SECTOR_SIZE];
	storage::read_sectors(sector, &mut buf)?;
	unsafe {
		core::ptr::write_unaligned(buf[within..].as_mut_ptr() as *mut RawDirent, *entry);
	}
	storage::write_sectors(sector, &buf)
}

/// Linearly scans the root directory for `name` (already packed 8.3),
/// returning its entry index and contents on a match.
pub fn find(fs: &Fs, name: &[u8; 11]) -> Result<Option<(u32, RawDirent)>, Errno> {
	for index in 0..fs.root_entry_count {
		let entry = read_dirent(fs, index)?;
		if entry.name[0] == FREE_MARK {
			break;
		}
		if entry.is_free() || entry.is_long_name() {
			continue;
		}
		if &entry.short_name() == name {
			return Ok(Some((index, entry)));
		}
	}
	Ok(None)
}

/// Creates a new entry for `name` at the first free/deleted/end slot.
/// Fails with `EEXIST` if the name is already present, `ENOSPC` if the
/// root directory is full.
pub fn create(fs: &Fs, name: &[u8; 11], attr: u8) -> Result<u32, Errno> {
	if find(fs, name)?.is_some() {
		return Err(EEXIST);
	}
	for index in 0..fs.root_entry_count {
		let entry = read_dirent(fs, index)?;
		if entry.name[0] == FREE_MARK || entry.name[0] == DELETED_MARK {
			let mut new_entry = entry;
			new_entry.name.copy_from_slice(&name[..8]);
			new_entry.ext.copy_from_slice(&name[8..]);
			new_entry.attr = attr;
			new_entry.cluster_lo = 0;
			new_entry.size = 0;
			write_dirent(fs, index, &new_entry)?;
			return Ok(index);
		}
	}
	Err(ENOSPC)
}

/// Updates the size and start cluster fields of the entry at `index`,
/// called from `close` when the file was opened for anything but
/// read-only.
pub fn update(fs: &Fs, index: u32, start_cluster: u16, size: u32) -> Result<(), Errno> {
	let mut entry = read_dirent(fs, index)?;
	entry.cluster_lo = start_cluster;
	entry.size = size;
	write_dirent(fs, index, &entry)
}

/// Marks the entry at `index` deleted.
pub fn unlink(fs: &Fs, index: u32) -> Result<(), Errno> {
	let mut entry = read_dirent(fs, index)?;
	entry.name[0] = DELETED_MARK;
	write_dirent(fs, index, &entry)
}

/// Returns the next non-free, non-long-name entry at or after `index`,
/// for `readdir` iteration. Returns `None` past the end of the directory.
pub fn next_visible(fs: &Fs, mut index: u32) -> Result<Option<(u32, RawDirent)>, Errno> {
	while index < fs.root_entry_count {
		let entry = read_dirent(fs, index)?;
		if entry.name[0] == FREE_MARK {
			return Ok(None);
		}
		if !entry.is_free() && !entry.is_long_name() {
			return Ok(Some((index, entry)));
		}
		index += 1;
	}
	Ok(None)
}

pub fn get(fs: &Fs, index: u32) -> Result<RawDirent, Errno> {
	read_dirent(fs, index).map_err(|_| ENOENT)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test_case]
	fn pack_short_name_pads_and_upcases() {
		let packed = pack_short_name("hello.txt");
		assert_eq!(&packed, b"HELLO   TXT");
	}

	#[test_case]
	fn pack_short_name_no_extension() {
		let packed = pack_short_name("readme");
		assert_eq!(&packed, b"README     ");
	}
}
