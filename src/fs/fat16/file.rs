//! Read/write/seek on an open FAT16 file: chunks transfers by cluster,
//! going straight to the caller's buffer on whole-cluster-aligned spans
//! and through the scratch buffer otherwise, following the FAT chain at
//! cluster boundaries.

use super::dir::{self, ATTR_ARCHIVE};
use super::{cluster, Fs, FIRST_VALID_CLUSTER};
use crate::device::storage::{self, SECTOR_SIZE};
use crate::errno::{Errno, ENOENT, ENOSPC};
use crate::fs::{Backend, Kind, OpenFile, OpenFlags};

/// Opens `name` (a bare 8.3-ish component, already validated by the VFS)
/// against the mounted root directory.
pub fn open(fs: &Fs, name: &str, flags: OpenFlags) -> Result<OpenFile, Errno> {
	let packed = dir::pack_short_name(name);
	match dir::find(fs, &packed)? {
		Some((index, entry)) => {
			if flags.contains(OpenFlags::TRUNC) {
				if fs.is_valid_cluster(entry.cluster_lo) {
					cluster::free_chain(fs, entry.cluster_lo)?;
				}
				dir::update(fs, index, 0, 0)?;
				Ok(OpenFile {
					backend: Backend::Fat16 {
						start_cluster: 0,
						cur_cluster: 0,
						dirent_index: index,
					},
					kind: Kind::Normal,
					pos: 0,
					size: 0,
					mode: flags,
				})
			} else {
				let size = entry.size;
				let start = entry.cluster_lo;
				Ok(OpenFile {
					backend: Backend::Fat16 {
						start_cluster: start,
						cur_cluster: start,
						dirent_index: index,
					},
					kind: Kind::Normal,
					pos: 0,
					size,
					mode: flags,
				})
			}
		}
		None if flags.contains(OpenFlags::CREAT) => {
			let index = dir::create(fs, &packed, ATTR_ARCHIVE)?;
			Ok(OpenFile {
				backend: Backend::Fat16 {
					start_cluster: 0,
					cur_cluster: 0,
					dirent_index: index,
				},
				kind: Kind::Normal,
				pos: 0,
				size: 0,
				mode: flags,
			})
		}
		None => Err(ENOENT),
	}
}

/// Advances `cur_cluster` to the cluster containing byte offset `pos`
/// within the file, starting the walk over from `start_cluster` — simple
/// and correct, not the fastest possible for large seeks backward.
fn cluster_for_pos(fs: &Fs, start_cluster: u16, pos: u32) -> Result<u16, Errno> {
	let bpc = fs.bytes_per_cluster();
	let mut cur = start_cluster;
	let mut remaining = pos / bpc;
	while remaining > 0 {
		if !fs.is_valid_cluster(cur) {
			return Err(ENOENT);
		}
		cur = cluster::get_next(fs, cur)?;
		remaining -= 1;
	}
	Ok(cur)
}

pub fn read(fs: &Fs, of: &mut OpenFile, buf: &mut [u8]) -> Result<usize, Errno> {
	let Backend::Fat16 { start_cluster, .. } = of.backend else {
		return Err(ENOENT);
	};
	let bpc = fs.bytes_per_cluster() as usize;
	let mut done = 0;
	while done < buf.len() && of.pos < of.size {
		let remaining_file = (of.size - of.pos) as usize;
		let want = (buf.len() - done).min(remaining_file);
		if want == 0 {
			break;
		}
		let cur = cluster_for_pos(fs, start_cluster, of.pos)?;
		if !fs.is_valid_cluster(cur) {
			break;
		}
		let within_cluster = (of.pos as usize) % bpc;
		let chunk = want.min(bpc - within_cluster);
		let lba = fs.cluster_to_lba(cur);

		if within_cluster == 0 && chunk == bpc {
			let sector_off = lba;
			storage::read_sectors(sector_off, &mut buf[done..done + chunk])?;
		} else {
			let mut scratch = alloc::vec![0u8; bpc];
			let sectors = bpc / SECTOR_SIZE;
			for s in 0..sectors {
				storage::read_sectors(lba + s as u32, &mut scratch[s * SECTOR_SIZE..(s + 1) * SECTOR_SIZE])?;
			}
			buf[done..done + chunk].copy_from_slice(&scratch[within_cluster..within_cluster + chunk]);
		}

		done += chunk;
		of.pos += chunk as u32;
		if let Backend::Fat16 { cur_cluster, .. } = &mut of.backend {
			*cur_cluster = cur;
		}
	}
	Ok(done)
}

/// Allocates clusters to cover at least `new_size` bytes, chaining a new
/// run onto the current tail. Returns the (possibly unchanged) start
/// cluster.
fn expand_file(fs: &Fs, start_cluster: u16, old_size: u32, new_size: u32) -> Result<u16, Errno> {
	let bpc = fs.bytes_per_cluster();
	let have_clusters = if start_cluster == 0 { 0 } else { (old_size + bpc - 1) / bpc };
	let need_clusters = (new_size + bpc - 1) / bpc;
	if need_clusters <= have_clusters {
		return Ok(start_cluster);
	}
	let extra = need_clusters - have_clusters;
	if start_cluster == 0 {
		return cluster::alloc_free(fs, extra);
	}
	let mut tail = start_cluster;
	loop {
		let next = cluster::get_next(fs, tail)?;
		if !fs.is_valid_cluster(next) {
			break;
		}
		tail = next;
	}
	cluster::extend_chain(fs, tail, extra)?;
	Ok(start_cluster)
}

pub fn write(fs: &Fs, of: &mut OpenFile, buf: &[u8]) -> Result<usize, Errno> {
	let Backend::Fat16 { start_cluster, .. } = of.backend else {
		return Err(ENOENT);
	};

	let end_pos = of.pos + buf.len() as u32;
	let new_start = expand_file(fs, start_cluster, of.size, end_pos)?;
	if let Backend::Fat16 {
		start_cluster: sc,
		cur_cluster,
		..
	} = &mut of.backend
	{
		if *sc == 0 {
			*sc = new_start;
			*cur_cluster = new_start;
		}
	}
	let Backend::Fat16 { start_cluster, .. } = of.backend else {
		unreachable!()
	};
	if !fs.is_valid_cluster(start_cluster) {
		return Err(ENOSPC);
	}

	let bpc = fs.bytes_per_cluster() as usize;
	let mut done = 0;
	while done < buf.len() {
		let cur = cluster_for_pos(fs, start_cluster, of.pos)?;
		let within_cluster = (of.pos as usize) % bpc;
		let chunk = (buf.len() - done).min(bpc - within_cluster);
		let lba = fs.cluster_to_lba(cur);

		if within_cluster == 0 && chunk == bpc {
			storage::write_sectors(lba, &buf[done..done + chunk])?;
		} else {
			let mut scratch = alloc::vec![0u8; bpc];
			let sectors = bpc / SECTOR_SIZE;
			for s in 0..sectors {
				storage::read_sectors(lba + s as u32, &mut scratch[s * SECTOR_SIZE..(s + 1) * SECTOR_SIZE])?;
			}
			scratch[within_cluster..within_cluster + chunk].copy_from_slice(&buf[done..done + chunk]);
			for s in 0..sectors {
				storage::write_sectors(lba + s as u32, &scratch[s * SECTOR_SIZE..(s + 1) * SECTOR_SIZE])?;
			}
		}

		done += chunk;
		of.pos += chunk as u32;
		if let Backend::Fat16 { cur_cluster, .. } = &mut of.backend {
			*cur_cluster = cur;
		}
	}
	if of.pos > of.size {
		of.size = of.pos;
	}
	Ok(done)
}

/// Only `SEEK_SET` (whence 0) is supported; anything else is `EINVAL` at
/// the VFS layer before this is even called.
pub fn seek_set(of: &mut OpenFile, offset: u32) {
	of.pos = offset;
}

/// Persists size and start cluster back to the directory entry if the
/// file was opened for anything other than read-only.
pub fn close(fs: &Fs, of: &OpenFile) -> Result<(), Errno> {
	let Backend::Fat16 {
		start_cluster,
		dirent_index,
		..
	} = of.backend
	else {
		return Err(ENOENT);
	};
	if of.mode.writable() {
		dir::update(fs, dirent_index, start_cluster, of.size)?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	#[test_case]
	fn cluster_floor_is_two() {
		assert_eq!(super::FIRST_VALID_CLUSTER, 2);
	}
}
