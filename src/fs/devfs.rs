//! Device filesystem: the `/dev` mount, presently just `tty0`..`tty3`.
//! Every entry resolves straight to a `Backend::Device` record; the real
//! I/O lives in `crate::device`.

use super::{Backend, DirEntry, Kind, OpenFile, OpenFlags};
use crate::device::MAJOR_TTY;
use crate::errno::{Errno, ENOENT};

/// Opens `rest` (the path with the `/dev` prefix stripped, e.g. `"tty0"`)
/// as a device file.
pub fn open(rest: &str, mode: OpenFlags) -> Result<OpenFile, Errno> {
	let minor = crate::device::tty::minor_from_path(rest).ok_or(ENOENT)?;
	Ok(OpenFile {
		backend: Backend::Device {
			major: MAJOR_TTY,
			minor: minor as u32,
		},
		kind: Kind::Tty,
		pos: 0,
		size: 0,
		mode,
	})
}

pub fn read(minor: u32, buf: &mut [u8]) -> Result<usize, Errno> {
	crate::device::tty::read(minor as usize, buf)
}

pub fn write(minor: u32, buf: &[u8]) -> Result<usize, Errno> {
	crate::device::tty::write(minor as usize, buf)
}

/// Lists the fixed set of tty device nodes; `index` is the ordinal into
/// that fixed list, matching `OpenFile::pos`'s monotonically increasing
/// cursor when a directory fd is open on `/dev`.
pub fn readdir(index: u32) -> Option<DirEntry> {
	if index as usize >= crate::tty::NUM_TTYS {
		return None;
	}
	let mut name = [0u8; 11];
	let label = match index {
		0 => b"tty0".as_slice(),
		1 => b"tty1".as_slice(),
		2 => b"tty2".as_slice(),
		3 => b"tty3".as_slice(),
		_ => return None,
	};
	name[..label.len()].copy_from_slice(label);
	Some(DirEntry { name, is_dir: false })
}
