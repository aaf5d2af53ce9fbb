//! File descriptor syscalls: open/read/write/close/lseek/isatty/fstat/dup
//! and the opendir/readdir/closedir directory-iteration trio.

use super::user;
use crate::errno::{to_retval, ENOTTY};
use crate::fs::{vfs, OpenFlags};
use crate::process::scheduler;

/// `arg0` = path, `arg1` = raw open flags bits, `arg2` unused.
pub fn open(path_ptr: u32, flags_bits: u32, _unused: u32) -> isize {
	let pid = scheduler::current_pid();
	let result = (|| {
		let path = unsafe { user::user_cstr(path_ptr)? };
		let flags = OpenFlags::from_bits_truncate(flags_bits);
		vfs::open(pid, path, flags)
	})();
	to_retval(result.map(|fd| fd as usize))
}

pub fn read(fd: i32, buf_ptr: u32, len: u32) -> isize {
	let pid = scheduler::current_pid();
	let buf = unsafe { user::user_slice_mut(buf_ptr, len as usize) };
	to_retval(vfs::read(pid, fd, buf))
}

pub fn write(fd: i32, buf_ptr: u32, len: u32) -> isize {
	let pid = scheduler::current_pid();
	let buf = unsafe { user::user_slice(buf_ptr, len as usize) };
	to_retval(vfs::write(pid, fd, buf))
}

pub fn close(fd: i32) -> isize {
	let pid = scheduler::current_pid();
	to_retval(vfs::close(pid, fd).map(|_| 0))
}

/// `arg1` = offset, `arg2` = whence (only `SEEK_SET`/0 is accepted).
pub fn lseek(fd: i32, offset: u32, whence: u32) -> isize {
	let pid = scheduler::current_pid();
	to_retval(vfs::lseek(pid, fd, offset, whence as i32).map(|p| p as usize))
}

pub fn isatty(fd: i32) -> isize {
	let pid = scheduler::current_pid();
	match vfs::isatty(pid, fd) {
		Ok(true) => 1,
		Ok(false) => -(ENOTTY as isize),
		Err(e) => -(e as isize),
	}
}

/// Writes a small `{size, is_dir}` record to the user buffer at `arg1`.
pub fn fstat(fd: i32, out_ptr: u32) -> isize {
	let pid = scheduler::current_pid();
	match vfs::fstat(pid, fd) {
		Ok(stat) => {
			let out = unsafe { user::user_slice_mut(out_ptr, 8) };
			out[0..4].copy_from_slice(&stat.size.to_le_bytes());
			let is_dir = matches!(stat.kind, crate::fs::Kind::Directory);
			out[4] = is_dir as u8;
			0
		}
		Err(e) => -(e as isize),
	}
}

pub fn dup(fd: i32) -> isize {
	let pid = scheduler::current_pid();
	to_retval(vfs::dup(pid, fd).map(|n| n as usize))
}

pub fn opendir(path_ptr: u32) -> isize {
	let pid = scheduler::current_pid();
	let result = (|| {
		let path = unsafe { user::user_cstr(path_ptr)? };
		vfs::opendir(pid, path)
	})();
	to_retval(result.map(|fd| fd as usize))
}

/// Writes the next entry's space-padded 8.3 name (11 bytes) plus an
/// `is_dir` byte to the user buffer at `arg1`; returns 0 at the end of the
/// directory, 1 if an entry was written.
pub fn readdir(fd: i32, out_ptr: u32) -> isize {
	let pid = scheduler::current_pid();
	match vfs::readdir(pid, fd) {
		Ok(Some(entry)) => {
			let out = unsafe { user::user_slice_mut(out_ptr, 12) };
			out[..11].copy_from_slice(&entry.name);
			out[11] = entry.is_dir as u8;
			1
		}
		Ok(None) => 0,
		Err(e) => -(e as isize),
	}
}

pub fn closedir(fd: i32) -> isize {
	let pid = scheduler::current_pid();
	to_retval(vfs::closedir(pid, fd).map(|_| 0))
}
