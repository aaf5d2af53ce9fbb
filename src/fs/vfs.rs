//! Syscall-facing file operations: resolves paths through the mount table,
//! dispatches to the FAT16 engine or the device filesystem, and manages
//! each task's file descriptor table entries as ref-counted open-file
//! records shared across `fork`/`dup`.

use super::{devfs, fat16, resolve, Backend, Kind, MountKind, OpenFile, OpenFlags};
use crate::device::MAJOR_TTY;
use crate::errno::{Errno, EBADF, EINVAL, EISDIR, EMFILE, ENOSYS, ENOTDIR};
use crate::process::{with_task, Pid};
use crate::sync::Mutex;
use alloc::sync::Arc;

/// Metadata returned by `fstat`.
pub struct Stat {
	pub size: u32,
	pub kind: Kind,
}

fn open_path(path: &str, flags: OpenFlags) -> Result<OpenFile, Errno> {
	let resolved = resolve(path)?;
	match resolved.kind {
		MountKind::Dev => {
			if resolved.rest.is_empty() {
				Ok(OpenFile {
					backend: Backend::Device { major: MAJOR_TTY, minor: 0 },
					kind: Kind::Directory,
					pos: 0,
					size: 0,
					mode: flags,
				})
			} else {
				devfs::open(resolved.rest, flags)
			}
		}
		MountKind::Fat16 => {
			let rest = resolved.rest.trim_start_matches('/');
			if rest.is_empty() {
				Ok(OpenFile {
					backend: Backend::Fat16 {
						start_cluster: 0,
						cur_cluster: 0,
						dirent_index: 0,
					},
					kind: Kind::Directory,
					pos: 0,
					size: 0,
					mode: flags,
				})
			} else {
				fat16::with_fs(|fs| fat16::file::open(fs, rest, flags))
			}
		}
	}
}

fn get_fd(pid: Pid, fd: i32) -> Result<Arc<Mutex<OpenFile>>, Errno> {
	if fd < 0 {
		return Err(EBADF);
	}
	with_task(pid, |t| t.fds.get(fd as usize).and_then(Clone::clone))?.ok_or(EBADF)
}

/// Opens `path`, installing the resulting record in `pid`'s first free fd
/// slot.
pub fn open(pid: Pid, path: &str, flags: OpenFlags) -> Result<i32, Errno> {
	let of = open_path(path, flags)?;
	if flags.contains(OpenFlags::DIRECTORY) && of.kind != Kind::Directory {
		return Err(ENOTDIR);
	}
	if let Backend::Device { major, minor } = of.backend {
		crate::device::open_ref(major, minor);
	}
	let handle = Arc::new(Mutex::new(of));
	with_task(pid, |t| {
		let slot = t.alloc_fd().ok_or(EMFILE)?;
		t.fds[slot] = Some(handle);
		Ok::<_, Errno>(slot as i32)
	})?
}

pub fn read(pid: Pid, fd: i32, buf: &mut [u8]) -> Result<usize, Errno> {
	let handle = get_fd(pid, fd)?;
	let mut of = handle.lock();
	match of.backend {
		Backend::Device { major, minor } if major == MAJOR_TTY => devfs::read(minor, buf),
		Backend::Fat16 { .. } => fat16::with_fs(|fs| fat16::file::read(fs, &mut of, buf)),
		_ => Err(ENOSYS),
	}
}

pub fn write(pid: Pid, fd: i32, buf: &[u8]) -> Result<usize, Errno> {
	let handle = get_fd(pid, fd)?;
	let mut of = handle.lock();
	match of.backend {
		Backend::Device { major, minor } if major == MAJOR_TTY => devfs::write(minor, buf),
		Backend::Fat16 { .. } => fat16::with_fs(|fs| fat16::file::write(fs, &mut of, buf)),
		_ => Err(ENOSYS),
	}
}

/// Releases `pid`'s reference to `fd`. If this was the last reference to
/// the underlying record (the `Arc` drops to 1 before this function's own
/// temporary goes away), FAT16 records get their metadata persisted and
/// device records get their open-count decremented.
pub fn close(pid: Pid, fd: i32) -> Result<(), Errno> {
	let handle = with_task(pid, |t| {
		let slot = t.fds.get_mut(fd as usize).ok_or(EBADF)?;
		slot.take().ok_or(EBADF)
	})??;
	if Arc::strong_count(&handle) == 1 {
		let of = handle.lock();
		match of.backend {
			Backend::Fat16 { .. } => fat16::with_fs(|fs| fat16::file::close(fs, &of))?,
			Backend::Device { major, minor } => crate::device::close_ref(major, minor),
		}
	}
	Ok(())
}

/// `SEEK_SET` only; any other `whence` is rejected, matching the FAT16
/// engine and the rest of the VFS.
pub fn lseek(pid: Pid, fd: i32, offset: u32, whence: i32) -> Result<u32, Errno> {
	if whence != 0 {
		return Err(EINVAL);
	}
	let handle = get_fd(pid, fd)?;
	let mut of = handle.lock();
	match of.backend {
		Backend::Fat16 { .. } => {
			fat16::file::seek_set(&mut of, offset);
			Ok(of.pos)
		}
		_ => Err(EINVAL),
	}
}

/// Shares the same underlying open-file record under a new fd in `pid`'s
/// table.
pub fn dup(pid: Pid, fd: i32) -> Result<i32, Errno> {
	let handle = get_fd(pid, fd)?;
	if let Backend::Device { major, minor } = handle.lock().backend {
		crate::device::open_ref(major, minor);
	}
	with_task(pid, |t| {
		let slot = t.alloc_fd().ok_or(EMFILE)?;
		t.fds[slot] = Some(handle.clone());
		Ok::<_, Errno>(slot as i32)
	})?
}

pub fn isatty(pid: Pid, fd: i32) -> Result<bool, Errno> {
	let handle = get_fd(pid, fd)?;
	Ok(matches!(handle.lock().backend, Backend::Device { major, .. } if major == MAJOR_TTY))
}

pub fn fstat(pid: Pid, fd: i32) -> Result<Stat, Errno> {
	let handle = get_fd(pid, fd)?;
	let of = handle.lock();
	Ok(Stat { size: of.size, kind: of.kind })
}

pub fn opendir(pid: Pid, path: &str) -> Result<i32, Errno> {
	open(pid, path, OpenFlags::RDONLY | OpenFlags::DIRECTORY)
}

/// Advances the directory cursor stored in the open-file record's `pos`
/// field and returns the next visible entry, or `None` at the end.
pub fn readdir(pid: Pid, fd: i32) -> Result<Option<super::DirEntry>, Errno> {
	let handle = get_fd(pid, fd)?;
	let mut of = handle.lock();
	if of.kind != Kind::Directory {
		return Err(ENOTDIR);
	}
	match of.backend {
		Backend::Fat16 { .. } => {
			let found = fat16::with_fs(|fs| fat16::dir::next_visible(fs, of.pos))?;
			match found {
				Some((index, entry)) => {
					of.pos = index + 1;
					Ok(Some(super::DirEntry {
						name: entry.short_name(),
						is_dir: entry.attr & fat16::dir::ATTR_DIRECTORY != 0,
					}))
				}
				None => Ok(None),
			}
		}
		Backend::Device { .. } => {
			let found = devfs::readdir(of.pos);
			if found.is_some() {
				of.pos += 1;
			}
			Ok(found)
		}
	}
}

pub fn closedir(pid: Pid, fd: i32) -> Result<(), Errno> {
	close(pid, fd)
}

/// A file opened for `execve`'s own use: not installed in any fd table,
/// read-only, never shared.
pub struct ExecFd(Mutex<OpenFile>);

/// Opens `path` against the current address space's view of the
/// filesystem, for `execve` to read the ELF image from before the task's
/// own address space is replaced.
pub fn open_for_exec(path: &str) -> Result<ExecFd, Errno> {
	let of = open_path(path, OpenFlags::RDONLY)?;
	if of.kind == Kind::Directory {
		return Err(EISDIR);
	}
	Ok(ExecFd(Mutex::new(of)))
}

/// Reads `buf.len()` bytes at `offset` from an exec-scoped file handle.
pub fn pread(fd: &ExecFd, offset: usize, buf: &mut [u8]) -> Result<usize, Errno> {
	let mut of = fd.0.lock();
	of.pos = offset as u32;
	match of.backend {
		Backend::Fat16 { .. } => fat16::with_fs(|fs| fat16::file::read(fs, &mut of, buf)),
		_ => Err(ENOSYS),
	}
}

/// Releases an exec-scoped file handle. Read-only, so there is nothing to
/// persist; this exists for symmetry and so callers have an explicit point
/// to stop borrowing the handle.
pub fn close_exec_fd(_fd: ExecFd) {}
