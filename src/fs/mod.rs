//! Virtual filesystem: mount table, path resolution, and the open-file
//! record shared by every fd. Routes to the device filesystem ("tty"
//! prefix) or FAT16, tagged rather than `dyn`-dispatched, per the kernel's
//! "capability set with a tag" representation of the source's vtables.

pub mod devfs;
pub mod fat16;
pub mod vfs;

use crate::errno::Errno;
use bitflags::bitflags;

bitflags! {
	/// Open-mode flags, matching the subset the core actually interprets.
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct OpenFlags: u32 {
		const RDONLY = 0;
		const WRONLY = 1 << 0;
		const RDWR = 1 << 1;
		const CREAT = 1 << 2;
		const TRUNC = 1 << 3;
		const DIRECTORY = 1 << 4;
	}
}

impl OpenFlags {
	pub fn readable(&self) -> bool {
		!self.contains(OpenFlags::WRONLY) || self.contains(OpenFlags::RDWR)
	}

	pub fn writable(&self) -> bool {
		self.contains(OpenFlags::WRONLY) || self.contains(OpenFlags::RDWR)
	}
}

/// What kind of thing an open-file record refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
	Normal,
	Directory,
	Tty,
	Unknown,
}

/// Which filesystem backend an open-file record belongs to, carrying just
/// enough per-backend state to resume FAT16 cluster-chain walks or route
/// device I/O.
#[derive(Clone, Copy, Debug)]
pub enum Backend {
	Fat16 {
		start_cluster: u16,
		cur_cluster: u16,
		dirent_index: u32,
	},
	Device {
		major: u32,
		minor: u32,
	},
}

/// One open-file record: the thing fds and their `dup`s point at.
pub struct OpenFile {
	pub backend: Backend,
	pub kind: Kind,
	pub pos: u32,
	pub size: u32,
	pub mode: OpenFlags,
}

/// One returned directory entry.
pub struct DirEntry {
	pub name: [u8; 11],
	pub is_dir: bool,
}

/// A mount point: prefix path and the filesystem it routes to.
pub struct Mount {
	pub prefix: &'static str,
	pub kind: MountKind,
}

#[derive(Clone, Copy)]
pub enum MountKind {
	Fat16,
	Dev,
}

/// Resolution result: which filesystem owns a path, and the path with the
/// mount prefix stripped.
pub struct Resolved<'a> {
	pub kind: MountKind,
	pub rest: &'a str,
}

/// Resolves `path` against the mount table using longest-prefix match —
/// the redesign the spec calls for over the source's any-prefix,
/// insertion-order scan, which is unsafe for nested mount points.
pub fn resolve(path: &str) -> Result<Resolved<'_>, Errno> {
	let mounts = MOUNTS.lock();
	let mut best: Option<&Mount> = None;
	for m in mounts.iter() {
		if path.starts_with(m.prefix) {
			if best.map_or(true, |b| m.prefix.len() > b.prefix.len()) {
				best = Some(m);
			}
		}
	}
	let m = best.ok_or(crate::errno::ENOENT)?;
	let rest = &path[m.prefix.len()..];
	Ok(Resolved { kind: m.kind, rest })
}

use crate::sync::Mutex;
use alloc::vec::Vec;

static MOUNTS: Mutex<Vec<Mount>> = Mutex::new(Vec::new());

/// Registers a mount point. Called once at init for `/` (FAT16, the root
/// filesystem) and `/dev` (the device filesystem).
pub fn mount(prefix: &'static str, kind: MountKind) {
	MOUNTS.lock().push(Mount { prefix, kind });
}
