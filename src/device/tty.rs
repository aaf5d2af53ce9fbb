//! Glue between the device filesystem and the tty layer: turns a minor
//! number into the matching [`crate::tty::Tty`] and forwards reads/writes
//! to its line discipline.

use crate::errno::Errno;

/// Parses a `/dev` path remainder like `"tty0"` into a tty minor number.
pub fn minor_from_path(rest: &str) -> Option<usize> {
	let digits = rest.strip_prefix("tty")?;
	digits.parse::<usize>().ok()
}

/// Reads up to `buf.len()` bytes from tty `minor`'s line discipline.
pub fn read(minor: usize, buf: &mut [u8]) -> Result<usize, Errno> {
	crate::tty::get(minor)?.read(buf)
}

/// Writes `buf` to tty `minor`'s output path.
pub fn write(minor: usize, buf: &[u8]) -> Result<usize, Errno> {
	crate::tty::get(minor)?.write(buf)
}
