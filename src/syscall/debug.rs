//! `print_msg`: a kernel-log bypass for user-space debugging, independent
//! of the tty/VFS write path.

use super::user;
use crate::process::scheduler;

/// `arg0` = pointer to a UTF-8 byte buffer, `arg1` = its length. Invalid
/// UTF-8 is logged as a lossy-decoded placeholder rather than rejected,
/// since this path exists purely for debugging convenience.
pub fn print_msg(ptr: u32, len: u32) -> isize {
	let pid = scheduler::current_pid();
	let bytes = unsafe { user::user_slice(ptr, len as usize) };
	match core::str::from_utf8(bytes) {
		Ok(s) => log::info!("[pid {}] {}", pid, s),
		Err(_) => log::info!("[pid {}] <{} bytes, invalid utf-8>", pid, bytes.len()),
	}
	0
}
