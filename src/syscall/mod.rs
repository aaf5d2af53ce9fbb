//! System-call dispatch table: the privilege boundary's only entry point
//! above the call gate itself. One numeric id per syscall, a sum type over
//! the syscall name per the spec's "represent as such" note, unknown ids
//! logged and rejected centrally.

pub mod debug;
pub mod file;
pub mod mem;
pub mod proc;
pub mod user;

/// Syscall numeric ids, reproduced verbatim from the external interface.
pub mod id {
	pub const SLEEP: u32 = 0;
	pub const GETPID: u32 = 1;
	pub const FORK: u32 = 2;
	pub const EXECVE: u32 = 3;
	pub const YIELD: u32 = 4;
	pub const EXIT: u32 = 5;
	pub const WAIT: u32 = 6;
	pub const OPEN: u32 = 50;
	pub const READ: u32 = 51;
	pub const WRITE: u32 = 52;
	pub const CLOSE: u32 = 53;
	pub const LSEEK: u32 = 54;
	pub const ISATTY: u32 = 55;
	pub const SBRK: u32 = 56;
	pub const FSTAT: u32 = 57;
	pub const DUP: u32 = 58;
	pub const OPENDIR: u32 = 60;
	pub const READDIR: u32 = 61;
	pub const CLOSEDIR: u32 = 62;
	pub const PRINT_MSG: u32 = 100;
}

/// Dispatches one syscall by numeric id. Mirrors the call gate's argument
/// frame: up to four `u32` arguments, a signed `isize` result (negative on
/// error, matching `errno::to_retval`'s convention).
pub fn dispatch(sysid: u32, arg0: u32, arg1: u32, arg2: u32, arg3: u32) -> isize {
	#[cfg(feature = "strace")]
	log::trace!("syscall {} ({:#x}, {:#x}, {:#x}, {:#x})", sysid, arg0, arg1, arg2, arg3);

	match sysid {
		id::SLEEP => proc::sleep(arg0),
		id::GETPID => proc::getpid(),
		id::FORK => proc::fork(),
		id::EXECVE => proc::execve(arg0, arg1, arg2),
		id::YIELD => proc::syscall_yield(),
		id::EXIT => proc::exit(arg0 as i32),
		id::WAIT => proc::wait(arg0),
		id::OPEN => file::open(arg0, arg1, arg2),
		id::READ => file::read(arg0 as i32, arg1, arg2),
		id::WRITE => file::write(arg0 as i32, arg1, arg2),
		id::CLOSE => file::close(arg0 as i32),
		id::LSEEK => file::lseek(arg0 as i32, arg1, arg2),
		id::ISATTY => file::isatty(arg0 as i32),
		id::SBRK => mem::sbrk(arg0 as i32),
		id::FSTAT => file::fstat(arg0 as i32, arg1),
		id::DUP => file::dup(arg0 as i32),
		id::OPENDIR => file::opendir(arg0),
		id::READDIR => file::readdir(arg0 as i32, arg1),
		id::CLOSEDIR => file::closedir(arg0 as i32),
		id::PRINT_MSG => debug::print_msg(arg0, arg1),
		other => {
			log::warn!("unknown syscall id {}", other);
			-1
		}
	}
}
