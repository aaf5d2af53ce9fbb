//! Process-lifecycle syscalls: `sleep`, `getpid`, `fork`, `execve`,
//! `yield`, `exit`, `wait`.

use super::user;
use crate::errno::to_retval;
use crate::process::scheduler;

pub fn sleep(ms: u32) -> isize {
	scheduler::sleep_ticks(crate::pit::ms_to_ticks(ms));
	0
}

pub fn getpid() -> isize {
	scheduler::current_pid() as isize
}

pub fn fork() -> isize {
	to_retval(crate::process::fork().map(|pid| pid as usize))
}

/// `arg0` = path (NUL-terminated), `arg1` = argv (NUL-terminated pointer
/// array, may be 0 for none), `arg2` unused.
pub fn execve(path_ptr: u32, argv_ptr: u32, _unused: u32) -> isize {
	let pid = scheduler::current_pid();
	let result = (|| {
		let path = unsafe { user::user_cstr(path_ptr)? };
		let mut storage: [&str; 32] = [""; 32];
		let n = unsafe { user::user_argv(argv_ptr, &mut storage) }?;
		crate::process::exec::execve(pid, path, &storage[..n])
	})();
	to_retval(result.map(|_| 0usize))
}

pub fn syscall_yield() -> isize {
	scheduler::yield_now();
	0
}

pub fn exit(status: i32) -> isize {
	let pid = scheduler::current_pid();
	crate::process::exit(pid, status);
	unreachable!("exit never returns to the exiting task")
}

/// `arg0` is `int *status` (may be 0 to discard it), matching the external
/// interface's `wait(int *status)`. Blocks until a zombie child exists,
/// then reaps it, writes its exit status through `arg0` if given, and
/// returns its pid.
pub fn wait(status_ptr: u32) -> isize {
	let pid = scheduler::current_pid();
	loop {
		match crate::process::reap_zombie_child(pid) {
			Ok(Some((child, status))) => {
				if status_ptr != 0 {
					let dst = unsafe { user::user_slice_mut(status_ptr, core::mem::size_of::<i32>()) };
					dst.copy_from_slice(&status.to_ne_bytes());
				}
				return child as isize;
			}
			Ok(None) => {
				if !crate::process::has_any_child(pid) {
					return -1;
				}
				scheduler::block_current_wait();
			}
			Err(e) => return -(e as isize),
		}
	}
}
