//! Heap-growth syscall.

use crate::errno::to_retval;
use crate::process::{grow_heap, scheduler};

/// Grows the calling task's heap by `increment` bytes, returning the
/// previous break. A negative `increment` is rejected with `EINVAL`
/// rather than asserted, since it is user-triggerable.
pub fn sbrk(increment: i32) -> isize {
	let pid = scheduler::current_pid();
	to_retval(grow_heap(pid, increment).map(|old_break| old_break as usize))
}
