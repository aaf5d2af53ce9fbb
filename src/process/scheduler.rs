//! Round-robin, time-sliced preemptive scheduler: ready/sleep/wait queues,
//! the timer tick handler, `yield`, and dispatch via hardware task switch.
//!
//! The idle task is deliberately outside this module's bookkeeping: it is
//! never enqueued on any queue and is simply what `dispatch` falls back to
//! when the ready queue is empty.

use super::{Pid, State};
use crate::sync::IntMutex;
use alloc::collections::VecDeque;

/// What the CPU is bound to: a real task, or the idle loop. Pid 0 is not
/// reserved for idle — it is an ordinary pool slot the first spawned task
/// can (and does) receive — so idle needs its own variant rather than a
/// sentinel pid, or it would alias a real task's bookkeeping.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Current {
	Idle,
	Task(Pid),
}

struct Queues {
	ready: VecDeque<Pid>,
	sleeping: VecDeque<Pid>,
	current: Option<Current>,
	idle_tss_slot: usize,
}

static QUEUES: IntMutex<Queues> = IntMutex::new(Queues {
	ready: VecDeque::new(),
	sleeping: VecDeque::new(),
	current: None,
	idle_tss_slot: 0,
});

/// Records the idle task's TSS slot so `dispatch` can fall back to it when
/// the ready queue is empty. Called once during init after the idle task's
/// TSS descriptor has been allocated.
pub fn set_idle_tss_slot(slot: usize) {
	QUEUES.lock().idle_tss_slot = slot;
}

/// Puts `pid` on the tail of the ready queue and marks it `Ready`. Safe to
/// call from interrupt context.
pub fn enqueue_ready(pid: Pid) {
	let _ = super::with_task(pid, |t| t.state = State::Ready);
	QUEUES.lock().ready.push_back(pid);
}

/// Returns the pid of the task currently bound to the CPU. Panics before
/// the first dispatch, and panics if the idle task is running — callers are
/// expected to be running in task (syscall or fault) context, which idle
/// never enters.
pub fn current_pid() -> Pid {
	match QUEUES.lock().current.expect("scheduler used before first dispatch") {
		Current::Task(pid) => pid,
		Current::Idle => panic!("scheduler: current task queried while idle is running"),
	}
}

/// True if the idle task is the one presently bound to the CPU.
fn current_is_idle() -> bool {
	matches!(QUEUES.lock().current, Some(Current::Idle))
}

/// Voluntarily gives up the remainder of the current time slice: re-enqueue
/// ready and dispatch.
pub fn yield_now() {
	let pid = current_pid();
	enqueue_ready(pid);
	dispatch();
}

/// Called on every timer interrupt. Decrements the running task's
/// remaining slice; at zero, re-enqueues it and redispatches. Also scans
/// the (unordered, linearly-scanned) sleep queue for tasks whose remaining
/// sleep has elapsed.
pub fn tick() {
	let mut woke = alloc::vec::Vec::new();
	{
		let mut q = QUEUES.lock();
		let mut i = 0;
		while i < q.sleeping.len() {
			let pid = q.sleeping[i];
			let done = super::with_task(pid, |t| {
				t.remaining_sleep_ticks = t.remaining_sleep_ticks.saturating_sub(1);
				t.remaining_sleep_ticks == 0
			})
			.unwrap_or(true);
			if done {
				q.sleeping.remove(i);
				woke.push(pid);
			} else {
				i += 1;
			}
		}
	}
	for pid in woke {
		enqueue_ready(pid);
	}

	// A tick can land while idle is running (no task has any slice to
	// decrement); only real tasks carry a time slice.
	if current_is_idle() {
		return;
	}
	let pid = current_pid();
	let expired = super::with_task(pid, |t| {
		t.remaining_slice = t.remaining_slice.saturating_sub(1);
		t.remaining_slice == 0
	})
	.unwrap_or(false);
	if expired {
		let _ = super::with_task(pid, |t| t.remaining_slice = t.time_slice);
		enqueue_ready(pid);
		dispatch();
	}
}

/// Puts the current task to sleep for `ticks` timer ticks and dispatches
/// away. Returns once rescheduled after waking.
pub fn sleep_ticks(ticks: u32) {
	let pid = current_pid();
	let _ = super::with_task(pid, |t| {
		t.state = State::Sleep;
		t.remaining_sleep_ticks = ticks.max(1);
	});
	QUEUES.lock().sleeping.push_back(pid);
	dispatch();
}

/// Marks the current task `Wait` (blocked on a semaphore, a contended
/// filesystem mutex modeled as blocking, or `wait()`/child reap) and
/// dispatches away without enqueueing it anywhere — it is woken explicitly
/// by [`wake`].
pub fn block_current_wait() {
	let pid = current_pid();
	let _ = super::with_task(pid, |t| t.state = State::Wait);
	dispatch();
}

/// Moves a blocked or sleeping task back to the ready queue. Idempotent if
/// the task is already ready or running.
pub fn wake(pid: Pid) {
	let already_ready = super::with_task(pid, |t| matches!(t.state, State::Ready | State::Running))
		.unwrap_or(true);
	if !already_ready {
		{
			let mut q = QUEUES.lock();
			q.sleeping.retain(|&p| p != pid);
		}
		enqueue_ready(pid);
	}
}

/// Marks the current task a zombie with the given status via
/// [`super::exit`] and dispatches away. Used by fault handlers that must
/// kill the running task outright.
pub fn exit_current(status: i32) {
	let pid = current_pid();
	super::exit(pid, status);
}

/// Called by [`super::exit`] once bookkeeping (re-parenting, waking) is
/// done: dispatches away from a task that will never run again. The task
/// stays `Zombie` in the pool until `wait` reaps it.
pub fn retire_current() {
	dispatch();
}

/// Picks the head of the ready queue, or the idle task if empty, and
/// performs a hardware task switch to it. A no-op if the pick equals the
/// currently running task.
pub fn dispatch() {
	let next = {
		let mut q = QUEUES.lock();
		match q.ready.pop_front() {
			Some(pid) => Current::Task(pid),
			None => Current::Idle,
		}
	};
	if let Current::Task(pid) = next {
		let _ = super::with_task(pid, |t| t.state = State::Running);
	}
	{
		let mut q = QUEUES.lock();
		if q.current == Some(next) {
			return;
		}
		q.current = Some(next);
	}
	let tss_slot = match next {
		Current::Idle => QUEUES.lock().idle_tss_slot,
		Current::Task(pid) => super::with_task(pid, |t| t.tss_slot).unwrap_or(0),
	};
	unsafe {
		crate::gdt::switch_to(tss_slot);
	}
}
