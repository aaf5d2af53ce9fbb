//! Task table and process-lifecycle primitives: fork, exec, exit, wait.
//!
//! A task lives in a fixed-size pool and is referenced everywhere else by
//! its index (== its [`Pid`]), the "arena of small integer indices"
//! alternative to raw intrusive back-pointers: queues are `VecDeque<Pid>`
//! rather than linked lists threaded through the task structs themselves.

pub mod exec;
pub mod scheduler;
pub mod switch;

use crate::errno::{Errno, EAGAIN, EINVAL, ENOMEM, ESRCH};
use crate::fs::OpenFile;
use crate::memory::vmem::AddressSpace;
use crate::memory::{frame, PAGE_SIZE};
use crate::sync::{IntMutex, Mutex};
use alloc::sync::Arc;

/// A task's identity. Equal to its slot index in the task pool for the
/// lifetime of that occupancy; reused once the slot is freed by `wait`.
pub type Pid = u32;

/// Size of the fixed task pool. Every `fork` draws a slot from here; `wait`
/// returns one to the pool.
pub const MAX_TASKS: usize = 64;
/// Per-task file descriptor table capacity.
pub const MAX_FDS: usize = 128;
/// Size, in frames, of each task's kernel stack.
pub const KERNEL_STACK_PAGES: usize = 2;
/// Default scheduler time slice, in timer ticks.
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// A task's position in the state machine described by the scheduler.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
	Created,
	Ready,
	Running,
	Sleep,
	Wait,
	Zombie,
}

/// One entry in the fixed task pool.
pub struct Task {
	pub name: [u8; 32],
	pub name_len: u8,
	pub pid: Pid,
	pub parent: Option<Pid>,
	pub state: State,
	pub heap_start: u32,
	pub heap_end: u32,
	pub addr_space: Option<AddressSpace>,
	pub kstack_phys: usize,
	pub tss_slot: usize,
	pub exit_status: i32,
	pub time_slice: u32,
	pub remaining_slice: u32,
	pub remaining_sleep_ticks: u32,
	pub fds: [Option<Arc<Mutex<OpenFile>>>; MAX_FDS],
}

impl Task {
	fn empty(pid: Pid) -> Self {
		const NONE_FD: Option<Arc<Mutex<OpenFile>>> = None;
		Self {
			name: [0; 32],
			name_len: 0,
			pid,
			parent: None,
			state: State::Created,
			heap_start: 0,
			heap_end: 0,
			addr_space: None,
			kstack_phys: 0,
			tss_slot: 0,
			exit_status: 0,
			time_slice: DEFAULT_TIME_SLICE,
			remaining_slice: DEFAULT_TIME_SLICE,
			remaining_sleep_ticks: 0,
			fds: [NONE_FD; MAX_FDS],
		}
	}

	/// Sets the task's name, truncating to the fixed-size buffer.
	pub fn set_name(&mut self, name: &[u8]) {
		let n = name.len().min(self.name.len());
		self.name[..n].copy_from_slice(&name[..n]);
		self.name_len = n as u8;
	}

	pub fn name(&self) -> &[u8] {
		&self.name[..self.name_len as usize]
	}

	/// Finds the first free fd slot, or `None` if the table is full.
	pub fn alloc_fd(&mut self) -> Option<usize> {
		self.fds.iter().position(Option::is_none)
	}
}

struct TaskPool {
	tasks: [Option<Task>; MAX_TASKS],
}

const NONE_TASK: Option<Task> = None;

static POOL: IntMutex<TaskPool> = IntMutex::new(TaskPool {
	tasks: [NONE_TASK; MAX_TASKS],
});

/// Runs `f` with mutable access to task `pid`'s slot, or returns `ESRCH` if
/// the slot is unoccupied.
pub fn with_task<R>(pid: Pid, f: impl FnOnce(&mut Task) -> R) -> Result<R, Errno> {
	let mut pool = POOL.lock();
	let slot = pool.tasks.get_mut(pid as usize).ok_or(ESRCH)?;
	let task = slot.as_mut().ok_or(ESRCH)?;
	Ok(f(task))
}

/// Allocates a free slot in the task pool, running `init` on the new,
/// otherwise-default task before it becomes visible to other tasks.
fn alloc_slot(init: impl FnOnce(&mut Task)) -> Result<Pid, Errno> {
	let mut pool = POOL.lock();
	let idx = pool.tasks.iter().position(Option::is_none).ok_or(EAGAIN)?;
	let mut task = Task::empty(idx as Pid);
	init(&mut task);
	pool.tasks[idx] = Some(task);
	Ok(idx as Pid)
}

/// Frees a task's slot, releasing its kernel stack and TSS descriptor. The
/// caller must have already destroyed its address space.
fn free_slot(pid: Pid) {
	let mut pool = POOL.lock();
	if let Some(task) = pool.tasks[pid as usize].take() {
		frame::free_frames(task.kstack_phys, KERNEL_STACK_PAGES);
		crate::gdt::free_tss(task.tss_slot);
	}
}

/// Allocates a kernel stack and TSS descriptor for a new task and puts it
/// on the ready queue. Shared by `fork` and `init`'s boot-time spawn of the
/// per-tty shell tasks.
pub(crate) fn spawn_with(
	name: &[u8],
	parent: Option<Pid>,
	addr_space: AddressSpace,
	entry_eip: u32,
	entry_esp: u32,
) -> Result<Pid, Errno> {
	let kstack_phys = frame::alloc_frames(KERNEL_STACK_PAGES)?;
	let kstack_top = (kstack_phys + KERNEL_STACK_PAGES * PAGE_SIZE) as u32;
	let cr3 = addr_space.pd_phys();
	let tss_slot_selector = crate::gdt::alloc_tss(kstack_top, cr3, entry_eip, entry_esp);
	let tss_slot = ((tss_slot_selector as usize) - crate::gdt::TSS_BASE_OFFSET) / 8;

	let pid = alloc_slot(|t| {
		t.set_name(name);
		t.parent = parent;
		t.state = State::Ready;
		t.addr_space = Some(addr_space);
		t.kstack_phys = kstack_phys;
		t.tss_slot = tss_slot;
	})?;
	scheduler::enqueue_ready(pid);
	Ok(pid)
}

/// Duplicates the calling task: new task slot, copied address space, copied
/// fd table (ref-counted), same name, parent set to the caller. Enqueues
/// the child ready before returning so both parent and child are eligible;
/// no guarantee is made about which runs first.
pub fn fork() -> Result<Pid, Errno> {
	let parent_pid = scheduler::current_pid();
	let (name, addr_space, fds, eip, esp) = with_task(parent_pid, |p| {
		let addr_space = p.addr_space.as_ref().ok_or(ESRCH)?.copy_uvm()?;
		let fds = p.fds.clone();
		let (eip, esp) = switch::saved_user_frame(p.tss_slot);
		Ok::<_, Errno>((p.name, addr_space, fds, eip, esp))
	})??;

	let pid = spawn_with(&name, Some(parent_pid), addr_space, eip, esp)?;
	with_task(pid, |t| t.fds = fds)?;
	// The child's saved return register is overwritten to 0 so it observes
	// fork's return value as 0; the parent keeps observing the child pid
	// from its own normal syscall return path.
	switch::set_saved_return_value(pid, 0);
	Ok(pid)
}

/// Closes every open fd, re-parents every child to the first task (pid 0),
/// waking it if any child is already a zombie, wakes the parent if it is
/// waiting, records the exit status, and marks the task a zombie. The
/// address space and kernel stack are freed later, by `wait`.
pub fn exit(pid: Pid, status: i32) {
	let parent = with_task(pid, |t| {
		for fd in t.fds.iter_mut() {
			*fd = None;
		}
		t.exit_status = status;
		t.state = State::Zombie;
		t.parent
	})
	.unwrap_or(None);

	let mut orphaned_zombie = false;
	{
		let mut pool = POOL.lock();
		for slot in pool.tasks.iter_mut() {
			if let Some(t) = slot {
				if t.parent == Some(pid) {
					t.parent = Some(0);
					if t.state == State::Zombie {
						orphaned_zombie = true;
					}
				}
			}
		}
	}
	if orphaned_zombie && pid != 0 {
		scheduler::wake(0);
	}
	if let Some(parent_pid) = parent {
		scheduler::wake(parent_pid);
	}
	scheduler::retire_current();
}

/// Scans for a zombie child of `pid`. If found, frees its address space and
/// kernel stack, frees its slot, and returns `(child_pid, status)`. Returns
/// `Ok(None)` (not an error) if `pid` has no zombie child right now, so the
/// syscall layer can loop: mark self waiting, dispatch, retry on wake.
pub fn reap_zombie_child(pid: Pid) -> Result<Option<(Pid, i32)>, Errno> {
	let mut pool = POOL.lock();
	let found = pool.tasks.iter().enumerate().find_map(|(i, slot)| {
		let t = slot.as_ref()?;
		if t.parent == Some(pid) && t.state == State::Zombie {
			Some(i as Pid)
		} else {
			None
		}
	});
	let Some(child_pid) = found else {
		return Ok(None);
	};
	let (status, addr_space, kstack_phys, tss_slot) = {
		let t = pool.tasks[child_pid as usize].take().unwrap();
		(t.exit_status, t.addr_space, t.kstack_phys, t.tss_slot)
	};
	drop(pool);
	if let Some(a) = addr_space {
		a.destroy_uvm();
	}
	frame::free_frames(kstack_phys, KERNEL_STACK_PAGES);
	crate::gdt::free_tss(tss_slot);
	Ok(Some((child_pid, status)))
}

/// Returns `true` if `pid` has no children at all (used by a parent about
/// to wait, to distinguish "no zombie yet" from "nothing to ever wait
/// for" — the spec leaves the latter's exact user-facing error to the
/// syscall layer, which returns `ECHILD`-equivalent via `ESRCH`).
pub fn has_any_child(pid: Pid) -> bool {
	POOL.lock()
		.tasks
		.iter()
		.flatten()
		.any(|t| t.parent == Some(pid))
}

/// Copies `n` bytes from a byte slice into the task's address space,
/// expanding `heap_end` if needed. Used by `execve`'s argv/envp setup and
/// `sbrk`.
pub fn grow_heap(pid: Pid, increment: i32) -> Result<u32, Errno> {
	if increment < 0 {
		return Err(EINVAL);
	}
	with_task(pid, |t| {
		let old_end = t.heap_end;
		let new_end = old_end
			.checked_add(increment as u32)
			.ok_or(ENOMEM)?;
		let old_page = old_end & !(PAGE_SIZE as u32 - 1);
		let new_page_end = (new_end + PAGE_SIZE as u32 - 1) & !(PAGE_SIZE as u32 - 1);
		let addr_space = t.addr_space.as_ref().ok_or(ESRCH)?;
		if new_page_end > old_page || old_end == old_page {
			let mut vaddr = if old_end == t.heap_start { old_page } else { old_page + PAGE_SIZE as u32 };
			while vaddr < new_page_end {
				if addr_space.get_paddr(vaddr).is_none() {
					addr_space.alloc_for(
						vaddr,
						PAGE_SIZE,
						crate::memory::vmem::x86::EntryFlags::WRITABLE | crate::memory::vmem::x86::EntryFlags::USER,
					)?;
				}
				vaddr += PAGE_SIZE as u32;
			}
		}
		t.heap_end = new_end;
		Ok(old_end)
	})?
}
