//! Synchronization primitives.
//!
//! Two mutex flavours are used across the kernel, matching the split called
//! for by the concurrency model: structures touched from interrupt context
//! (scheduler queues, tty FIFOs, the frame allocator) are protected by
//! [`IntMutex`], a spinlock that also disables interrupts for the duration of
//! the critical section; structures only ever touched from task context
//! (filesystems, consoles, the open-file table, the GDT allocator) use the
//! plain [`Mutex`]/[`RwLock`] from the `spin` crate.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

pub use spin::{Mutex, RwLock};

mod semaphore;
pub use semaphore::Semaphore;

/// Disables interrupts and returns the previous value of `eflags.IF`.
#[inline(always)]
fn irq_disable() -> bool {
	let flags: u32;
	unsafe {
		core::arch::asm!("pushfd; pop {0}; cli", out(reg) flags);
	}
	(flags & (1 << 9)) != 0
}

/// Restores `eflags.IF` to `was_enabled`.
#[inline(always)]
fn irq_restore(was_enabled: bool) {
	if was_enabled {
		unsafe {
			core::arch::asm!("sti");
		}
	}
}

/// A spinlock that disables interrupts while held.
///
/// Used for any structure that is mutated both from task context and from an
/// interrupt handler (the scheduler's ready/sleep/wait queues, tty FIFOs, the
/// frame allocator bitmap). Without disabling interrupts, a handler
/// preempting the lock holder on the same CPU would deadlock spinning on a
/// lock it already owns.
pub struct IntMutex<T: ?Sized> {
	locked: AtomicBool,
	data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Sync for IntMutex<T> {}
unsafe impl<T: ?Sized + Send> Send for IntMutex<T> {}

impl<T> IntMutex<T> {
	/// Creates a new unlocked mutex wrapping `data`.
	pub const fn new(data: T) -> Self {
		Self {
			locked: AtomicBool::new(false),
			data: UnsafeCell::new(data),
		}
	}
}

impl<T: ?Sized> IntMutex<T> {
	/// Disables interrupts, spins until the lock is acquired, and returns a
	/// guard that releases the lock and restores the prior interrupt state
	/// when dropped.
	pub fn lock(&self) -> IntMutexGuard<'_, T> {
		let was_enabled = irq_disable();
		while self
			.locked
			.compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
			.is_err()
		{
			core::hint::spin_loop();
		}
		IntMutexGuard {
			lock: self,
			was_enabled,
		}
	}
}

/// RAII guard for [`IntMutex`]. Restores `eflags.IF` on drop, so a nested
/// critical section inside an already-interrupts-disabled path never
/// re-enables interrupts prematurely.
pub struct IntMutexGuard<'a, T: ?Sized> {
	lock: &'a IntMutex<T>,
	was_enabled: bool,
}

impl<'a, T: ?Sized> Deref for IntMutexGuard<'a, T> {
	type Target = T;
	fn deref(&self) -> &T {
		unsafe { &*self.lock.data.get() }
	}
}

impl<'a, T: ?Sized> DerefMut for IntMutexGuard<'a, T> {
	fn deref_mut(&mut self) -> &mut T {
		unsafe { &mut *self.lock.data.get() }
	}
}

impl<'a, T: ?Sized> Drop for IntMutexGuard<'a, T> {
	fn drop(&mut self) {
		self.lock.locked.store(false, Ordering::Release);
		irq_restore(self.was_enabled);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test_case]
	fn basic_lock_unlock() {
		let m = IntMutex::new(0u32);
		*m.lock() = 42;
		assert_eq!(*m.lock(), 42);
	}
}
