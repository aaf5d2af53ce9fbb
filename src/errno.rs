//! Kernel-internal error codes.
//!
//! Kernel helpers return `KResult<T>` rather than raw ints; syscall handlers
//! collapse the `Err` case to the negative numeric id expected by user space.

/// A kernel error code. Negative by convention when crossing the syscall
/// boundary, but the newtype itself carries no sign requirement.
pub type Errno = i32;

/// Result type used throughout the kernel for fallible operations.
pub type KResult<T> = Result<T, Errno>;

/// Operation not permitted.
pub const EPERM: Errno = 1;
/// No such file or directory.
pub const ENOENT: Errno = 2;
/// No such process.
pub const ESRCH: Errno = 3;
/// Interrupted syscall.
pub const EINTR: Errno = 4;
/// I/O error.
pub const EIO: Errno = 5;
/// No such device or address.
pub const ENXIO: Errno = 6;
/// Bad file descriptor.
pub const EBADF: Errno = 9;
/// Try again (resource momentarily unavailable).
pub const EAGAIN: Errno = 11;
/// Out of memory.
pub const ENOMEM: Errno = 12;
/// Bad address.
pub const EFAULT: Errno = 14;
/// Device or resource busy.
pub const EBUSY: Errno = 16;
/// File exists.
pub const EEXIST: Errno = 17;
/// No such device.
pub const ENODEV: Errno = 19;
/// Not a directory.
pub const ENOTDIR: Errno = 20;
/// Is a directory.
pub const EISDIR: Errno = 21;
/// Invalid argument.
pub const EINVAL: Errno = 22;
/// Too many open files.
pub const EMFILE: Errno = 24;
/// Inappropriate ioctl for device (used for `isatty` on non-tty fds).
pub const ENOTTY: Errno = 25;
/// No space left on device.
pub const ENOSPC: Errno = 28;
/// Function not implemented.
pub const ENOSYS: Errno = 38;

/// Converts a [`KResult`] into the raw signed return value handed back to
/// user space across the call gate: `Ok(n)` becomes `n as isize`, `Err(e)`
/// becomes `-e as isize`.
pub fn to_retval(res: KResult<usize>) -> isize {
	match res {
		Ok(n) => n as isize,
		Err(e) => -(e as isize),
	}
}
