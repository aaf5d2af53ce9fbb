//! Virtual terminal multiplexer: a keyboard-fed input FIFO with line
//! discipline, and a console-fed output FIFO, one pair per virtual
//! terminal. This is component 13 of the core.

pub mod ansi;
pub mod console;

use crate::errno::Errno;
use crate::sync::{IntMutex, Semaphore};
use bitflags::bitflags;

bitflags! {
	/// Line-discipline mode flags.
	#[derive(Clone, Copy, Debug)]
	pub struct Mode: u32 {
		/// Echo input bytes back through the output path.
		const IECHO = 1 << 0;
		/// Translate input CR to CR+LF.
		const INCLR = 1 << 1;
		/// Translate output LF to CR+LF.
		const OCRLF = 1 << 2;
	}
}

impl Default for Mode {
	fn default() -> Self {
		Mode::IECHO | Mode::INCLR | Mode::OCRLF
	}
}

/// Number of virtual terminals the kernel multiplexes.
pub const NUM_TTYS: usize = 4;
const FIFO_SIZE: usize = 256;

struct Fifo {
	buf: [u8; FIFO_SIZE],
	head: usize,
	len: usize,
}

impl Fifo {
	const fn new() -> Self {
		Self {
			buf: [0; FIFO_SIZE],
			head: 0,
			len: 0,
		}
	}

	fn push(&mut self, b: u8) -> bool {
		if self.len == FIFO_SIZE {
			return false;
		}
		let idx = (self.head + self.len) % FIFO_SIZE;
		self.buf[idx] = b;
		self.len += 1;
		true
	}

	fn pop(&mut self) -> Option<u8> {
		if self.len == 0 {
			return None;
		}
		let b = self.buf[self.head];
		self.head = (self.head + 1) % FIFO_SIZE;
		self.len -= 1;
		Some(b)
	}

	fn pop_back(&mut self) -> Option<u8> {
		if self.len == 0 {
			return None;
		}
		self.len -= 1;
		let idx = (self.head + self.len) % FIFO_SIZE;
		Some(self.buf[idx])
	}
}

/// A single virtual terminal's input/output FIFOs and line-discipline mode.
pub struct Tty {
	minor: usize,
	input: IntMutex<Fifo>,
	input_sem: Semaphore,
	output: IntMutex<Fifo>,
	output_sem: Semaphore,
	mode: IntMutex<Mode>,
}

impl Tty {
	const fn new(minor: usize) -> Self {
		Self {
			minor,
			input: IntMutex::new(Fifo::new()),
			input_sem: Semaphore::new(0),
			output: IntMutex::new(Fifo::new()),
			output_sem: Semaphore::new(FIFO_SIZE as isize),
		}
	}

	/// Producer side, called from the keyboard IRQ handler for the
	/// currently selected tty. Handles DEL as a back-erase against the raw
	/// FIFO and otherwise deposits the byte, then wakes one waiting reader.
	pub fn input_produce(&self, c: u8) {
		const DEL: u8 = 0x7f;
		const BS: u8 = 8;
		if c == DEL || c == BS {
			let mut fifo = self.input.lock();
			if fifo.pop_back().is_some() {
				drop(fifo);
				self.input_sem.try_down();
				if self.mode.lock().contains(Mode::IECHO) {
					let _ = self.write(&[BS, b' ', BS]);
				}
			}
			return;
		}
		let pushed = self.input.lock().push(c);
		if pushed {
			self.input_sem.up();
			if self.mode.lock().contains(Mode::IECHO) {
				let echoed = if c == b'\r' && self.mode.lock().contains(Mode::INCLR) {
					[b'\r', b'\n']
				} else {
					[c, 0]
				};
				let n = if echoed[1] == 0 { 1 } else { 2 };
				let _ = self.write(&echoed[..n]);
			}
		}
	}

	/// Line-discipline read: waits for input, applies CR translation, and
	/// returns on newline or when `buf` is full, per `tty_read`.
	pub fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
		let mut n = 0;
		while n < buf.len() {
			self.input_sem.down();
			let Some(mut c) = self.input.lock().pop() else {
				continue;
			};
			if c == b'\r' && self.mode.lock().contains(Mode::INCLR) {
				c = b'\n';
			}
			buf[n] = c;
			n += 1;
			if c == b'\n' {
				break;
			}
		}
		Ok(n)
	}

	/// Line-discipline write: translates `\n` to `\r\n` when configured,
	/// pushes into the output FIFO (blocking on free slots), then drains
	/// whatever is queued through the bound console.
	pub fn write(&self, buf: &[u8]) -> Result<usize, Errno> {
		for &b in buf {
			if b == b'\n' && self.mode.lock().contains(Mode::OCRLF) {
				self.enqueue_output(b'\r');
			}
			self.enqueue_output(b);
		}
		self.drain_to_console();
		Ok(buf.len())
	}

	fn enqueue_output(&self, b: u8) {
		self.output_sem.down();
		self.output.lock().push(b);
	}

	fn drain_to_console(&self) {
		let console = console::get(self.minor);
		while let Some(b) = self.output.lock().pop() {
			self.output_sem.up();
			console.put_byte(b);
		}
	}

	pub fn set_mode(&self, mode: Mode) {
		*self.mode.lock() = mode;
	}

	pub fn minor(&self) -> usize {
		self.minor
	}
}

static TTYS: [Tty; NUM_TTYS] = [Tty::new(0), Tty::new(1), Tty::new(2), Tty::new(3)];

static ACTIVE: IntMutex<usize> = IntMutex::new(0);

/// Returns tty `minor`, or `ENXIO` if out of range.
pub fn get(minor: usize) -> Result<&'static Tty, Errno> {
	TTYS.get(minor).ok_or(crate::errno::ENXIO)
}

/// Returns the currently selected tty (the one keyboard input routes to).
pub fn active_tty() -> &'static Tty {
	&TTYS[*ACTIVE.lock()]
}

/// Switches which tty keyboard input is delivered to. Distinct from
/// [`console::select`], which switches which tty's *video* is displayed —
/// the two are kept in lock-step by [`device::keyboard`]'s F-key handler,
/// but are conceptually independent per the spec's data model.
pub fn select_active_input(minor: usize) {
	if minor < NUM_TTYS {
		*ACTIVE.lock() = minor;
	}
}
