//! A [`log::Log`] implementation that writes to the serial port and to an
//! in-memory ring buffer, so `log::info!`/`log::warn!`/`log::error!` are the
//! one logging surface used across the kernel instead of ad-hoc prints.

use crate::io::{inb, outb};
use crate::sync::IntMutex;
use core::fmt::Write;
use log::{Level, LevelFilter, Log, Metadata, Record};

const COM1: u16 = 0x3f8;

/// Capacity of the in-memory log ring buffer, readable by the debug shell
/// command without needing the serial port to be attached to anything.
const RING_SIZE: usize = 16 * 1024;

struct RingBuffer {
	buf: [u8; RING_SIZE],
	head: usize,
	len: usize,
}

impl RingBuffer {
	const fn new() -> Self {
		Self {
			buf: [0; RING_SIZE],
			head: 0,
			len: 0,
		}
	}

	fn push(&mut self, bytes: &[u8]) {
		for &b in bytes {
			let idx = (self.head + self.len) % RING_SIZE;
			self.buf[idx] = b;
			if self.len < RING_SIZE {
				self.len += 1;
			} else {
				self.head = (self.head + 1) % RING_SIZE;
			}
		}
	}
}

static RING: IntMutex<RingBuffer> = IntMutex::new(RingBuffer::new());

struct Serial;

impl Serial {
	fn init(&self) {
		unsafe {
			outb(COM1 + 1, 0x00); // disable interrupts
			outb(COM1 + 3, 0x80); // enable DLAB
			outb(COM1 + 0, 0x03); // divisor low: 38400 baud
			outb(COM1 + 1, 0x00); // divisor high
			outb(COM1 + 3, 0x03); // 8 bits, no parity, one stop bit
			outb(COM1 + 2, 0xc7); // enable FIFO, clear, 14-byte threshold
			outb(COM1 + 4, 0x0b); // IRQs enabled, RTS/DSR set
		}
	}

	fn putc(&self, c: u8) {
		unsafe {
			while inb(COM1 + 5) & 0x20 == 0 {}
			outb(COM1, c);
		}
	}
}

impl Write for Serial {
	fn write_str(&mut self, s: &str) -> core::fmt::Result {
		for b in s.bytes() {
			if b == b'\n' {
				self.putc(b'\r');
			}
			self.putc(b);
		}
		Ok(())
	}
}

struct KernelLogger;

impl Log for KernelLogger {
	fn enabled(&self, metadata: &Metadata) -> bool {
		metadata.level() <= Level::Trace
	}

	fn log(&self, record: &Record) {
		if !self.enabled(record.metadata()) {
			return;
		}
		let mut serial = Serial;
		let _ = writeln!(serial, "[{:>5}] {}", record.level(), record.args());

		let mut line = heapless_line();
		use core::fmt::Write as _;
		let _ = write!(&mut line, "[{:>5}] {}\n", record.level(), record.args());
		RING.lock().push(line.as_bytes());
	}

	fn flush(&self) {}
}

/// Small fixed-capacity string used to format one log line without touching
/// the heap (the logger may run before [`crate::memory::heap::init`]).
struct LineBuf {
	buf: [u8; 256],
	len: usize,
}

fn heapless_line() -> LineBuf {
	LineBuf {
		buf: [0; 256],
		len: 0,
	}
}

impl core::fmt::Write for LineBuf {
	fn write_str(&mut self, s: &str) -> core::fmt::Result {
		let bytes = s.as_bytes();
		let n = bytes.len().min(self.buf.len() - self.len);
		self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
		self.len += n;
		Ok(())
	}
}

impl LineBuf {
	fn as_bytes(&self) -> &[u8] {
		&self.buf[..self.len]
	}
}

static LOGGER: KernelLogger = KernelLogger;

/// Initializes the serial port and registers the kernel logger as the
/// `log` crate's global logger. Must run as early as possible so later init
/// steps can log.
pub fn init() {
	Serial.init();
	log::set_logger(&LOGGER).expect("logger already set");
	log::set_max_level(LevelFilter::Trace);
}

/// Copies up to `buf.len()` of the most recent log bytes into `buf`,
/// returning the number of bytes copied. Used by a debug syscall/shell
/// command to inspect kernel history.
pub fn read_ring(buf: &mut [u8]) -> usize {
	let ring = RING.lock();
	let n = ring.len.min(buf.len());
	for i in 0..n {
		buf[i] = ring.buf[(ring.head + i) % RING_SIZE];
	}
	n
}
