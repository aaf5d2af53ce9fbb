//! PS/2 keyboard scan-code decoding: tracks the E0/E1 prefix state and
//! shift/ctrl/alt/caps modifiers, maps to ASCII, and deposits bytes into
//! the currently selected virtual terminal's input FIFO. Function keys
//! F1..F8 switch the active tty instead of producing a byte.

use crate::io::{inb, outb};
use crate::sync::IntMutex;

const DATA_PORT: u16 = 0x60;
const STATUS_PORT: u16 = 0x64;

const SCAN_RELEASE_BIT: u8 = 0x80;

const LSHIFT: u8 = 0x2a;
const RSHIFT: u8 = 0x36;
const CTRL: u8 = 0x1d;
const ALT: u8 = 0x38;
const CAPSLOCK: u8 = 0x3a;
const F1: u8 = 0x3b;
const F8: u8 = 0x42;

#[derive(Clone, Copy, Default)]
struct Modifiers {
	shift: bool,
	ctrl: bool,
	alt: bool,
	caps: bool,
	extended: bool,
}

static STATE: IntMutex<Modifiers> = IntMutex::new(Modifiers {
	shift: false,
	ctrl: false,
	alt: false,
	caps: false,
	extended: false,
});

/// US QWERTY lower-case scan-code-to-ASCII table, indices 0..=0x39.
const LOWER: [u8; 0x3a] = [
	0, 27, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 8, b'\t', b'q', b'w', b'e', b'r',
	b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\r', 0, b'a', b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l',
	b';', b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/', 0, b'*', 0, b' ',
];

const UPPER: [u8; 0x3a] = [
	0, 27, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 8, b'\t', b'Q', b'W', b'E', b'R',
	b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\r', 0, b'A', b'S', b'D', b'F', b'G', b'H', b'J', b'K', b'L',
	b':', b'"', b'~', 0, b'|', b'Z', b'X', b'C', b'V', b'B', b'N', b'M', b'<', b'>', b'?', 0, b'*', 0, b' ',
];

fn ascii_for(code: u8, mods: Modifiers) -> Option<u8> {
	if code as usize >= LOWER.len() {
		return None;
	}
	let is_letter = (0x10..=0x19).contains(&code) || (0x1e..=0x26).contains(&code) || (0x2c..=0x32).contains(&code);
	let shifted = mods.shift ^ (mods.caps && is_letter);
	let table = if shifted { &UPPER } else { &LOWER };
	let c = table[code as usize];
	if c == 0 {
		None
	} else {
		Some(c)
	}
}

fn set_leds(caps: bool) {
	unsafe {
		while inb(STATUS_PORT) & 0x02 != 0 {}
		outb(DATA_PORT, 0xed);
		while inb(STATUS_PORT) & 0x02 != 0 {}
		outb(DATA_PORT, if caps { 0x04 } else { 0x00 });
	}
}

/// Called from the IRQ1 handler. Reads one scan code and, depending on the
/// modifier/state machine, either updates modifier state, switches the
/// active tty (F1..F8), or deposits a decoded ASCII byte into the active
/// tty's input FIFO.
pub fn handle_irq() {
	let code = unsafe { inb(DATA_PORT) };

	if code == 0xe0 {
		STATE.lock().extended = true;
		return;
	}

	let released = code & SCAN_RELEASE_BIT != 0;
	let code = code & !SCAN_RELEASE_BIT;

	{
		let mut s = STATE.lock();
		match code {
			LSHIFT | RSHIFT => {
				s.shift = !released;
				return;
			}
			CTRL => {
				s.ctrl = !released;
				return;
			}
			ALT => {
				s.alt = !released;
				return;
			}
			CAPSLOCK => {
				if !released {
					s.caps = !s.caps;
					set_leds(s.caps);
				}
				return;
			}
			_ => {}
		}
		s.extended = false;
	}

	if released {
		return;
	}

	if (F1..=F8).contains(&code) {
		crate::tty::console::select((code - F1) as usize);
		return;
	}

	let mods = *STATE.lock();
	if let Some(c) = ascii_for(code, mods) {
		crate::tty::active_tty().input_produce(c);
	}
}
