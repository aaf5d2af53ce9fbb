//! Minimal ANSI/VT100 escape sequence parser. Three states — normal,
//! `ESC` seen, and inside a CSI sequence — cover cursor movement, erase,
//! and SGR color selection, which is all the virtual terminals need.

use super::console::{ConsoleState, ParseState};

const ESC: u8 = 0x1b;

/// Feeds one byte through `c`'s parser state machine, rendering it or
/// updating parser/cursor/color state as appropriate.
pub fn handle_byte(c: &mut ConsoleState, b: u8) {
	match c.state {
		ParseState::Normal => {
			if b == ESC {
				c.state = ParseState::Esc;
			} else {
				c.putchar_raw(b);
			}
		}
		ParseState::Esc => {
			if b == b'[' {
				c.csi_len = 0;
				c.csi_params = [None; 10];
				c.state = ParseState::Csi;
			} else if b == b'7' {
				c.saved_x = c.cursor_x;
				c.saved_y = c.cursor_y;
				c.state = ParseState::Normal;
			} else if b == b'8' {
				c.cursor_x = c.saved_x;
				c.cursor_y = c.saved_y;
				c.state = ParseState::Normal;
			} else {
				c.state = ParseState::Normal;
			}
		}
		ParseState::Csi => handle_csi_byte(c, b),
	}
}

fn handle_csi_byte(c: &mut ConsoleState, b: u8) {
	match b {
		b'0'..=b'9' => {
			if c.csi_len == 0 {
				c.csi_len = 1;
			}
			let idx = c.csi_len - 1;
			if idx < c.csi_params.len() {
				let digit = (b - b'0') as u32;
				c.csi_params[idx] = Some(c.csi_params[idx].unwrap_or(0) * 10 + digit);
			}
		}
		b';' => {
			if c.csi_len < c.csi_params.len() {
				c.csi_len += 1;
			}
		}
		b'A' => {
			let n = param(c, 0, 1);
			c.cursor_y = c.cursor_y.saturating_sub(n as u16);
			c.state = ParseState::Normal;
		}
		b'B' => {
			let n = param(c, 0, 1);
			c.cursor_y = (c.cursor_y + n as u16).min(super::console::HEIGHT - 1);
			c.state = ParseState::Normal;
		}
		b'C' => {
			let n = param(c, 0, 1);
			c.cursor_x = (c.cursor_x + n as u16).min(super::console::WIDTH - 1);
			c.state = ParseState::Normal;
		}
		b'D' => {
			let n = param(c, 0, 1);
			c.cursor_x = c.cursor_x.saturating_sub(n as u16);
			c.state = ParseState::Normal;
		}
		b'H' | b'f' => {
			let row = param(c, 0, 1).max(1) - 1;
			let col = param(c, 1, 1).max(1) - 1;
			c.cursor_y = (row as u16).min(super::console::HEIGHT - 1);
			c.cursor_x = (col as u16).min(super::console::WIDTH - 1);
			c.state = ParseState::Normal;
		}
		b'J' => {
			c.erase_display(param(c, 0, 0));
			c.state = ParseState::Normal;
		}
		b'm' => {
			apply_sgr(c);
			c.state = ParseState::Normal;
		}
		0x40..=0x7e => {
			// Unrecognized final byte: drop the sequence.
			c.state = ParseState::Normal;
		}
		_ => {}
	}
}

fn param(c: &ConsoleState, idx: usize, default: u32) -> u32 {
	c.csi_params.get(idx).copied().flatten().unwrap_or(default)
}

fn apply_sgr(c: &mut ConsoleState) {
	let count = c.csi_len.max(1);
	for i in 0..count {
		match param(c, i, 0) {
			0 => {
				c.fg = super::console::COLOR_LIGHT_GREY;
				c.bg = super::console::COLOR_BLACK;
			}
			30 => c.fg = super::console::COLOR_BLACK,
			31 => c.fg = super::console::COLOR_RED,
			32 => c.fg = super::console::COLOR_GREEN,
			33 => c.fg = super::console::COLOR_BROWN,
			34 => c.fg = super::console::COLOR_BLUE,
			35 => c.fg = super::console::COLOR_MAGENTA,
			36 => c.fg = super::console::COLOR_CYAN,
			37 => c.fg = super::console::COLOR_LIGHT_GREY,
			40 => c.bg = super::console::COLOR_BLACK,
			41 => c.bg = super::console::COLOR_RED,
			42 => c.bg = super::console::COLOR_GREEN,
			43 => c.bg = super::console::COLOR_BROWN,
			44 => c.bg = super::console::COLOR_BLUE,
			45 => c.bg = super::console::COLOR_MAGENTA,
			46 => c.bg = super::console::COLOR_CYAN,
			47 => c.bg = super::console::COLOR_LIGHT_GREY,
			1 => {
				c.fg = match c.fg {
					super::console::COLOR_BLACK => super::console::COLOR_DARK_GREY,
					super::console::COLOR_RED => super::console::COLOR_LIGHT_RED,
					super::console::COLOR_GREEN => super::console::COLOR_LIGHT_GREEN,
					super::console::COLOR_BROWN => super::console::COLOR_YELLOW,
					super::console::COLOR_BLUE => super::console::COLOR_LIGHT_BLUE,
					super::console::COLOR_MAGENTA => super::console::COLOR_LIGHT_MAGENTA,
					super::console::COLOR_CYAN => super::console::COLOR_LIGHT_CYAN,
					other => other.max(super::console::COLOR_WHITE),
				}
			}
			_ => {}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test_case]
	fn csi_color_then_erase() {
		let mut c = ConsoleState::test_instance(0);
		for &b in b"\x1b[31;1m" {
			handle_byte(&mut c, b);
		}
		assert_eq!(c.fg, super::super::console::COLOR_LIGHT_RED);
	}

	#[test_case]
	fn cursor_position_sequence() {
		let mut c = ConsoleState::test_instance(1);
		for &b in b"\x1b[5;10H" {
			handle_byte(&mut c, b);
		}
		assert_eq!(c.cursor_y, 4);
		assert_eq!(c.cursor_x, 9);
	}
}
