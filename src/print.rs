//! `print!`/`println!` macros for kernel-internal diagnostics that should
//! reach the currently selected virtual terminal rather than (or in
//! addition to) the log ring.

use core::fmt;

#[doc(hidden)]
pub fn _print(args: fmt::Args) {
	use core::fmt::Write;
	let _ = write!(crate::tty::console::ActiveConsole, "{}", args);
}

/// Writes formatted text to the currently active console, with no trailing
/// newline.
#[macro_export]
macro_rules! print {
	($($arg:tt)*) => ($crate::print::_print(format_args!($($arg)*)));
}

/// Writes formatted text to the currently active console, followed by a
/// newline.
#[macro_export]
macro_rules! println {
	() => ($crate::print!("\n"));
	($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
