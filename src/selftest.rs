//! Self-testing harness: `#[test_case]` functions scattered through the
//! module tree run against the same code linked into the bootable image,
//! under `cargo test`'s `custom_test_frameworks` runner.
//!
//! Running in-kernel rather than under a hosted test binary means most
//! `#[test_case]`s are careful to only exercise pure logic (parsing,
//! bitmap math, cluster-chain arithmetic) or to skip themselves when the
//! boot-time state they'd need isn't present, since the kernel cannot reset
//! itself between tests.

use core::any::type_name;

/// Anything that can be run as a self-test. Blanket-implemented for any
/// zero-argument closure, which is what `#[test_case]` fn items are.
pub trait Testable {
	fn run(&self);
}

impl<T: Fn()> Testable for T {
	fn run(&self) {
		let name = type_name::<T>();
		crate::print!("test {} ... ", name);
		self();
		crate::println!("ok");
	}
}

/// Entry point named by `#![test_runner]`. Runs every collected test in
/// order and halts — there is nowhere to return to in a `no_std` binary.
pub fn runner(tests: &[&dyn Testable]) -> ! {
	crate::println!("running {} tests", tests.len());
	for test in tests {
		test.run();
	}
	crate::println!("all tests passed");
	crate::debug::halt_forever();
}
