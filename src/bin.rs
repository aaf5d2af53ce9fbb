//! This module exists only to pull in the kernel, compiled as a library,
//! and link it against the assembly boot stub (`libkestrel.a`, linked by
//! `build.rs`) that sets up a stack and calls `kernel_main`.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(kestrel_kernel::selftest::runner)]

extern crate kestrel_kernel;
