//! Thin glue between the scheduler's notion of a task and the GDT's TSS
//! pool, for the few places process lifecycle code needs to read or patch a
//! task's saved hardware context directly (fork's child frame, exec's
//! address-space handoff).

use super::Pid;

/// Returns the `(eip, esp)` pair currently saved in `pid`'s TSS, i.e. where
/// it will resume when next dispatched.
pub fn saved_user_frame(tss_slot: usize) -> (u32, u32) {
	let mut eip = 0;
	let mut esp = 0;
	crate::gdt::update_tss(tss_slot, |t| {
		eip = t.eip;
		esp = t.esp;
	});
	(eip, esp)
}

/// Forces the saved `eax` of `pid` to `value`. Used so a newly forked child
/// observes `fork() == 0` the first time it is dispatched, without
/// disturbing the parent's own in-flight return value.
pub fn set_saved_return_value(pid: Pid, value: u32) {
	let _ = super::with_task(pid, |t| {
		let slot = t.tss_slot;
		crate::gdt::update_tss(slot, |tss| tss.eax = value);
	});
}

/// Updates the saved `cr3` of `pid`'s TSS after its address space changes
/// (exec switching to a fresh directory), so a later preemption of the new
/// program saves and restores it under the right address space.
pub fn rewrite_cr3(pid: Pid, cr3: u32) {
	let _ = super::with_task(pid, |t| {
		let slot = t.tss_slot;
		crate::gdt::update_tss(slot, |tss| tss.cr3 = cr3);
	});
}
