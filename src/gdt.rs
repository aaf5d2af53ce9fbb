//! The Global Descriptor Table: kernel/user code and data segments, a call
//! gate for the syscall entry point, and one Task State Segment descriptor
//! per task slot.
//!
//! Hardware task switching (a `ljmp` to a TSS selector) is how the scheduler
//! performs a context switch, so every task needs its own TSS descriptor
//! for the lifetime of its slot in the task pool.

use crate::process::MAX_TASKS;
use crate::sync::Mutex;
use core::arch::asm;
use core::mem::size_of;

/// The offset of the kernel code segment.
pub const KERNEL_CS: usize = 8;
/// The offset of the kernel data segment.
pub const KERNEL_DS: usize = 16;
/// The offset of the user code segment.
pub const USER_CS: usize = 24;
/// The offset of the user data segment.
pub const USER_DS: usize = 32;
/// The offset of the syscall call gate descriptor.
pub const CALL_GATE_OFFSET: usize = 40;
/// The offset of the first per-task TSS descriptor.
pub const TSS_BASE_OFFSET: usize = 48;

/// Number of fixed (non-TSS) descriptors before the TSS pool.
const FIXED_ENTRIES: usize = TSS_BASE_OFFSET / 8;
/// Total GDT entries: the fixed ones plus one TSS descriptor per task slot.
const GDT_ENTRIES: usize = FIXED_ENTRIES + MAX_TASKS;

/// A raw 8-byte GDT entry (also reused, bit-for-bit, as one half of a
/// 16-byte call-gate or TSS descriptor on IA-32; the upper half is written
/// through [`set_base`]/[`set_limit`] just the same).
#[repr(transparent)]
#[derive(Clone, Copy, Default)]
pub struct Entry(pub u64);

impl Entry {
	#[inline(always)]
	pub fn get_base(&self) -> u32 {
		(((self.0 >> 16) & 0xffffff) | ((self.0 >> 32) & 0xff00_0000)) as _
	}

	#[inline(always)]
	pub fn set_base(&mut self, base: u32) {
		self.0 &= !(0xffffffu64 << 16);
		self.0 &= !(0xffu64 << 56);
		self.0 |= (base as u64 & 0xffffff) << 16;
		self.0 |= ((base as u64 >> 24) & 0xff) << 56;
	}

	#[inline(always)]
	pub fn get_limit(&self) -> u32 {
		((self.0 & 0xffff) | (((self.0 >> 48) & 0xf) << 16)) as _
	}

	#[inline(always)]
	pub fn set_limit(&mut self, limit: u32) {
		self.0 &= !0xffffu64;
		self.0 &= !(0xfu64 << 48);
		self.0 |= limit as u64 & 0xffff;
		self.0 |= ((limit as u64 >> 16) & 0xf) << 48;
	}

	#[inline(always)]
	pub fn set_access_byte(&mut self, byte: u8) {
		self.0 &= !(0xffu64 << 40);
		self.0 |= (byte as u64) << 40;
	}

	#[inline(always)]
	pub fn set_flags(&mut self, flags: u8) {
		self.0 &= !(0x0fu64 << 52);
		self.0 |= ((flags as u64) & 0x0f) << 52;
	}
}

/// Raw x86 Task State Segment. Only the fields the hardware switch actually
/// reads at the moment of a task switch are meaningfully populated; I/O
/// bitmap support is not needed since user tasks never issue `in`/`out`.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Tss {
	pub link: u16,
	_r0: u16,
	pub esp0: u32,
	pub ss0: u16,
	_r1: u16,
	pub esp1: u32,
	pub ss1: u16,
	_r2: u16,
	pub esp2: u32,
	pub ss2: u16,
	_r3: u16,
	pub cr3: u32,
	pub eip: u32,
	pub eflags: u32,
	pub eax: u32,
	pub ecx: u32,
	pub edx: u32,
	pub ebx: u32,
	pub esp: u32,
	pub ebp: u32,
	pub esi: u32,
	pub edi: u32,
	pub es: u16,
	_r4: u16,
	pub cs: u16,
	_r5: u16,
	pub ss: u16,
	_r6: u16,
	pub ds: u16,
	_r7: u16,
	pub fs: u16,
	_r8: u16,
	pub gs: u16,
	_r9: u16,
	pub ldt: u16,
	_r10: u16,
	pub trap: u16,
	pub iomap_base: u16,
}

impl Tss {
	pub const fn zeroed() -> Self {
		// SAFETY: an all-zero TSS is a valid (if useless) TSS; every field
		// is populated explicitly before the descriptor referencing it is
		// ever marked present.
		unsafe { core::mem::zeroed() }
	}
}

struct GdtState {
	table: [Entry; GDT_ENTRIES],
	tss_pool: [Tss; MAX_TASKS],
	free_tss: [bool; MAX_TASKS],
}

static GDT: Mutex<GdtState> = Mutex::new(GdtState {
	table: [Entry(0); GDT_ENTRIES],
	tss_pool: [Tss::zeroed(); MAX_TASKS],
	free_tss: [true; MAX_TASKS],
});

#[repr(C, packed)]
struct GdtDescriptor {
	limit: u16,
	base: u32,
}

/// Builds the fixed segment descriptors (null, kernel/user code/data) and
/// the syscall call gate, then loads the GDT register. Must run once,
/// early in arch init, before any far jump or call-gate invocation.
pub fn init(syscall_entry: extern "C" fn()) {
	let mut g = GDT.lock();

	set_code_data(&mut g.table[1], 0x9a); // kernel code, ring 0
	set_code_data(&mut g.table[2], 0x92); // kernel data, ring 0
	set_code_data(&mut g.table[3], 0xfa); // user code, ring 3
	set_code_data(&mut g.table[4], 0xf2); // user data, ring 3

	set_call_gate(&mut g.table[5], syscall_entry as u32);

	drop(g);
	flush();
}

fn set_code_data(e: &mut Entry, access: u8) {
	e.set_base(0);
	e.set_limit(0xfffff);
	e.set_access_byte(access);
	e.set_flags(0xc); // 4K granularity, 32-bit
}

/// A call gate descriptor has the same 8-byte shape as a segment descriptor
/// but interprets the fields differently: selector:offset of the entry
/// point, a fixed argument count, and a type of `0xec` (present, ring 3
/// accessible, 32-bit call gate, 4 params matching the {id, arg0..arg3}
/// frame).
fn set_call_gate(e: &mut Entry, entry_point: u32) {
	let selector = KERNEL_CS as u64;
	let offset_low = entry_point as u64 & 0xffff;
	let offset_high = (entry_point as u64 >> 16) & 0xffff;
	let param_count = 4u64;
	let access = 0xecu64; // present, DPL=3, type=1100 (32-bit call gate)
	e.0 = offset_low | (selector << 16) | (param_count << 32) | (access << 40) | (offset_high << 48);
}

/// Allocates a TSS slot from the pool for a newly created task, writes its
/// initial fields, and installs (or refreshes) the corresponding GDT
/// descriptor. Returns the GDT selector for the task's TSS.
pub fn alloc_tss(kernel_stack_top: u32, cr3: u32, entry_eip: u32, entry_esp: u32) -> u16 {
	let mut g = GDT.lock();
	let slot = g
		.free_tss
		.iter()
		.position(|f| *f)
		.expect("out of TSS descriptor slots");
	g.free_tss[slot] = false;

	g.tss_pool[slot] = Tss::zeroed();
	{
		let t = &mut g.tss_pool[slot];
		t.ss0 = KERNEL_DS as u16;
		t.esp0 = kernel_stack_top;
		t.cr3 = cr3;
		t.eip = entry_eip;
		t.esp = entry_esp;
		t.eflags = 1 << 9; // IF set
		t.cs = make_segment_selector(USER_CS as u32, 3);
		t.ds = make_segment_selector(USER_DS as u32, 3);
		t.es = t.ds;
		t.fs = t.ds;
		t.gs = t.ds;
		t.ss = t.ds;
		t.iomap_base = size_of::<Tss>() as u16;
	}

	let tss_ptr = core::ptr::addr_of!(g.tss_pool[slot]) as u32;
	let offset = TSS_BASE_OFFSET + slot * 8;
	let entry = &mut g.table[offset / 8];
	entry.set_base(tss_ptr);
	entry.set_limit((size_of::<Tss>() - 1) as u32);
	entry.set_access_byte(0x89); // present, ring 0, 32-bit TSS (available)
	entry.set_flags(0x0);

	make_segment_selector(offset as u32, 0)
}

/// Allocates a TSS descriptor for a task that runs in ring 0 forever (the
/// idle task): unlike [`alloc_tss`], `cs`/`ss` stay the kernel selectors, so
/// the far jump into it never crosses a privilege level.
pub fn alloc_kernel_tss(kernel_stack_top: u32, cr3: u32, entry_eip: u32) -> u16 {
	let mut g = GDT.lock();
	let slot = g
		.free_tss
		.iter()
		.position(|f| *f)
		.expect("out of TSS descriptor slots");
	g.free_tss[slot] = false;

	g.tss_pool[slot] = Tss::zeroed();
	{
		let t = &mut g.tss_pool[slot];
		t.ss0 = KERNEL_DS as u16;
		t.esp0 = kernel_stack_top;
		t.cr3 = cr3;
		t.eip = entry_eip;
		t.esp = kernel_stack_top;
		t.eflags = 1 << 9; // IF set
		t.cs = KERNEL_CS as u16;
		t.ds = KERNEL_DS as u16;
		t.es = t.ds;
		t.fs = t.ds;
		t.gs = t.ds;
		t.ss = t.ds;
		t.iomap_base = size_of::<Tss>() as u16;
	}

	let tss_ptr = core::ptr::addr_of!(g.tss_pool[slot]) as u32;
	let offset = TSS_BASE_OFFSET + slot * 8;
	let entry = &mut g.table[offset / 8];
	entry.set_base(tss_ptr);
	entry.set_limit((size_of::<Tss>() - 1) as u32);
	entry.set_access_byte(0x89);
	entry.set_flags(0x0);

	make_segment_selector(offset as u32, 0)
}

/// Updates the saved register snapshot of an already-allocated TSS slot,
/// e.g. after a task is rescheduled with different hardware state.
pub fn update_tss(slot: usize, f: impl FnOnce(&mut Tss)) {
	let mut g = GDT.lock();
	f(&mut g.tss_pool[slot]);
}

/// Releases a TSS slot back to the pool when its task is reaped.
pub fn free_tss(slot: usize) {
	let mut g = GDT.lock();
	g.free_tss[slot] = true;
}

/// Creates a segment selector for the given segment offset and ring.
#[inline(always)]
pub fn make_segment_selector(offset: u32, ring: u32) -> u16 {
	debug_assert!(ring <= 3);
	(offset | ring) as _
}

/// Loads the task register with `slot`'s TSS selector via `ltr`, without
/// performing a task switch.
///
/// `ljmp`/`lcall` to a TSS only ever *saves* the outgoing task's state —
/// into whatever TSS TR currently names — so TR must already hold a valid,
/// marked-busy TSS before the very first [`switch_to`] is reached, or that
/// save has nowhere safe to go. Init calls this once, with the idle task's
/// slot, right before enabling interrupts and dispatching for the first
/// time.
///
/// # Safety
///
/// Must be called exactly once, before any interrupt that could preempt
/// into [`switch_to`] is possible, and `slot` must refer to a live TSS.
pub unsafe fn load_initial_tr(slot: usize) {
	let offset = TSS_BASE_OFFSET + slot * 8;
	let selector = make_segment_selector(offset as u32, 0);
	asm!("ltr {0:x}", in(reg) selector, options(nostack));
}

/// Performs a hardware task switch by far-jumping to the TSS selector
/// allocated for `slot`.
///
/// # Safety
///
/// `slot` must refer to a live, fully-initialized TSS descriptor; the
/// caller must have interrupts disabled and must not be holding any lock
/// that the switched-to task might also need, since control does not return
/// here until this task is switched back to.
pub unsafe fn switch_to(slot: usize) {
	#[repr(C, packed)]
	struct FarPtr {
		offset: u32,
		selector: u16,
	}
	let offset = TSS_BASE_OFFSET + slot * 8;
	let far_ptr = FarPtr {
		offset: 0,
		selector: make_segment_selector(offset as u32, 0),
	};
	asm!("ljmp [{0}]", in(reg) &far_ptr, options(nostack));
}

/// Loads `cr3` and transfers directly into ring 3 at `(eip, esp)`, never
/// returning to the caller.
///
/// `execve` uses this instead of returning through the call gate: the
/// hardware only reloads a task's `eip`/`esp`/`cr3` from its TSS at the
/// moment of a task switch, and this task's own TSS fields would simply be
/// overwritten with its live (mid-syscall) state the next time it is
/// switched out. Jumping to the new program directly sidesteps that — the
/// in-memory TSS is still kept in sync via [`update_tss`] so a later
/// preemption saves and restores the *new* context correctly.
///
/// # Safety
///
/// `cr3` must map `eip` as user-executable and `esp` as a valid user stack;
/// the caller must not be holding any lock.
pub unsafe fn enter_user_mode(cr3: u32, eip: u32, esp: u32) -> ! {
	let cs = make_segment_selector(USER_CS as u32, 3) as u32;
	let ss = make_segment_selector(USER_DS as u32, 3) as u32;
	let eflags: u32 = 1 << 9; // IF set
	asm!(
		"cli",
		"mov ax, {ss:x}",
		"mov ds, ax",
		"mov es, ax",
		"mov fs, ax",
		"mov gs, ax",
		"mov cr3, {cr3}",
		"push {ss}",
		"push {esp}",
		"push {eflags}",
		"push {cs}",
		"push {eip}",
		"iretd",
		ss = in(reg) ss,
		cr3 = in(reg) cr3,
		esp = in(reg) esp,
		eflags = in(reg) eflags,
		cs = in(reg) cs,
		eip = in(reg) eip,
		options(noreturn)
	);
}

/// Refreshes the GDT register (`lgdt`) and segment registers from the
/// current table contents.
pub fn flush() {
	let g = GDT.lock();
	let desc = GdtDescriptor {
		limit: (size_of::<[Entry; GDT_ENTRIES]>() - 1) as u16,
		base: g.table.as_ptr() as u32,
	};
	unsafe {
		asm!(
			"lgdt [{0}]",
			"mov ax, {kds}",
			"mov ds, ax",
			"mov es, ax",
			"mov fs, ax",
			"mov gs, ax",
			"mov ss, ax",
			in(reg) &desc,
			kds = const KERNEL_DS,
			options(nostack)
		);
	}
}
