//! Fixed layout constants for the register file and stack.

/// Number of general-purpose registers.
pub const REGISTER_COUNT: usize = 16;

/// Number of 64-bit slots in the machine's private stack.
pub const STACK_SLOTS: usize = 4096;

/// Frame pointer alias.
pub const FP: u8 = 11;
/// Instruction pointer alias (reserved; not written by any instruction kind).
pub const IP: u8 = 12;
/// Stack pointer alias.
pub const SP: u8 = 13;
/// Link register alias.
pub const LR: u8 = 14;
/// Program counter alias.
pub const PC: u8 = 15;

/// Sentinel program counter value meaning "return from the top stack frame".
///
/// `lr` is initialized to this value on every `Machine::execute` call, so `jx lr`
/// at the outermost call frame halts the machine instead of jumping somewhere bogus.
pub const SENTINEL_PC: u64 = u64::MAX;
