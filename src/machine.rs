//! The Metro VM register file, stack, and execution loop.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::io::{self, Write};

use crate::constants::{self, LR, PC, SENTINEL_PC, SP};
use crate::instruction::{Instruction, Operand, Width};
use crate::memory;

/// Errors that can occur while `Machine::execute` is running a program.
///
/// Lex/parse errors are fatal-at-first-error by policy (see the `asm` crate);
/// runtime errors are instead surfaced as a typed `Result` so a hosting
/// process can choose how to react, per the design notes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RuntimeError {
    DivisionByZero,
    UndefinedLabel(String),
    UnknownSyscall(u64),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RuntimeError::DivisionByZero => write!(f, "division by zero"),
            RuntimeError::UndefinedLabel(name) => write!(f, "undefined label '{}'", name),
            RuntimeError::UnknownSyscall(value) => write!(f, "syscall {} not implemented", value),
        }
    }
}

impl StdError for RuntimeError {}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct CmpFlags {
    negative: bool,
    zero: bool,
}

/// A Metro VM. Owns its register file and a private 4096-slot stack.
pub struct Machine {
    registers: [u64; constants::REGISTER_COUNT],
    stack: [u64; constants::STACK_SLOTS],
    cmp_flags: CmpFlags,
    /// Pending `(return_address, caller's lr)` frames pushed by `Call`, most
    /// recent last. Consulted only to restore `lr` once control flow reaches
    /// a return address; never exposed outside `execute`.
    call_stack: Vec<(u64, u64)>,
}

impl Default for Machine {
    fn default() -> Machine {
        Machine {
            registers: [0; constants::REGISTER_COUNT],
            stack: [0; constants::STACK_SLOTS],
            cmp_flags: CmpFlags::default(),
            call_stack: Vec::new(),
        }
    }
}

impl Machine {
    pub fn new() -> Machine {
        Machine::default()
    }

    /// Current value of register `id` (`0..16`).
    pub fn register(&self, id: u8) -> u64 {
        self.registers[id as usize]
    }

    /// Sets register `id` before calling `execute`, e.g. to point a register
    /// at some host value the program will load/store through.
    pub fn set_register(&mut self, id: u8, value: u64) {
        self.registers[id as usize] = value;
    }

    pub fn registers(&self) -> &[u64; constants::REGISTER_COUNT] {
        &self.registers
    }

    /// The first `n` stack slots, base-relative (slot 0 is the base of the stack buffer).
    pub fn stack_slots(&self, n: usize) -> &[u64] {
        &self.stack[..n.min(self.stack.len())]
    }

    fn operand_value(&self, operand: Operand) -> u64 {
        match operand {
            Operand::Register(r) => self.registers[r as usize],
            Operand::Immediate(v) => v,
        }
    }

    /// Runs `program` to completion. Resets `sp` (to the base of this
    /// machine's private stack), `lr` (to the sentinel) and `pc` (to zero) on
    /// entry; all other registers keep whatever value the caller last set.
    ///
    /// Returns once `pc` lands on the sentinel or falls outside `program`.
    pub fn execute(&mut self, program: &[Instruction]) -> Result<(), RuntimeError> {
        self.registers[SP as usize] = self.stack.as_ptr() as u64;
        self.registers[LR as usize] = SENTINEL_PC;
        self.registers[PC as usize] = 0;
        self.call_stack.clear();

        let labels = build_label_map(program);

        loop {
            let pc = self.registers[PC as usize];
            if pc == SENTINEL_PC || pc >= program.len() as u64 {
                return Ok(());
            }

            // A call's return address is the instruction right after it; once
            // control flow (by however it got there) lands back on it, that
            // call has returned, so restore the lr it had on entry. Without
            // this, `lr` would keep pointing at the call's own return address
            // and a top-level `jx lr` reached right after the call returns
            // would jump to itself forever instead of treating the sentinel
            // `lr` it started with as "halt".
            if let Some(&(return_addr, saved_lr)) = self.call_stack.last() {
                if pc == return_addr {
                    self.call_stack.pop();
                    self.registers[LR as usize] = saved_lr;
                }
            }

            let mut jumped = false;
            match &program[pc as usize] {
                Instruction::Mov { rd, src } => {
                    let value = self.operand_value(*src);
                    self.registers[*rd as usize] = value;
                }

                Instruction::Cmp { ra, operand } => {
                    let lhs = self.registers[*ra as usize];
                    let rhs = self.operand_value(*operand);
                    let diff = (lhs as i64).wrapping_sub(rhs as i64);
                    self.cmp_flags = CmpFlags {
                        negative: diff < 0,
                        zero: diff == 0,
                    };
                }

                Instruction::Add { rd, ra, operand } => {
                    let lhs = self.registers[*ra as usize];
                    let rhs = self.operand_value(*operand);
                    self.registers[*rd as usize] = lhs.wrapping_add(rhs);
                }

                Instruction::Sub { rd, ra, operand } => {
                    let lhs = self.registers[*ra as usize];
                    let rhs = self.operand_value(*operand);
                    self.registers[*rd as usize] = lhs.wrapping_sub(rhs);
                }

                Instruction::Mul { rd, ra, operand } => {
                    let lhs = self.registers[*ra as usize];
                    let rhs = self.operand_value(*operand);
                    self.registers[*rd as usize] = lhs.wrapping_mul(rhs);
                }

                Instruction::Div { rd, ra, operand } => {
                    let lhs = self.registers[*ra as usize];
                    let rhs = self.operand_value(*operand);
                    if rhs == 0 {
                        return Err(RuntimeError::DivisionByZero);
                    }
                    self.registers[*rd as usize] = lhs / rhs;
                }

                Instruction::Mod { rd, ra, operand } => {
                    let lhs = self.registers[*ra as usize];
                    let rhs = self.operand_value(*operand);
                    if rhs == 0 {
                        return Err(RuntimeError::DivisionByZero);
                    }
                    self.registers[*rd as usize] = lhs % rhs;
                }

                Instruction::Lst { rd, ra, operand } => {
                    let lhs = self.registers[*ra as usize];
                    let amount = self.operand_value(*operand) as u32;
                    self.registers[*rd as usize] = lhs.wrapping_shl(amount);
                }

                Instruction::Rst { rd, ra, operand } => {
                    let lhs = self.registers[*ra as usize];
                    let amount = self.operand_value(*operand) as u32;
                    self.registers[*rd as usize] = lhs.wrapping_shr(amount);
                }

                Instruction::Load {
                    ra,
                    rb,
                    offset,
                    post_increment,
                    width,
                } => {
                    let addr = self.registers[*rb as usize].wrapping_add(*offset);
                    let value = unsafe { memory::read_width(addr, *width) };
                    self.registers[*ra as usize] = value;
                    self.registers[*rb as usize] =
                        self.registers[*rb as usize].wrapping_add(*post_increment);
                }

                Instruction::Store {
                    ra,
                    rb,
                    offset,
                    post_increment,
                    width,
                } => {
                    let addr = self.registers[*rb as usize].wrapping_add(*offset);
                    let value = self.registers[*ra as usize];
                    unsafe { memory::write_width(addr, *width, value) };
                    self.registers[*rb as usize] =
                        self.registers[*rb as usize].wrapping_add(*post_increment);
                }

                Instruction::Push { reglist } => {
                    let mut sp = self.registers[SP as usize];
                    for i in (0..constants::REGISTER_COUNT).rev() {
                        if reglist & (1 << i) != 0 {
                            unsafe { memory::write_width(sp, Width::Long, self.registers[i]) };
                            sp = sp.wrapping_add(Width::Long.bytes());
                        }
                    }
                    self.registers[SP as usize] = sp;
                }

                Instruction::Pop { reglist } => {
                    let mut sp = self.registers[SP as usize];
                    for i in 0..constants::REGISTER_COUNT {
                        if reglist & (1 << i) != 0 {
                            sp = sp.wrapping_sub(Width::Long.bytes());
                            self.registers[i] = unsafe { memory::read_width(sp, Width::Long) };
                        }
                    }
                    self.registers[SP as usize] = sp;
                }

                Instruction::Call { label } => {
                    let return_addr = pc.wrapping_add(1);
                    self.call_stack
                        .push((return_addr, self.registers[LR as usize]));
                    self.registers[LR as usize] = return_addr;
                    let target = *labels
                        .get(label.as_str())
                        .ok_or_else(|| RuntimeError::UndefinedLabel(label.clone()))?;
                    self.registers[PC as usize] = target as u64 + 1;
                    jumped = true;
                }

                Instruction::Jump { label } => {
                    let target = *labels
                        .get(label.as_str())
                        .ok_or_else(|| RuntimeError::UndefinedLabel(label.clone()))?;
                    self.registers[PC as usize] = target as u64 + 1;
                    jumped = true;
                }

                Instruction::Jumpx { ra } => {
                    let target = self.registers[*ra as usize];
                    if target == SENTINEL_PC {
                        return Ok(());
                    }
                    self.registers[PC as usize] = target;
                    jumped = true;
                }

                Instruction::SysCall { number } => match number {
                    0 => {
                        let byte = (self.registers[0] & 0xFF) as u8;
                        // Best-effort: a VM instruction should not panic on a
                        // closed stdout pipe.
                        let _ = io::stdout().write_all(&[byte]);
                        let _ = io::stdout().flush();
                    }
                    other => return Err(RuntimeError::UnknownSyscall(*other)),
                },

                Instruction::Data { .. } | Instruction::Label { .. } => {}
            }

            if !jumped {
                self.registers[PC as usize] = pc.wrapping_add(1);
            }
        }
    }
}

fn build_label_map(program: &[Instruction]) -> HashMap<&str, usize> {
    let mut labels = HashMap::new();
    for (index, instr) in program.iter().enumerate() {
        if let Some(name) = instr.label_name() {
            // First matching label in program order wins.
            labels.entry(name).or_insert(index);
        }
    }
    labels
}
