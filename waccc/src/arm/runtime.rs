/*
 * Copyright 2022 - Jahred Love
 *
 * Redistribution and use in source and binary forms, with or without modification,
 * are permitted provided that the following conditions are met:
 *
 * 1. Redistributions of source code must retain the above copyright notice, this
 * list of conditions and the following disclaimer.
 *
 * 2. Redistributions in binary form must reproduce the above copyright notice, this
 * list of conditions and the following disclaimer in the documentation and/or other
 * materials provided with the distribution.
 *
 * 3. Neither the name of the copyright holder nor the names of its contributors may
 * be used to endorse or promote products derived from this software without specific
 * prior written permission.
 *
 * THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS “AS IS” AND
 * ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE IMPLIED
 * WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE DISCLAIMED.
 * IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT,
 * INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT
 * NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR
 * PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
 * WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE)
 * ARISING IN ANY WAY OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE
 * POSSIBILITY OF SUCH DAMAGE.
 */

//! Runtime-support routines.
//!
//! Each helper owns its assembly fragment and the set of other helpers it
//! depends on. Emission computes the transitive closure of the requested
//! set and renders each routine exactly once, however many sites reference
//! it. Message literals go through the shared string pool, so identical
//! diagnostics collapse to one data entry.

use std::collections::BTreeSet;

use crate::fragment::Fragment;

use super::data::StrPool;
use super::insn::{AddrMode2, Cond, Instr, Line, MemSize, Operand2, Reg};

const MSG_OVERFLOW: &str =
    "OverflowError: the result is too small/large to store in a 4-byte signed-integer.\n\0";
const MSG_DIV_ZERO: &str = "DivideByZeroError: divide or modulo by zero\n\0";
const MSG_NULL_REF: &str = "NullReferenceError: dereference a null reference\n\0";
const MSG_NEG_INDEX: &str = "ArrayIndexOutOfBoundsError: negative index\n\0";
const MSG_LARGE_INDEX: &str = "ArrayIndexOutOfBoundsError: index too large\n\0";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Helper {
    PrintInt,
    PrintBool,
    PrintChar,
    PrintString,
    PrintRef,
    PrintLn,
    ReadInt,
    ReadChar,
    CheckDivZero,
    CheckNullPointer,
    CheckArrayBounds,
    ThrowOverflow,
    ThrowRuntime,
    FreePair,
}

impl Helper {
    pub fn label(self) -> &'static str {
        match self {
            Helper::PrintInt => "p_print_int",
            Helper::PrintBool => "p_print_bool",
            Helper::PrintChar => "p_print_char",
            Helper::PrintString => "p_print_string",
            Helper::PrintRef => "p_print_reference",
            Helper::PrintLn => "p_print_ln",
            Helper::ReadInt => "p_read_int",
            Helper::ReadChar => "p_read_char",
            Helper::CheckDivZero => "p_check_divide_by_zero",
            Helper::CheckNullPointer => "p_check_null_pointer",
            Helper::CheckArrayBounds => "p_check_array_bounds",
            Helper::ThrowOverflow => "p_throw_overflow_error",
            Helper::ThrowRuntime => "p_throw_runtime_error",
            Helper::FreePair => "p_free_pair",
        }
    }

    pub fn deps(self) -> &'static [Helper] {
        match self {
            Helper::CheckDivZero
            | Helper::CheckNullPointer
            | Helper::CheckArrayBounds
            | Helper::ThrowOverflow
            | Helper::FreePair => &[Helper::ThrowRuntime],
            Helper::ThrowRuntime => &[Helper::PrintString],
            _ => &[],
        }
    }

    fn fragment(self, pool: &mut StrPool) -> Fragment<Line> {
        let mut f = Fragment::new();
        f.push(Line::Label(self.label().to_string()));
        match self {
            Helper::PrintInt => {
                push_lr(&mut f);
                mov(&mut f, Reg::R1, Reg::R0);
                load_msg(&mut f, pool, Cond::Al, Reg::R0, "%d\0");
                skip_length_word(&mut f);
                call(&mut f, "printf");
                flush(&mut f);
                pop_pc(&mut f);
            }
            Helper::PrintBool => {
                push_lr(&mut f);
                cmp_zero(&mut f, Reg::R0);
                load_msg(&mut f, pool, Cond::Ne, Reg::R0, "true\0");
                load_msg(&mut f, pool, Cond::Eq, Reg::R0, "false\0");
                skip_length_word(&mut f);
                call(&mut f, "printf");
                flush(&mut f);
                pop_pc(&mut f);
            }
            Helper::PrintChar => {
                push_lr(&mut f);
                call(&mut f, "putchar");
                pop_pc(&mut f);
            }
            Helper::PrintString => {
                push_lr(&mut f);
                // r0 points at a length-prefixed record.
                f.push(Line::Instr(Instr::Ldr {
                    cond: Cond::Al,
                    size: MemSize::Word,
                    rd: Reg::R1,
                    addr: AddrMode2::Zero { base: Reg::R0 },
                }));
                add_imm(&mut f, Reg::R2, Reg::R0, 4);
                load_msg(&mut f, pool, Cond::Al, Reg::R0, "%.*s\0");
                skip_length_word(&mut f);
                call(&mut f, "printf");
                flush(&mut f);
                pop_pc(&mut f);
            }
            Helper::PrintRef => {
                push_lr(&mut f);
                mov(&mut f, Reg::R1, Reg::R0);
                load_msg(&mut f, pool, Cond::Al, Reg::R0, "%p\0");
                skip_length_word(&mut f);
                call(&mut f, "printf");
                flush(&mut f);
                pop_pc(&mut f);
            }
            Helper::PrintLn => {
                push_lr(&mut f);
                load_msg(&mut f, pool, Cond::Al, Reg::R0, "\0");
                skip_length_word(&mut f);
                call(&mut f, "puts");
                flush(&mut f);
                pop_pc(&mut f);
            }
            Helper::ReadInt => {
                push_lr(&mut f);
                mov(&mut f, Reg::R1, Reg::R0);
                load_msg(&mut f, pool, Cond::Al, Reg::R0, "%d\0");
                skip_length_word(&mut f);
                call(&mut f, "scanf");
                pop_pc(&mut f);
            }
            Helper::ReadChar => {
                push_lr(&mut f);
                mov(&mut f, Reg::R1, Reg::R0);
                load_msg(&mut f, pool, Cond::Al, Reg::R0, " %c\0");
                skip_length_word(&mut f);
                call(&mut f, "scanf");
                pop_pc(&mut f);
            }
            Helper::CheckDivZero => {
                push_lr(&mut f);
                cmp_zero(&mut f, Reg::R1);
                load_msg(&mut f, pool, Cond::Eq, Reg::R0, MSG_DIV_ZERO);
                call_cond(&mut f, Cond::Eq, Helper::ThrowRuntime.label());
                pop_pc(&mut f);
            }
            Helper::CheckNullPointer => {
                push_lr(&mut f);
                cmp_zero(&mut f, Reg::R0);
                load_msg(&mut f, pool, Cond::Eq, Reg::R0, MSG_NULL_REF);
                call_cond(&mut f, Cond::Eq, Helper::ThrowRuntime.label());
                pop_pc(&mut f);
            }
            Helper::CheckArrayBounds => {
                push_lr(&mut f);
                cmp_zero(&mut f, Reg::R0);
                load_msg(&mut f, pool, Cond::Lt, Reg::R0, MSG_NEG_INDEX);
                call_cond(&mut f, Cond::Lt, Helper::ThrowRuntime.label());
                f.push(Line::Instr(Instr::Ldr {
                    cond: Cond::Al,
                    size: MemSize::Word,
                    rd: Reg::R1,
                    addr: AddrMode2::Zero { base: Reg::R1 },
                }));
                f.push(Line::Instr(Instr::Cmp {
                    cond: Cond::Al,
                    rn: Reg::R0,
                    op2: Operand2::Reg(Reg::R1),
                }));
                load_msg(&mut f, pool, Cond::Cs, Reg::R0, MSG_LARGE_INDEX);
                call_cond(&mut f, Cond::Cs, Helper::ThrowRuntime.label());
                pop_pc(&mut f);
            }
            Helper::ThrowOverflow => {
                load_msg(&mut f, pool, Cond::Al, Reg::R0, MSG_OVERFLOW);
                call(&mut f, Helper::ThrowRuntime.label());
            }
            Helper::ThrowRuntime => {
                call(&mut f, Helper::PrintString.label());
                f.push(Line::Instr(Instr::Mov {
                    cond: Cond::Al,
                    s: false,
                    rd: Reg::R0,
                    op2: Operand2::imm(255).expect("small immediate"),
                }));
                call(&mut f, "exit");
            }
            Helper::FreePair => {
                push_lr(&mut f);
                cmp_zero(&mut f, Reg::R0);
                load_msg(&mut f, pool, Cond::Eq, Reg::R0, MSG_NULL_REF);
                f.push(Line::Instr(Instr::B {
                    cond: Cond::Eq,
                    label: Helper::ThrowRuntime.label().to_string(),
                }));
                // Both components live inline in the record.
                call(&mut f, "free");
                pop_pc(&mut f);
            }
        }
        f
    }
}

fn push_lr(f: &mut Fragment<Line>) {
    f.push(Line::Instr(Instr::Push {
        regs: vec![Reg::Lr],
    }));
}

fn pop_pc(f: &mut Fragment<Line>) {
    f.push(Line::Instr(Instr::Pop {
        regs: vec![Reg::Pc],
    }));
}

fn mov(f: &mut Fragment<Line>, rd: Reg, rm: Reg) {
    f.push(Line::Instr(Instr::Mov {
        cond: Cond::Al,
        s: false,
        rd,
        op2: Operand2::Reg(rm),
    }));
}

fn cmp_zero(f: &mut Fragment<Line>, rn: Reg) {
    f.push(Line::Instr(Instr::Cmp {
        cond: Cond::Al,
        rn,
        op2: Operand2::imm(0).expect("small immediate"),
    }));
}

fn add_imm(f: &mut Fragment<Line>, rd: Reg, rn: Reg, v: u32) {
    f.push(Line::Instr(Instr::Add {
        cond: Cond::Al,
        s: false,
        rd,
        rn,
        op2: Operand2::imm(v).expect("small immediate"),
    }));
}

/// The C callee expects a NUL-terminated string, so step past `.word`.
fn skip_length_word(f: &mut Fragment<Line>) {
    add_imm(f, Reg::R0, Reg::R0, 4);
}

fn call(f: &mut Fragment<Line>, label: &str) {
    f.push(Line::Instr(Instr::Bl {
        cond: Cond::Al,
        label: label.to_string(),
    }));
}

fn call_cond(f: &mut Fragment<Line>, cond: Cond, label: &str) {
    f.push(Line::Instr(Instr::Bl {
        cond,
        label: label.to_string(),
    }));
}

fn flush(f: &mut Fragment<Line>) {
    f.push(Line::Instr(Instr::Mov {
        cond: Cond::Al,
        s: false,
        rd: Reg::R0,
        op2: Operand2::imm(0).expect("small immediate"),
    }));
    call(f, "fflush");
}

fn load_msg(f: &mut Fragment<Line>, pool: &mut StrPool, cond: Cond, rd: Reg, text: &str) {
    let (label, entry) = pool.intern(text);
    f.push_data(entry);
    f.push(Line::Instr(Instr::Ldr {
        cond,
        size: MemSize::Word,
        rd,
        addr: AddrMode2::Label(label),
    }));
}

/// The requested helpers closed under `deps`, each emitted once, in a
/// stable order.
pub(crate) fn closure(requested: &BTreeSet<Helper>) -> BTreeSet<Helper> {
    let mut out: BTreeSet<Helper> = BTreeSet::new();
    let mut work: Vec<Helper> = requested.iter().copied().collect();
    while let Some(h) = work.pop() {
        if out.insert(h) {
            work.extend_from_slice(h.deps());
        }
    }
    out
}

pub(crate) fn emit_helpers(requested: &BTreeSet<Helper>, pool: &mut StrPool) -> Fragment<Line> {
    let mut out = Fragment::new();
    for h in closure(requested) {
        out = out.concat(h.fragment(pool));
    }
    out
}
