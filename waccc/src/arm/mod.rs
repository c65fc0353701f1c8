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

//! ARM backend: ARMv6 assembly in GAS syntax.
//!
//! Expressions lower through a Sethi–Ullman register plan over the ordered
//! pool `r4..r10`, with `r11` held back as the spill partner of the stack
//! machine fallback. `r0..r3` carry call arguments and results only.

pub mod data;
pub mod expr;
pub mod insn;
pub mod runtime;
pub mod stmt;

use std::collections::BTreeSet;

use crate::ast::{Function, Program};
use crate::error::CompileError;
use crate::fragment::Fragment;
use crate::symtab::{scope_size, ScopeStack};

use data::{render_data_section, StrPool};
use insn::{AddrMode2, Cond, Instr, Line, MemSize, Operand2, Reg};
use runtime::Helper;

/// Allocatable registers in priority order.
pub(crate) const POOL: [Reg; 7] = [
    Reg::R4,
    Reg::R5,
    Reg::R6,
    Reg::R7,
    Reg::R8,
    Reg::R9,
    Reg::R10,
];

/// Reserved partner register for the stack-machine fallback. Never handed
/// out by the pool.
pub(crate) const LAST: Reg = Reg::R11;

/// Monotonic `L<n>` label source, fresh per compilation.
pub struct LabelGen {
    next: u32,
}

impl LabelGen {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn fresh(&mut self) -> String {
        let l = format!("L{}", self.next);
        self.next += 1;
        l
    }
}

impl Default for LabelGen {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable state threaded through ARM lowering: the string pool and helper
/// set live for the whole program, the scope environment is reset per
/// function.
pub(crate) struct ArmCtx {
    pub pool: StrPool,
    pub helpers: BTreeSet<Helper>,
    pub labels: LabelGen,
    pub env: ScopeStack,
}

impl ArmCtx {
    fn new() -> Self {
        Self {
            pool: StrPool::new(),
            helpers: BTreeSet::new(),
            labels: LabelGen::new(),
            env: ScopeStack::new(),
        }
    }

    pub fn need(&mut self, h: Helper) {
        self.helpers.insert(h);
    }
}

/// Emit `SUB sp, sp, #bytes`, chunked so every immediate encodes.
pub(crate) fn emit_sub_sp(bytes: u32, f: &mut Fragment<Line>) {
    emit_sp_step(bytes, f, |chunk| Instr::Sub {
        cond: Cond::Al,
        s: false,
        rd: Reg::Sp,
        rn: Reg::Sp,
        op2: chunk,
    });
}

/// Emit `ADD sp, sp, #bytes`, chunked so every immediate encodes.
pub(crate) fn emit_add_sp(bytes: u32, f: &mut Fragment<Line>) {
    emit_sp_step(bytes, f, |chunk| Instr::Add {
        cond: Cond::Al,
        s: false,
        rd: Reg::Sp,
        rn: Reg::Sp,
        op2: chunk,
    });
}

fn emit_sp_step(bytes: u32, f: &mut Fragment<Line>, make: impl Fn(Operand2) -> Instr) {
    let mut left = bytes;
    while left > 0 {
        let chunk = left.min(1024);
        let op2 = Operand2::imm(chunk).expect("sp chunk immediate");
        f.push(Line::Instr(make(op2)));
        left -= chunk;
    }
}

fn gen_function(func: &Function, ctx: &mut ArmCtx) -> Result<Fragment<Line>, CompileError> {
    let mut f = Fragment::new();
    f.push(Line::Label(format!("f_{}", func.name)));
    f.push(Line::Instr(Instr::Push {
        regs: vec![Reg::Lr],
    }));

    ctx.env = ScopeStack::new();
    ctx.env.enter_params(&func.params);
    let size = scope_size(&func.body);
    emit_sub_sp(size, &mut f);
    ctx.env.enter(size);

    stmt::gen_stmt(&func.body, ctx, &mut f)?;

    // Every path through a function body ends in a return or exit
    // (front-end guarantee), each of which unwinds the frame itself.
    ctx.env.exit();
    f.push(Line::Directive(".ltorg".to_string()));
    Ok(f)
}

fn gen_main(p: &Program, ctx: &mut ArmCtx) -> Result<Fragment<Line>, CompileError> {
    let mut f = Fragment::new();
    f.push(Line::Label("main".to_string()));
    f.push(Line::Instr(Instr::Push {
        regs: vec![Reg::Lr],
    }));

    ctx.env = ScopeStack::new();
    let size = scope_size(&p.body);
    emit_sub_sp(size, &mut f);
    ctx.env.enter(size);

    stmt::gen_stmt(&p.body, ctx, &mut f)?;

    emit_add_sp(size, &mut f);
    ctx.env.exit();
    f.push(Line::Instr(Instr::Mov {
        cond: Cond::Al,
        s: false,
        rd: Reg::R0,
        op2: Operand2::imm(0).expect("zero immediate"),
    }));
    f.push(Line::Instr(Instr::Pop {
        regs: vec![Reg::Pc],
    }));
    f.push(Line::Directive(".ltorg".to_string()));
    Ok(f)
}

/// Lower a whole program to one ARM assembly fragment: `main`, then the
/// transitive closure of requested runtime helpers, then user functions.
pub(crate) fn gen_program_fragment(p: &Program) -> Result<Fragment<Line>, CompileError> {
    let mut ctx = ArmCtx::new();

    let main_frag = gen_main(p, &mut ctx)?;
    let mut func_frags = Vec::with_capacity(p.funcs.len());
    for func in &p.funcs {
        func_frags.push(gen_function(func, &mut ctx)?);
    }

    let helper_frag = runtime::emit_helpers(&ctx.helpers, &mut ctx.pool);

    let mut total = main_frag.concat(helper_frag);
    for f in func_frags {
        total = total.concat(f);
    }
    Ok(total)
}

/// Render a program as GAS-syntax text.
pub fn gen_program(p: &Program) -> Result<String, CompileError> {
    let total = gen_program_fragment(p)?;

    let mut out = String::new();
    out.push_str(&render_data_section(&total.data));
    out.push_str(".text\n\n.global main\n");
    for line in &total.code {
        line.render_into(&mut out);
    }
    Ok(out)
}

/// Materialise the address of a stack slot in `rd`. Offsets beyond the
/// 8-bit-rotated immediate range detour through the literal pool.
pub(crate) fn emit_slot_addr(rd: Reg, off: u32, f: &mut Fragment<Line>) {
    match Operand2::imm(off) {
        Some(op2) => f.push(Line::Instr(Instr::Add {
            cond: Cond::Al,
            s: false,
            rd,
            rn: Reg::Sp,
            op2,
        })),
        None => {
            f.push(Line::Instr(Instr::Ldr {
                cond: Cond::Al,
                size: MemSize::Word,
                rd,
                addr: AddrMode2::Const(off as i32),
            }));
            f.push(Line::Instr(Instr::Add {
                cond: Cond::Al,
                s: false,
                rd,
                rn: Reg::Sp,
                op2: Operand2::Reg(rd),
            }));
        }
    }
}

/// Convenience used across statement and expression lowering: a load of a
/// stack slot with the currently active shifts applied.
pub(crate) fn load_slot(rd: Reg, off: u32) -> Instr {
    Instr::Ldr {
        cond: Cond::Al,
        size: MemSize::Word,
        rd,
        addr: AddrMode2::offset(Reg::Sp, off as i32),
    }
}

pub(crate) fn store_slot(rd: Reg, off: u32) -> Instr {
    Instr::Str {
        cond: Cond::Al,
        size: MemSize::Word,
        rd,
        addr: AddrMode2::offset(Reg::Sp, off as i32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_monotonic_from_zero() {
        let mut g = LabelGen::new();
        assert_eq!(g.fresh(), "L0");
        assert_eq!(g.fresh(), "L1");
        assert_eq!(g.fresh(), "L2");
    }

    #[test]
    fn sp_adjustments_chunk_at_1024() {
        let mut f: Fragment<Line> = Fragment::new();
        emit_sub_sp(2052, &mut f);
        let rendered: Vec<String> = f
            .code
            .iter()
            .map(|l| match l {
                Line::Instr(i) => i.render(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(
            rendered,
            vec![
                "SUB sp, sp, #1024",
                "SUB sp, sp, #1024",
                "SUB sp, sp, #4"
            ]
        );
    }

    #[test]
    fn pool_excludes_reserved_register() {
        assert!(!POOL.contains(&LAST));
        assert!(!POOL.contains(&Reg::R0));
    }
}
