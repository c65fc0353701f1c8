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

//! Statement lowering for the ARM backend.

use crate::ast::{AssignLhs, AssignRhs, Expr, PairSide, Stmt, Type};
use crate::error::CompileError;
use crate::fragment::Fragment;
use crate::symtab::scope_size;

use super::expr::{gen_array_elem_addr, gen_expr};
use super::insn::{AddrMode2, Cond, Instr, Line, MemSize, Operand2, Reg};
use super::runtime::Helper;
use super::{emit_add_sp, emit_sub_sp, emit_slot_addr, store_slot, ArmCtx, POOL};

fn mov_reg(rd: Reg, rm: Reg) -> Instr {
    Instr::Mov {
        cond: Cond::Al,
        s: false,
        rd,
        op2: Operand2::Reg(rm),
    }
}

fn bl(label: &str) -> Instr {
    Instr::Bl {
        cond: Cond::Al,
        label: label.to_string(),
    }
}

fn mem_size(ty: &Type) -> MemSize {
    match ty {
        Type::Char | Type::Bool => MemSize::Byte,
        _ => MemSize::Word,
    }
}

pub(crate) fn gen_stmt(
    s: &Stmt,
    ctx: &mut ArmCtx,
    f: &mut Fragment<Line>,
) -> Result<(), CompileError> {
    match s {
        Stmt::Skip => Ok(()),
        Stmt::Seq(a, b) => {
            gen_stmt(a, ctx, f)?;
            gen_stmt(b, ctx, f)
        }
        Stmt::Block(stmts) => {
            let size: u32 = stmts.iter().map(scope_size).sum();
            emit_sub_sp(size, f);
            ctx.env.enter(size);
            for st in stmts {
                gen_stmt(st, ctx, f)?;
            }
            emit_add_sp(size, f);
            ctx.env.exit();
            Ok(())
        }
        Stmt::Decl(var, rhs) => {
            // The declared name only comes into scope after its initialiser
            // has evaluated.
            gen_rhs(rhs, ctx, f)?;
            let off = ctx.env.declare(&var.name);
            f.push(Line::Instr(store_slot(POOL[0], off)));
            Ok(())
        }
        Stmt::Assign(lhs, rhs) => {
            gen_rhs(rhs, ctx, f)?;
            match lhs {
                AssignLhs::Var(v) => {
                    let off = ctx.env.lookup(&v.name).ok_or_else(|| {
                        CompileError::internal(format!("unknown variable '{}'", v.name))
                    })?;
                    f.push(Line::Instr(store_slot(POOL[0], off)));
                }
                AssignLhs::ArrayElem {
                    var,
                    indices,
                    elem_ty,
                } => {
                    gen_array_elem_addr(var, indices, &POOL[1..], ctx, f)?;
                    f.push(Line::Instr(Instr::Str {
                        cond: Cond::Al,
                        size: mem_size(elem_ty),
                        rd: POOL[0],
                        addr: AddrMode2::Zero { base: POOL[1] },
                    }));
                }
                AssignLhs::PairElem(side, pair) => {
                    gen_expr(pair, &POOL[1..], ctx, f)?;
                    ctx.need(Helper::CheckNullPointer);
                    f.push(Line::Instr(mov_reg(Reg::R0, POOL[1])));
                    f.push(Line::Instr(bl(Helper::CheckNullPointer.label())));
                    f.push(Line::Instr(Instr::Str {
                        cond: Cond::Al,
                        size: MemSize::Word,
                        rd: POOL[0],
                        addr: AddrMode2::offset(POOL[1], side.offset()),
                    }));
                }
            }
            Ok(())
        }
        Stmt::Read(lhs) => {
            let helper = match lhs.ty() {
                Type::Int => Helper::ReadInt,
                Type::Char => Helper::ReadChar,
                other => {
                    return Err(CompileError::internal(format!(
                        "read target has unreadable type {other:?}"
                    )))
                }
            };
            gen_lhs_addr(lhs, &POOL, ctx, f)?;
            ctx.need(helper);
            f.push(Line::Instr(mov_reg(Reg::R0, POOL[0])));
            f.push(Line::Instr(bl(helper.label())));
            Ok(())
        }
        Stmt::Free(e) => {
            gen_expr(e, &POOL, ctx, f)?;
            f.push(Line::Instr(mov_reg(Reg::R0, POOL[0])));
            if e.ty().is_pair() {
                ctx.need(Helper::FreePair);
                f.push(Line::Instr(bl(Helper::FreePair.label())));
            } else {
                ctx.need(Helper::CheckNullPointer);
                f.push(Line::Instr(bl(Helper::CheckNullPointer.label())));
                f.push(Line::Instr(bl("free")));
            }
            Ok(())
        }
        Stmt::Return(e) => {
            gen_expr(e, &POOL, ctx, f)?;
            f.push(Line::Instr(mov_reg(Reg::R0, POOL[0])));
            emit_add_sp(ctx.env.unwind_size(), f);
            f.push(Line::Instr(Instr::Pop {
                regs: vec![Reg::Pc],
            }));
            Ok(())
        }
        Stmt::Exit(e) => {
            gen_expr(e, &POOL, ctx, f)?;
            f.push(Line::Instr(mov_reg(Reg::R0, POOL[0])));
            emit_add_sp(ctx.env.unwind_size(), f);
            f.push(Line::Instr(bl("exit")));
            Ok(())
        }
        Stmt::Print { expr, newline } => {
            gen_expr(expr, &POOL, ctx, f)?;
            f.push(Line::Instr(mov_reg(Reg::R0, POOL[0])));
            let helper = print_helper(&expr.ty());
            ctx.need(helper);
            f.push(Line::Instr(bl(helper.label())));
            if *newline {
                ctx.need(Helper::PrintLn);
                f.push(Line::Instr(bl(Helper::PrintLn.label())));
            }
            Ok(())
        }
        Stmt::If {
            cond,
            then_body,
            else_body,
        } => {
            gen_expr(cond, &POOL, ctx, f)?;
            let else_label = ctx.labels.fresh();
            let end_label = ctx.labels.fresh();
            f.push(Line::Instr(Instr::Cmp {
                cond: Cond::Al,
                rn: POOL[0],
                op2: Operand2::imm(0).expect("small immediate"),
            }));
            f.push(Line::Instr(Instr::B {
                cond: Cond::Eq,
                label: else_label.clone(),
            }));
            gen_stmt(then_body, ctx, f)?;
            f.push(Line::Instr(Instr::B {
                cond: Cond::Al,
                label: end_label.clone(),
            }));
            f.push(Line::Label(else_label));
            gen_stmt(else_body, ctx, f)?;
            f.push(Line::Label(end_label));
            Ok(())
        }
        Stmt::While { cond, body } => {
            // A constant-true loop needs no condition block at all.
            if matches!(cond, Expr::BoolLit(true)) {
                let head = ctx.labels.fresh();
                f.push(Line::Label(head.clone()));
                gen_stmt(body, ctx, f)?;
                f.push(Line::Instr(Instr::B {
                    cond: Cond::Al,
                    label: head,
                }));
                return Ok(());
            }
            let head = ctx.labels.fresh();
            let end = ctx.labels.fresh();
            f.push(Line::Label(head.clone()));
            gen_expr(cond, &POOL, ctx, f)?;
            f.push(Line::Instr(Instr::Cmp {
                cond: Cond::Al,
                rn: POOL[0],
                op2: Operand2::imm(0).expect("small immediate"),
            }));
            f.push(Line::Instr(Instr::B {
                cond: Cond::Eq,
                label: end.clone(),
            }));
            gen_stmt(body, ctx, f)?;
            f.push(Line::Instr(Instr::B {
                cond: Cond::Al,
                label: head,
            }));
            f.push(Line::Label(end));
            Ok(())
        }
        Stmt::Call { name, args } => gen_call(name, args, ctx, f),
    }
}

fn print_helper(ty: &Type) -> Helper {
    match ty {
        Type::Int => Helper::PrintInt,
        Type::Bool => Helper::PrintBool,
        Type::Char => Helper::PrintChar,
        Type::Str => Helper::PrintString,
        // A flat char array shares the length-prefixed string layout.
        Type::Array { elem, depth } if **elem == Type::Char && *depth == 1 => Helper::PrintString,
        _ => Helper::PrintRef,
    }
}

/// Evaluate a right-hand side into `POOL[0]`.
pub(crate) fn gen_rhs(
    rhs: &AssignRhs,
    ctx: &mut ArmCtx,
    f: &mut Fragment<Line>,
) -> Result<(), CompileError> {
    let dest = POOL[0];
    match rhs {
        AssignRhs::Expr(e) => gen_expr(e, &POOL, ctx, f),
        AssignRhs::ArrayLit { elems, elem_ty } => {
            let elem_size = match elem_ty {
                Type::Char | Type::Bool => 1u32,
                _ => 4,
            };
            let total = 4 + elems.len() as u32 * elem_size;
            f.push(Line::Instr(Instr::Ldr {
                cond: Cond::Al,
                size: MemSize::Word,
                rd: Reg::R0,
                addr: AddrMode2::Const(total as i32),
            }));
            f.push(Line::Instr(bl("malloc")));
            f.push(Line::Instr(mov_reg(dest, Reg::R0)));
            for (i, e) in elems.iter().enumerate() {
                gen_expr(e, &POOL[1..], ctx, f)?;
                f.push(Line::Instr(Instr::Str {
                    cond: Cond::Al,
                    size: if elem_size == 1 {
                        MemSize::Byte
                    } else {
                        MemSize::Word
                    },
                    rd: POOL[1],
                    addr: AddrMode2::offset(dest, (4 + i as u32 * elem_size) as i32),
                }));
            }
            f.push(Line::Instr(Instr::Ldr {
                cond: Cond::Al,
                size: MemSize::Word,
                rd: POOL[1],
                addr: AddrMode2::Const(elems.len() as i32),
            }));
            f.push(Line::Instr(Instr::Str {
                cond: Cond::Al,
                size: MemSize::Word,
                rd: POOL[1],
                addr: AddrMode2::Zero { base: dest },
            }));
            Ok(())
        }
        AssignRhs::NewPair(a, b) => {
            f.push(Line::Instr(Instr::Ldr {
                cond: Cond::Al,
                size: MemSize::Word,
                rd: Reg::R0,
                addr: AddrMode2::Const(8),
            }));
            f.push(Line::Instr(bl("malloc")));
            f.push(Line::Instr(mov_reg(dest, Reg::R0)));
            for (e, side) in [(a, PairSide::Fst), (b, PairSide::Snd)] {
                gen_expr(e, &POOL[1..], ctx, f)?;
                f.push(Line::Instr(Instr::Str {
                    cond: Cond::Al,
                    size: MemSize::Word,
                    rd: POOL[1],
                    addr: AddrMode2::offset(dest, side.offset()),
                }));
            }
            Ok(())
        }
        AssignRhs::PairElem(side, pair) => {
            gen_expr(pair, &POOL, ctx, f)?;
            ctx.need(Helper::CheckNullPointer);
            f.push(Line::Instr(mov_reg(Reg::R0, dest)));
            f.push(Line::Instr(bl(Helper::CheckNullPointer.label())));
            f.push(Line::Instr(Instr::Ldr {
                cond: Cond::Al,
                size: MemSize::Word,
                rd: dest,
                addr: AddrMode2::offset(dest, side.offset()),
            }));
            Ok(())
        }
        AssignRhs::Call { name, args, .. } => {
            gen_call(name, args, ctx, f)?;
            f.push(Line::Instr(mov_reg(dest, Reg::R0)));
            Ok(())
        }
    }
}

/// Leave the address of an assignment target in `rem[0]`, emitting the
/// checks the target kind requires.
fn gen_lhs_addr(
    lhs: &AssignLhs,
    rem: &[Reg],
    ctx: &mut ArmCtx,
    f: &mut Fragment<Line>,
) -> Result<(), CompileError> {
    let dest = rem[0];
    match lhs {
        AssignLhs::Var(v) => {
            let off = ctx.env.lookup(&v.name).ok_or_else(|| {
                CompileError::internal(format!("unknown variable '{}'", v.name))
            })?;
            emit_slot_addr(dest, off, f);
            Ok(())
        }
        AssignLhs::ArrayElem { var, indices, .. } => {
            gen_array_elem_addr(var, indices, rem, ctx, f)
        }
        AssignLhs::PairElem(side, pair) => {
            gen_expr(pair, rem, ctx, f)?;
            ctx.need(Helper::CheckNullPointer);
            f.push(Line::Instr(mov_reg(Reg::R0, dest)));
            f.push(Line::Instr(bl(Helper::CheckNullPointer.label())));
            if let PairSide::Snd = side {
                f.push(Line::Instr(Instr::Add {
                    cond: Cond::Al,
                    s: false,
                    rd: dest,
                    rn: dest,
                    op2: Operand2::imm(4).expect("small immediate"),
                }));
            }
            Ok(())
        }
    }
}

/// Push arguments right to left, branch, release the argument window.
fn gen_call(
    name: &str,
    args: &[Expr],
    ctx: &mut ArmCtx,
    f: &mut Fragment<Line>,
) -> Result<(), CompileError> {
    for arg in args.iter().rev() {
        gen_expr(arg, &POOL, ctx, f)?;
        f.push(Line::Instr(Instr::Str {
            cond: Cond::Al,
            size: MemSize::Word,
            rd: POOL[0],
            addr: AddrMode2::pre_offset(Reg::Sp, -4),
        }));
        ctx.env.push(4);
    }
    f.push(Line::Instr(bl(&format!("f_{}", name))));
    let window = 4 * args.len() as u32;
    ctx.env.pop(window);
    emit_add_sp(window, f);
    Ok(())
}
