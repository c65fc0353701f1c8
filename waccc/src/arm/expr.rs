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

//! Expression lowering with Sethi–Ullman register planning.
//!
//! `gen_expr` takes the list of free registers in priority order; the head
//! is the destination. While at least two registers remain, the heavier
//! child of a binary node evaluates first into the destination and the
//! lighter into the next register, which is optimal for tree expressions.
//! Down to one register, lowering degrades to a stack machine: the right
//! child evaluates and is pushed, the left re-uses the register, and the
//! push pops back into the reserved `r11` partner.

use crate::ast::{BinaryOp, Expr, Type, UnaryOp, Variable};
use crate::error::CompileError;
use crate::fragment::Fragment;

use super::insn::{AddrMode2, Cond, Instr, Line, MemSize, Operand2, Reg, ShiftKind};
use super::runtime::Helper;
use super::{emit_slot_addr, load_slot, ArmCtx, LAST};

fn mov_reg(rd: Reg, rm: Reg) -> Instr {
    Instr::Mov {
        cond: Cond::Al,
        s: false,
        rd,
        op2: Operand2::Reg(rm),
    }
}

fn mov_imm(rd: Reg, v: u32) -> Instr {
    Instr::Mov {
        cond: Cond::Al,
        s: false,
        rd,
        op2: Operand2::imm(v).expect("small immediate"),
    }
}

fn cmp_imm(rn: Reg, v: u32) -> Instr {
    Instr::Cmp {
        cond: Cond::Al,
        rn,
        op2: Operand2::imm(v).expect("small immediate"),
    }
}

fn bl(label: &str) -> Instr {
    Instr::Bl {
        cond: Cond::Al,
        label: label.to_string(),
    }
}

/// Evaluate `e` into `rem[0]` using only the registers in `rem` plus, under
/// register exhaustion, the stack and `r11`.
pub(crate) fn gen_expr(
    e: &Expr,
    rem: &[Reg],
    ctx: &mut ArmCtx,
    f: &mut Fragment<Line>,
) -> Result<(), CompileError> {
    let dest = rem[0];
    match e {
        Expr::IntLit(n) => {
            f.push(Line::Instr(Instr::Ldr {
                cond: Cond::Al,
                size: MemSize::Word,
                rd: dest,
                addr: AddrMode2::Const(*n),
            }));
            Ok(())
        }
        Expr::BoolLit(b) => {
            f.push(Line::Instr(mov_imm(dest, *b as u32)));
            Ok(())
        }
        Expr::CharLit(c) => {
            f.push(Line::Instr(mov_imm(dest, *c as u32)));
            Ok(())
        }
        Expr::StrLit(s) => {
            let (label, entry) = ctx.pool.intern(s);
            f.push_data(entry);
            f.push(Line::Instr(Instr::Ldr {
                cond: Cond::Al,
                size: MemSize::Word,
                rd: dest,
                addr: AddrMode2::Label(label),
            }));
            Ok(())
        }
        Expr::NullLit => {
            f.push(Line::Instr(mov_imm(dest, 0)));
            Ok(())
        }
        Expr::Ident(v) => {
            let off = slot_of(v, ctx)?;
            f.push(Line::Instr(load_slot(dest, off)));
            Ok(())
        }
        Expr::ArrayElem {
            var,
            indices,
            elem_ty,
        } => {
            gen_array_elem_addr(var, indices, rem, ctx, f)?;
            let size = match elem_ty {
                Type::Char | Type::Bool => MemSize::Byte,
                _ => MemSize::Word,
            };
            f.push(Line::Instr(Instr::Ldr {
                cond: Cond::Al,
                size,
                rd: dest,
                addr: AddrMode2::Zero { base: dest },
            }));
            Ok(())
        }
        Expr::Unary(op, inner) => {
            gen_expr(inner, rem, ctx, f)?;
            gen_unary(*op, dest, ctx, f);
            Ok(())
        }
        Expr::Binary(e1, op, e2) => gen_binary(e1, *op, e2, rem, ctx, f),
    }
}

fn slot_of(v: &Variable, ctx: &ArmCtx) -> Result<u32, CompileError> {
    ctx.env
        .lookup(&v.name)
        .ok_or_else(|| CompileError::internal(format!("unknown variable '{}'", v.name)))
}

fn gen_unary(op: UnaryOp, dest: Reg, ctx: &mut ArmCtx, f: &mut Fragment<Line>) {
    match op {
        UnaryOp::Not => {
            f.push(Line::Instr(Instr::Eor {
                cond: Cond::Al,
                s: false,
                rd: dest,
                rn: dest,
                op2: Operand2::imm(1).expect("small immediate"),
            }));
        }
        UnaryOp::Neg => {
            f.push(Line::Instr(Instr::Rsb {
                cond: Cond::Al,
                s: true,
                rd: dest,
                rn: dest,
                op2: Operand2::imm(0).expect("small immediate"),
            }));
            ctx.need(Helper::ThrowOverflow);
            f.push(Line::Instr(Instr::Bl {
                cond: Cond::Vs,
                label: Helper::ThrowOverflow.label().to_string(),
            }));
        }
        UnaryOp::Len => {
            // Arrays are length-prefixed; the pointer's first word is it.
            f.push(Line::Instr(Instr::Ldr {
                cond: Cond::Al,
                size: MemSize::Word,
                rd: dest,
                addr: AddrMode2::Zero { base: dest },
            }));
        }
        // Char and int share a representation.
        UnaryOp::Ord | UnaryOp::Chr => {}
    }
}

fn gen_binary(
    e1: &Expr,
    op: BinaryOp,
    e2: &Expr,
    rem: &[Reg],
    ctx: &mut ArmCtx,
    f: &mut Fragment<Line>,
) -> Result<(), CompileError> {
    let dest = rem[0];

    // Boolean operators short-circuit over the second operand rather than
    // combining two materialised values.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        gen_expr(e1, rem, ctx, f)?;
        let skip = ctx.labels.fresh();
        let guard = match op {
            BinaryOp::And => 0, // false decides the result
            _ => 1,             // true decides the result
        };
        f.push(Line::Instr(cmp_imm(dest, guard)));
        f.push(Line::Instr(Instr::B {
            cond: Cond::Eq,
            label: skip.clone(),
        }));
        gen_expr(e2, rem, ctx, f)?;
        f.push(Line::Label(skip));
        return Ok(());
    }

    let rest = &rem[1..];
    if rest.is_empty() {
        // Stack machine: e2 into dest, park it, e1 into dest, recover e2
        // into the reserved partner register.
        gen_expr(e2, rem, ctx, f)?;
        f.push(Line::Instr(Instr::Push { regs: vec![dest] }));
        ctx.env.push(4);
        gen_expr(e1, rem, ctx, f)?;
        f.push(Line::Instr(Instr::Pop { regs: vec![LAST] }));
        ctx.env.pop(4);
        apply_binop(op, dest, LAST, false, ctx, f);
    } else {
        let next = rest[0];
        let swapped = e2.weight() > e1.weight();
        if swapped {
            gen_expr(e2, rem, ctx, f)?;
            gen_expr(e1, rest, ctx, f)?;
        } else {
            gen_expr(e1, rem, ctx, f)?;
            gen_expr(e2, rest, ctx, f)?;
        }
        apply_binop(op, dest, next, swapped, ctx, f);
    }
    Ok(())
}

/// Combine two evaluated operands into `dest`.
///
/// The left operand's value sits in `other` when `swapped` (the heavier
/// right child was evaluated first), otherwise in `dest`.
fn apply_binop(
    op: BinaryOp,
    dest: Reg,
    other: Reg,
    swapped: bool,
    ctx: &mut ArmCtx,
    f: &mut Fragment<Line>,
) {
    let (lhs, rhs) = if swapped { (other, dest) } else { (dest, other) };
    match op {
        BinaryOp::Add => {
            f.push(Line::Instr(Instr::Add {
                cond: Cond::Al,
                s: true,
                rd: dest,
                rn: lhs,
                op2: Operand2::Reg(rhs),
            }));
            overflow_check(ctx, f);
        }
        BinaryOp::Sub => {
            f.push(Line::Instr(Instr::Sub {
                cond: Cond::Al,
                s: true,
                rd: dest,
                rn: lhs,
                op2: Operand2::Reg(rhs),
            }));
            overflow_check(ctx, f);
        }
        BinaryOp::Mul => {
            // 64-bit product; overflow iff the high word is not the sign
            // extension of the low word.
            f.push(Line::Instr(Instr::Smull {
                cond: Cond::Al,
                s: false,
                rdlo: dest,
                rdhi: other,
                rm: dest,
                rs: other,
            }));
            f.push(Line::Instr(Instr::Cmp {
                cond: Cond::Al,
                rn: other,
                op2: Operand2::RegShift {
                    rm: dest,
                    kind: ShiftKind::Asr,
                    amount: 31,
                },
            }));
            ctx.need(Helper::ThrowOverflow);
            f.push(Line::Instr(Instr::Bl {
                cond: Cond::Ne,
                label: Helper::ThrowOverflow.label().to_string(),
            }));
        }
        BinaryOp::Div | BinaryOp::Mod => {
            f.push(Line::Instr(mov_reg(Reg::R0, lhs)));
            f.push(Line::Instr(mov_reg(Reg::R1, rhs)));
            ctx.need(Helper::CheckDivZero);
            f.push(Line::Instr(bl(Helper::CheckDivZero.label())));
            if op == BinaryOp::Div {
                f.push(Line::Instr(bl("__aeabi_idiv")));
                f.push(Line::Instr(mov_reg(dest, Reg::R0)));
            } else {
                f.push(Line::Instr(bl("__aeabi_idivmod")));
                f.push(Line::Instr(mov_reg(dest, Reg::R1)));
            }
        }
        BinaryOp::Gt | BinaryOp::Gte | BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Eq
        | BinaryOp::Neq => {
            let cond = match op {
                BinaryOp::Gt => Cond::Gt,
                BinaryOp::Gte => Cond::Ge,
                BinaryOp::Lt => Cond::Lt,
                BinaryOp::Lte => Cond::Le,
                BinaryOp::Eq => Cond::Eq,
                _ => Cond::Ne,
            };
            f.push(Line::Instr(Instr::Cmp {
                cond: Cond::Al,
                rn: lhs,
                op2: Operand2::Reg(rhs),
            }));
            f.push(Line::Instr(Instr::Mov {
                cond,
                s: false,
                rd: dest,
                op2: Operand2::imm(1).expect("small immediate"),
            }));
            f.push(Line::Instr(Instr::Mov {
                cond: cond.negate(),
                s: false,
                rd: dest,
                op2: Operand2::imm(0).expect("small immediate"),
            }));
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuited earlier"),
    }
}

fn overflow_check(ctx: &mut ArmCtx, f: &mut Fragment<Line>) {
    ctx.need(Helper::ThrowOverflow);
    f.push(Line::Instr(Instr::Bl {
        cond: Cond::Vs,
        label: Helper::ThrowOverflow.label().to_string(),
    }));
}

/// Leave the address of `var[indices...]` in `rem[0]`, bounds-checking each
/// dimension. The base pointer and the current index occupy two registers,
/// re-used per dimension; with only one register free the base is parked on
/// the stack while the index evaluates.
pub(crate) fn gen_array_elem_addr(
    var: &Variable,
    indices: &[Expr],
    rem: &[Reg],
    ctx: &mut ArmCtx,
    f: &mut Fragment<Line>,
) -> Result<(), CompileError> {
    let dest = rem[0];
    let rest = &rem[1..];

    let off = slot_of(var, ctx)?;
    emit_slot_addr(dest, off, f);

    let mut cur_ty = var.ty.clone();
    for idx in indices {
        let elem_size = cur_ty.elem_size();

        // Replace the slot (or element) address with the array pointer.
        f.push(Line::Instr(Instr::Ldr {
            cond: Cond::Al,
            size: MemSize::Word,
            rd: dest,
            addr: AddrMode2::Zero { base: dest },
        }));

        let (base, index) = if rest.is_empty() {
            f.push(Line::Instr(Instr::Push { regs: vec![dest] }));
            ctx.env.push(4);
            gen_expr(idx, rem, ctx, f)?;
            f.push(Line::Instr(Instr::Pop { regs: vec![LAST] }));
            ctx.env.pop(4);
            (LAST, dest)
        } else {
            gen_expr(idx, rest, ctx, f)?;
            (dest, rest[0])
        };

        ctx.need(Helper::CheckArrayBounds);
        f.push(Line::Instr(mov_reg(Reg::R0, index)));
        f.push(Line::Instr(mov_reg(Reg::R1, base)));
        f.push(Line::Instr(bl(Helper::CheckArrayBounds.label())));

        // Step over the length word, then scale the index in. The length
        // skip accumulates into the base register so the index survives
        // when the two live in `dest` and the reserved partner.
        f.push(Line::Instr(Instr::Add {
            cond: Cond::Al,
            s: false,
            rd: base,
            rn: base,
            op2: Operand2::imm(4).expect("small immediate"),
        }));
        let op2 = if elem_size == 1 {
            Operand2::Reg(index)
        } else {
            Operand2::RegShift {
                rm: index,
                kind: ShiftKind::Lsl,
                amount: 2,
            }
        };
        f.push(Line::Instr(Instr::Add {
            cond: Cond::Al,
            s: false,
            rd: dest,
            rn: base,
            op2,
        }));

        cur_ty = cur_ty.elem_type();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Type;
    use crate::symtab::ScopeStack;

    fn ctx() -> ArmCtx {
        ArmCtx {
            pool: super::super::data::StrPool::new(),
            helpers: std::collections::BTreeSet::new(),
            labels: super::super::LabelGen::new(),
            env: ScopeStack::new(),
        }
    }

    fn rendered(f: &Fragment<Line>) -> Vec<String> {
        f.code
            .iter()
            .map(|l| match l {
                Line::Instr(i) => i.render(),
                Line::Label(l) => format!("{l}:"),
                Line::Directive(d) => d.clone(),
            })
            .collect()
    }

    fn count_stack_ops(f: &Fragment<Line>) -> usize {
        f.code
            .iter()
            .filter(|l| matches!(l, Line::Instr(Instr::Push { .. }) | Line::Instr(Instr::Pop { .. })))
            .count()
    }

    fn add(l: Expr, r: Expr) -> Expr {
        Expr::Binary(Box::new(l), BinaryOp::Add, Box::new(r))
    }

    fn balanced(depth: u32) -> Expr {
        if depth == 0 {
            Expr::IntLit(1)
        } else {
            add(balanced(depth - 1), balanced(depth - 1))
        }
    }

    #[test]
    fn literal_materialises_through_the_pool() {
        let mut c = ctx();
        let mut f = Fragment::new();
        gen_expr(&Expr::IntLit(42), &super::super::POOL, &mut c, &mut f).unwrap();
        assert_eq!(rendered(&f), vec!["LDR r4, =42"]);
    }

    #[test]
    fn weight_registers_suffice_without_stack_ops() {
        for depth in 1..=3 {
            let e = balanced(depth);
            let w = e.weight() as usize;
            let mut c = ctx();
            let mut f = Fragment::new();
            gen_expr(&e, &super::super::POOL[..w], &mut c, &mut f).unwrap();
            assert_eq!(count_stack_ops(&f), 0, "depth {depth} weight {w}");
        }
    }

    #[test]
    fn one_register_short_costs_one_push_pop_pair() {
        let e = balanced(3); // weight 4
        let w = e.weight() as usize;
        let mut c = ctx();
        let mut f = Fragment::new();
        gen_expr(&e, &super::super::POOL[..w - 1], &mut c, &mut f).unwrap();
        assert_eq!(count_stack_ops(&f), 2);
    }

    #[test]
    fn exhaustion_spills_through_reserved_register() {
        let e = add(Expr::IntLit(1), Expr::IntLit(2));
        let mut c = ctx();
        let mut f = Fragment::new();
        gen_expr(&e, &super::super::POOL[..1], &mut c, &mut f).unwrap();
        let lines = rendered(&f);
        assert_eq!(
            lines,
            vec![
                "LDR r4, =2",
                "PUSH {r4}",
                "LDR r4, =1",
                "POP {r11}",
                "ADDS r4, r4, r11",
                "BLVS p_throw_overflow_error",
            ]
        );
    }

    #[test]
    fn heavier_child_evaluates_first() {
        // 1 + (2 * 3): the product evaluates into r4 first, the literal 1
        // into r5, and the non-commutative orientation is preserved.
        let mul = Expr::Binary(
            Box::new(Expr::IntLit(2)),
            BinaryOp::Mul,
            Box::new(Expr::IntLit(3)),
        );
        let e = Expr::Binary(Box::new(Expr::IntLit(1)), BinaryOp::Sub, Box::new(mul));
        let mut c = ctx();
        let mut f = Fragment::new();
        gen_expr(&e, &super::super::POOL, &mut c, &mut f).unwrap();
        let lines = rendered(&f);
        assert!(lines.contains(&"SUBS r4, r5, r4".to_string()), "{lines:?}");
        assert_eq!(count_stack_ops(&f), 0);
    }

    #[test]
    fn and_short_circuits_over_second_operand() {
        let e = Expr::Binary(
            Box::new(Expr::BoolLit(false)),
            BinaryOp::And,
            Box::new(Expr::BoolLit(true)),
        );
        let mut c = ctx();
        let mut f = Fragment::new();
        gen_expr(&e, &super::super::POOL, &mut c, &mut f).unwrap();
        let lines = rendered(&f);
        assert_eq!(
            lines,
            vec![
                "MOV r4, #0",
                "CMP r4, #0",
                "BEQ L0",
                "MOV r4, #1",
                "L0:",
            ]
        );
    }

    #[test]
    fn division_goes_through_aeabi_with_zero_check() {
        let e = Expr::Binary(
            Box::new(Expr::IntLit(7)),
            BinaryOp::Div,
            Box::new(Expr::IntLit(2)),
        );
        let mut c = ctx();
        let mut f = Fragment::new();
        gen_expr(&e, &super::super::POOL, &mut c, &mut f).unwrap();
        let lines = rendered(&f);
        let want = [
            "MOV r0, r4",
            "MOV r1, r5",
            "BL p_check_divide_by_zero",
            "BL __aeabi_idiv",
            "MOV r4, r0",
        ];
        for w in want {
            assert!(lines.contains(&w.to_string()), "missing {w} in {lines:?}");
        }
        assert!(c.helpers.contains(&Helper::CheckDivZero));
    }

    #[test]
    fn comparison_sets_one_or_zero() {
        let e = Expr::Binary(
            Box::new(Expr::IntLit(1)),
            BinaryOp::Lte,
            Box::new(Expr::IntLit(2)),
        );
        let mut c = ctx();
        let mut f = Fragment::new();
        gen_expr(&e, &super::super::POOL, &mut c, &mut f).unwrap();
        let lines = rendered(&f);
        assert!(lines.contains(&"CMP r4, r5".to_string()));
        assert!(lines.contains(&"MOVLE r4, #1".to_string()));
        assert!(lines.contains(&"MOVGT r4, #0".to_string()));
    }

    #[test]
    fn array_access_bounds_checks_each_dimension() {
        let mut c = ctx();
        c.env.enter(4);
        c.env.declare("a");
        let e = Expr::ArrayElem {
            var: Variable::new("a", Type::array(Type::Int, 2)),
            indices: vec![Expr::IntLit(0), Expr::IntLit(1)],
            elem_ty: Type::Int,
        };
        let mut f = Fragment::new();
        gen_expr(&e, &super::super::POOL, &mut c, &mut f).unwrap();
        let lines = rendered(&f);
        let checks = lines
            .iter()
            .filter(|l| l.as_str() == "BL p_check_array_bounds")
            .count();
        assert_eq!(checks, 2);
        // Word elements scale by shift, and the final load is a word load.
        assert!(lines.contains(&"ADD r4, r4, r5, LSL #2".to_string()), "{lines:?}");
        assert_eq!(lines.last().unwrap(), "LDR r4, [r4]");
    }

    #[test]
    fn char_array_elements_load_bytes_without_scaling() {
        let mut c = ctx();
        c.env.enter(4);
        c.env.declare("s");
        let e = Expr::ArrayElem {
            var: Variable::new("s", Type::array(Type::Char, 1)),
            indices: vec![Expr::IntLit(2)],
            elem_ty: Type::Char,
        };
        let mut f = Fragment::new();
        gen_expr(&e, &super::super::POOL, &mut c, &mut f).unwrap();
        let lines = rendered(&f);
        assert!(lines.contains(&"ADD r4, r4, r5".to_string()), "{lines:?}");
        assert_eq!(lines.last().unwrap(), "LDRSB r4, [r4]");
    }

    #[test]
    fn pending_push_shifts_variable_loads() {
        // Under register exhaustion the parked value moves sp, so the slot
        // offset of a variable read inside the left operand grows by 4.
        let mut c = ctx();
        c.env.enter(4);
        c.env.declare("x");
        let e = add(
            Expr::Ident(Variable::new("x", Type::Int)),
            Expr::IntLit(1),
        );
        let mut f = Fragment::new();
        gen_expr(&e, &super::super::POOL[..1], &mut c, &mut f).unwrap();
        let lines = rendered(&f);
        assert!(lines.contains(&"LDR r4, [sp, #4]".to_string()), "{lines:?}");
    }
}
