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

//! Expression lowering for the JVM backend: a post-order stack
//! construction, each operator popping its arity and pushing its result.
//! Integer arithmetic routes through the `Math.*Exact` family so overflow
//! surfaces as `ArithmeticException`, mirroring the ARM overflow checks.

use crate::ast::{BinaryOp, Expr, Type, UnaryOp};
use crate::error::CompileError;

use super::insn::{JCmp, JInstr, JPrim};
use super::JvmCtx;

/// The `<t>aload` for one element of the given element type.
pub(crate) fn array_load(elem_ty: &Type) -> JInstr {
    match elem_ty {
        Type::Int => JInstr::Iaload,
        Type::Char => JInstr::Caload,
        Type::Bool => JInstr::Baload,
        _ => JInstr::Aaload,
    }
}

pub(crate) fn array_store(elem_ty: &Type) -> JInstr {
    match elem_ty {
        Type::Int => JInstr::Iastore,
        Type::Char => JInstr::Castore,
        Type::Bool => JInstr::Bastore,
        _ => JInstr::Aastore,
    }
}

/// The `newarray`/`anewarray` allocating a one-dimension payload of the
/// given element type.
pub(crate) fn array_new(elem_ty: &Type) -> JInstr {
    match elem_ty {
        Type::Int => JInstr::Newarray(JPrim::Int),
        Type::Char => JInstr::Newarray(JPrim::Char),
        Type::Bool => JInstr::Newarray(JPrim::Boolean),
        Type::Str => JInstr::Anewarray("java/lang/String".to_string()),
        Type::Pair { .. } => JInstr::Anewarray(super::PAIR_CLASS.to_string()),
        Type::Array { .. } => JInstr::Anewarray(super::descriptor(elem_ty)),
    }
}

pub(crate) fn load_var(ty: &Type, slot: u16) -> JInstr {
    if ty.is_reference() {
        JInstr::Aload(slot)
    } else {
        JInstr::Iload(slot)
    }
}

pub(crate) fn store_var(ty: &Type, slot: u16) -> JInstr {
    if ty.is_reference() {
        JInstr::Astore(slot)
    } else {
        JInstr::Istore(slot)
    }
}

pub(crate) fn gen_expr(
    e: &Expr,
    ctx: &mut JvmCtx,
    code: &mut Vec<JInstr>,
) -> Result<(), CompileError> {
    match e {
        Expr::IntLit(n) => {
            code.push(JInstr::Ldc(*n));
            Ok(())
        }
        Expr::BoolLit(b) => {
            code.push(JInstr::Ldc(*b as i32));
            Ok(())
        }
        Expr::CharLit(c) => {
            code.push(JInstr::Ldc(*c as i32));
            Ok(())
        }
        Expr::StrLit(s) => {
            code.push(JInstr::LdcStr(s.clone()));
            Ok(())
        }
        Expr::NullLit => {
            code.push(JInstr::AconstNull);
            Ok(())
        }
        Expr::Ident(v) => {
            let slot = ctx.lookup(&v.name)?;
            code.push(load_var(&v.ty, slot));
            Ok(())
        }
        Expr::ArrayElem { var, indices, .. } => {
            let slot = ctx.lookup(&var.name)?;
            code.push(JInstr::Aload(slot));
            let mut cur = var.ty.clone();
            for (k, idx) in indices.iter().enumerate() {
                gen_expr(idx, ctx, code)?;
                if k + 1 < indices.len() {
                    code.push(JInstr::Aaload);
                } else {
                    code.push(array_load(&cur.elem_type()));
                }
                cur = cur.elem_type();
            }
            Ok(())
        }
        Expr::Unary(op, inner) => {
            gen_expr(inner, ctx, code)?;
            match op {
                UnaryOp::Not => {
                    code.push(JInstr::Ldc(1));
                    code.push(JInstr::Ixor);
                }
                UnaryOp::Neg => {
                    code.push(JInstr::Invokestatic(
                        "java/lang/Math/negateExact(I)I".to_string(),
                    ));
                }
                UnaryOp::Len => code.push(JInstr::Arraylength),
                UnaryOp::Ord => {}
                UnaryOp::Chr => code.push(JInstr::I2c),
            }
            Ok(())
        }
        Expr::Binary(e1, op, e2) => gen_binary(e1, *op, e2, ctx, code),
    }
}

fn gen_binary(
    e1: &Expr,
    op: BinaryOp,
    e2: &Expr,
    ctx: &mut JvmCtx,
    code: &mut Vec<JInstr>,
) -> Result<(), CompileError> {
    match op {
        BinaryOp::And | BinaryOp::Or => {
            // Short-circuit: the first operand alone may decide the result.
            let decided = ctx.fresh_label();
            let done = ctx.fresh_label();
            gen_expr(e1, ctx, code)?;
            let (branch, result) = match op {
                BinaryOp::And => (JInstr::Ifeq(decided.clone()), 0),
                _ => (JInstr::Ifne(decided.clone()), 1),
            };
            code.push(branch);
            gen_expr(e2, ctx, code)?;
            code.push(JInstr::Goto(done.clone()));
            code.push(JInstr::Label(decided));
            code.push(JInstr::Ldc(result));
            code.push(JInstr::Label(done));
            Ok(())
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
            gen_expr(e1, ctx, code)?;
            gen_expr(e2, ctx, code)?;
            let spec = match op {
                BinaryOp::Add => "java/lang/Math/addExact(II)I",
                BinaryOp::Sub => "java/lang/Math/subtractExact(II)I",
                _ => "java/lang/Math/multiplyExact(II)I",
            };
            code.push(JInstr::Invokestatic(spec.to_string()));
            Ok(())
        }
        BinaryOp::Div | BinaryOp::Mod => {
            gen_expr(e1, ctx, code)?;
            gen_expr(e2, ctx, code)?;
            code.push(if op == BinaryOp::Div {
                JInstr::Idiv
            } else {
                JInstr::Irem
            });
            Ok(())
        }
        BinaryOp::Gt | BinaryOp::Gte | BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Eq
        | BinaryOp::Neq => {
            gen_expr(e1, ctx, code)?;
            gen_expr(e2, ctx, code)?;
            let truthy = ctx.fresh_label();
            let done = ctx.fresh_label();
            let branch = if e1.ty().is_reference() {
                match op {
                    BinaryOp::Eq => JInstr::IfAcmpEq(truthy.clone()),
                    _ => JInstr::IfAcmpNe(truthy.clone()),
                }
            } else {
                let cmp = match op {
                    BinaryOp::Gt => JCmp::Gt,
                    BinaryOp::Gte => JCmp::Ge,
                    BinaryOp::Lt => JCmp::Lt,
                    BinaryOp::Lte => JCmp::Le,
                    BinaryOp::Eq => JCmp::Eq,
                    _ => JCmp::Ne,
                };
                JInstr::IfIcmp(cmp, truthy.clone())
            };
            code.push(branch);
            code.push(JInstr::Ldc(0));
            code.push(JInstr::Goto(done.clone()));
            code.push(JInstr::Label(truthy));
            code.push(JInstr::Ldc(1));
            code.push(JInstr::Label(done));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Variable;
    use std::collections::HashMap;

    fn ctx() -> JvmCtx {
        JvmCtx::new(HashMap::new(), Type::Int)
    }

    fn renders(code: &[JInstr]) -> Vec<String> {
        code.iter().map(|i| i.render()).collect()
    }

    #[test]
    fn arithmetic_routes_through_exact_math() {
        let e = Expr::Binary(
            Box::new(Expr::IntLit(1)),
            BinaryOp::Add,
            Box::new(Expr::IntLit(2)),
        );
        let mut c = ctx();
        let mut code = Vec::new();
        gen_expr(&e, &mut c, &mut code).unwrap();
        assert_eq!(
            renders(&code),
            vec![
                "iconst_1",
                "iconst_2",
                "invokestatic java/lang/Math/addExact(II)I",
            ]
        );
    }

    #[test]
    fn comparison_materialises_zero_or_one() {
        let e = Expr::Binary(
            Box::new(Expr::IntLit(1)),
            BinaryOp::Lt,
            Box::new(Expr::IntLit(2)),
        );
        let mut c = ctx();
        let mut code = Vec::new();
        gen_expr(&e, &mut c, &mut code).unwrap();
        assert_eq!(
            renders(&code),
            vec![
                "iconst_1",
                "iconst_2",
                "if_icmplt L0",
                "iconst_0",
                "goto L1",
                "L0:",
                "iconst_1",
                "L1:",
            ]
        );
    }

    #[test]
    fn pair_equality_compares_references() {
        let p = Variable::new("p", Type::pair(Type::Int, Type::Int));
        let e = Expr::Binary(
            Box::new(Expr::Ident(p.clone())),
            BinaryOp::Eq,
            Box::new(Expr::NullLit),
        );
        let mut c = ctx();
        c.declare("p");
        let mut code = Vec::new();
        gen_expr(&e, &mut c, &mut code).unwrap();
        let lines = renders(&code);
        assert!(lines.contains(&"if_acmpeq L0".to_string()), "{lines:?}");
    }

    #[test]
    fn and_short_circuits() {
        let e = Expr::Binary(
            Box::new(Expr::BoolLit(false)),
            BinaryOp::And,
            Box::new(Expr::BoolLit(true)),
        );
        let mut c = ctx();
        let mut code = Vec::new();
        gen_expr(&e, &mut c, &mut code).unwrap();
        assert_eq!(
            renders(&code),
            vec![
                "iconst_0",
                "ifeq L0",
                "iconst_1",
                "goto L1",
                "L0:",
                "iconst_0",
                "L1:",
            ]
        );
    }

    #[test]
    fn nested_array_access_loads_dimension_by_dimension() {
        let e = Expr::ArrayElem {
            var: Variable::new("m", Type::array(Type::Int, 2)),
            indices: vec![Expr::IntLit(0), Expr::IntLit(1)],
            elem_ty: Type::Int,
        };
        let mut c = ctx();
        c.declare("m");
        let mut code = Vec::new();
        gen_expr(&e, &mut c, &mut code).unwrap();
        assert_eq!(
            renders(&code),
            vec!["aload 0", "iconst_0", "aaload", "iconst_1", "iaload"]
        );
    }

    #[test]
    fn unary_not_flips_the_low_bit() {
        let e = Expr::Unary(UnaryOp::Not, Box::new(Expr::BoolLit(true)));
        let mut c = ctx();
        let mut code = Vec::new();
        gen_expr(&e, &mut c, &mut code).unwrap();
        assert_eq!(renders(&code), vec!["iconst_1", "iconst_1", "ixor"]);
    }

    #[test]
    fn len_is_arraylength() {
        let e = Expr::Unary(
            UnaryOp::Len,
            Box::new(Expr::Ident(Variable::new("a", Type::array(Type::Int, 1)))),
        );
        let mut c = ctx();
        c.declare("a");
        let mut code = Vec::new();
        gen_expr(&e, &mut c, &mut code).unwrap();
        assert_eq!(renders(&code), vec!["aload 0", "arraylength"]);
    }
}
