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

//! Statement lowering for the JVM backend.

use crate::ast::{AssignLhs, AssignRhs, Expr, PairSide, Stmt, Type};
use crate::error::CompileError;

use super::expr::{array_new, array_store, gen_expr, store_var};
use super::insn::JInstr;
use super::{to_boxed, to_primitive, JvmCtx, PAIR_CLASS};

fn pair_field(side: PairSide) -> String {
    match side {
        PairSide::Fst => format!("{}/fst", PAIR_CLASS),
        PairSide::Snd => format!("{}/snd", PAIR_CLASS),
    }
}

const OBJECT_DESC: &str = "Ljava/lang/Object;";

pub(crate) fn gen_stmt(
    s: &Stmt,
    ctx: &mut JvmCtx,
    code: &mut Vec<JInstr>,
) -> Result<(), CompileError> {
    match s {
        Stmt::Skip => Ok(()),
        Stmt::Seq(a, b) => {
            gen_stmt(a, ctx, code)?;
            gen_stmt(b, ctx, code)
        }
        Stmt::Block(stmts) => {
            ctx.enter_scope();
            for st in stmts {
                gen_stmt(st, ctx, code)?;
            }
            ctx.exit_scope();
            Ok(())
        }
        Stmt::Decl(var, rhs) => {
            gen_rhs(rhs, ctx, code)?;
            let slot = ctx.declare(&var.name);
            code.push(store_var(&var.ty, slot));
            Ok(())
        }
        Stmt::Assign(lhs, rhs) => match lhs {
            AssignLhs::Var(v) => {
                gen_rhs(rhs, ctx, code)?;
                let slot = ctx.lookup(&v.name)?;
                code.push(store_var(&v.ty, slot));
                Ok(())
            }
            AssignLhs::ArrayElem {
                var,
                indices,
                elem_ty,
            } => {
                push_element_container(var, indices, ctx, code)?;
                gen_rhs(rhs, ctx, code)?;
                code.push(array_store(elem_ty));
                Ok(())
            }
            AssignLhs::PairElem(side, pair) => {
                gen_expr(pair, ctx, code)?;
                gen_rhs(rhs, ctx, code)?;
                to_boxed(&lhs.ty(), code);
                code.push(JInstr::Putfield {
                    field: pair_field(*side),
                    desc: OBJECT_DESC.to_string(),
                });
                Ok(())
            }
        },
        Stmt::Read(lhs) => {
            let target_ty = lhs.ty();
            match lhs {
                AssignLhs::Var(v) => {
                    read_value(&target_ty, code)?;
                    let slot = ctx.lookup(&v.name)?;
                    code.push(store_var(&v.ty, slot));
                }
                AssignLhs::ArrayElem {
                    var,
                    indices,
                    elem_ty,
                } => {
                    push_element_container(var, indices, ctx, code)?;
                    read_value(&target_ty, code)?;
                    code.push(array_store(elem_ty));
                }
                AssignLhs::PairElem(side, pair) => {
                    gen_expr(pair, ctx, code)?;
                    read_value(&target_ty, code)?;
                    to_boxed(&target_ty, code);
                    code.push(JInstr::Putfield {
                        field: pair_field(*side),
                        desc: OBJECT_DESC.to_string(),
                    });
                }
            }
            Ok(())
        }
        Stmt::Free(e) => {
            // The JVM collects; evaluate for effect and drop the reference.
            gen_expr(e, ctx, code)?;
            code.push(JInstr::Pop);
            Ok(())
        }
        Stmt::Return(e) => {
            gen_expr(e, ctx, code)?;
            code.push(if ctx.ret_ty.is_reference() {
                JInstr::Areturn
            } else {
                JInstr::Ireturn
            });
            Ok(())
        }
        Stmt::Exit(e) => {
            gen_expr(e, ctx, code)?;
            code.push(JInstr::Invokestatic(
                "java/lang/System/exit(I)V".to_string(),
            ));
            Ok(())
        }
        Stmt::Print { expr, newline } => {
            code.push(JInstr::Getstatic {
                field: "java/lang/System/out".to_string(),
                desc: "Ljava/io/PrintStream;".to_string(),
            });
            gen_expr(expr, ctx, code)?;
            let name = if *newline { "println" } else { "print" };
            code.push(JInstr::Invokevirtual(format!(
                "java/io/PrintStream/{}{}",
                name,
                print_desc(&expr.ty())
            )));
            Ok(())
        }
        Stmt::If {
            cond,
            then_body,
            else_body,
        } => {
            let otherwise = ctx.fresh_label();
            let done = ctx.fresh_label();
            gen_expr(cond, ctx, code)?;
            code.push(JInstr::Ifeq(otherwise.clone()));
            gen_stmt(then_body, ctx, code)?;
            code.push(JInstr::Goto(done.clone()));
            code.push(JInstr::Label(otherwise));
            gen_stmt(else_body, ctx, code)?;
            code.push(JInstr::Label(done));
            Ok(())
        }
        Stmt::While { cond, body } => {
            if matches!(cond, Expr::BoolLit(true)) {
                let head = ctx.fresh_label();
                code.push(JInstr::Label(head.clone()));
                gen_stmt(body, ctx, code)?;
                code.push(JInstr::Goto(head));
                return Ok(());
            }
            let head = ctx.fresh_label();
            let done = ctx.fresh_label();
            code.push(JInstr::Label(head.clone()));
            gen_expr(cond, ctx, code)?;
            code.push(JInstr::Ifeq(done.clone()));
            gen_stmt(body, ctx, code)?;
            code.push(JInstr::Goto(head));
            code.push(JInstr::Label(done));
            Ok(())
        }
        Stmt::Call { name, args } => {
            for arg in args {
                gen_expr(arg, ctx, code)?;
            }
            let (spec, _) = ctx.method_spec(name)?;
            code.push(JInstr::Invokestatic(spec));
            // Every WACC function returns a value; a call statement drops it.
            code.push(JInstr::Pop);
            Ok(())
        }
    }
}

fn print_desc(ty: &Type) -> &'static str {
    match ty {
        Type::Int => "(I)V",
        Type::Bool => "(Z)V",
        Type::Char => "(C)V",
        Type::Str => "(Ljava/lang/String;)V",
        // A flat char array prints as text, like the ARM backend.
        Type::Array { elem, depth } if **elem == Type::Char && *depth == 1 => "([C)V",
        _ => "(Ljava/lang/Object;)V",
    }
}

/// Push the innermost array reference and the final index, ready for a
/// `<t>astore` once the value joins them.
fn push_element_container(
    var: &crate::ast::Variable,
    indices: &[Expr],
    ctx: &mut JvmCtx,
    code: &mut Vec<JInstr>,
) -> Result<(), CompileError> {
    let slot = ctx.lookup(&var.name)?;
    code.push(JInstr::Aload(slot));
    for idx in &indices[..indices.len() - 1] {
        gen_expr(idx, ctx, code)?;
        code.push(JInstr::Aaload);
    }
    gen_expr(indices.last().expect("array access has an index"), ctx, code)
}

/// Read one value from stdin onto the stack.
fn read_value(ty: &Type, code: &mut Vec<JInstr>) -> Result<(), CompileError> {
    code.push(JInstr::New("java/util/Scanner".to_string()));
    code.push(JInstr::Dup);
    code.push(JInstr::Getstatic {
        field: "java/lang/System/in".to_string(),
        desc: "Ljava/io/InputStream;".to_string(),
    });
    code.push(JInstr::Invokespecial(
        "java/util/Scanner/<init>(Ljava/io/InputStream;)V".to_string(),
    ));
    match ty {
        Type::Int => {
            code.push(JInstr::Invokevirtual(
                "java/util/Scanner/nextInt()I".to_string(),
            ));
            Ok(())
        }
        Type::Char => {
            code.push(JInstr::Invokevirtual(
                "java/util/Scanner/next()Ljava/lang/String;".to_string(),
            ));
            code.push(JInstr::Ldc(0));
            code.push(JInstr::Invokevirtual(
                "java/lang/String/charAt(I)C".to_string(),
            ));
            Ok(())
        }
        other => Err(CompileError::internal(format!(
            "read target has unreadable type {other:?}"
        ))),
    }
}

/// Evaluate a right-hand side onto the stack.
pub(crate) fn gen_rhs(
    rhs: &AssignRhs,
    ctx: &mut JvmCtx,
    code: &mut Vec<JInstr>,
) -> Result<(), CompileError> {
    match rhs {
        AssignRhs::Expr(e) => gen_expr(e, ctx, code),
        AssignRhs::ArrayLit { elems, elem_ty } => {
            code.push(JInstr::Ldc(elems.len() as i32));
            code.push(array_new(elem_ty));
            for (i, e) in elems.iter().enumerate() {
                code.push(JInstr::Dup);
                code.push(JInstr::Ldc(i as i32));
                gen_expr(e, ctx, code)?;
                code.push(array_store(elem_ty));
            }
            Ok(())
        }
        AssignRhs::NewPair(a, b) => {
            code.push(JInstr::New(PAIR_CLASS.to_string()));
            code.push(JInstr::Dup);
            gen_expr(a, ctx, code)?;
            to_boxed(&a.ty(), code);
            gen_expr(b, ctx, code)?;
            to_boxed(&b.ty(), code);
            code.push(JInstr::Invokespecial(format!(
                "{}/<init>({}{})V",
                PAIR_CLASS, OBJECT_DESC, OBJECT_DESC
            )));
            Ok(())
        }
        AssignRhs::PairElem(side, pair) => {
            gen_expr(pair, ctx, code)?;
            code.push(JInstr::Getfield {
                field: pair_field(*side),
                desc: OBJECT_DESC.to_string(),
            });
            to_primitive(&pair.ty().pair_field(*side), code);
            Ok(())
        }
        AssignRhs::Call { name, args, .. } => {
            for arg in args {
                gen_expr(arg, ctx, code)?;
            }
            let (spec, _) = ctx.method_spec(name)?;
            code.push(JInstr::Invokestatic(spec));
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
    fn newpair_boxes_both_components() {
        let mut c = ctx();
        let mut code = Vec::new();
        let rhs = AssignRhs::NewPair(Expr::IntLit(1), Expr::CharLit(b'a'));
        gen_rhs(&rhs, &mut c, &mut code).unwrap();
        let lines = renders(&code);
        assert_eq!(lines[0], "new wacc/lang/Pair");
        assert!(lines
            .iter()
            .any(|l| l.contains("Integer/valueOf(I)Ljava/lang/Integer;")));
        assert!(lines
            .iter()
            .any(|l| l.contains("Character/valueOf(C)Ljava/lang/Character;")));
        assert!(lines.last().unwrap().contains(
            "wacc/lang/Pair/<init>(Ljava/lang/Object;Ljava/lang/Object;)V"
        ));
    }

    #[test]
    fn pair_read_unboxes_to_the_static_type() {
        let mut c = ctx();
        c.declare("p");
        let mut code = Vec::new();
        let rhs = AssignRhs::PairElem(
            PairSide::Snd,
            Expr::Ident(Variable::new("p", Type::pair(Type::Char, Type::Int))),
        );
        gen_rhs(&rhs, &mut c, &mut code).unwrap();
        let lines = renders(&code);
        assert!(lines.contains(&"getfield wacc/lang/Pair/snd Ljava/lang/Object;".to_string()));
        assert!(lines.contains(&"checkcast java/lang/Integer".to_string()));
        assert!(lines.contains(&"invokevirtual java/lang/Integer/intValue()I".to_string()));
    }

    #[test]
    fn array_literal_fills_every_slot() {
        let mut c = ctx();
        let mut code = Vec::new();
        let rhs = AssignRhs::ArrayLit {
            elems: vec![Expr::IntLit(7), Expr::IntLit(8)],
            elem_ty: Type::Int,
        };
        gen_rhs(&rhs, &mut c, &mut code).unwrap();
        assert_eq!(
            renders(&code),
            vec![
                "iconst_2",
                "newarray int",
                "dup",
                "iconst_0",
                "bipush 7",
                "iastore",
                "dup",
                "iconst_1",
                "bipush 8",
                "iastore",
            ]
        );
    }

    #[test]
    fn print_char_array_uses_char_array_overload() {
        let mut c = ctx();
        c.declare("s");
        let mut code = Vec::new();
        let s = Stmt::Print {
            expr: Expr::Ident(Variable::new("s", Type::array(Type::Char, 1))),
            newline: false,
        };
        gen_stmt(&s, &mut c, &mut code).unwrap();
        let lines = renders(&code);
        assert!(lines.contains(&"invokevirtual java/io/PrintStream/print([C)V".to_string()));
    }

    #[test]
    fn exit_calls_system_exit() {
        let mut c = ctx();
        let mut code = Vec::new();
        gen_stmt(&Stmt::Exit(Expr::IntLit(3)), &mut c, &mut code).unwrap();
        assert_eq!(
            renders(&code),
            vec!["iconst_3", "invokestatic java/lang/System/exit(I)V"]
        );
    }

    #[test]
    fn read_char_goes_through_scanner_next() {
        let mut c = ctx();
        c.declare("ch");
        let mut code = Vec::new();
        let s = Stmt::Read(AssignLhs::Var(Variable::new("ch", Type::Char)));
        gen_stmt(&s, &mut c, &mut code).unwrap();
        let lines = renders(&code);
        assert!(lines.contains(&"new java/util/Scanner".to_string()));
        assert!(lines.contains(&"invokevirtual java/lang/String/charAt(I)C".to_string()));
        assert_eq!(lines.last().unwrap(), "istore 0");
    }

    #[test]
    fn while_true_loops_unconditionally() {
        let mut c = ctx();
        let mut code = Vec::new();
        let s = Stmt::While {
            cond: Expr::BoolLit(true),
            body: Box::new(Stmt::Skip),
        };
        gen_stmt(&s, &mut c, &mut code).unwrap();
        assert_eq!(renders(&code), vec!["L0:", "goto L0"]);
    }

    #[test]
    fn block_scopes_do_not_leak_but_slots_advance() {
        let mut c = ctx();
        let mut code = Vec::new();
        let inner = Stmt::Block(vec![Stmt::Decl(
            Variable::new("x", Type::Int),
            AssignRhs::Expr(Expr::IntLit(1)),
        )]);
        gen_stmt(&inner, &mut c, &mut code).unwrap();
        assert!(c.lookup("x").is_err());
        // The next declaration takes a fresh slot; the counter never rewinds.
        let s = Stmt::Decl(
            Variable::new("y", Type::Int),
            AssignRhs::Expr(Expr::IntLit(2)),
        );
        gen_stmt(&s, &mut c, &mut code).unwrap();
        assert_eq!(c.lookup("y").unwrap(), 1);
    }

    #[test]
    fn function_calls_use_registered_signatures() {
        let mut funcs = HashMap::new();
        funcs.insert(
            "inc".to_string(),
            (vec![Type::Int], Type::Int),
        );
        let mut c = JvmCtx::new(funcs, Type::Int);
        let mut code = Vec::new();
        let rhs = AssignRhs::Call {
            name: "inc".to_string(),
            args: vec![Expr::IntLit(4)],
            ret_ty: Type::Int,
        };
        gen_rhs(&rhs, &mut c, &mut code).unwrap();
        assert_eq!(
            renders(&code),
            vec!["iconst_4", "invokestatic WaccProgram/f_inc(I)I"]
        );
    }
}
