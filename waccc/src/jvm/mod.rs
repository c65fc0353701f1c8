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

//! JVM backend: one Jasmin class `WaccProgram` with a static method per
//! user function, plus a `wacc/lang/Pair` support class when the program
//! touches pairs.
//!
//! Pair fields are typed `Object`, so every read of one is followed by a
//! `to_primitive` coercion when the static type is primitive, and every
//! write is preceded by `to_boxed`. Arrays keep native descriptors.

pub mod expr;
pub mod insn;
pub mod stmt;

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::ast::{Function, Program, Stmt, Type, AssignRhs, AssignLhs, Expr};
use crate::error::CompileError;

use insn::{max_stack, JInstr};

pub const PAIR_CLASS: &str = "wacc/lang/Pair";
pub const PROGRAM_CLASS: &str = "WaccProgram";

/// JVM field descriptor of a WACC type.
pub fn descriptor(ty: &Type) -> String {
    match ty {
        Type::Int => "I".to_string(),
        Type::Bool => "Z".to_string(),
        Type::Char => "C".to_string(),
        Type::Str => "Ljava/lang/String;".to_string(),
        Type::Array { elem, depth } => {
            format!("{}{}", "[".repeat(*depth as usize), descriptor(elem))
        }
        Type::Pair { .. } => format!("L{};", PAIR_CLASS),
    }
}

/// Box the primitive on top of the stack into its wrapper; references pass
/// through untouched.
pub fn to_boxed(ty: &Type, code: &mut Vec<JInstr>) {
    let spec = match ty {
        Type::Int => "java/lang/Integer/valueOf(I)Ljava/lang/Integer;",
        Type::Bool => "java/lang/Boolean/valueOf(Z)Ljava/lang/Boolean;",
        Type::Char => "java/lang/Character/valueOf(C)Ljava/lang/Character;",
        _ => return,
    };
    code.push(JInstr::Invokestatic(spec.to_string()));
}

/// Coerce the `Object` on top of the stack to `ty`: unbox primitives,
/// downcast references.
pub fn to_primitive(ty: &Type, code: &mut Vec<JInstr>) {
    match ty {
        Type::Int => {
            code.push(JInstr::Checkcast("java/lang/Integer".to_string()));
            code.push(JInstr::Invokevirtual(
                "java/lang/Integer/intValue()I".to_string(),
            ));
        }
        Type::Bool => {
            code.push(JInstr::Checkcast("java/lang/Boolean".to_string()));
            code.push(JInstr::Invokevirtual(
                "java/lang/Boolean/booleanValue()Z".to_string(),
            ));
        }
        Type::Char => {
            code.push(JInstr::Checkcast("java/lang/Character".to_string()));
            code.push(JInstr::Invokevirtual(
                "java/lang/Character/charValue()C".to_string(),
            ));
        }
        Type::Str => code.push(JInstr::Checkcast("java/lang/String".to_string())),
        Type::Array { .. } => code.push(JInstr::Checkcast(descriptor(ty))),
        Type::Pair { .. } => code.push(JInstr::Checkcast(PAIR_CLASS.to_string())),
    }
}

/// Per-method lowering state: a scope chain over one ever-growing slot
/// counter (all WACC values are category 1), a label source, and the
/// signatures of every user function for call descriptors.
pub(crate) struct JvmCtx {
    scopes: Vec<HashMap<String, u16>>,
    next_slot: u16,
    next_label: u32,
    pub ret_ty: Type,
    pub funcs: HashMap<String, (Vec<Type>, Type)>,
}

impl JvmCtx {
    fn new(funcs: HashMap<String, (Vec<Type>, Type)>, ret_ty: Type) -> Self {
        Self {
            scopes: vec![HashMap::new()],
            next_slot: 0,
            next_label: 0,
            ret_ty,
            funcs,
        }
    }

    pub fn fresh_label(&mut self) -> String {
        let l = format!("L{}", self.next_label);
        self.next_label += 1;
        l
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn exit_scope(&mut self) {
        self.scopes.pop().expect("scope stack");
    }

    pub fn declare(&mut self, name: &str) -> u16 {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.scopes
            .last_mut()
            .expect("scope stack")
            .insert(name.to_string(), slot);
        slot
    }

    pub fn lookup(&self, name: &str) -> Result<u16, CompileError> {
        self.scopes
            .iter()
            .rev()
            .find_map(|m| m.get(name))
            .copied()
            .ok_or_else(|| CompileError::internal(format!("unknown variable '{}'", name)))
    }

    /// Jasmin spec `WaccProgram/f_<name>(<params>)<ret>` of a user function.
    pub fn method_spec(&self, name: &str) -> Result<(String, Type), CompileError> {
        let (params, ret) = self
            .funcs
            .get(name)
            .ok_or_else(|| CompileError::internal(format!("unknown function '{}'", name)))?;
        let mut desc = String::new();
        for p in params {
            desc.push_str(&descriptor(p));
        }
        Ok((
            format!("{}/f_{}({}){}", PROGRAM_CLASS, name, desc, descriptor(ret)),
            ret.clone(),
        ))
    }
}

fn func_signatures(p: &Program) -> HashMap<String, (Vec<Type>, Type)> {
    p.funcs
        .iter()
        .map(|f| {
            (
                f.name.clone(),
                (
                    f.params.iter().map(|v| v.ty.clone()).collect(),
                    f.ret_ty.clone(),
                ),
            )
        })
        .collect()
}

fn render_method(header: &str, code: &[JInstr], locals: u16, stack: u32, out: &mut String) {
    let _ = writeln!(out, ".method public static {}", header);
    let _ = writeln!(out, ".limit stack {}", stack);
    let _ = writeln!(out, ".limit locals {}", locals);
    for i in code {
        match i {
            JInstr::Label(_) => {
                let _ = writeln!(out, "{}", i.render());
            }
            _ => {
                let _ = writeln!(out, "\t{}", i.render());
            }
        }
    }
    let _ = writeln!(out, ".end method");
    let _ = writeln!(out);
}

fn gen_function(func: &Function, funcs: &HashMap<String, (Vec<Type>, Type)>) -> Result<String, CompileError> {
    let mut ctx = JvmCtx::new(funcs.clone(), func.ret_ty.clone());
    for p in &func.params {
        ctx.declare(&p.name);
    }
    let mut code = Vec::new();
    stmt::gen_stmt(&func.body, &mut ctx, &mut code)?;

    let mut desc = String::new();
    for p in &func.params {
        desc.push_str(&descriptor(&p.ty));
    }
    let header = format!("f_{}({}){}", func.name, desc, descriptor(&func.ret_ty));
    let mut out = String::new();
    render_method(&header, &code, ctx.next_slot.max(1), max_stack(&code), &mut out);
    Ok(out)
}

fn gen_main(p: &Program, funcs: &HashMap<String, (Vec<Type>, Type)>) -> Result<String, CompileError> {
    let mut ctx = JvmCtx::new(funcs.clone(), Type::Int);
    // Slot 0 belongs to the argument array.
    ctx.next_slot = 1;

    let start = ctx.fresh_label();
    let end = ctx.fresh_label();
    let handler = ctx.fresh_label();

    let mut code = Vec::new();
    code.push(JInstr::Label(start.clone()));
    stmt::gen_stmt(&p.body, &mut ctx, &mut code)?;
    code.push(JInstr::Label(end.clone()));
    code.push(JInstr::Return);

    // Runtime errors print to stderr and exit 255.
    code.push(JInstr::Label(handler.clone()));
    code.push(JInstr::Getstatic {
        field: "java/lang/System/err".to_string(),
        desc: "Ljava/io/PrintStream;".to_string(),
    });
    code.push(JInstr::Swap);
    code.push(JInstr::Invokevirtual(
        "java/io/PrintStream/println(Ljava/lang/Object;)V".to_string(),
    ));
    code.push(JInstr::Ldc(255));
    code.push(JInstr::Invokestatic("java/lang/System/exit(I)V".to_string()));
    code.push(JInstr::Return);

    let mut out = String::new();
    let _ = writeln!(out, ".method public static main([Ljava/lang/String;)V");
    // The handler is entered with the throwable already on the stack, which
    // the linear estimate cannot see.
    let _ = writeln!(out, ".limit stack {}", max_stack(&code).max(4));
    let _ = writeln!(out, ".limit locals {}", ctx.next_slot.max(1));
    let _ = writeln!(
        out,
        ".catch java/lang/RuntimeException from {} to {} using {}",
        start, end, handler
    );
    for i in &code {
        match i {
            JInstr::Label(_) => {
                let _ = writeln!(out, "{}", i.render());
            }
            _ => {
                let _ = writeln!(out, "\t{}", i.render());
            }
        }
    }
    let _ = writeln!(out, ".end method");
    let _ = writeln!(out);
    Ok(out)
}

fn ty_mentions_pair(t: &Type) -> bool {
    match t {
        Type::Pair { .. } => true,
        Type::Array { elem, .. } => ty_mentions_pair(elem),
        _ => false,
    }
}

fn expr_mentions_pair(e: &Expr) -> bool {
    match e {
        Expr::NullLit => true,
        Expr::Ident(v) => ty_mentions_pair(&v.ty),
        Expr::ArrayElem { var, indices, .. } => {
            ty_mentions_pair(&var.ty) || indices.iter().any(expr_mentions_pair)
        }
        Expr::Unary(_, inner) => expr_mentions_pair(inner),
        Expr::Binary(a, _, b) => expr_mentions_pair(a) || expr_mentions_pair(b),
        _ => false,
    }
}

fn rhs_mentions_pair(r: &AssignRhs) -> bool {
    match r {
        AssignRhs::Expr(e) => expr_mentions_pair(e),
        AssignRhs::ArrayLit { elems, elem_ty } => {
            ty_mentions_pair(elem_ty) || elems.iter().any(expr_mentions_pair)
        }
        AssignRhs::NewPair(..) | AssignRhs::PairElem(..) => true,
        AssignRhs::Call { args, ret_ty, .. } => {
            ty_mentions_pair(ret_ty) || args.iter().any(expr_mentions_pair)
        }
    }
}

fn stmt_mentions_pair(s: &Stmt) -> bool {
    match s {
        Stmt::Skip => false,
        Stmt::Decl(v, rhs) => ty_mentions_pair(&v.ty) || rhs_mentions_pair(rhs),
        Stmt::Assign(lhs, rhs) => {
            matches!(lhs, AssignLhs::PairElem(..)) || rhs_mentions_pair(rhs)
        }
        Stmt::Read(lhs) => matches!(lhs, AssignLhs::PairElem(..)),
        Stmt::Free(e) | Stmt::Return(e) | Stmt::Exit(e) => expr_mentions_pair(e),
        Stmt::Print { expr, .. } => expr_mentions_pair(expr),
        Stmt::If {
            cond,
            then_body,
            else_body,
        } => {
            expr_mentions_pair(cond)
                || stmt_mentions_pair(then_body)
                || stmt_mentions_pair(else_body)
        }
        Stmt::While { cond, body } => expr_mentions_pair(cond) || stmt_mentions_pair(body),
        Stmt::Block(stmts) => stmts.iter().any(stmt_mentions_pair),
        Stmt::Seq(a, b) => stmt_mentions_pair(a) || stmt_mentions_pair(b),
        Stmt::Call { args, .. } => args.iter().any(expr_mentions_pair),
    }
}

fn program_mentions_pair(p: &Program) -> bool {
    stmt_mentions_pair(&p.body)
        || p.funcs.iter().any(|f| {
            ty_mentions_pair(&f.ret_ty)
                || f.params.iter().any(|v| ty_mentions_pair(&v.ty))
                || stmt_mentions_pair(&f.body)
        })
}

/// The `wacc/lang/Pair` support class: two `Object` fields and a two-arg
/// constructor.
pub fn pair_class_text() -> String {
    let mut out = String::new();
    out.push_str(".class public wacc/lang/Pair\n");
    out.push_str(".super java/lang/Object\n\n");
    out.push_str(".field public fst Ljava/lang/Object;\n");
    out.push_str(".field public snd Ljava/lang/Object;\n\n");
    out.push_str(".method public <init>(Ljava/lang/Object;Ljava/lang/Object;)V\n");
    out.push_str(".limit stack 2\n");
    out.push_str(".limit locals 3\n");
    out.push_str("\taload 0\n");
    out.push_str("\tinvokespecial java/lang/Object/<init>()V\n");
    out.push_str("\taload 0\n");
    out.push_str("\taload 1\n");
    out.push_str("\tputfield wacc/lang/Pair/fst Ljava/lang/Object;\n");
    out.push_str("\taload 0\n");
    out.push_str("\taload 2\n");
    out.push_str("\tputfield wacc/lang/Pair/snd Ljava/lang/Object;\n");
    out.push_str("\treturn\n");
    out.push_str(".end method\n");
    out
}

pub struct JvmOutput {
    pub class_text: String,
    pub pair_class: Option<String>,
}

/// Lower a whole program to Jasmin text.
pub fn gen_program(p: &Program) -> Result<JvmOutput, CompileError> {
    let funcs = func_signatures(p);

    let mut out = String::new();
    let _ = writeln!(out, ".class public {}", PROGRAM_CLASS);
    let _ = writeln!(out, ".super java/lang/Object");
    let _ = writeln!(out);

    for func in &p.funcs {
        out.push_str(&gen_function(func, &funcs)?);
    }
    out.push_str(&gen_main(p, &funcs)?);

    let pair_class = if program_mentions_pair(p) {
        Some(pair_class_text())
    } else {
        None
    };

    Ok(JvmOutput {
        class_text: out,
        pair_class,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Variable;

    #[test]
    fn descriptors_cover_nesting_and_pairs() {
        assert_eq!(descriptor(&Type::Int), "I");
        assert_eq!(descriptor(&Type::Bool), "Z");
        assert_eq!(descriptor(&Type::Str), "Ljava/lang/String;");
        assert_eq!(descriptor(&Type::array(Type::Int, 2)), "[[I");
        assert_eq!(descriptor(&Type::array(Type::Char, 1)), "[C");
        assert_eq!(
            descriptor(&Type::pair(Type::Int, Type::Int)),
            "Lwacc/lang/Pair;"
        );
        assert_eq!(
            descriptor(&Type::array(Type::erased_pair(), 1)),
            "[Lwacc/lang/Pair;"
        );
    }

    #[test]
    fn boxing_round_trip_per_type() {
        for (ty, box_spec, unbox_spec) in [
            (Type::Int, "Integer/valueOf", "intValue()I"),
            (Type::Bool, "Boolean/valueOf", "booleanValue()Z"),
            (Type::Char, "Character/valueOf", "charValue()C"),
        ] {
            let mut code = Vec::new();
            to_boxed(&ty, &mut code);
            assert!(matches!(&code[0], JInstr::Invokestatic(s) if s.contains(box_spec)));
            let mut code = Vec::new();
            to_primitive(&ty, &mut code);
            assert!(matches!(&code[0], JInstr::Checkcast(_)));
            assert!(matches!(&code[1], JInstr::Invokevirtual(s) if s.contains(unbox_spec)));
        }
    }

    #[test]
    fn reference_types_box_to_themselves() {
        let mut code = Vec::new();
        to_boxed(&Type::Str, &mut code);
        assert!(code.is_empty());
        let mut code = Vec::new();
        to_primitive(&Type::array(Type::Int, 1), &mut code);
        assert_eq!(code, vec![JInstr::Checkcast("[I".to_string())]);
    }

    #[test]
    fn pair_class_only_emitted_when_needed() {
        let plain = Program {
            funcs: vec![],
            body: Stmt::Exit(Expr::IntLit(0)),
        };
        assert!(gen_program(&plain).unwrap().pair_class.is_none());

        let with_pair = Program {
            funcs: vec![],
            body: Stmt::seq(
                Stmt::Decl(
                    Variable::new("p", Type::pair(Type::Int, Type::Int)),
                    AssignRhs::NewPair(Expr::IntLit(1), Expr::IntLit(2)),
                ),
                Stmt::Exit(Expr::IntLit(0)),
            ),
        };
        let out = gen_program(&with_pair).unwrap();
        let pair = out.pair_class.unwrap();
        assert!(pair.contains(".class public wacc/lang/Pair"));
        assert!(pair.contains(".field public fst Ljava/lang/Object;"));
    }

    #[test]
    fn main_wraps_body_in_runtime_error_handler() {
        let p = Program {
            funcs: vec![],
            body: Stmt::Exit(Expr::IntLit(0)),
        };
        let out = gen_program(&p).unwrap().class_text;
        assert!(out.contains(".catch java/lang/RuntimeException from L0 to L1 using L2"));
        assert!(out.contains("sipush 255"));
        assert!(out.contains("invokestatic java/lang/System/exit(I)V"));
    }
}
