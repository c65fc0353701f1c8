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

//! Typed AST delivered by the front end.
//!
//! Every node here has already been name-resolved and type-checked; the
//! backends assume the invariants hold (array arities match, identifiers
//! resolve within their scope chain, operator operands are well typed) and
//! do not re-check them.

/// Static type of a WACC value.
///
/// Supertypes for generic comparisons (`len` on any array, `==` on any pair)
/// are predicates on this enum (`is_array`/`is_pair`), not siblings. A pair
/// component of `None` covers both the `null` literal and an erased nested
/// pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Int,
    Bool,
    Char,
    Str,
    Array { elem: Box<Type>, depth: u32 },
    Pair { fst: Option<Box<Type>>, snd: Option<Box<Type>> },
}

impl Type {
    pub fn array(elem: Type, depth: u32) -> Type {
        debug_assert!(depth >= 1);
        Type::Array {
            elem: Box::new(elem),
            depth,
        }
    }

    pub fn pair(fst: Type, snd: Type) -> Type {
        Type::Pair {
            fst: Some(Box::new(fst)),
            snd: Some(Box::new(snd)),
        }
    }

    /// The type of `null`, and of an erased nested pair component.
    pub fn erased_pair() -> Type {
        Type::Pair { fst: None, snd: None }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    pub fn is_pair(&self) -> bool {
        matches!(self, Type::Pair { .. })
    }

    /// True for heap-pointer values (strings, arrays, pairs).
    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Str | Type::Array { .. } | Type::Pair { .. })
    }

    /// Size of one element of this array type's payload.
    ///
    /// Only `char` and `bool` elements pack to single bytes; everything else
    /// (including nested array pointers) is a word.
    pub fn elem_size(&self) -> u32 {
        match self.elem_type() {
            Type::Char | Type::Bool => 1,
            _ => 4,
        }
    }

    /// The type obtained by indexing this array once.
    pub fn elem_type(&self) -> Type {
        match self {
            Type::Array { elem, depth } if *depth > 1 => Type::Array {
                elem: elem.clone(),
                depth: depth - 1,
            },
            Type::Array { elem, .. } => (**elem).clone(),
            _ => self.clone(),
        }
    }

    /// The static type of a pair component, erasing nested pairs.
    pub fn pair_field(&self, side: PairSide) -> Type {
        match self {
            Type::Pair { fst, snd } => {
                let field = match side {
                    PairSide::Fst => fst,
                    PairSide::Snd => snd,
                };
                match field {
                    Some(t) => (**t).clone(),
                    None => Type::erased_pair(),
                }
            }
            _ => Type::erased_pair(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairSide {
    Fst,
    Snd,
}

impl PairSide {
    /// Byte offset of the component within the 8-byte pair record.
    pub fn offset(self) -> i32 {
        match self {
            PairSide::Fst => 0,
            PairSide::Snd => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Len,
    Ord,
    Chr,
}

impl UnaryOp {
    pub const ALL: [UnaryOp; 5] = [
        UnaryOp::Not,
        UnaryOp::Neg,
        UnaryOp::Len,
        UnaryOp::Ord,
        UnaryOp::Chr,
    ];

    pub fn result_type(self) -> Type {
        match self {
            UnaryOp::Not => Type::Bool,
            UnaryOp::Neg | UnaryOp::Len | UnaryOp::Ord => Type::Int,
            UnaryOp::Chr => Type::Char,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::Len => "len",
            UnaryOp::Ord => "ord",
            UnaryOp::Chr => "chr",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
    And,
    Or,
}

impl BinaryOp {
    /// All operators, in a fixed order. Tests use this to enumerate coverage.
    pub const ALL: [BinaryOp; 13] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Mod,
        BinaryOp::Gt,
        BinaryOp::Gte,
        BinaryOp::Lt,
        BinaryOp::Lte,
        BinaryOp::Eq,
        BinaryOp::Neq,
        BinaryOp::And,
        BinaryOp::Or,
    ];

    pub fn result_type(self) -> Type {
        match self {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                Type::Int
            }
            // Comparison and boolean operators all produce Bool.
            _ => Type::Bool,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// A resolved identifier. Storage offsets are not part of the AST; the
/// symbol environment assigns them at scope entry during lowering.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Expr {
    IntLit(i32),
    BoolLit(bool),
    CharLit(u8),
    StrLit(String),
    NullLit,
    Ident(Variable),
    ArrayElem {
        var: Variable,
        indices: Vec<Expr>,
        elem_ty: Type,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
}

impl Expr {
    /// The derived static type of this expression.
    pub fn ty(&self) -> Type {
        match self {
            Expr::IntLit(_) => Type::Int,
            Expr::BoolLit(_) => Type::Bool,
            Expr::CharLit(_) => Type::Char,
            Expr::StrLit(_) => Type::Str,
            Expr::NullLit => Type::erased_pair(),
            Expr::Ident(v) => v.ty.clone(),
            Expr::ArrayElem { elem_ty, .. } => elem_ty.clone(),
            Expr::Unary(op, _) => op.result_type(),
            Expr::Binary(_, op, _) => op.result_type(),
        }
    }

    /// Sethi–Ullman weight: the minimum number of registers needed to
    /// evaluate this expression without spilling.
    ///
    /// Literals and identifiers need one register. A unary operator reuses
    /// its operand's register. For a binary operator the cheaper of the two
    /// evaluation orders is taken: holding the first child's result while
    /// the second evaluates costs one extra register on that side. An array
    /// element access holds the base pointer while each index evaluates,
    /// reusing the same index register per dimension.
    pub fn weight(&self) -> u32 {
        match self {
            Expr::IntLit(_)
            | Expr::BoolLit(_)
            | Expr::CharLit(_)
            | Expr::StrLit(_)
            | Expr::NullLit
            | Expr::Ident(_) => 1,
            Expr::ArrayElem { indices, .. } => indices
                .iter()
                .map(|i| i.weight() + 1)
                .max()
                .unwrap_or(1)
                .max(2),
            Expr::Unary(_, e) => e.weight(),
            Expr::Binary(e1, _, e2) => {
                let w1 = e1.weight();
                let w2 = e2.weight();
                u32::min(u32::max(w1 + 1, w2), u32::max(w1, w2 + 1))
            }
        }
    }
}

/// Left side of an assignment or `read`.
#[derive(Clone, Debug)]
pub enum AssignLhs {
    Var(Variable),
    ArrayElem {
        var: Variable,
        indices: Vec<Expr>,
        elem_ty: Type,
    },
    PairElem(PairSide, Expr),
}

impl AssignLhs {
    pub fn ty(&self) -> Type {
        match self {
            AssignLhs::Var(v) => v.ty.clone(),
            AssignLhs::ArrayElem { elem_ty, .. } => elem_ty.clone(),
            AssignLhs::PairElem(side, pair) => pair.ty().pair_field(*side),
        }
    }
}

/// Right side of a declaration or assignment.
#[derive(Clone, Debug)]
pub enum AssignRhs {
    Expr(Expr),
    ArrayLit {
        elems: Vec<Expr>,
        elem_ty: Type,
    },
    NewPair(Expr, Expr),
    PairElem(PairSide, Expr),
    Call {
        name: String,
        args: Vec<Expr>,
        ret_ty: Type,
    },
}

#[derive(Clone, Debug)]
pub enum Stmt {
    Skip,
    Decl(Variable, AssignRhs),
    Assign(AssignLhs, AssignRhs),
    Read(AssignLhs),
    Free(Expr),
    Return(Expr),
    Exit(Expr),
    Print {
        expr: Expr,
        newline: bool,
    },
    If {
        cond: Expr,
        then_body: Box<Stmt>,
        else_body: Box<Stmt>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    /// A nested scope with its own stack region.
    Block(Vec<Stmt>),
    Seq(Box<Stmt>, Box<Stmt>),
    /// Procedure-style call; the result is discarded.
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Stmt {
    pub fn seq(a: Stmt, b: Stmt) -> Stmt {
        Stmt::Seq(Box::new(a), Box::new(b))
    }
}

#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub ret_ty: Type,
    pub params: Vec<Variable>,
    pub body: Stmt,
}

#[derive(Clone, Debug)]
pub struct Program {
    pub funcs: Vec<Function>,
    pub body: Stmt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_weights_are_one() {
        assert_eq!(Expr::IntLit(1).weight(), 1);
        assert_eq!(Expr::StrLit("s".to_string()).weight(), 1);
        assert_eq!(Expr::Ident(Variable::new("x", Type::Int)).weight(), 1);
    }

    #[test]
    fn binary_weight_takes_cheaper_order() {
        // (1 + 2) has two leaves: either order holds one register while the
        // other leaf evaluates, so the weight is 2.
        let e = Expr::Binary(
            Box::new(Expr::IntLit(1)),
            BinaryOp::Add,
            Box::new(Expr::IntLit(2)),
        );
        assert_eq!(e.weight(), 2);

        // 1 + (2 * 3): evaluating the heavier right child first keeps the
        // weight at 2 rather than 3.
        let mul = Expr::Binary(
            Box::new(Expr::IntLit(2)),
            BinaryOp::Mul,
            Box::new(Expr::IntLit(3)),
        );
        let e = Expr::Binary(Box::new(Expr::IntLit(1)), BinaryOp::Add, Box::new(mul));
        assert_eq!(e.weight(), 2);
    }

    #[test]
    fn balanced_tree_weight_grows_by_level() {
        fn leaf() -> Expr {
            Expr::IntLit(0)
        }
        fn node(l: Expr, r: Expr) -> Expr {
            Expr::Binary(Box::new(l), BinaryOp::Add, Box::new(r))
        }
        let d1 = node(leaf(), leaf());
        let d2 = node(node(leaf(), leaf()), node(leaf(), leaf()));
        let d3 = node(d2.clone(), d2.clone());
        assert_eq!(d1.weight(), 2);
        assert_eq!(d2.weight(), 3);
        assert_eq!(d3.weight(), 4);
    }

    #[test]
    fn array_elem_weight_is_at_least_two() {
        let e = Expr::ArrayElem {
            var: Variable::new("a", Type::array(Type::Int, 1)),
            indices: vec![Expr::IntLit(0)],
            elem_ty: Type::Int,
        };
        assert_eq!(e.weight(), 2);
    }

    #[test]
    fn boolean_operators_produce_bool() {
        assert_eq!(BinaryOp::And.result_type(), Type::Bool);
        assert_eq!(BinaryOp::Or.result_type(), Type::Bool);
    }

    #[test]
    fn lte_symbol_is_less_equal() {
        assert_eq!(BinaryOp::Lte.symbol(), "<=");
        assert_eq!(BinaryOp::Gte.symbol(), ">=");
    }

    #[test]
    fn pair_field_erases_nested_pairs() {
        let inner = Type::pair(Type::Int, Type::Int);
        let outer = Type::Pair {
            fst: None,
            snd: Some(Box::new(Type::Int)),
        };
        assert_eq!(outer.pair_field(PairSide::Fst), Type::erased_pair());
        assert_eq!(outer.pair_field(PairSide::Snd), Type::Int);
        assert!(inner.is_pair());
    }

    #[test]
    fn char_array_elements_are_bytes() {
        assert_eq!(Type::array(Type::Char, 1).elem_size(), 1);
        assert_eq!(Type::array(Type::Int, 1).elem_size(), 4);
        // Indexing a depth-2 array yields a pointer element.
        assert_eq!(Type::array(Type::Char, 2).elem_size(), 4);
        assert_eq!(
            Type::array(Type::Int, 2).elem_type(),
            Type::array(Type::Int, 1)
        );
    }
}
