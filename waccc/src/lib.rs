//! Code-generation core for WACC, a small imperative language with
//! integers, booleans, characters, strings, nested arrays and pairs.
//!
//! The crate accepts a type-checked [`ast::Program`] from an upstream front
//! end and emits assembly for two targets: ARMv6 (GAS syntax, with an
//! optimal Sethi–Ullman register plan for expression trees) and the JVM
//! (Jasmin syntax, as a stack machine). See [`compile::compile_program`].

pub mod arm;
pub mod ast;
pub mod compile;
pub mod error;
pub mod fragment;
pub mod jvm;
pub mod symtab;
