//! Driver: walk a typed `Program`, run both backends, render text.
//!
//! The backends share only the immutable AST; each starts its own label
//! counter. They run sequentially here. Nothing touches the filesystem
//! until both have succeeded, so a failed compile writes no partial output.

use std::fs;
use std::io;
use std::path::Path;

use crate::arm;
use crate::ast::Program;
use crate::error::CompileError;
use crate::jvm;

#[derive(Debug)]
pub struct CompiledProgram {
    /// GAS-syntax ARM assembly.
    pub arm: String,
    /// Jasmin text for `WaccProgram`.
    pub jvm: String,
    /// Jasmin text for `wacc/lang/Pair`, when the program uses pairs.
    pub jvm_pair: Option<String>,
}

pub fn compile_program(p: &Program) -> Result<CompiledProgram, CompileError> {
    let arm_text = arm::gen_program(p)?;
    let jvm_out = jvm::gen_program(p)?;
    Ok(CompiledProgram {
        arm: arm_text,
        jvm: jvm_out.class_text,
        jvm_pair: jvm_out.pair_class,
    })
}

impl CompiledProgram {
    /// Write `<stem>.s` and `WaccProgram.j` into `dir`, plus `Pair.j` when
    /// pairs are in play.
    pub fn write_files(&self, dir: &Path, stem: &str) -> io::Result<()> {
        fs::write(dir.join(format!("{stem}.s")), &self.arm)?;
        fs::write(dir.join("WaccProgram.j"), &self.jvm)?;
        if let Some(pair) = &self.jvm_pair {
            fs::write(dir.join("Pair.j"), pair)?;
        }
        Ok(())
    }
}
