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

//! Symbol environment and stack-frame layout.
//!
//! Each scope reserves one region of the frame on entry (`SUB sp, sp, #n`)
//! and releases it on every exit edge. All locals occupy 4-byte word slots
//! for uniform indexing; offsets are assigned in declaration order from the
//! top of the scope's region. A lookup from a use site therefore sums the
//! variable's offset, the sizes of every scope entered since it was
//! declared, and any bytes transiently pushed by expression spills or call
//! argument stores.

use std::collections::HashMap;

use crate::ast::{Stmt, Variable};

/// Bytes reserved by the statements of one scope level.
///
/// `Seq` chains extend the current level; `Block`, `If` and `While` bodies
/// open their own regions and contribute nothing here.
pub fn scope_size(s: &Stmt) -> u32 {
    match s {
        Stmt::Decl(..) => 4,
        Stmt::Seq(a, b) => scope_size(a) + scope_size(b),
        _ => 0,
    }
}

struct Scope {
    vars: HashMap<String, u32>,
    size: u32,
    cursor: u32,
}

/// Scope chain for one function, innermost scope last.
pub struct ScopeStack {
    scopes: Vec<Scope>,
    push_shift: u32,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            push_shift: 0,
        }
    }

    /// Open the parameter region. Parameters sit above the saved link
    /// register, so parameter `i` starts at offset `4 + 4i` and the region
    /// itself reserves no frame bytes.
    pub fn enter_params(&mut self, params: &[Variable]) {
        let mut vars = HashMap::new();
        for (i, p) in params.iter().enumerate() {
            vars.insert(p.name.clone(), 4 + 4 * i as u32);
        }
        self.scopes.push(Scope {
            vars,
            size: 0,
            cursor: 0,
        });
    }

    /// Open a scope whose declarations total `size` bytes.
    pub fn enter(&mut self, size: u32) {
        self.scopes.push(Scope {
            vars: HashMap::new(),
            size,
            cursor: size,
        });
    }

    /// Close the innermost scope, returning the bytes it reserved.
    pub fn exit(&mut self) -> u32 {
        self.scopes.pop().expect("scope stack").size
    }

    /// Assign the next slot in the innermost scope. The first declaration
    /// takes the top of the region.
    pub fn declare(&mut self, name: &str) -> u32 {
        let scope = self.scopes.last_mut().expect("scope stack");
        assert!(scope.cursor >= 4, "scope region overflow for '{}'", name);
        scope.cursor -= 4;
        scope.vars.insert(name.to_string(), scope.cursor);
        scope.cursor
    }

    /// Offset of `name` from the current stack pointer, accounting for
    /// every region entered since its declaration and any pending pushes.
    pub fn lookup(&self, name: &str) -> Option<u32> {
        let mut shift = self.push_shift;
        for scope in self.scopes.iter().rev() {
            if let Some(&off) = scope.vars.get(name) {
                return Some(off + shift);
            }
            shift += scope.size;
        }
        None
    }

    /// Total bytes of every open scope region; what a `return` or `exit`
    /// must release before leaving the function.
    pub fn unwind_size(&self) -> u32 {
        self.scopes.iter().map(|s| s.size).sum()
    }

    /// Record bytes pushed below the frame (expression spills, call args).
    pub fn push(&mut self, bytes: u32) {
        self.push_shift += bytes;
    }

    pub fn pop(&mut self, bytes: u32) {
        debug_assert!(self.push_shift >= bytes);
        self.push_shift -= bytes;
    }
}
