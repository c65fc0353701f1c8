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

//! Interned string pool for the `.data` section.
//!
//! String records are a `.word` byte length followed by the `.ascii`
//! payload. Interning is by content: the same text always resolves to the
//! same `msg_<n>` label, no matter how many sites reference it.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::fragment::DataEntry;

pub struct StrPool {
    by_content: HashMap<Vec<u8>, String>,
    count: u32,
}

impl StrPool {
    pub fn new() -> Self {
        Self {
            by_content: HashMap::new(),
            count: 0,
        }
    }

    /// Resolve `text` to its pool entry, creating one on first sight.
    pub fn intern(&mut self, text: &str) -> (String, DataEntry) {
        let bytes = text.as_bytes().to_vec();
        if let Some(label) = self.by_content.get(&bytes) {
            return (
                label.clone(),
                DataEntry {
                    label: label.clone(),
                    bytes,
                },
            );
        }
        let label = format!("msg_{}", self.count);
        self.count += 1;
        self.by_content.insert(bytes.clone(), label.clone());
        (
            label.clone(),
            DataEntry { label, bytes },
        )
    }
}

impl Default for StrPool {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_ascii(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0 => out.push_str("\\0"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7E => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{:03o}", b);
            }
        }
    }
    out
}

/// Render merged data entries as the `.data` section.
pub fn render_data_section(entries: &[DataEntry]) -> String {
    let mut out = String::new();
    if entries.is_empty() {
        return out;
    }
    out.push_str(".data\n\n");
    for e in entries {
        let _ = writeln!(out, "{}:", e.label);
        let _ = writeln!(out, "\t.word {}", e.bytes.len());
        let _ = writeln!(out, "\t.ascii \"{}\"", escape_ascii(&e.bytes));
    }
    out.push('\n');
    out
}
