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

//! Assembly-fragment algebra.
//!
//! A fragment is a pair of data-section entries and code lines. `concat` is
//! associative with the empty fragment as unit: code appends sequentially,
//! data merges as a set keyed by label in first-appearance order. Two
//! entries under one label must be byte-identical; anything else is a bug
//! in the compiler, not in the input program, and aborts immediately.

/// One labelled record in the data section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataEntry {
    pub label: String,
    pub bytes: Vec<u8>,
}

/// A sequence of emitted lines plus the data entries they reference.
///
/// The line type is backend-specific; the algebra is not.
#[derive(Clone, Debug)]
pub struct Fragment<L> {
    pub data: Vec<DataEntry>,
    pub code: Vec<L>,
}

impl<L> Fragment<L> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            code: Vec::new(),
        }
    }

    pub fn push(&mut self, line: L) {
        self.code.push(line);
    }

    /// Attach a data entry, collapsing duplicates by label.
    pub fn push_data(&mut self, entry: DataEntry) {
        if let Some(existing) = self.data.iter().find(|e| e.label == entry.label) {
            assert!(
                existing.bytes == entry.bytes,
                "duplicate data label '{}' with different contents",
                entry.label
            );
            return;
        }
        self.data.push(entry);
    }

    /// Append `other`, merging its data section into this one.
    pub fn concat(mut self, other: Fragment<L>) -> Fragment<L> {
        for entry in other.data {
            self.push_data(entry);
        }
        self.code.extend(other.code);
        self
    }
}

impl<L> Default for Fragment<L> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: &str, bytes: &[u8]) -> DataEntry {
        DataEntry {
            label: label.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    fn frag(labels: &[(&str, &[u8])], code: &[&str]) -> Fragment<String> {
        let mut f = Fragment::new();
        for (l, b) in labels {
            f.push_data(entry(l, b));
        }
        for c in code {
            f.push(c.to_string());
        }
        f
    }

    #[test]
    fn concat_appends_code_in_order() {
        let a = frag(&[], &["one"]);
        let b = frag(&[], &["two", "three"]);
        let c = a.concat(b);
        assert_eq!(c.code, vec!["one", "two", "three"]);
    }

    #[test]
    fn concat_is_associative() {
        let a = frag(&[("m0", b"a")], &["a"]);
        let b = frag(&[("m1", b"b")], &["b"]);
        let c = frag(&[("m0", b"a")], &["c"]);
        let left = a.clone().concat(b.clone()).concat(c.clone());
        let right = a.concat(b.concat(c));
        assert_eq!(left.code, right.code);
        assert_eq!(left.data, right.data);
    }

    #[test]
    fn identical_labels_collapse_keeping_first_position() {
        let a = frag(&[("m0", b"x"), ("m1", b"y")], &[]);
        let b = frag(&[("m1", b"y"), ("m2", b"z")], &[]);
        let c = a.concat(b);
        let labels: Vec<&str> = c.data.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["m0", "m1", "m2"]);
    }

    #[test]
    #[should_panic(expected = "duplicate data label")]
    fn conflicting_labels_abort() {
        let a = frag(&[("m0", b"x")], &[]);
        let b = frag(&[("m0", b"different")], &[]);
        let _ = a.concat(b);
    }
}
