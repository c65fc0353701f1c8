use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A limit a valid program can hit during code generation.
    Codegen,
    /// The input violated a precondition the front end was meant to
    /// guarantee. Never expected against a conforming front end.
    Internal,
}

#[derive(Clone, Debug)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Codegen => "codegen error",
            ErrorKind::Internal => "internal error",
        };
        write!(f, "{}: {}", kind, self.message)
    }
}

impl std::error::Error for CompileError {}
