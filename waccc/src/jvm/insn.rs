//! JVM instruction model and Jasmin rendering.
//!
//! Only the slice of the instruction set the backend emits is modelled.
//! Method references carry their full Jasmin spelling
//! (`owner/name(desc)ret`), which is also what stack-effect calculation
//! parses the argument count out of.

/// Comparison condition of an `if_icmp<cond>` branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JCmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl JCmp {
    fn mnemonic(self) -> &'static str {
        match self {
            JCmp::Eq => "if_icmpeq",
            JCmp::Ne => "if_icmpne",
            JCmp::Lt => "if_icmplt",
            JCmp::Le => "if_icmple",
            JCmp::Gt => "if_icmpgt",
            JCmp::Ge => "if_icmpge",
        }
    }
}

/// Element type of a primitive `newarray`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JPrim {
    Int,
    Char,
    Boolean,
}

impl JPrim {
    fn keyword(self) -> &'static str {
        match self {
            JPrim::Int => "int",
            JPrim::Char => "char",
            JPrim::Boolean => "boolean",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JInstr {
    Label(String),
    Ldc(i32),
    LdcStr(String),
    AconstNull,
    Iload(u16),
    Istore(u16),
    Aload(u16),
    Astore(u16),
    Idiv,
    Irem,
    Ixor,
    I2c,
    Dup,
    Pop,
    Swap,
    Newarray(JPrim),
    Anewarray(String),
    Iaload,
    Iastore,
    Caload,
    Castore,
    Baload,
    Bastore,
    Aaload,
    Aastore,
    Arraylength,
    New(String),
    Checkcast(String),
    Getstatic { field: String, desc: String },
    Getfield { field: String, desc: String },
    Putfield { field: String, desc: String },
    Invokestatic(String),
    Invokevirtual(String),
    Invokespecial(String),
    Goto(String),
    Ifeq(String),
    Ifne(String),
    IfIcmp(JCmp, String),
    IfAcmpEq(String),
    IfAcmpNe(String),
    Ireturn,
    Areturn,
    Return,
}

/// Number of argument slots named by a Jasmin method spec, plus whether it
/// returns a value. All WACC-visible types are category 1.
fn method_effect(spec: &str) -> (i32, i32) {
    let open = spec.find('(').expect("method spec has no '('");
    let close = spec.find(')').expect("method spec has no ')'");
    let args = &spec[open + 1..close];
    let ret = &spec[close + 1..];

    let mut count = 0;
    let mut chars = args.chars();
    while let Some(c) = chars.next() {
        match c {
            'L' => {
                for c2 in chars.by_ref() {
                    if c2 == ';' {
                        break;
                    }
                }
                count += 1;
            }
            '[' => {} // the element descriptor that follows counts once
            _ => count += 1,
        }
    }
    let produces = if ret == "V" { 0 } else { 1 };
    (count, produces)
}

impl JInstr {
    pub fn render(&self) -> String {
        match self {
            JInstr::Label(l) => format!("{}:", l),
            JInstr::Ldc(v) => match v {
                -1 => "iconst_m1".to_string(),
                0..=5 => format!("iconst_{}", v),
                -128..=127 => format!("bipush {}", v),
                -32768..=32767 => format!("sipush {}", v),
                _ => format!("ldc {}", v),
            },
            JInstr::LdcStr(s) => {
                let escaped = s
                    .replace('\\', "\\\\")
                    .replace('"', "\\\"")
                    .replace('\n', "\\n")
                    .replace('\t', "\\t")
                    .replace('\r', "\\r");
                format!("ldc \"{}\"", escaped)
            }
            JInstr::AconstNull => "aconst_null".to_string(),
            JInstr::Iload(n) => format!("iload {}", n),
            JInstr::Istore(n) => format!("istore {}", n),
            JInstr::Aload(n) => format!("aload {}", n),
            JInstr::Astore(n) => format!("astore {}", n),
            JInstr::Idiv => "idiv".to_string(),
            JInstr::Irem => "irem".to_string(),
            JInstr::Ixor => "ixor".to_string(),
            JInstr::I2c => "i2c".to_string(),
            JInstr::Dup => "dup".to_string(),
            JInstr::Pop => "pop".to_string(),
            JInstr::Swap => "swap".to_string(),
            JInstr::Newarray(p) => format!("newarray {}", p.keyword()),
            JInstr::Anewarray(class) => format!("anewarray {}", class),
            JInstr::Iaload => "iaload".to_string(),
            JInstr::Iastore => "iastore".to_string(),
            JInstr::Caload => "caload".to_string(),
            JInstr::Castore => "castore".to_string(),
            JInstr::Baload => "baload".to_string(),
            JInstr::Bastore => "bastore".to_string(),
            JInstr::Aaload => "aaload".to_string(),
            JInstr::Aastore => "aastore".to_string(),
            JInstr::Arraylength => "arraylength".to_string(),
            JInstr::New(class) => format!("new {}", class),
            JInstr::Checkcast(class) => format!("checkcast {}", class),
            JInstr::Getstatic { field, desc } => format!("getstatic {} {}", field, desc),
            JInstr::Getfield { field, desc } => format!("getfield {} {}", field, desc),
            JInstr::Putfield { field, desc } => format!("putfield {} {}", field, desc),
            JInstr::Invokestatic(spec) => format!("invokestatic {}", spec),
            JInstr::Invokevirtual(spec) => format!("invokevirtual {}", spec),
            JInstr::Invokespecial(spec) => format!("invokespecial {}", spec),
            JInstr::Goto(l) => format!("goto {}", l),
            JInstr::Ifeq(l) => format!("ifeq {}", l),
            JInstr::Ifne(l) => format!("ifne {}", l),
            JInstr::IfIcmp(c, l) => format!("{} {}", c.mnemonic(), l),
            JInstr::IfAcmpEq(l) => format!("if_acmpeq {}", l),
            JInstr::IfAcmpNe(l) => format!("if_acmpne {}", l),
            JInstr::Ireturn => "ireturn".to_string(),
            JInstr::Areturn => "areturn".to_string(),
            JInstr::Return => "return".to_string(),
        }
    }

    /// Net change in operand-stack depth.
    pub fn stack_delta(&self) -> i32 {
        match self {
            JInstr::Label(_) | JInstr::Goto(_) | JInstr::Return => 0,
            JInstr::Ldc(_) | JInstr::LdcStr(_) | JInstr::AconstNull => 1,
            JInstr::Iload(_) | JInstr::Aload(_) => 1,
            JInstr::Istore(_) | JInstr::Astore(_) | JInstr::Pop => -1,
            JInstr::Idiv | JInstr::Irem | JInstr::Ixor => -1,
            JInstr::I2c | JInstr::Swap | JInstr::Arraylength | JInstr::Checkcast(_) => 0,
            JInstr::Dup | JInstr::New(_) => 1,
            JInstr::Newarray(_) | JInstr::Anewarray(_) => 0,
            JInstr::Iaload | JInstr::Caload | JInstr::Baload | JInstr::Aaload => -1,
            JInstr::Iastore | JInstr::Castore | JInstr::Bastore | JInstr::Aastore => -3,
            JInstr::Getstatic { .. } => 1,
            JInstr::Getfield { .. } => 0,
            JInstr::Putfield { .. } => -2,
            JInstr::Invokestatic(spec) => {
                let (args, ret) = method_effect(spec);
                ret - args
            }
            JInstr::Invokevirtual(spec) | JInstr::Invokespecial(spec) => {
                let (args, ret) = method_effect(spec);
                ret - args - 1
            }
            JInstr::Ifeq(_) | JInstr::Ifne(_) => -1,
            JInstr::IfIcmp(..) | JInstr::IfAcmpEq(_) | JInstr::IfAcmpNe(_) => -2,
            JInstr::Ireturn | JInstr::Areturn => -1,
        }
    }
}

/// Conservative operand-stack bound: a linear pass over the emitted
/// sequence. Every label in this backend is reached with the same depth as
/// its fall-through predecessor, so the running maximum is an upper bound.
pub fn max_stack(code: &[JInstr]) -> u32 {
    let mut depth: i32 = 0;
    let mut max: i32 = 0;
    for i in code {
        depth += i.stack_delta();
        if depth < 0 {
            depth = 0;
        }
        if depth > max {
            max = depth;
        }
    }
    max as u32
}
