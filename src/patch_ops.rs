/* Replacement-body instructions: the handful of ops a forced-return body
   needs - a register budget directive, one constant load and a return. */

use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, digit1, space0, space1};
use nom::combinator::opt;
use nom::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A local (non-parameter) register, rendered `v{n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reg(pub u16);

/// Shorthand constructor matching the register notation.
pub fn v(n: u16) -> Reg {
    Reg(n)
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// One line of a synthesized method body.
///
/// # Examples
///
/// ```
///  use smalipatch::patch_ops::{PatchOp, v};
///
///  let op = PatchOp::Const4 { dest: v(0), value: 1 };
///  assert_eq!(op.to_string(), "const/4 v0, 0x1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchOp {
    /// `.locals N` register budget directive.
    Locals(u32),
    /// `const/4 vA, #lit` with a 4-bit literal.
    Const4 { dest: Reg, value: i8 },
    /// `const/16 vA, #lit` with a 16-bit literal.
    Const16 { dest: Reg, value: i16 },
    /// `const vA, #lit` with a full 32-bit literal.
    Const { dest: Reg, value: i32 },
    /// `const-wide/16 vA, #lit` widened into a register pair.
    ConstWide16 { dest: Reg, value: i16 },
    /// `const-wide vA, #lit` with a full 64-bit literal.
    ConstWide { dest: Reg, value: i64 },
    Return { src: Reg },
    ReturnWide { src: Reg },
    ReturnObject { src: Reg },
    ReturnVoid,
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOp::Locals(n) => write!(f, ".locals {n}"),
            PatchOp::Const4 { dest, value } => {
                write!(f, "const/4 {}, {}", dest, hex_literal(*value as i64))
            }
            PatchOp::Const16 { dest, value } => {
                write!(f, "const/16 {}, {}", dest, hex_literal(*value as i64))
            }
            PatchOp::Const { dest, value } => {
                write!(f, "const {}, {}", dest, hex_literal(*value as i64))
            }
            PatchOp::ConstWide16 { dest, value } => {
                write!(f, "const-wide/16 {}, {}", dest, hex_literal(*value as i64))
            }
            PatchOp::ConstWide { dest, value } => {
                write!(f, "const-wide {}, {}", dest, hex_literal(*value))
            }
            PatchOp::Return { src } => write!(f, "return {src}"),
            PatchOp::ReturnWide { src } => write!(f, "return-wide {src}"),
            PatchOp::ReturnObject { src } => write!(f, "return-object {src}"),
            PatchOp::ReturnVoid => write!(f, "return-void"),
        }
    }
}

/// Hex rendering with an explicit sign, the smali literal form.
fn hex_literal(value: i64) -> String {
    if value < 0 {
        format!("-0x{:x}", value.unsigned_abs())
    } else {
        format!("0x{value:x}")
    }
}

/// Narrowest const op able to load `value` into a 32-bit register.
pub fn const_load(dest: Reg, value: i32) -> PatchOp {
    if (-8..=7).contains(&value) {
        PatchOp::Const4 { dest, value: value as i8 }
    } else if let Ok(value) = i16::try_from(value) {
        PatchOp::Const16 { dest, value }
    } else {
        PatchOp::Const { dest, value }
    }
}

/// Narrowest const-wide op able to load `value` into a register pair.
pub fn const_load_wide(dest: Reg, value: i64) -> PatchOp {
    if let Ok(value) = i16::try_from(value) {
        PatchOp::ConstWide16 { dest, value }
    } else {
        PatchOp::ConstWide { dest, value }
    }
}

/// Parses a signed integer literal in decimal or `0x` hex form into any
/// numeric type reachable from `i64`.
pub(crate) fn parse_literal<T>(input: &str) -> IResult<&str, T>
where
    T: num_traits::Num + TryFrom<i64>,
{
    let (input, sign) = opt(char('-'))(input)?;

    let hex: IResult<&str, &str> = alt((tag("0x"), tag("0X")))(input);
    let (input, magnitude) = if let Ok((rest, _)) = hex {
        let (rest, digits) = take_while1(|c: char| c.is_ascii_hexdigit())(rest)?;
        let value = u64::from_str_radix(digits, 16)
            .map_err(|_| nom::Err::Failure(Error::new(rest, ErrorKind::Digit)))?;
        (rest, value)
    } else {
        let (rest, digits) = digit1(input)?;
        let value = digits
            .parse::<u64>()
            .map_err(|_| nom::Err::Failure(Error::new(rest, ErrorKind::Digit)))?;
        (rest, value)
    };

    let signed = if sign.is_some() {
        -(magnitude as i128)
    } else {
        magnitude as i128
    };
    if signed < i64::MIN as i128 || signed > i64::MAX as i128 {
        return Err(nom::Err::Failure(Error::new(input, ErrorKind::Digit)));
    }
    let out = T::try_from(signed as i64)
        .map_err(|_| nom::Err::Failure(Error::new(input, ErrorKind::Digit)))?;
    Ok((input, out))
}

/// Reads a constant-load line back, returning the destination register and
/// its sign-extended literal. Recognizes the const forms the synthesizer
/// emits; handy for decoding what a patched body returns.
pub fn read_const_line(line: &str) -> Option<(Reg, i64)> {
    fn inner(line: &str) -> IResult<&str, (Reg, i64)> {
        let (rest, _) = space0(line)?;
        // Longest mnemonics first, the shorter ones are prefixes.
        let (rest, _) = alt((
            tag("const-wide/16"),
            tag("const-wide"),
            tag("const/16"),
            tag("const/4"),
            tag("const"),
        ))(rest)?;
        let (rest, _) = space1(rest)?;
        let (rest, _) = char('v')(rest)?;
        let (rest, reg) = parse_literal::<u16>(rest)?;
        let (rest, _) = space0(rest)?;
        let (rest, _) = char(',')(rest)?;
        let (rest, _) = space0(rest)?;
        let (rest, value) = parse_literal::<i64>(rest)?;
        Ok((rest, (Reg(reg), value)))
    }
    inner(line).ok().map(|(_, parsed)| parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_ops() {
        assert_eq!(PatchOp::Locals(2).to_string(), ".locals 2");
        assert_eq!(
            PatchOp::Const4 { dest: v(0), value: 0 }.to_string(),
            "const/4 v0, 0x0"
        );
        assert_eq!(
            PatchOp::Const16 { dest: v(0), value: 300 }.to_string(),
            "const/16 v0, 0x12c"
        );
        assert_eq!(
            PatchOp::Const { dest: v(0), value: i32::MAX }.to_string(),
            "const v0, 0x7fffffff"
        );
        assert_eq!(
            PatchOp::ConstWide16 { dest: v(0), value: 0 }.to_string(),
            "const-wide/16 v0, 0x0"
        );
        assert_eq!(
            PatchOp::ConstWide { dest: v(0), value: i64::MAX }.to_string(),
            "const-wide v0, 0x7fffffffffffffff"
        );
        assert_eq!(PatchOp::Return { src: v(0) }.to_string(), "return v0");
        assert_eq!(PatchOp::ReturnWide { src: v(0) }.to_string(), "return-wide v0");
        assert_eq!(
            PatchOp::ReturnObject { src: v(1) }.to_string(),
            "return-object v1"
        );
        assert_eq!(PatchOp::ReturnVoid.to_string(), "return-void");
    }

    #[test]
    fn negative_literals_carry_a_sign() {
        assert_eq!(
            PatchOp::Const4 { dest: v(0), value: -1 }.to_string(),
            "const/4 v0, -0x1"
        );
        assert_eq!(
            PatchOp::Const16 { dest: v(2), value: -300 }.to_string(),
            "const/16 v2, -0x12c"
        );
    }

    #[test]
    fn const_width_selection() {
        assert_eq!(const_load(v(0), 1), PatchOp::Const4 { dest: v(0), value: 1 });
        assert_eq!(const_load(v(0), -8), PatchOp::Const4 { dest: v(0), value: -8 });
        assert_eq!(const_load(v(0), 8), PatchOp::Const16 { dest: v(0), value: 8 });
        assert_eq!(
            const_load(v(0), 40_000),
            PatchOp::Const { dest: v(0), value: 40_000 }
        );
        assert_eq!(
            const_load_wide(v(0), 12),
            PatchOp::ConstWide16 { dest: v(0), value: 12 }
        );
        assert_eq!(
            const_load_wide(v(0), i64::MAX),
            PatchOp::ConstWide { dest: v(0), value: i64::MAX }
        );
    }

    #[test]
    fn read_back_const_lines() {
        assert_eq!(read_const_line("    const/4 v0, 0x1"), Some((v(0), 1)));
        assert_eq!(read_const_line("const/4 v0, 0x0"), Some((v(0), 0)));
        assert_eq!(read_const_line("const/16 v3, -0x12c"), Some((v(3), -300)));
        assert_eq!(
            read_const_line("const-wide v0, 0x7fffffffffffffff"),
            Some((v(0), i64::MAX))
        );
        assert_eq!(read_const_line("const v1, 0x7fffffff"), Some((v(1), 0x7fff_ffff)));
        assert_eq!(read_const_line("return v0"), None);
        assert_eq!(read_const_line(".locals 1"), None);
    }

    #[test]
    fn rendered_ops_read_back() {
        for value in [0i32, 1, -1, 7, -8, 100, -100, 32_767, -32_768, i32::MAX, i32::MIN] {
            let op = const_load(v(0), value);
            let line = format!("    {op}");
            assert_eq!(read_const_line(&line), Some((v(0), value as i64)));
        }
    }
}
