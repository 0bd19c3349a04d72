//! Defines the expression node and its operator and literal types.

use crate::store::{Component, DatasetRef, NodeId};
use serde::{Serialize, Deserialize};
use smallvec::{smallvec, SmallVec};
use std::fmt;

/// Single-operand operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum UnaryOp {
    Negate = 0x10,
    Abs = 0x11,
    Sign = 0x12,
    Exp = 0x20,
    Ln = 0x21,
}

/// Two-operand operators. The order of `lhs`/`rhs` is significant for
/// everything except `Add` and `Mul`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BinaryOp {
    Add = 0x40,
    Sub = 0x41,
    Mul = 0x42,
    Div = 0x43,
    Mod = 0x44,
    Pow = 0x45,
}

impl UnaryOp {
    pub const ALL: [UnaryOp; 5] = [Self::Negate, Self::Abs, Self::Sign, Self::Exp, Self::Ln];

    pub fn opcode(self) -> u8 { self as u8 }

    pub fn from_opcode(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.opcode() == byte)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Negate => "neg",
            Self::Abs => "abs",
            Self::Sign => "sign",
            Self::Exp => "exp",
            Self::Ln => "ln",
        }
    }

    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Negate => -x,
            Self::Abs => x.abs(),
            Self::Sign => sign(x),
            Self::Exp => x.exp(),
            Self::Ln => x.ln(),
        }
    }
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 6] = [Self::Add, Self::Sub, Self::Mul, Self::Div, Self::Mod, Self::Pow];

    pub fn opcode(self) -> u8 { self as u8 }

    pub fn from_opcode(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.opcode() == byte)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "^",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Mod => "mod",
            Self::Pow => "pow",
        }
    }

    /// Binding strength used by the infix printer.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div | Self::Mod => 2,
            Self::Pow => 3,
        }
    }

    pub fn apply(self, x: f64, y: f64) -> f64 {
        match self {
            Self::Add => x + y,
            Self::Sub => x - y,
            Self::Mul => x * y,
            Self::Div => x / y,
            // Floored modulo: the result takes the sign of the divisor.
            Self::Mod => x - y * (x / y).floor(),
            Self::Pow => x.powf(y),
        }
    }
}

/// Either kind of operator, used where errors or statistics need to name one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Unary(UnaryOp),
    Binary(BinaryOp),
}

impl Operator {
    pub fn name(self) -> &'static str {
        match self {
            Self::Unary(op) => op.name(),
            Self::Binary(op) => op.name(),
        }
    }
}

impl From<UnaryOp> for Operator {
    fn from(op: UnaryOp) -> Self { Self::Unary(op) }
}

impl From<BinaryOp> for Operator {
    fn from(op: BinaryOp) -> Self { Self::Binary(op) }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `signum` with `sign(0) == 0`, which `f64::signum` does not give.
#[inline]
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Wire tag selecting how a constant's bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueType {
    Int32 = 0x01,
    Int64 = 0x02,
    Float32 = 0x03,
    Float64 = 0x04,
    /// i64 numerator followed by a non-zero i64 denominator.
    Rational = 0x05,
}

impl ValueType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Int32),
            0x02 => Some(Self::Int64),
            0x03 => Some(Self::Float32),
            0x04 => Some(Self::Float64),
            0x05 => Some(Self::Rational),
            _ => None,
        }
    }

    /// Encoded width in bytes. Every documented type is fixed width.
    pub fn width(self) -> usize {
        match self {
            Self::Int32 | Self::Float32 => 4,
            Self::Int64 | Self::Float64 => 8,
            Self::Rational => 16,
        }
    }
}

/// A typed literal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Rational { numer: i64, denom: i64 },
}

impl ScalarValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Int32(_) => ValueType::Int32,
            Self::Int64(_) => ValueType::Int64,
            Self::Float32(_) => ValueType::Float32,
            Self::Float64(_) => ValueType::Float64,
            Self::Rational { .. } => ValueType::Rational,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Int32(v) => v as f64,
            Self::Int64(v) => v as f64,
            Self::Float32(v) => v as f64,
            Self::Float64(v) => v,
            Self::Rational { numer, denom } => numer as f64 / denom as f64,
        }
    }

    /// Big-endian value bytes, without the type tag or length.
    pub fn to_bytes(&self) -> SmallVec<[u8; 16]> {
        match *self {
            Self::Int32(v) => SmallVec::from_slice(&v.to_be_bytes()),
            Self::Int64(v) => SmallVec::from_slice(&v.to_be_bytes()),
            Self::Float32(v) => SmallVec::from_slice(&v.to_be_bytes()),
            Self::Float64(v) => SmallVec::from_slice(&v.to_be_bytes()),
            Self::Rational { numer, denom } => {
                let mut out: SmallVec<[u8; 16]> = SmallVec::from_slice(&numer.to_be_bytes());
                out.extend_from_slice(&denom.to_be_bytes());
                out
            }
        }
    }

    /// Parses value bytes for a raw type tag. `None` when the tag is unknown,
    /// the length does not match the type's width, or a rational has a zero
    /// denominator.
    pub fn from_bytes(tag: u8, bytes: &[u8]) -> Option<Self> {
        let value_type = ValueType::from_byte(tag)?;
        if bytes.len() != value_type.width() {
            return None;
        }
        let value = match value_type {
            ValueType::Int32 => Self::Int32(i32::from_be_bytes(bytes.try_into().ok()?)),
            ValueType::Int64 => Self::Int64(i64::from_be_bytes(bytes.try_into().ok()?)),
            ValueType::Float32 => Self::Float32(f32::from_be_bytes(bytes.try_into().ok()?)),
            ValueType::Float64 => Self::Float64(f64::from_be_bytes(bytes.try_into().ok()?)),
            ValueType::Rational => {
                let numer = i64::from_be_bytes(bytes[..8].try_into().ok()?);
                let denom = i64::from_be_bytes(bytes[8..].try_into().ok()?);
                if denom == 0 {
                    return None;
                }
                Self::Rational { numer, denom }
            }
        };
        Some(value)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Int32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            // `{:?}` keeps a `.0` or exponent, so a float never reads as an integer.
            Self::Float32(v) => write!(f, "{:?}", v),
            Self::Float64(v) => write!(f, "{:?}", v),
            Self::Rational { numer, denom } => write!(f, "{}/{}", numer, denom),
        }
    }
}

/// One step of a derived computation. Children are arena ids, so a node is
/// only meaningful inside the arena that issued them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExprNode {
    Variable { dataset: DatasetRef, component: Component },
    Constant(ScalarValue),
    Unary { op: UnaryOp, child: NodeId },
    Binary { op: BinaryOp, lhs: NodeId, rhs: NodeId },
}

impl ExprNode {
    pub const VARIABLE_OPCODE: u8 = 0x01;
    pub const CONSTANT_OPCODE: u8 = 0x02;

    pub fn opcode(&self) -> u8 {
        match self {
            Self::Variable { .. } => Self::VARIABLE_OPCODE,
            Self::Constant(_) => Self::CONSTANT_OPCODE,
            Self::Unary { op, .. } => op.opcode(),
            Self::Binary { op, .. } => op.opcode(),
        }
    }

    pub fn children(&self) -> SmallVec<[NodeId; 2]> {
        match *self {
            Self::Variable { .. } | Self::Constant(_) => SmallVec::new(),
            Self::Unary { child, .. } => smallvec![child],
            Self::Binary { lhs, rhs, .. } => smallvec![lhs, rhs],
        }
    }

    pub fn operator(&self) -> Option<Operator> {
        match *self {
            Self::Unary { op, .. } => Some(op.into()),
            Self::Binary { op, .. } => Some(op.into()),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Variable { .. } | Self::Constant(_))
    }
}

/// Display-only data attached to a node. Never part of its identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub print_alias: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ScalarValue::Int32(-7))]
    #[case(ScalarValue::Int64(1 << 40))]
    #[case(ScalarValue::Float32(0.25))]
    #[case(ScalarValue::Float64(-3.5e300))]
    #[case(ScalarValue::Rational { numer: 1, denom: 3 })]
    fn test_scalar_bytes_match_declared_width(#[case] value: ScalarValue) {
        let bytes = value.to_bytes();
        assert_eq!(bytes.len(), value.value_type().width());
        assert_eq!(ScalarValue::from_bytes(value.value_type() as u8, &bytes), Some(value));
    }

    #[rstest]
    #[case(0x01, 3)]
    #[case(0x04, 4)]
    #[case(0x05, 8)]
    #[case(0x06, 4)]
    #[case(0x00, 0)]
    fn test_scalar_rejects_bad_shape(#[case] tag: u8, #[case] len: usize) {
        assert_eq!(ScalarValue::from_bytes(tag, &vec![0u8; len]), None);
    }

    #[test]
    fn test_rational_zero_denominator_rejected() {
        let mut bytes = 1i64.to_be_bytes().to_vec();
        bytes.extend_from_slice(&0i64.to_be_bytes());
        assert_eq!(ScalarValue::from_bytes(0x05, &bytes), None);
    }

    #[test]
    fn test_opcode_tables_are_disjoint_and_round_trip() {
        for op in UnaryOp::ALL {
            assert_eq!(UnaryOp::from_opcode(op.opcode()), Some(op));
            assert_eq!(BinaryOp::from_opcode(op.opcode()), None);
        }
        for op in BinaryOp::ALL {
            assert_eq!(BinaryOp::from_opcode(op.opcode()), Some(op));
        }
        assert_eq!(UnaryOp::from_opcode(0x13), None);
        assert_eq!(BinaryOp::from_opcode(0x46), None);
    }

    #[rstest]
    #[case(7.0, 3.0, 1.0)]
    #[case(-7.0, 3.0, 2.0)]
    #[case(7.0, -3.0, -2.0)]
    fn test_mod_is_floored(#[case] x: f64, #[case] y: f64, #[case] expected: f64) {
        assert_eq!(BinaryOp::Mod.apply(x, y), expected);
    }

    #[test]
    fn test_sign_of_zero_is_zero() {
        assert_eq!(UnaryOp::Sign.apply(0.0), 0.0);
        assert_eq!(UnaryOp::Sign.apply(-0.0), 0.0);
        assert_eq!(UnaryOp::Sign.apply(-2.0), -1.0);
    }
}
