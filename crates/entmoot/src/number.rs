//! Opaque numeric values.
//!
//! The evaluator never inspects numbers directly. It asks the number
//! natives (`int.__add__`, `float.__lt__`, ...) to combine them, and those
//! natives delegate here. Integers are arbitrary precision, floats are
//! `f64`, and mixed arithmetic promotes to float.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest shift count accepted by `<<`.
const MAX_SHIFT: usize = 1 << 24;

/// Failure of a numeric operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumberError {
    /// Division or modulo by zero
    #[error("{message}")]
    ZeroDivision {
        /// Language-level message
        message: &'static str,
    },

    /// Operation not defined for the operand kinds
    #[error("unsupported operand type(s) for {op}: '{left}' and '{right}'")]
    Unsupported {
        /// Operator symbol
        op: &'static str,
        /// Left operand type name
        left: &'static str,
        /// Right operand type name
        right: &'static str,
    },

    /// Result does not fit
    #[error("{message}")]
    Overflow {
        /// Language-level message
        message: String,
    },

    /// Shift by a negative count
    #[error("negative shift count")]
    NegativeShift,
}

/// An integer or floating point number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Literal", into = "Literal")]
pub struct Number(Repr);

#[derive(Clone, Debug, PartialEq)]
enum Repr {
    Int(BigInt),
    Float(f64),
}

/// Wire form of a numeric literal: JSON integers and floats, or decimal
/// text for integers beyond 64 bits.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Literal {
    Int(i64),
    Float(f64),
    Text(String),
}

impl TryFrom<Literal> for Number {
    type Error = String;

    fn try_from(literal: Literal) -> Result<Self, Self::Error> {
        match literal {
            Literal::Int(n) => Ok(Number::int(n)),
            Literal::Float(f) => Ok(Number::float(f)),
            Literal::Text(text) => {
                Number::parse(&text).ok_or_else(|| format!("invalid numeric literal: {text:?}"))
            }
        }
    }
}

impl From<Number> for Literal {
    fn from(number: Number) -> Self {
        match number.0 {
            Repr::Int(n) => match n.to_i64() {
                Some(small) => Literal::Int(small),
                None => Literal::Text(n.to_string()),
            },
            Repr::Float(f) => Literal::Float(f),
        }
    }
}

impl Number {
    /// Create an integer.
    pub fn int(value: impl Into<BigInt>) -> Self {
        Number(Repr::Int(value.into()))
    }

    /// Create a float.
    pub fn float(value: f64) -> Self {
        Number(Repr::Float(value))
    }

    /// Parse decimal integer or float text.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim().replace('_', "");
        if let Ok(n) = text.parse::<BigInt>() {
            return Some(Number::int(n));
        }
        text.parse::<f64>().ok().map(Number::float)
    }

    /// Whether this is an integer.
    pub fn is_int(&self) -> bool {
        matches!(self.0, Repr::Int(_))
    }

    /// Language-level type name (`int` or `float`).
    pub fn type_name(&self) -> &'static str {
        match self.0 {
            Repr::Int(_) => "int",
            Repr::Float(_) => "float",
        }
    }

    /// The integer value when it fits in an `i64`.
    pub fn to_i64(&self) -> Option<i64> {
        match &self.0 {
            Repr::Int(n) => n.to_i64(),
            Repr::Float(_) => None,
        }
    }

    /// Lossy conversion to `f64`.
    pub fn to_f64(&self) -> f64 {
        match &self.0 {
            Repr::Int(n) => n.to_f64().unwrap_or(f64::NAN),
            Repr::Float(f) => *f,
        }
    }

    /// Whether the value is zero.
    pub fn is_zero(&self) -> bool {
        match &self.0 {
            Repr::Int(n) => n.is_zero(),
            Repr::Float(f) => *f == 0.0,
        }
    }

    /// `self + other`
    pub fn add(&self, other: &Number) -> Number {
        match (&self.0, &other.0) {
            (Repr::Int(a), Repr::Int(b)) => Number::int(a + b),
            _ => Number::float(self.to_f64() + other.to_f64()),
        }
    }

    /// `self - other`
    pub fn sub(&self, other: &Number) -> Number {
        match (&self.0, &other.0) {
            (Repr::Int(a), Repr::Int(b)) => Number::int(a - b),
            _ => Number::float(self.to_f64() - other.to_f64()),
        }
    }

    /// `self * other`
    pub fn mul(&self, other: &Number) -> Number {
        match (&self.0, &other.0) {
            (Repr::Int(a), Repr::Int(b)) => Number::int(a * b),
            _ => Number::float(self.to_f64() * other.to_f64()),
        }
    }

    /// `self / other`, always a float.
    pub fn true_div(&self, other: &Number) -> Result<Number, NumberError> {
        if other.is_zero() {
            return Err(NumberError::ZeroDivision {
                message: "division by zero",
            });
        }
        Ok(Number::float(self.to_f64() / other.to_f64()))
    }

    /// `self // other`, rounding toward negative infinity.
    pub fn floor_div(&self, other: &Number) -> Result<Number, NumberError> {
        if other.is_zero() {
            return Err(NumberError::ZeroDivision {
                message: "integer division or modulo by zero",
            });
        }
        match (&self.0, &other.0) {
            (Repr::Int(a), Repr::Int(b)) => Ok(Number::int(a.div_floor(b))),
            _ => Ok(Number::float((self.to_f64() / other.to_f64()).floor())),
        }
    }

    /// `self % other`, taking the sign of the divisor.
    pub fn rem(&self, other: &Number) -> Result<Number, NumberError> {
        if other.is_zero() {
            return Err(NumberError::ZeroDivision {
                message: "integer division or modulo by zero",
            });
        }
        match (&self.0, &other.0) {
            (Repr::Int(a), Repr::Int(b)) => Ok(Number::int(a.mod_floor(b))),
            _ => {
                let (a, b) = (self.to_f64(), other.to_f64());
                let mut r = a % b;
                if r != 0.0 && (r < 0.0) != (b < 0.0) {
                    r += b;
                }
                Ok(Number::float(r))
            }
        }
    }

    /// `self ** other`
    pub fn pow(&self, other: &Number) -> Result<Number, NumberError> {
        match (&self.0, &other.0) {
            (Repr::Int(base), Repr::Int(exp)) if !exp.is_negative() => {
                let exp = exp.to_u32().ok_or_else(|| NumberError::Overflow {
                    message: "exponent too large".to_string(),
                })?;
                Ok(Number::int(base.pow(exp)))
            }
            _ => {
                let (a, b) = (self.to_f64(), other.to_f64());
                if a == 0.0 && b < 0.0 {
                    return Err(NumberError::ZeroDivision {
                        message: "0.0 cannot be raised to a negative power",
                    });
                }
                Ok(Number::float(a.powf(b)))
            }
        }
    }

    /// `self << other`
    pub fn shl(&self, other: &Number) -> Result<Number, NumberError> {
        let (a, count) = self.shift_operands(other, "<<")?;
        let count = count.to_usize().filter(|c| *c <= MAX_SHIFT).ok_or_else(|| {
            NumberError::Overflow {
                message: "shift count too large".to_string(),
            }
        })?;
        Ok(Number::int(a << count))
    }

    /// `self >> other`
    pub fn shr(&self, other: &Number) -> Result<Number, NumberError> {
        let (a, count) = self.shift_operands(other, ">>")?;
        match count.to_u64().filter(|c| *c < a.bits().saturating_add(1)) {
            Some(c) => Ok(Number::int(a >> c)),
            None if a.is_negative() => Ok(Number::int(-1)),
            None => Ok(Number::int(0)),
        }
    }

    fn shift_operands<'a>(
        &'a self,
        other: &'a Number,
        op: &'static str,
    ) -> Result<(&'a BigInt, &'a BigInt), NumberError> {
        let (a, b) = self.int_operands(other, op)?;
        if b.is_negative() {
            return Err(NumberError::NegativeShift);
        }
        Ok((a, b))
    }

    /// `self & other`
    pub fn bitand(&self, other: &Number) -> Result<Number, NumberError> {
        let (a, b) = self.int_operands(other, "&")?;
        Ok(Number::int(a & b))
    }

    /// `self | other`
    pub fn bitor(&self, other: &Number) -> Result<Number, NumberError> {
        let (a, b) = self.int_operands(other, "|")?;
        Ok(Number::int(a | b))
    }

    /// `self ^ other`
    pub fn bitxor(&self, other: &Number) -> Result<Number, NumberError> {
        let (a, b) = self.int_operands(other, "^")?;
        Ok(Number::int(a ^ b))
    }

    fn int_operands<'a>(
        &'a self,
        other: &'a Number,
        op: &'static str,
    ) -> Result<(&'a BigInt, &'a BigInt), NumberError> {
        match (&self.0, &other.0) {
            (Repr::Int(a), Repr::Int(b)) => Ok((a, b)),
            _ => Err(NumberError::Unsupported {
                op,
                left: self.type_name(),
                right: other.type_name(),
            }),
        }
    }

    /// `-self`
    pub fn neg(&self) -> Number {
        match &self.0 {
            Repr::Int(n) => Number::int(-n),
            Repr::Float(f) => Number::float(-f),
        }
    }

    /// `~self`
    pub fn invert(&self) -> Result<Number, NumberError> {
        match &self.0 {
            Repr::Int(n) => Ok(Number::int(-(n + 1u32))),
            Repr::Float(_) => Err(NumberError::Unsupported {
                op: "~",
                left: "float",
                right: "float",
            }),
        }
    }

    /// `abs(self)`
    pub fn abs(&self) -> Number {
        match &self.0 {
            Repr::Int(n) => Number::int(n.abs()),
            Repr::Float(f) => Number::float(f.abs()),
        }
    }

    /// Truncate toward zero, producing an int.
    pub fn truncate(&self) -> Result<Number, NumberError> {
        match &self.0 {
            Repr::Int(_) => Ok(self.clone()),
            Repr::Float(f) if f.is_nan() => Err(NumberError::Overflow {
                message: "cannot convert float NaN to integer".to_string(),
            }),
            Repr::Float(f) => BigInt::from_f64(f.trunc())
                .map(Number::int)
                .ok_or_else(|| NumberError::Overflow {
                    message: "cannot convert float infinity to integer".to_string(),
                }),
        }
    }

    /// The same value as a float.
    pub fn to_float(&self) -> Number {
        Number::float(self.to_f64())
    }

    /// Numeric ordering; `None` when a NaN is involved.
    pub fn compare(&self, other: &Number) -> Option<Ordering> {
        match (&self.0, &other.0) {
            (Repr::Int(a), Repr::Int(b)) => Some(a.cmp(b)),
            _ => self.to_f64().partial_cmp(&other.to_f64()),
        }
    }

    /// Numeric equality across int and float.
    pub fn equals(&self, other: &Number) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Number::int(n)
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number::float(f)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Int(n) => write!(f, "{}", n),
            Repr::Float(x) => fmt_float(*x, f),
        }
    }
}

fn fmt_float(x: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if x.is_nan() {
        return write!(f, "nan");
    }
    if x.is_infinite() {
        return write!(f, "{}", if x > 0.0 { "inf" } else { "-inf" });
    }
    let magnitude = x.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let text = format!("{:e}", x);
        return match text.split_once('e') {
            Some((mantissa, exp)) => {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exp),
                };
                write!(f, "{}e{}{:0>2}", mantissa, sign, digits)
            }
            None => write!(f, "{}", text),
        };
    }
    if x.fract() == 0.0 {
        write!(f, "{:.1}", x)
    } else {
        write!(f, "{}", x)
    }
}
