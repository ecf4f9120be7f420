//! The tagged scalar value model.

use std::cmp::Ordering;
use std::fmt;

/// One of three policies governing how a raw record-field string is
/// promoted to a typed [`Value`] on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InferencePolicy {
    /// Never infer; every field stays a `String`.
    StringsOnly,
    /// Infer floats but never ints (`3` stays a `String`, `3.0` becomes a `Float`).
    StringsAndFloats,
    /// Infer ints and floats.
    #[default]
    StringsFloatsAndInts,
}

/// A tagged scalar value: the unit of computation in the DSL.
#[derive(Debug, Clone)]
pub enum Value {
    /// The field does not exist at all.
    Absent,
    /// The field exists with an empty string.
    Empty,
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// The absorbing error value; propagates through arithmetic.
    Error,
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn is_present(&self) -> bool {
        !self.is_absent()
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Strict boolean coercion: anything other than `Bool` is a type error.
    pub fn coerce_to_bool(&self) -> Result<bool, TypeError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(TypeError::NotBool(other.type_name())),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Absent => "absent",
            Value::Empty => "empty",
            Value::String(_) => "string",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Error => "error",
        }
    }

    /// Lazily parse a raw record-field string into a [`Value`] under the
    /// given [`InferencePolicy`].
    pub fn parse_inferred(s: &str, policy: InferencePolicy) -> Value {
        if s.is_empty() {
            return Value::Empty;
        }
        match policy {
            InferencePolicy::StringsOnly => Value::String(s.to_string()),
            InferencePolicy::StringsAndFloats => {
                if looks_like_int(s) {
                    // Ints are not inferred under this policy; leave
                    // int-looking strings alone even though they'd also
                    // parse as floats.
                    Value::String(s.to_string())
                } else if let Ok(f) = s.parse::<f64>() {
                    Value::Float(f)
                } else {
                    Value::String(s.to_string())
                }
            }
            InferencePolicy::StringsFloatsAndInts => {
                if let Ok(i) = s.parse::<i64>() {
                    Value::Int(i)
                } else if let Ok(f) = s.parse::<f64>() {
                    Value::Float(f)
                } else {
                    Value::String(s.to_string())
                }
            }
        }
    }

    /// Format a value to its record-field string form, honoring an optional
    /// numeric output format (`OFMT`, e.g. `"%.6f"`).
    pub fn format_value(&self, numeric_format: Option<&str>) -> String {
        match self {
            Value::Absent => String::new(),
            Value::Empty => String::new(),
            Value::String(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f, numeric_format),
            Value::Bool(b) => b.to_string(),
            Value::Error => "(error)".to_string(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn is_string_like(&self) -> bool {
        matches!(self, Value::String(_) | Value::Empty)
    }

    /// `+`: absent is the additive identity (`absent + x = x`, `x + absent =
    /// x`), so that the canonical `@s[$g] += $v` accumulation idiom
    /// initializes on first sight rather than staying absent forever.
    pub fn add(&self, rhs: &Value) -> Value {
        if self.is_error() || rhs.is_error() {
            return Value::Error;
        }
        if self.is_absent() {
            return rhs.clone();
        }
        if rhs.is_absent() {
            return self.clone();
        }
        arith(self, rhs, |a, b| a.checked_add(b), |a, b| a + b)
    }

    /// `-`: absent is the additive identity on the right (`x - absent =
    /// x`); on the left it negates the right operand (`absent - x = -x`).
    pub fn sub(&self, rhs: &Value) -> Value {
        if self.is_error() || rhs.is_error() {
            return Value::Error;
        }
        if rhs.is_absent() {
            return self.clone();
        }
        if self.is_absent() {
            return arith(&Value::Int(0), rhs, |a, b| a.checked_sub(b), |a, b| a - b);
        }
        arith(self, rhs, |a, b| a.checked_sub(b), |a, b| a - b)
    }

    pub fn mul(&self, rhs: &Value) -> Value {
        arith(self, rhs, |a, b| a.checked_mul(b), |a, b| a * b)
    }

    /// True division (`/`): always promotes to float. Division by zero
    /// yields `Error` for int/int and `±Inf`/`NaN` for float, matching IEEE
    /// 754 float semantics rather than panicking.
    pub fn div(&self, rhs: &Value) -> Value {
        if self.is_error() || rhs.is_error() {
            return Value::Error;
        }
        if self.is_absent() || rhs.is_absent() {
            return Value::Absent;
        }
        match (self.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => {
                if matches!(rhs, Value::Int(0)) && matches!(self, Value::Int(_)) {
                    return Value::Error;
                }
                Value::Float(a / b)
            }
            _ => Value::Error,
        }
    }

    /// Integer (floor) division (`//`).
    pub fn int_div(&self, rhs: &Value) -> Value {
        if self.is_error() || rhs.is_error() {
            return Value::Error;
        }
        if self.is_absent() || rhs.is_absent() {
            return Value::Absent;
        }
        match (self.as_i64(), rhs.as_i64()) {
            (Some(a), Some(b)) => {
                if b == 0 {
                    return Value::Error;
                }
                Value::Int(a.div_euclid(b))
            }
            _ => match (self.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => Value::Float((a / b).floor()),
                _ => Value::Error,
            },
        }
    }

    pub fn modulo(&self, rhs: &Value) -> Value {
        if self.is_error() || rhs.is_error() {
            return Value::Error;
        }
        if self.is_absent() || rhs.is_absent() {
            return Value::Absent;
        }
        match (self.as_i64(), rhs.as_i64()) {
            (Some(a), Some(b)) => {
                if b == 0 {
                    return Value::Error;
                }
                Value::Int(a.rem_euclid(b))
            }
            _ => match (self.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => Value::Float(a.rem_euclid(b)),
                _ => Value::Error,
            },
        }
    }

    /// Ordered comparison. String comparison is lexicographic whenever
    /// either operand is string-like.
    pub fn compare(&self, rhs: &Value) -> Option<Ordering> {
        if self.is_string_like() || rhs.is_string_like() {
            let a = self.format_value(None);
            let b = rhs.format_value(None);
            return Some(a.cmp(&b));
        }
        match (self.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        }
    }

    pub fn eq_value(&self, rhs: &Value) -> bool {
        match (self, rhs) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Absent, Value::Absent) => true,
            (Value::Empty, Value::Empty) => true,
            _ => self.compare(rhs) == Some(Ordering::Equal),
        }
    }

    pub fn logical_and(&self, rhs: &Value) -> Result<Value, TypeError> {
        Ok(Value::Bool(self.coerce_to_bool()? && rhs.coerce_to_bool()?))
    }

    pub fn logical_or(&self, rhs: &Value) -> Result<Value, TypeError> {
        Ok(Value::Bool(self.coerce_to_bool()? || rhs.coerce_to_bool()?))
    }

    pub fn logical_not(&self) -> Result<Value, TypeError> {
        Ok(Value::Bool(!self.coerce_to_bool()?))
    }

    pub fn bitand(&self, rhs: &Value) -> Value {
        int_bitop(self, rhs, |a, b| a & b)
    }

    pub fn bitor(&self, rhs: &Value) -> Value {
        int_bitop(self, rhs, |a, b| a | b)
    }

    pub fn bitxor(&self, rhs: &Value) -> Value {
        int_bitop(self, rhs, |a, b| a ^ b)
    }

    pub fn shl(&self, rhs: &Value) -> Value {
        int_bitop(self, rhs, |a, b| a.wrapping_shl(b as u32))
    }

    pub fn shr(&self, rhs: &Value) -> Value {
        int_bitop(self, rhs, |a, b| a.wrapping_shr(b as u32))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    #[error("expected bool, found {0}")]
    NotBool(&'static str),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_value(None))
    }
}

fn looks_like_int(s: &str) -> bool {
    let s = s.strip_prefix(['+', '-']).unwrap_or(s);
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn arith(
    a: &Value,
    b: &Value,
    int_op: impl Fn(i64, i64) -> Option<i64>,
    float_op: impl Fn(f64, f64) -> f64,
) -> Value {
    if a.is_error() || b.is_error() {
        return Value::Error;
    }
    if a.is_absent() || b.is_absent() {
        return Value::Absent;
    }
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => match int_op(*x, *y) {
            Some(v) => Value::Int(v),
            None => Value::Float(float_op(*x as f64, *y as f64)),
        },
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Value::Float(float_op(x, y)),
            _ => Value::Error,
        },
    }
}

fn int_bitop(a: &Value, b: &Value, op: impl Fn(i64, i64) -> i64) -> Value {
    if a.is_error() || b.is_error() {
        return Value::Error;
    }
    if a.is_absent() || b.is_absent() {
        return Value::Absent;
    }
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => Value::Int(op(x, y)),
        _ => Value::Error,
    }
}

/// Minimal printf-style float formatter supporting the subset of `OFMT`
/// strings Miller programs commonly set (`%f`, `%.Nf`, `%e`, `%g`, `%d`).
fn format_float(f: f64, ofmt: Option<&str>) -> String {
    let Some(fmt) = ofmt else {
        return default_float_format(f);
    };
    let Some(spec) = parse_printf_float_spec(fmt) else {
        return default_float_format(f);
    };
    match spec.conv {
        'd' => format!("{}", f as i64),
        'e' => match spec.precision {
            Some(p) => format!("{:.*e}", p, f),
            None => format!("{:e}", f),
        },
        _ => match spec.precision {
            Some(p) => format!("{:.*}", p, f),
            None => format!("{f}"),
        },
    }
}

fn default_float_format(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e15 {
        format!("{f:.6}")
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        format!("{f}")
    }
}

struct PrintfFloatSpec {
    precision: Option<usize>,
    conv: char,
}

fn parse_printf_float_spec(fmt: &str) -> Option<PrintfFloatSpec> {
    let rest = fmt.strip_prefix('%')?;
    let mut chars = rest.chars().peekable();
    let mut precision = None;
    // skip flags/width
    while matches!(chars.peek(), Some('-' | '+' | '0' | ' ')) {
        chars.next();
    }
    while matches!(chars.peek(), Some(c) if c.is_ascii_digit()) {
        chars.next();
    }
    if chars.peek() == Some(&'.') {
        chars.next();
        let mut digits = String::new();
        while matches!(chars.peek(), Some(c) if c.is_ascii_digit()) {
            digits.push(chars.next().unwrap());
        }
        precision = digits.parse().ok();
    }
    let conv = chars.next()?;
    if !matches!(conv, 'f' | 'e' | 'g' | 'd' | 'l') {
        return None;
    }
    // "%lf" style: the conversion char can be preceded by a length modifier 'l'
    let conv = if conv == 'l' { chars.next()? } else { conv };
    Some(PrintfFloatSpec { precision, conv })
}

/// A mask of value kinds accepted by a declared local-variable slot (§4.1,
/// §4.4). Distinct from `Value` itself: `map` is a mask bit even though
/// `Value` has no `Map` variant (maps live in a [`crate::MultiLevelMap`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMask(u8);

impl TypeMask {
    pub const INT: TypeMask = TypeMask(1 << 0);
    pub const FLOAT: TypeMask = TypeMask(1 << 1);
    pub const BOOL: TypeMask = TypeMask(1 << 2);
    pub const STRING: TypeMask = TypeMask(1 << 3);
    pub const MAP: TypeMask = TypeMask(1 << 4);
    pub const NUM: TypeMask = TypeMask(Self::INT.0 | Self::FLOAT.0);
    pub const ANY: TypeMask = TypeMask(
        Self::INT.0 | Self::FLOAT.0 | Self::BOOL.0 | Self::STRING.0 | Self::MAP.0,
    );

    pub fn contains(self, other: TypeMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: TypeMask) -> TypeMask {
        TypeMask(self.0 | other.0)
    }

    /// Does this mask accept the given scalar value? `map` slots never
    /// accept a scalar `Value` (they are checked separately by the caller).
    pub fn accepts(self, value: &Value) -> bool {
        let bit = match value {
            Value::Int(_) => Self::INT,
            Value::Float(_) => Self::FLOAT,
            Value::Bool(_) => Self::BOOL,
            Value::String(_) | Value::Empty => Self::STRING,
            // Absent assignment is a no-op upstream and never reaches here;
            // Error is allowed into any slot since it only ever propagates.
            Value::Absent | Value::Error => return true,
        };
        self.contains(bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_inferred_policies() {
        assert!(matches!(
            Value::parse_inferred("3", InferencePolicy::StringsOnly),
            Value::String(s) if s == "3"
        ));
        assert!(matches!(
            Value::parse_inferred("3", InferencePolicy::StringsAndFloats),
            Value::String(s) if s == "3"
        ));
        assert!(matches!(
            Value::parse_inferred("3", InferencePolicy::StringsFloatsAndInts),
            Value::Int(3)
        ));
        assert!(matches!(
            Value::parse_inferred("3.5", InferencePolicy::StringsAndFloats),
            Value::Float(f) if f == 3.5
        ));
        assert!(matches!(Value::parse_inferred("", InferencePolicy::StringsFloatsAndInts), Value::Empty));
    }

    #[test]
    fn int_arithmetic_stays_int_when_exact() {
        let a = Value::Int(4);
        let b = Value::Int(2);
        assert!(matches!(a.add(&b), Value::Int(6)));
        assert!(matches!(a.int_div(&b), Value::Int(2)));
    }

    #[test]
    fn int_overflow_promotes_to_float() {
        let a = Value::Int(i64::MAX);
        let b = Value::Int(1);
        assert!(matches!(a.add(&b), Value::Float(_)));
    }

    #[test]
    fn division_by_zero() {
        assert!(matches!(Value::Int(1).div(&Value::Int(0)), Value::Error));
        assert!(matches!(Value::Float(1.0).div(&Value::Float(0.0)), Value::Float(f) if f.is_infinite()));
    }

    #[test]
    fn error_is_absorbing() {
        assert!(Value::Error.add(&Value::Int(1)).is_error());
    }

    #[test]
    fn absent_is_additive_identity() {
        assert!(matches!(Value::Absent.add(&Value::Int(1)), Value::Int(1)));
        assert!(matches!(Value::Int(1).add(&Value::Absent), Value::Int(1)));
        assert!(matches!(Value::Int(1).sub(&Value::Absent), Value::Int(1)));
    }

    #[test]
    fn absent_propagates_through_other_arithmetic() {
        assert!(Value::Absent.mul(&Value::Int(1)).is_absent());
        assert!(Value::Absent.div(&Value::Int(1)).is_absent());
    }

    #[test]
    fn string_comparison_is_lexicographic() {
        let a = Value::String("10".into());
        let b = Value::String("9".into());
        assert_eq!(a.compare(&b), Some(Ordering::Less));
    }

    #[test]
    fn type_mask_accepts() {
        assert!(TypeMask::NUM.accepts(&Value::Int(1)));
        assert!(TypeMask::NUM.accepts(&Value::Float(1.0)));
        assert!(!TypeMask::NUM.accepts(&Value::Bool(true)));
        assert!(TypeMask::INT.contains(TypeMask::INT));
        assert!(!TypeMask::INT.contains(TypeMask::FLOAT));
    }
}
