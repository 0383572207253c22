//! Cache values and the coercions typed accessors rely on

use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar stored in the cache.
///
/// The variant is the type tag: it survives serialization so a value read back
/// from disk has the same shape it was written with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// Amount applied by `increment_by` / `decrement_by`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn is_float(&self) -> bool {
        matches!(self, Number::Float(_))
    }

    /// Returns the additive inverse, or `None` when it does not fit (`i64::MIN`).
    pub fn checked_neg(self) -> Option<Self> {
        match self {
            Number::Int(v) => v.checked_neg().map(Number::Int),
            Number::Float(v) => Some(Number::Float(-v)),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(v) => *v as f64,
            Number::Float(v) => *v,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(v) => write!(f, "{}", v),
            Number::Float(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! number_from {
    ($variant:ident, $target:ty; $($t:ty),*) => {
        $(
            impl From<$t> for Number {
                fn from(v: $t) -> Self {
                    Number::$variant(v as $target)
                }
            }
        )*
    };
}

number_from!(Int, i64; i8, i16, i32, i64, u8, u16, u32);
number_from!(Float, f64; f32, f64);

impl From<isize> for Number {
    fn from(v: isize) -> Self {
        // isize is at most 64 bits on every supported target
        Number::Int(v as i64)
    }
}

/// Unsigned deltas above `i64::MAX` have no integer counter form
impl TryFrom<u64> for Number {
    type Error = std::num::TryFromIntError;

    fn try_from(v: u64) -> Result<Self, Self::Error> {
        i64::try_from(v).map(Number::Int)
    }
}

impl TryFrom<usize> for Number {
    type Error = std::num::TryFromIntError;

    fn try_from(v: usize) -> Result<Self, Self::Error> {
        i64::try_from(v).map(Number::Int)
    }
}

macro_rules! value_from {
    ($variant:ident, $target:ty; $($t:ty),*) => {
        $(
            impl From<$t> for CacheValue {
                fn from(v: $t) -> Self {
                    CacheValue::$variant(v as $target)
                }
            }
        )*
    };
}

value_from!(Int, i64; i8, i16, i32, i64, isize);
value_from!(UInt, u64; u8, u16, u32, u64, usize);
value_from!(Float, f64; f32, f64);

impl From<bool> for CacheValue {
    fn from(v: bool) -> Self {
        CacheValue::Bool(v)
    }
}

impl From<&str> for CacheValue {
    fn from(v: &str) -> Self {
        CacheValue::String(v.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(v: String) -> Self {
        CacheValue::String(v)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(v: Vec<u8>) -> Self {
        CacheValue::Bytes(v)
    }
}

impl From<&[u8]> for CacheValue {
    fn from(v: &[u8]) -> Self {
        CacheValue::Bytes(v.to_vec())
    }
}

impl From<Number> for CacheValue {
    fn from(v: Number) -> Self {
        match v {
            Number::Int(i) => CacheValue::Int(i),
            Number::Float(f) => CacheValue::Float(f),
        }
    }
}

// 2^63 and 2^64 are exact in f64; both bounds are exclusive.
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;
const U64_UPPER: f64 = 18_446_744_073_709_551_616.0;

fn integral(v: f64) -> bool {
    v.is_finite() && v.fract() == 0.0
}

impl CacheValue {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            CacheValue::Int(_) | CacheValue::UInt(_) | CacheValue::Float(_)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CacheValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CacheValue::Int(v) => Some(*v),
            CacheValue::UInt(v) => i64::try_from(*v).ok(),
            CacheValue::Float(v) if integral(*v) && *v >= -I64_UPPER && *v < I64_UPPER => {
                Some(*v as i64)
            }
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            CacheValue::Int(v) => u64::try_from(*v).ok(),
            CacheValue::UInt(v) => Some(*v),
            CacheValue::Float(v) if integral(*v) && *v >= 0.0 && *v < U64_UPPER => {
                Some(*v as u64)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CacheValue::Int(v) => Some(*v as f64),
            CacheValue::UInt(v) => Some(*v as f64),
            CacheValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Narrowing to `f32` fails when a finite value overflows to infinity.
    pub fn as_f32(&self) -> Option<f32> {
        let wide = self.as_f64()?;
        let narrow = wide as f32;
        if wide.is_finite() && !narrow.is_finite() {
            return None;
        }
        Some(narrow)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CacheValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CacheValue::Bytes(v) => Some(v),
            CacheValue::String(v) => Some(v.as_bytes()),
            _ => None,
        }
    }

    /// Integer conversion to any fixed-width type, checked against its range.
    pub fn as_int<T: TryFrom<i64>>(&self) -> Option<T> {
        self.as_i64().and_then(|v| T::try_from(v).ok())
    }

    /// Unsigned conversion to any fixed-width type, checked against its range.
    pub fn as_uint<T: TryFrom<u64>>(&self) -> Option<T> {
        self.as_u64().and_then(|v| T::try_from(v).ok())
    }

    /// Adds `delta` to a numeric value.
    ///
    /// Integer values stay integers while the delta is an integer and the result
    /// fits; a float on either side yields a float. Returns `None` for
    /// non-numeric values, integer overflow and non-finite float results.
    pub fn checked_add(&self, delta: Number) -> Option<CacheValue> {
        match (self, delta) {
            (CacheValue::Int(a), Number::Int(d)) => a.checked_add(d).map(CacheValue::Int),
            (CacheValue::UInt(a), Number::Int(d)) => {
                let sum = *a as i128 + d as i128;
                if sum >= 0 {
                    u64::try_from(sum).ok().map(CacheValue::UInt)
                } else {
                    i64::try_from(sum).ok().map(CacheValue::Int)
                }
            }
            (current, delta) if current.is_numeric() => {
                let sum = current.as_f64()? + delta.as_f64();
                sum.is_finite().then_some(CacheValue::Float(sum))
            }
            _ => None,
        }
    }

    /// Whether every backend can persist the value; NaN and infinities have no
    /// stored form.
    pub fn is_storable(&self) -> bool {
        match self {
            CacheValue::Float(v) => v.is_finite(),
            _ => true,
        }
    }

        pub fn type_name(&self) -> &'static str {
        match self {
            CacheValue::Bool(_) => "bool",
            CacheValue::Int(_) => "int",
            CacheValue::UInt(_) => "uint",
            CacheValue::Float(_) => "float",
            CacheValue::String(_) => "string",
            CacheValue::Bytes(_) => "bytes",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widening_and_narrowing() {
        let value = CacheValue::from(300i32);

        assert_eq!(value.as_i64(), Some(300));
        assert_eq!(value.as_int::<i16>(), Some(300));
        assert_eq!(value.as_int::<i8>(), None);
        assert_eq!(value.as_uint::<u16>(), Some(300));
    }

    #[test]
    fn test_negative_int_does_not_fit_unsigned() {
        let value = CacheValue::Int(-1);
        assert_eq!(value.as_u64(), None);
        assert_eq!(value.as_uint::<u8>(), None);
    }

    #[test]
    fn test_large_uint_only_fits_unsigned() {
        let value = CacheValue::UInt(u64::MAX);
        assert_eq!(value.as_u64(), Some(u64::MAX));
        assert_eq!(value.as_i64(), None);
    }

    #[test]
    fn test_float_to_integer_requires_whole_number() {
        assert_eq!(CacheValue::Float(12.0).as_i64(), Some(12));
        assert_eq!(CacheValue::Float(12.5).as_i64(), None);
        assert_eq!(CacheValue::Float(f64::NAN).as_i64(), None);
        assert_eq!(CacheValue::Float(-3.0).as_u64(), None);
        assert_eq!(CacheValue::Float(1e30).as_i64(), None);
    }

    #[test]
    fn test_integer_to_float() {
        assert_eq!(CacheValue::Int(-7).as_f64(), Some(-7.0));
        assert_eq!(CacheValue::UInt(7).as_f32(), Some(7.0));
    }

    #[test]
    fn test_f32_overflow_fails() {
        assert_eq!(CacheValue::Float(1e300).as_f32(), None);
        assert_eq!(CacheValue::Float(1.5).as_f32(), Some(1.5));
    }

    #[test]
    fn test_string_is_not_numeric() {
        let value = CacheValue::from("42");
        assert_eq!(value.as_i64(), None);
        assert_eq!(value.as_f64(), None);
        assert_eq!(value.as_str(), Some("42"));
        assert_eq!(value.as_bytes(), Some("42".as_bytes()));
    }

    #[test]
    fn test_numeric_is_not_string_or_bool() {
        let value = CacheValue::Int(1);
        assert_eq!(value.as_str(), None);
        assert_eq!(value.as_bool(), None);
        assert_eq!(value.as_bytes(), None);
    }

    #[test]
    fn test_checked_add_keeps_integer() {
        let value = CacheValue::Int(10);
        assert_eq!(value.checked_add(Number::Int(5)), Some(CacheValue::Int(15)));
        assert_eq!(
            CacheValue::Int(i64::MAX).checked_add(Number::Int(1)),
            None
        );
    }

    #[test]
    fn test_checked_add_uint_below_zero_becomes_int() {
        let value = CacheValue::UInt(2);
        assert_eq!(value.checked_add(Number::Int(-1)), Some(CacheValue::UInt(1)));
        assert_eq!(value.checked_add(Number::Int(-5)), Some(CacheValue::Int(-3)));
    }

    #[test]
    fn test_checked_add_float_roundtrip() {
        let value = CacheValue::Int(10);
        let up = value.checked_add(Number::Float(2.5)).unwrap();
        assert_eq!(up, CacheValue::Float(12.5));

        let down = up.checked_add(Number::Float(-2.5)).unwrap();
        assert_eq!(down.as_i64(), Some(10));
    }

    #[test]
    fn test_checked_add_rejects_float_overflow() {
        let value = CacheValue::Float(f64::MAX);
        assert_eq!(value.checked_add(Number::Float(f64::MAX)), None);
        assert_eq!(value.checked_add(Number::Float(f64::NAN)), None);
        assert_eq!(value.checked_add(Number::Float(-1.0)), Some(CacheValue::Float(f64::MAX - 1.0)));
    }

    #[test]
    fn test_non_finite_floats_are_not_storable() {
        assert!(!CacheValue::Float(f64::INFINITY).is_storable());
        assert!(!CacheValue::Float(f64::NAN).is_storable());
        assert!(CacheValue::Float(1.5).is_storable());
        assert!(CacheValue::from("inf").is_storable());
    }

    #[test]
    fn test_checked_add_rejects_non_numeric() {
        assert_eq!(CacheValue::from("x").checked_add(Number::Int(1)), None);
        assert_eq!(CacheValue::Bool(true).checked_add(Number::Int(1)), None);
    }

    #[test]
    fn test_serialized_form_keeps_type_tag() {
        let json = serde_json::to_string(&CacheValue::UInt(5)).unwrap();
        assert_eq!(json, r#"{"UInt":5}"#);

        let back: CacheValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CacheValue::UInt(5));
    }

    #[test]
    fn test_number_neg() {
        assert_eq!(Number::from(3).checked_neg(), Some(Number::Int(-3)));
        assert_eq!(Number::from(2.5).checked_neg(), Some(Number::Float(-2.5)));
        assert_eq!(Number::Int(i64::MIN).checked_neg(), None);
        assert!(Number::from(1.0f32).is_float());
    }

    #[test]
    fn test_number_from_wide_integers() {
        assert_eq!(Number::from(-7isize), Number::Int(-7));
        assert_eq!(Number::try_from(42u64).unwrap(), Number::Int(42));
        assert_eq!(Number::try_from(42usize).unwrap(), Number::Int(42));
        assert!(Number::try_from(u64::MAX).is_err());
    }
}
