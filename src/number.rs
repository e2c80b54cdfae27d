// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::cmp::Ordering;
use core::fmt::{Debug, Display, Formatter};
use core::str::FromStr;

use anyhow::{anyhow, Result};
use serde::ser::Serializer;
use serde::Serialize;

/// Numeric values as they appear in data and in numeric constraint limits.
///
/// Integers are kept in integer representations so that equality and
/// divisibility are exact; floats use the f64 total order so that `Number`
/// can serve as a `BTreeMap` key inside [`crate::Value`].
#[derive(Clone)]
pub enum Number {
    UInt(u64),
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Number::UInt(u) => Some(*u),
            Number::Int(i) if *i >= 0 => Some(*i as u64),
            Number::Float(f) if f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64 => {
                Some(*f as u64)
            }
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::UInt(u) => i64::try_from(*u).ok(),
            Number::Int(i) => Some(*i),
            Number::Float(f)
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 =>
            {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Number::UInt(u) => Some(*u as f64),
            Number::Int(i) => Some(*i as f64),
            Number::Float(f) => Some(*f),
        }
    }

    pub fn is_integer(&self) -> bool {
        match self {
            Number::UInt(_) | Number::Int(_) => true,
            Number::Float(f) => f.fract() == 0.0 && f.is_finite(),
        }
    }

    /// Whether dividing by `divisor` leaves no remainder.
    pub fn is_multiple_of(&self, divisor: u64) -> bool {
        if divisor == 0 {
            return false;
        }
        match self {
            Number::UInt(u) => u % divisor == 0,
            Number::Int(i) => match i64::try_from(divisor) {
                Ok(d) => i.rem_euclid(d) == 0,
                Err(_) => *i == 0,
            },
            Number::Float(f) => f % (divisor as f64) == 0.0,
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        use Number::*;
        match (self, other) {
            (UInt(a), UInt(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),

            (UInt(a), Int(b)) => {
                if *b < 0 {
                    Ordering::Greater
                } else {
                    a.cmp(&(*b as u64))
                }
            }
            (Int(a), UInt(b)) => {
                if *a < 0 {
                    Ordering::Less
                } else {
                    (*a as u64).cmp(b)
                }
            }

            // Mixed integer/float comparisons go through the f64 total
            // order. Integers beyond 2^53 lose precision here, which is
            // acceptable for constraint limits over JSON data.
            (a, Float(b)) => a.as_f64().unwrap_or(f64::NAN).total_cmp(b),
            (Float(a), b) => a.total_cmp(&b.as_f64().unwrap_or(f64::NAN)),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Number::UInt(u) => write!(f, "{u}"),
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(v) => write!(f, "{v}"),
        }
    }
}

impl Debug for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Serialize for Number {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Number::UInt(u) => serializer.serialize_u64(*u),
            Number::Int(i) => serializer.serialize_i64(*i),
            Number::Float(v) => serializer.serialize_f64(*v),
        }
    }
}

impl FromStr for Number {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(u) = s.parse::<u64>() {
            return Ok(Number::UInt(u));
        }
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Number::Int(i));
        }
        if let Ok(f) = s.parse::<f64>() {
            return Ok(Number::Float(f));
        }
        Err(anyhow!("not a number: {s}"))
    }
}

impl From<u64> for Number {
    fn from(n: u64) -> Self {
        Number::UInt(n)
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        if n >= 0 {
            Number::UInt(n as u64)
        } else {
            Number::Int(n)
        }
    }
}

impl From<i32> for Number {
    fn from(n: i32) -> Self {
        Number::from(n as i64)
    }
}

impl From<usize> for Number {
    fn from(n: usize) -> Self {
        Number::UInt(n as u64)
    }
}

impl From<f64> for Number {
    fn from(n: f64) -> Self {
        Number::Float(n)
    }
}
