use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

/// Stable feature identity as supplied by the map engine.
///
/// GeoJSON allows either a number or a string; both are kept verbatim so a
/// numeric `7` and a textual `"7"` stay distinct keys. Integral numbers are
/// normalized, so `7` and `7.0` are the same id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum FeatureId {
    /// Negative integers only; non-negative ones are `Unsigned`.
    Signed(i64),
    Unsigned(u64),
    Fractional(FractionalId),
    Text(String),
}

/// A non-integral numeric id, ordered by `f64::total_cmp`.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(transparent)]
pub struct FractionalId(f64);

impl FractionalId {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for FractionalId {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FractionalId {}

impl Hash for FractionalId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for FractionalId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FractionalId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl FeatureId {
    /// Numeric id from any finite JSON number. `None` for NaN and infinities.
    pub fn from_f64(n: f64) -> Option<Self> {
        if !n.is_finite() {
            return None;
        }
        if n.fract() == 0.0 {
            if (0.0..18_446_744_073_709_551_616.0).contains(&n) {
                return Some(FeatureId::Unsigned(n as u64));
            }
            if (-9_223_372_036_854_775_808.0..0.0).contains(&n) {
                return Some(FeatureId::Signed(n as i64));
            }
        }
        Some(FeatureId::Fractional(FractionalId(n)))
    }
}

impl From<u64> for FeatureId {
    fn from(n: u64) -> Self {
        FeatureId::Unsigned(n)
    }
}

impl From<i64> for FeatureId {
    fn from(n: i64) -> Self {
        match u64::try_from(n) {
            Ok(n) => FeatureId::Unsigned(n),
            Err(_) => FeatureId::Signed(n),
        }
    }
}

impl From<&str> for FeatureId {
    fn from(s: &str) -> Self {
        FeatureId::Text(s.to_string())
    }
}

impl From<String> for FeatureId {
    fn from(s: String) -> Self {
        FeatureId::Text(s)
    }
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureId::Signed(n) => write!(f, "{n}"),
            FeatureId::Unsigned(n) => write!(f, "{n}"),
            FeatureId::Fractional(n) => write!(f, "{}", n.0),
            FeatureId::Text(s) => write!(f, "{s}"),
        }
    }
}

struct FeatureIdVisitor;

impl Visitor<'_> for FeatureIdVisitor {
    type Value = FeatureId;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a number or a string")
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> Result<FeatureId, E> {
        Ok(FeatureId::from(n))
    }

    fn visit_i64<E: de::Error>(self, n: i64) -> Result<FeatureId, E> {
        Ok(FeatureId::from(n))
    }

    fn visit_f64<E: de::Error>(self, n: f64) -> Result<FeatureId, E> {
        FeatureId::from_f64(n).ok_or_else(|| E::custom(format!("feature id {n} is not finite")))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<FeatureId, E> {
        Ok(FeatureId::from(s))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<FeatureId, E> {
        Ok(FeatureId::Text(s))
    }
}

impl<'de> Deserialize<'de> for FeatureId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FeatureIdVisitor)
    }
}
