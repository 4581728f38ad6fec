use std::collections::BTreeMap;

use foundation::feature::Properties;

use crate::expression::Expression;

/// Opaque sRGB color, rendered as `#rrggbb`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Color(pub [u8; 3]);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    InvalidColor(String),
    ThresholdsNotIncreasing,
    ColorCount { expected: usize, found: usize },
}

impl std::fmt::Display for ClassificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassificationError::InvalidColor(s) => write!(f, "invalid color (expected #rrggbb): {s}"),
            ClassificationError::ThresholdsNotIncreasing => {
                write!(f, "class thresholds must be strictly increasing")
            }
            ClassificationError::ColorCount { expected, found } => {
                write!(f, "expected {expected} colors, found {found}")
            }
        }
    }
}

impl std::error::Error for ClassificationError {}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color([r, g, b])
    }

    pub fn parse(s: &str) -> Result<Self, ClassificationError> {
        let invalid = || ClassificationError::InvalidColor(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(invalid)?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(Color([channel(0)?, channel(2)?, channel(4)?]))
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

/// Earthquake palette, light to dark, one color per magnitude class.
pub const EARTHQUAKE_COLORS: [Color; 5] = [
    Color::rgb(0xfe, 0xd9, 0x76),
    Color::rgb(0xfe, 0xb2, 0x4c),
    Color::rgb(0xfd, 0x8d, 0x3c),
    Color::rgb(0xfc, 0x4e, 0x2a),
    Color::rgb(0xe3, 0x1a, 0x1c),
];

pub const EARTHQUAKE_THRESHOLDS: [f64; 4] = [2.0, 3.0, 4.0, 5.0];

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    /// Name of the aggregated per-cluster count property.
    pub key: String,
    pub filter: Expression,
    pub color: Color,
}

/// Ordered table of `(predicate, color)` pairs over one numeric property.
///
/// Categories partition the number line: the first is `< t0`, the last is
/// `>= tN`, the rest are half-open `[t(i-1), t(i))`.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    property: String,
    categories: Vec<Category>,
}

impl Classification {
    pub fn from_thresholds(
        property: &str,
        key_prefix: &str,
        thresholds: &[f64],
        colors: &[Color],
    ) -> Result<Self, ClassificationError> {
        if thresholds.windows(2).any(|w| w[0] >= w[1]) || thresholds.iter().any(|t| !t.is_finite()) {
            return Err(ClassificationError::ThresholdsNotIncreasing);
        }
        if colors.len() != thresholds.len() + 1 {
            return Err(ClassificationError::ColorCount {
                expected: thresholds.len() + 1,
                found: colors.len(),
            });
        }
        Ok(Self::build(property, key_prefix, thresholds, colors))
    }

    /// Five magnitude classes keyed `mag1..mag5`.
    pub fn earthquakes() -> Self {
        Self::build("mag", "mag", &EARTHQUAKE_THRESHOLDS, &EARTHQUAKE_COLORS)
    }

    fn build(property: &str, key_prefix: &str, thresholds: &[f64], colors: &[Color]) -> Self {
        let value = || Expression::get(property);
        let categories = colors
            .iter()
            .enumerate()
            .map(|(i, color)| {
                let lower = i.checked_sub(1).map(|j| thresholds[j]);
                let upper = thresholds.get(i).copied();
                let filter = match (lower, upper) {
                    (None, Some(hi)) => value().less_than(hi),
                    (Some(lo), None) => value().at_least(lo),
                    (Some(lo), Some(hi)) => {
                        Expression::all(vec![value().at_least(lo), value().less_than(hi)])
                    }
                    (None, None) => Expression::from(true),
                };
                Category {
                    key: format!("{key_prefix}{}", i + 1),
                    filter,
                    color: *color,
                }
            })
            .collect();
        Self {
            property: property.to_string(),
            categories,
        }
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.key.as_str()).collect()
    }

    pub fn colors(&self) -> Vec<Color> {
        self.categories.iter().map(|c| c.color).collect()
    }

    pub fn category_for(&self, props: &Properties) -> Option<usize> {
        self.categories.iter().position(|c| c.filter.matches(props))
    }

    pub fn category_for_value(&self, value: f64) -> Option<usize> {
        self.category_for(&Properties::new().with(self.property.as_str(), value))
    }

    /// Per-category counters for the clustered source: `key -> ["+", ["case", filter, 1, 0]]`.
    pub fn cluster_properties(&self) -> BTreeMap<String, Expression> {
        self.categories
            .iter()
            .map(|c| {
                let one_if_member =
                    Expression::case(vec![(c.filter.clone(), Expression::from(1.0))], 0.0);
                (c.key.clone(), Expression::Add(vec![one_if_member]))
            })
            .collect()
    }

    /// Paint expression picking the class color; the last class is the fallback.
    pub fn color_expression(&self) -> Expression {
        let Some((last, rest)) = self.categories.split_last() else {
            return Expression::from("#000000");
        };
        let branches = rest
            .iter()
            .map(|c| (c.filter.clone(), Expression::from(c.color.to_string().as_str())))
            .collect();
        Expression::case(branches, last.color.to_string().as_str())
    }
}
