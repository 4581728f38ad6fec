use foundation::feature::{Properties, PropertyValue};

use crate::expression::Expression;

/// Inserts `,` between groups of three digits: `1500` -> `1,500`.
pub fn group_digits(n: u64) -> String {
    group_digit_str(&n.to_string())
}

fn group_digit_str(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Fixed-point rendering with digit grouping, rounding half away from zero.
///
/// Trailing fraction zeros are trimmed down to `min_fraction_digits`.
pub fn format_number(value: f64, min_fraction_digits: u8, max_fraction_digits: u8) -> String {
    let max = max_fraction_digits.max(min_fraction_digits);
    let factor = 10u64.pow(u32::from(max.min(15)));
    let scaled = (value.abs() * factor as f64).round();
    if !scaled.is_finite() || scaled >= 9.0e15 {
        return format!("{:.*}", usize::from(max), value);
    }

    let scaled = scaled as u64;
    let int_part = scaled / factor;
    let mut frac = format!("{:0width$}", scaled % factor, width = usize::from(max));
    while frac.len() > usize::from(min_fraction_digits) && frac.ends_with('0') {
        frac.pop();
    }
    if max == 0 {
        frac.clear();
    }

    let mut out = String::new();
    if value < 0.0 && scaled != 0 {
        out.push('-');
    }
    out.push_str(&group_digits(int_part));
    if !frac.is_empty() {
        out.push('.');
        out.push_str(&frac);
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventLabel {
    pub text: String,
    pub color: String,
}

/// Text label drawn on top of an individual (unclustered) event.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRule {
    pub property: String,
    pub fraction_digits: u8,
    /// Values below this get `text_on_light`, the rest `text_on_dark`.
    pub contrast_threshold: f64,
    pub text_on_light: String,
    pub text_on_dark: String,
    pub text_size: f64,
    pub fonts: Vec<String>,
}

impl Default for LabelRule {
    fn default() -> Self {
        Self {
            property: "mag".to_string(),
            fraction_digits: 1,
            contrast_threshold: 3.0,
            text_on_light: "black".to_string(),
            text_on_dark: "white".to_string(),
            text_size: 10.0,
            fonts: vec![
                "Open Sans Semibold".to_string(),
                "Arial Unicode MS Bold".to_string(),
            ],
        }
    }
}

impl LabelRule {
    pub fn text_field(&self) -> Expression {
        Expression::NumberFormat {
            input: Box::new(Expression::get(self.property.as_str())),
            min_fraction_digits: self.fraction_digits,
            max_fraction_digits: self.fraction_digits,
        }
    }

    pub fn text_color(&self) -> Expression {
        Expression::case(
            vec![(
                Expression::get(self.property.as_str()).less_than(self.contrast_threshold),
                self.text_on_light.as_str().into(),
            )],
            self.text_on_dark.as_str(),
        )
    }

    /// Evaluates the label locally; `None` when the property is not numeric.
    pub fn label_for(&self, props: &Properties) -> Option<EventLabel> {
        let PropertyValue::String(text) = self.text_field().evaluate(props).ok()? else {
            return None;
        };
        let PropertyValue::String(color) = self.text_color().evaluate(props).ok()? else {
            return None;
        };
        Some(EventLabel { text, color })
    }
}
