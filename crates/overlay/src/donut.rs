use std::f64::consts::TAU;
use std::fmt::Write as _;

use foundation::feature::Properties;
use layers::labels::group_digits;
use layers::symbology::{Classification, Color};

/// A segment covering the whole ring is shortened by this fraction so its
/// start and end points differ and the arc commands still draw.
pub const FULL_RING_EPSILON: f64 = 0.00001;

/// Inner radius as a fraction of the outer radius.
pub const INNER_RADIUS_RATIO: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlyphError {
    /// Every category count is zero; shares are undefined.
    EmptyCluster,
    MissingCount { key: String },
    InvalidCount { key: String },
    CountMismatch { counts: usize, colors: usize },
    /// The category counts sum past `u64::MAX`.
    CountOverflow,
}

impl std::fmt::Display for GlyphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GlyphError::EmptyCluster => write!(f, "cluster has a total count of zero"),
            GlyphError::MissingCount { key } => write!(f, "cluster property {key} is missing"),
            GlyphError::InvalidCount { key } => {
                write!(f, "cluster property {key} is not a non-negative integer")
            }
            GlyphError::CountMismatch { counts, colors } => {
                write!(f, "{counts} category counts but {colors} colors")
            }
            GlyphError::CountOverflow => write!(f, "cluster counts overflow a 64-bit total"),
        }
    }
}

impl std::error::Error for GlyphError {}

/// Per-category counts of one cluster, in fixed category order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCounts {
    counts: Vec<u64>,
    total: u64,
}

impl CategoryCounts {
    /// Fails with [`GlyphError::CountOverflow`] when the total does not fit a `u64`.
    pub fn new(counts: impl Into<Vec<u64>>) -> Result<Self, GlyphError> {
        let counts = counts.into();
        let total = counts
            .iter()
            .try_fold(0u64, |acc, c| acc.checked_add(*c))
            .ok_or(GlyphError::CountOverflow)?;
        Ok(Self { counts, total })
    }

    pub fn from_properties(props: &Properties, keys: &[&str]) -> Result<Self, GlyphError> {
        let counts = keys
            .iter()
            .map(|key| match props.get(key) {
                None => Err(GlyphError::MissingCount {
                    key: key.to_string(),
                }),
                Some(_) => props.count(key).ok_or_else(|| GlyphError::InvalidCount {
                    key: key.to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(counts)
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Running sums before each category; `offsets[i] + counts[i] == offsets[i + 1]`.
    /// Every partial sum is bounded by the total checked in [`CategoryCounts::new`].
    pub fn offsets(&self) -> Vec<u64> {
        let mut acc = 0;
        self.counts
            .iter()
            .map(|c| {
                let offset = acc;
                acc += c;
                offset
            })
            .collect()
    }
}

/// Glyph scale chosen from the cluster total.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SizeTier {
    pub radius: f64,
    pub font_size: f64,
}

impl SizeTier {
    pub fn for_total(total: u64) -> Self {
        let (radius, font_size) = match total {
            1000.. => (50.0, 22.0),
            100.. => (32.0, 20.0),
            10.. => (24.0, 18.0),
            _ => (18.0, 16.0),
        };
        Self { radius, font_size }
    }
}

/// Annular sector spanning `[start, end)` of the full turn, measured
/// clockwise from 12 o'clock.
#[derive(Debug, Clone, PartialEq)]
pub struct RingSegment {
    pub color: Color,
    pub start: f64,
    pub end: f64,
    pub outer_radius: f64,
    pub inner_radius: f64,
}

impl RingSegment {
    pub fn span(&self) -> f64 {
        self.end - self.start
    }

    /// SVG path in glyph coordinates, centered at `(outer_radius, outer_radius)`.
    pub fn path_data(&self) -> String {
        let start = self.start;
        let mut end = self.end;
        if end - start >= 1.0 {
            end = start + 1.0 - FULL_RING_EPSILON;
        }

        let (r, r0) = (self.outer_radius, self.inner_radius);
        let a0 = TAU * (start - 0.25);
        let a1 = TAU * (end - 0.25);
        let (x0, y0) = (a0.cos(), a0.sin());
        let (x1, y1) = (a1.cos(), a1.sin());
        let large_arc = u8::from(end - start > 0.5);

        let mut d = String::new();
        let _ = write!(d, "M {} {} ", r + r0 * x0, r + r0 * y0);
        let _ = write!(d, "L {} {} ", r + r * x0, r + r * y0);
        let _ = write!(d, "A {r} {r} 0 {large_arc} 1 {} {} ", r + r * x1, r + r * y1);
        let _ = write!(d, "L {} {} ", r + r0 * x1, r + r0 * y1);
        let _ = write!(d, "A {r0} {r0} 0 {large_arc} 0 {} {}", r + r0 * x0, r + r0 * y0);
        d
    }
}

/// Donut chart summarizing the category mix of one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterGlyph {
    pub total: u64,
    pub tier: SizeTier,
    pub inner_radius: f64,
    pub segments: Vec<RingSegment>,
    pub label: String,
}

impl ClusterGlyph {
    pub fn new(counts: &CategoryCounts, colors: &[Color]) -> Result<Self, GlyphError> {
        if counts.counts().len() != colors.len() {
            return Err(GlyphError::CountMismatch {
                counts: counts.counts().len(),
                colors: colors.len(),
            });
        }
        let total = counts.total();
        if total == 0 {
            return Err(GlyphError::EmptyCluster);
        }

        let tier = SizeTier::for_total(total);
        let inner_radius = (tier.radius * INNER_RADIUS_RATIO).round();
        let segments = counts
            .counts()
            .iter()
            .zip(counts.offsets())
            .zip(colors)
            .filter(|((count, _), _)| **count > 0)
            .map(|((count, offset), color)| RingSegment {
                color: *color,
                start: offset as f64 / total as f64,
                end: (offset + count) as f64 / total as f64,
                outer_radius: tier.radius,
                inner_radius,
            })
            .collect();

        Ok(Self {
            total,
            tier,
            inner_radius,
            segments,
            label: group_digits(total),
        })
    }

    pub fn from_properties(
        props: &Properties,
        classification: &Classification,
    ) -> Result<Self, GlyphError> {
        let counts = CategoryCounts::from_properties(props, &classification.keys())?;
        Self::new(&counts, &classification.colors())
    }

    pub fn width(&self) -> f64 {
        self.tier.radius * 2.0
    }

    pub fn to_svg(&self) -> String {
        let r = self.tier.radius;
        let w = self.width();
        let mut out = String::new();
        let _ = write!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{w}" viewBox="0 0 {w} {w}" text-anchor="middle" style="font: {}px sans-serif; display: block">"#,
            self.tier.font_size
        );
        for segment in &self.segments {
            let _ = write!(
                out,
                r#"<path d="{}" fill="{}"/>"#,
                segment.path_data(),
                segment.color
            );
        }
        let _ = write!(
            out,
            r#"<circle cx="{r}" cy="{r}" r="{}" fill="white"/>"#,
            self.inner_radius
        );
        let _ = write!(
            out,
            r#"<text dominant-baseline="central" transform="translate({r}, {r})">{}</text>"#,
            self.label
        );
        out.push_str("</svg>");
        out
    }
}
