//! Fear & Greed gauge image for the dashboard.

use std::fmt::Write as _;
use std::path::PathBuf;

use market_core::{FearGreedCategory, GaugeReading};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GaugeError {
    #[error("failed to write gauge {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render gauge: {0}")]
    Render(#[from] std::fmt::Error),
}

pub trait GaugeRenderer: Send + Sync {
    fn render(&self, reading: &GaugeReading) -> Result<(), GaugeError>;
}

/// Discards readings.
pub struct NoopGaugeRenderer;

impl GaugeRenderer for NoopGaugeRenderer {
    fn render(&self, _reading: &GaugeReading) -> Result<(), GaugeError> {
        Ok(())
    }
}

const SEGMENT_LABELS: [&str; 5] = ["EXTREME FEAR", "FEAR", "NEUTRAL", "GREED", "EXTREME GREED"];
const CX: f64 = 200.0;
const CY: f64 = 210.0;
const R_OUTER: f64 = 180.0;
const R_INNER: f64 = 110.0;

/// Semicircle gauge written as SVG.
pub struct SvgGaugeRenderer {
    path: PathBuf,
}

impl SvgGaugeRenderer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl GaugeRenderer for SvgGaugeRenderer {
    fn render(&self, reading: &GaugeReading) -> Result<(), GaugeError> {
        let svg = render_svg(reading)?;
        let write_err = |source| GaugeError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(&self.path, svg).map_err(write_err)?;
        tracing::info!("Fear & Greed gauge written to {}", self.path.display());
        Ok(())
    }
}

/// Segment holding `value`; 100 belongs to the last one.
pub fn active_segment(value: f64) -> usize {
    let n = SEGMENT_LABELS.len();
    ((value.clamp(0.0, 100.0) / 100.0 * n as f64).floor() as usize).min(n - 1)
}

fn polar(radius: f64, degrees: f64) -> (f64, f64) {
    let rad = degrees.to_radians();
    (CX + radius * rad.cos(), CY - radius * rad.sin())
}

fn category_colors(category: FearGreedCategory) -> (&'static str, &'static str) {
    match category {
        FearGreedCategory::ExtremeFear | FearGreedCategory::Fear => ("#f6a35c", "#cc6600"),
        FearGreedCategory::Neutral => ("#bfbfbf", "#666666"),
        FearGreedCategory::Greed | FearGreedCategory::ExtremeGreed => ("#66cc99", "#006633"),
        FearGreedCategory::Unknown => ("#eeeeee", "#999999"),
    }
}

pub fn render_svg(reading: &GaugeReading) -> Result<String, std::fmt::Error> {
    let mut svg = String::new();
    let height = CY + 60.0 + 44.0 * reading.points.len() as f64;
    writeln!(
        svg,
        r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 400 {h:.0}" width="400" height="{h:.0}" font-family="sans-serif">"##,
        h = height
    )?;

    let active = active_segment(reading.center_value);
    let span = 180.0 / SEGMENT_LABELS.len() as f64;
    for (i, label) in SEGMENT_LABELS.iter().enumerate() {
        let a1 = 180.0 - i as f64 * span;
        let a2 = a1 - span;
        let (ox1, oy1) = polar(R_OUTER, a1);
        let (ox2, oy2) = polar(R_OUTER, a2);
        let (ix2, iy2) = polar(R_INNER, a2);
        let (ix1, iy1) = polar(R_INNER, a1);
        let (fill, stroke, width) = if i == active {
            ("#e0e0e0", "black", 1.5)
        } else {
            ("#f5f5f5", "#cccccc", 1.0)
        };
        writeln!(
            svg,
            r##"  <path d="M {ox1:.2} {oy1:.2} A {R_OUTER} {R_OUTER} 0 0 1 {ox2:.2} {oy2:.2} L {ix2:.2} {iy2:.2} A {R_INNER} {R_INNER} 0 0 0 {ix1:.2} {iy1:.2} Z" fill="{fill}" stroke="{stroke}" stroke-width="{width}"/>"##
        )?;
        let (lx, ly) = polar((R_OUTER + R_INNER) / 2.0, a1 - span / 2.0);
        writeln!(
            svg,
            r##"  <text x="{lx:.2}" y="{ly:.2}" font-size="9" text-anchor="middle" fill="#555">{label}</text>"##
        )?;
    }

    let needle = 180.0 - reading.center_value.clamp(0.0, 100.0) * 1.8;
    let (nx, ny) = polar(R_INNER - 10.0, needle);
    writeln!(
        svg,
        r##"  <line x1="{CX}" y1="{CY}" x2="{nx:.2}" y2="{ny:.2}" stroke="black" stroke-width="4" stroke-linecap="round"/>"##
    )?;
    writeln!(svg, r##"  <circle cx="{CX}" cy="{CY}" r="28" fill="white" stroke="black"/>"##)?;
    writeln!(
        svg,
        r##"  <text x="{CX}" y="{y:.0}" font-size="22" font-weight="bold" text-anchor="middle">{v:.0}</text>"##,
        y = CY + 8.0,
        v = reading.center_value
    )?;

    for (i, point) in reading.points.iter().enumerate() {
        let y = CY + 50.0 + 44.0 * i as f64;
        let (fill, stroke) = category_colors(point.category);
        let value = point.value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string());
        writeln!(
            svg,
            r##"  <text x="30" y="{ty:.0}" font-size="13" fill="#555">{label}</text>"##,
            ty = y + 4.0,
            label = point.label
        )?;
        writeln!(
            svg,
            r##"  <text x="30" y="{ty:.0}" font-size="15" font-weight="bold">{category}</text>"##,
            ty = y + 22.0,
            category = point.category.label()
        )?;
        writeln!(
            svg,
            r##"  <circle cx="350" cy="{cy:.0}" r="17" fill="{fill}" stroke="{stroke}" stroke-width="2"/>"##,
            cy = y + 10.0
        )?;
        writeln!(
            svg,
            r##"  <text x="350" y="{ty:.0}" font-size="13" font-weight="bold" text-anchor="middle">{value}</text>"##,
            ty = y + 15.0
        )?;
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}
