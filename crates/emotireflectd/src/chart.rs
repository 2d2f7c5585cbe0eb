//! Horizontal SVG bar chart of emotion confidences.

use askama_escape::{escape, Html};
use emotireflect_core::{display_label, EmotionScores};
use std::fmt::Write as _;

const BAR_COLOR: &str = "#7d5fff";
const WIDTH: f32 = 520.0;
const LABEL_WIDTH: f32 = 90.0;
const VALUE_WIDTH: f32 = 50.0;
const ROW_HEIGHT: f32 = 30.0;
const BAR_HEIGHT: f32 = 20.0;
const AXIS_HEIGHT: f32 = 40.0;

/// One bar per emotion, in score order as produced by the detector.
/// Confidences are drawn on a fixed 0..1 axis.
pub fn render(scores: &EmotionScores) -> String {
    let plot_width = WIDTH - LABEL_WIDTH - VALUE_WIDTH;
    let height = scores.len() as f32 * ROW_HEIGHT + AXIS_HEIGHT;
    let mut svg = String::new();

    let _ = write!(
        svg,
        r#"<svg class="chart" xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{height}" viewBox="0 0 {WIDTH} {height}" role="img" aria-label="Emotion confidence">"#
    );

    for (row, (label, confidence)) in scores.iter().enumerate() {
        let y = row as f32 * ROW_HEIGHT;
        let bar = confidence.clamp(0.0, 1.0) * plot_width;
        let name = display_label(label);
        let _ = write!(
            svg,
            r#"<text x="{lx}" y="{ty}" text-anchor="end" dominant-baseline="middle">{name}</text><rect x="{LABEL_WIDTH}" y="{by}" width="{bar:.1}" height="{BAR_HEIGHT}" fill="{BAR_COLOR}"><title>{name}: {confidence:.2}</title></rect><text x="{vx:.1}" y="{ty}" dominant-baseline="middle">{confidence:.2}</text>"#,
            lx = LABEL_WIDTH - 8.0,
            ty = y + ROW_HEIGHT / 2.0,
            by = y + (ROW_HEIGHT - BAR_HEIGHT) / 2.0,
            vx = LABEL_WIDTH + bar + 6.0,
            name = escape(&name, Html),
        );
    }

    let axis_y = scores.len() as f32 * ROW_HEIGHT + 4.0;
    let _ = write!(
        svg,
        r##"<line x1="{LABEL_WIDTH}" y1="{axis_y}" x2="{x2}" y2="{axis_y}" stroke="#999"/>"##,
        x2 = LABEL_WIDTH + plot_width,
    );
    for tick in [0.0_f32, 0.25, 0.5, 0.75, 1.0] {
        let _ = write!(
            svg,
            r#"<text x="{x:.1}" y="{y}" text-anchor="middle" font-size="11">{tick}</text>"#,
            x = LABEL_WIDTH + tick * plot_width,
            y = axis_y + 14.0,
        );
    }
    let _ = write!(
        svg,
        r#"<text x="{x:.1}" y="{y}" text-anchor="middle">Confidence</text></svg>"#,
        x = LABEL_WIDTH + plot_width / 2.0,
        y = axis_y + 32.0,
    );
    svg
}
