//! The single HTML page.

use crate::chart;
use crate::pipeline::{NoticeLevel, Outcome, Report};
use askama_escape::{escape, Html};
use emotireflect_core::StressLevel;
use std::fmt::Write as _;

const TITLE: &str = "💎 EmotiReflect: AI Mirror for Emotional Awareness";
const INTRO: &str = "Upload a photo and let AI gently reflect your emotional state.";

const STYLE: &str = "\
body{font-family:system-ui,sans-serif;max-width:720px;margin:2rem auto;padding:0 1rem;color:#222}\
h1{text-align:center;color:#D4AF37}\
form{margin:1.5rem 0}\
figure{margin:1rem 0;text-align:center}\
figure img{max-width:100%;border-radius:8px}\
figcaption{color:#666;font-size:.9rem}\
.notice{padding:.75rem 1rem;border-radius:6px;margin:1rem 0}\
.notice.warning{background:#fff6d6;border:1px solid #e8c450}\
.notice.error{background:#fde2e2;border:1px solid #e06060}\
.stress{padding:.75rem 1rem;border-radius:6px;margin:1rem 0;font-weight:600}\
.stress.high{background:#fde2e2}.stress.moderate{background:#fff6d6}\
.stress.low{background:#e1f5e4}.stress.unknown{background:#eee}\
table{border-collapse:collapse;width:100%}\
td,th{border-bottom:1px solid #ddd;padding:.4rem;text-align:left}";

/// Render the page for `report`.
pub fn render(report: &Report) -> String {
    let mut html = String::with_capacity(8 * 1024);
    let _ = write!(
        html,
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>EmotiReflect</title><style>{STYLE}</style></head><body>\
         <h1>{TITLE}</h1><p>{INTRO}</p>\
         <form method=\"post\" action=\"/\" enctype=\"multipart/form-data\">\
         <label for=\"file\">Upload a face photo</label> \
         <input id=\"file\" type=\"file\" name=\"file\" accept=\".jpg,.jpeg,.png,image/jpeg,image/png\" required> \
         <button type=\"submit\">Reflect</button></form>"
    );

    // Base64 data URI built by the pipeline; no characters need escaping.
    if let Some(preview) = &report.preview {
        let _ = write!(
            html,
            "<figure><img src=\"{preview}\" alt=\"Uploaded Image\"><figcaption>Uploaded Image</figcaption></figure>"
        );
    }

    for notice in &report.notices {
        let class = match notice.level {
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        let _ = write!(
            html,
            "<div class=\"notice {class}\" role=\"alert\">{}</div>",
            escape(&notice.message, Html)
        );
    }

    if let Outcome::Detected(r) = &report.outcome {
        let _ = write!(
            html,
            "<h2>Detected Emotion: <b>{}</b></h2>{}",
            escape(&r.display_label, Html),
            chart::render(&r.emotions)
        );
        if let Some(stress) = r.stress {
            let _ = write!(
                html,
                "<div class=\"stress {}\">Stress level: {}</div>",
                stress_class(stress),
                stress
            );
        }
        let _ = write!(html, "<h3 class=\"message\">{}</h3>", escape(&r.message, Html));
    }

    if let Some(rows) = &report.recent {
        html.push_str("<section><h3>Recent moods</h3>");
        if rows.is_empty() {
            html.push_str("<p>No moods logged yet.</p>");
        } else {
            html.push_str("<table><thead><tr><th>Time</th><th>Emotion</th></tr></thead><tbody>");
            for row in rows {
                let _ = write!(
                    html,
                    "<tr><td>{}</td><td>{}</td></tr>",
                    escape(&row.timestamp, Html),
                    escape(&row.emotion, Html)
                );
            }
            html.push_str("</tbody></table>");
        }
        html.push_str("</section>");
    }

    html.push_str("</body></html>");
    html
}

fn stress_class(level: StressLevel) -> &'static str {
    match level {
        StressLevel::High => "high",
        StressLevel::Moderate => "moderate",
        StressLevel::Low => "low",
        StressLevel::Unknown => "unknown",
    }
}
