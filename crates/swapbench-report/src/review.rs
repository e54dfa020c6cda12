//! Static HTML review page built from the test log.
//!
//! One row per source/target pair, one column per provider. When a
//! combination was attempted more than once, the last logged row wins.

use crate::sink::LogRow;
use std::collections::BTreeMap;
use std::fmt::Write;

const STYLE: &str = "body{font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;margin:2em;background:#fafafa}\
table{border-collapse:collapse}td,th{border:1px solid #ddd;padding:8px;vertical-align:top;text-align:center}\
img{max-width:240px;display:block;margin:0 auto 4px}.ok{color:#2e7d32}.err{color:#c62828;max-width:240px;font-size:0.85em}\
.meta{color:#666;font-size:0.8em}";

/// Render the review page. `result_image` values are used as image
/// sources as-is, so the page belongs next to the saved results.
pub fn render_review(rows: &[LogRow]) -> String {
    let mut providers: Vec<&str> = Vec::new();
    let mut grid: BTreeMap<(&str, &str), BTreeMap<&str, &LogRow>> = BTreeMap::new();
    for row in rows {
        if !providers.contains(&row.provider.as_str()) {
            providers.push(&row.provider);
        }
        grid.entry((row.source_id.as_str(), row.target_id.as_str()))
            .or_default()
            .insert(row.provider.as_str(), row);
    }

    let successes = grid
        .values()
        .flat_map(|cells| cells.values())
        .filter(|r| r.success)
        .count();
    let cells: usize = grid.values().map(|c| c.len()).sum();

    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <title>Face Swap Results Review</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <h1>Face Swap Results Review</h1>\n\
         <p>{} combinations, {} provider results ({} successful), {} logged attempts</p>\n",
        grid.len(),
        cells,
        successes,
        rows.len()
    );

    html.push_str("<table>\n<tr><th>source</th><th>target</th>");
    for provider in &providers {
        let _ = write!(html, "<th>{}</th>", escape(provider));
    }
    html.push_str("</tr>\n");

    for ((source, target), by_provider) in &grid {
        let _ = write!(html, "<tr><td>{}</td><td>{}</td>", escape(source), escape(target));
        for provider in &providers {
            html.push_str("<td>");
            if let Some(row) = by_provider.get(provider) {
                render_cell(&mut html, row);
            }
            html.push_str("</td>");
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n</body>\n</html>\n");
    html
}

fn render_cell(html: &mut String, row: &LogRow) {
    if row.success {
        if let Some(src) = &row.result_image {
            let _ = write!(html, "<img src=\"{}\" alt=\"result\">", escape(src));
        }
        let _ = write!(html, "<div class=\"ok\">ok</div>");
    } else {
        let _ = write!(
            html,
            "<div class=\"err\">{}: {}</div>",
            escape(row.error_kind.as_deref().unwrap_or("error")),
            escape(row.error_message.as_deref().unwrap_or(""))
        );
    }

    let mut meta = format!("{:.1} s wall", row.wall_clock_ms as f64 / 1000.0);
    if let Some(secs) = row.inference_seconds {
        let _ = write!(meta, ", {secs:.1} s inference");
    }
    if row.attempt > 1 {
        let _ = write!(meta, ", attempt {}", row.attempt);
    }
    let _ = write!(html, "<div class=\"meta\">{meta}</div>");
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(source: &str, provider: &str, attempt: u32, success: bool) -> LogRow {
        LogRow {
            timestamp: "2025-07-01T10:00:00.000Z".into(),
            run_id: "run".into(),
            source_id: source.into(),
            target_id: "card_01".into(),
            template_id: None,
            provider: provider.into(),
            attempt,
            source_face_index: 0,
            target_face_index: 0,
            restoration_model: None,
            detection_order: None,
            model_type: None,
            success,
            error_kind: (!success).then(|| "timeout".into()),
            error_message: (!success).then(|| "request timed out after 120s".into()),
            http_status: None,
            wall_clock_ms: 41_500,
            inference_seconds: success.then_some(40.0),
            cost_units: None,
            remaining_credits: None,
            request_id: None,
            result_image: success.then(|| format!("{source}_to_card_01_{provider}_result.jpg")),
        }
    }

    #[test]
    fn test_latest_attempt_wins() {
        let rows = [
            row("face_a", "v2", 1, true),
            row("face_a", "v4.3", 1, false),
            row("face_a", "v4.3", 2, true),
            row("face_b", "v2", 1, false),
        ];
        let html = render_review(&rows);

        assert!(html.contains("<th>v2</th><th>v4.3</th>"));
        assert!(html.contains("face_a_to_card_01_v4.3_result.jpg"));
        assert!(html.contains("attempt 2"));
        assert!(html.contains("2 combinations, 3 provider results (2 successful), 4 logged attempts"));
        assert!(html.contains("timeout: request timed out after 120s"));
        assert!(html.find("face_a").unwrap() < html.find("face_b").unwrap());
    }

    #[test]
    fn test_escapes_html() {
        let mut bad = row("<script>", "v2", 1, false);
        bad.error_message = Some("a & \"b\"".into());
        let html = render_review(&[bad]);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("a &amp; &quot;b&quot;"));
    }

    #[test]
    fn test_empty_log() {
        let html = render_review(&[]);
        assert!(html.contains("0 combinations"));
        assert!(html.ends_with("</html>\n"));
    }
}
