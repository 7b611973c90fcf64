use std::fmt::Write;

use unicode_truncate::{Alignment, UnicodeTruncateStr};

use crate::probe::result::ProbeResult;

/// Diagnostics printed when nothing passed.
const DIAGNOSTIC_COUNT: usize = 5;
const MAX_STATUS_WIDTH: usize = 48;

fn to_fixed_width(input: &str, width: usize) -> String {
    input.unicode_pad(width, Alignment::Left, true).into_owned()
}

/// Columns the text takes up on a terminal.
fn display_width(input: &str) -> usize {
    input.unicode_truncate(usize::MAX).1
}

/// Valid results, fastest first. Equal speeds keep their input order.
pub fn ranked(results: &[ProbeResult]) -> Vec<&ProbeResult> {
    let mut valid: Vec<&ProbeResult> = results.iter().filter(|r| r.valid).collect();
    valid.sort_by(|a, b| b.download_speed.total_cmp(&a.download_speed));
    valid
}

/// Human readable ranking of the `top` fastest streams plus the best one.
pub fn render(results: &[ProbeResult], top: usize) -> String {
    let mut out = String::new();
    let valid = ranked(results);

    let Some(best) = valid.first() else {
        let _ = writeln!(out, "No usable live stream found.");
        if !results.is_empty() {
            let _ = writeln!(out, "\nSome of the results:");
        }
        for result in results.iter().take(DIAGNOSTIC_COUNT) {
            let _ = writeln!(
                out,
                "URL: {}\nLatency: {:?}\nStatus: {}\n",
                result.url, result.latency, result.error
            );
        }
        return out;
    };

    let shown = &valid[..valid.len().min(top)];
    let status_width = shown
        .iter()
        .map(|r| display_width(&r.error))
        .max()
        .unwrap_or(2)
        .min(MAX_STATUS_WIDTH);

    let _ = writeln!(
        out,
        "=== {} usable live streams, ranked by download speed ===\n",
        valid.len()
    );
    for (rank, result) in shown.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>2}. {:>9.2} KB/s  {:>7.0?}  {:>9.2} KB  [{}]  {}",
            rank + 1,
            result.download_speed,
            result.latency,
            result.data_size as f64 / 1024.0,
            to_fixed_width(&result.error, status_width),
            result.url
        );
    }

    let _ = writeln!(
        out,
        "\n=== Fastest live stream ===\n{}\nDownload speed: {:.2} KB/s\nLatency: {:?}\nData size: {:.2} KB\nDownload time: {:?}",
        best.url,
        best.download_speed,
        best.latency,
        best.data_size as f64 / 1024.0,
        best.download_time
    );
    out
}

pub fn to_json(results: &[ProbeResult]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&ranked(results))
}
