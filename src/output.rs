//! Output formatting module
//!
//! Renders the run summary printed when the relay stops. Standard output
//! belongs to the records in dry-run mode, so callers pass the writer.

use std::io::Write;

use anyhow::Result;

use crate::models::RunSummary;

/// Format the summary in human-readable form
pub fn format_human<W: Write>(summary: &RunSummary, out: &mut W) -> Result<()> {
    writeln!(out, "Relay Summary:")?;
    writeln!(out, "  Received: {} notifications", summary.received)?;
    if summary.malformed > 0 {
        writeln!(out, "  Malformed: {} lines", summary.malformed)?;
    }
    writeln!(out, "  Enqueued: {} records", summary.enqueued)?;
    writeln!(out, "  Delivered: {} records", summary.delivered)?;
    if summary.retried > 0 {
        writeln!(out, "  Retried: {} produce calls", summary.retried)?;
    }
    if summary.dropped > 0 {
        writeln!(out, "  Dropped: {} records", summary.dropped)?;
    }
    if summary.rejected > 0 {
        writeln!(out, "  Rejected: {} records", summary.rejected)?;
    }
    if summary.delivery_failed > 0 {
        writeln!(out, "  Delivery failures: {}", summary.delivery_failed)?;
    }

    let duration_sec = summary.duration_ms as f64 / 1000.0;
    if duration_sec < 1.0 {
        writeln!(out, "  Duration: {}ms", summary.duration_ms)?;
    } else {
        writeln!(out, "  Duration: {:.2}s", duration_sec)?;
    }

    if let Some(true) = summary.interrupted {
        writeln!(out, "  Status: Interrupted by signal")?;
    }
    Ok(())
}

/// Format the summary as a single JSON document
pub fn format_json<W: Write>(summary: &RunSummary, out: &mut W) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(summary)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_human(summary: &RunSummary) -> String {
        let mut buffer = Vec::new();
        format_human(summary, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_human_summary_hides_zero_problem_counters() {
        let text = render_human(&RunSummary {
            received: 4,
            enqueued: 4,
            delivered: 4,
            duration_ms: 12,
            ..RunSummary::default()
        });

        assert!(text.contains("Received: 4 notifications"));
        assert!(text.contains("Duration: 12ms"));
        assert!(!text.contains("Dropped"));
        assert!(!text.contains("Interrupted"));
    }

    #[test]
    fn test_human_summary_reports_drops_and_interrupt() {
        let text = render_human(&RunSummary {
            received: 2,
            dropped: 1,
            duration_ms: 2500,
            interrupted: Some(true),
            ..RunSummary::default()
        });

        assert!(text.contains("Dropped: 1 records"));
        assert!(text.contains("Duration: 2.50s"));
        assert!(text.contains("Status: Interrupted by signal"));
    }

    #[test]
    fn test_json_summary_round_trips() {
        let mut buffer = Vec::new();
        let summary = RunSummary {
            received: 1,
            malformed: 1,
            ..RunSummary::default()
        };
        format_json(&summary, &mut buffer).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(parsed["received"], 1);
        assert_eq!(parsed["malformed"], 1);
        assert!(parsed.get("interrupted").is_none());
    }
}
