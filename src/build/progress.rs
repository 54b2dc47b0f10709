//! Pure parsing of structured progress lines emitted by stage scripts.
//!
//! Two line shapes carry structure; everything else is a plain log line.
//! `PROGRESS:<step>:<message>:<percentage>%` updates the live progress
//! snapshot for a platform. `STEP:<step>:<status>:<message>` records a
//! completed step. Malformed lines (wrong arity, non-numeric percentage)
//! degrade to plain log lines rather than being dropped.

use chrono::Utc;
use mbo_protocol::job::StepRecord;

/// What a parsed line should do to a platform's progress state.
pub enum ParsedLine {
    Progress {
        step: String,
        message: String,
        percentage: u32,
    },
    Step(StepRecord),
    Plain,
}

/// Parse one trimmed stage-output line.
pub fn parse_progress_line(line: &str) -> ParsedLine {
    if let Some(rest) = line.strip_prefix("PROGRESS:") {
        let parts: Vec<&str> = rest.splitn(3, ':').collect();
        if parts.len() == 3 {
            let step = parts[0].to_string();
            let message = parts[1].to_string();
            let percent_str = parts[2].trim_end_matches('%');
            if let Ok(percentage) = percent_str.parse::<u32>() {
                return ParsedLine::Progress {
                    step,
                    message,
                    percentage,
                };
            }
        }
        return ParsedLine::Plain;
    }

    if let Some(rest) = line.strip_prefix("STEP:") {
        let parts: Vec<&str> = rest.splitn(3, ':').collect();
        if parts.len() == 3 {
            return ParsedLine::Step(StepRecord {
                step: parts[0].to_string(),
                status: parts[1].to_string(),
                message: parts[2].to_string(),
                timestamp: Utc::now(),
            });
        }
        return ParsedLine::Plain;
    }

    ParsedLine::Plain
}

/// Format a parsed line the way it's surfaced in the job's log tail,
/// e.g. `[dev-all-x][ANDROID] 📊 Building APK (42%)`.
pub fn format_log_entry(job_id: &str, platform: &str, line: &str) -> String {
    let tag = platform.to_uppercase();
    match parse_progress_line(line) {
        ParsedLine::Progress { message, percentage, .. } => {
            format!("[{job_id}][{tag}] 📊 {message} ({percentage}%)")
        }
        ParsedLine::Step(step) => {
            let emoji = if step.status == "SUCCESS" { "✅" } else { "❌" };
            format!("[{job_id}][{tag}] {emoji} {}", step.message)
        }
        ParsedLine::Plain => format!("[{job_id}][{tag}] {line}"),
    }
}
