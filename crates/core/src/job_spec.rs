//! Job-definition parsing.
//!
//! A job file is line-oriented UTF-8 text. Each meaningful line reads
//! `PROMPT ; DURATION_SECONDS ; BASE_NAME`. Blank lines and lines starting
//! with [`COMMENT_MARKER`] are skipped. A malformed line is reported and
//! dropped; it never aborts the rest of the file.

use std::fmt;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Field delimiter within a job line.
pub const FIELD_DELIMITER: char = ';';

/// Lines whose first non-whitespace character is this are ignored.
pub const COMMENT_MARKER: char = '#';

const BYTE_ORDER_MARK: char = '\u{feff}';

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One requested generation unit. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Job {
    prompt: String,
    duration_secs: u32,
    base_name: String,
}

impl Job {
    /// Build a job from already-validated parts.
    ///
    /// Returns `None` when the prompt or name is blank or the duration is
    /// zero; callers parsing untrusted text should go through
    /// [`parse_job_line`] instead to get a descriptive error.
    pub fn new(
        prompt: impl Into<String>,
        duration_secs: u32,
        base_name: impl Into<String>,
    ) -> Option<Self> {
        let prompt = prompt.into().trim().to_string();
        let base_name = base_name.into().trim().to_string();
        if prompt.is_empty() || base_name.is_empty() || duration_secs == 0 {
            return None;
        }
        Some(Self {
            prompt,
            duration_secs,
            base_name,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Requested output length in whole seconds (always > 0).
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}s): {}",
            self.base_name, self.duration_secs, self.prompt
        )
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a single job line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobLineError {
    #[error("expected 'PROMPT;DURATION;NAME', found {found} field(s)")]
    FieldCount { found: usize },

    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("name is empty")]
    EmptyName,

    #[error("duration '{0}' is not a positive integer")]
    InvalidDuration(String),
}

/// A rejected line together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line_number}: {reason} (in '{line}')")]
pub struct JobSpecError {
    /// 1-based line number in the source text.
    pub line_number: usize,
    pub line: String,
    pub reason: JobLineError,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Outcome of parsing a whole job file.
#[derive(Debug, Clone, Default)]
pub struct ParsedJobs {
    /// Valid jobs in file order.
    pub jobs: Vec<Job>,
    /// Rejected lines in file order.
    pub rejected: Vec<JobSpecError>,
}

/// Parse a single non-comment, non-blank line.
///
/// The two right-most delimiters split off the duration and the name, so
/// the prompt itself may contain `;`.
pub fn parse_job_line(line: &str) -> Result<Job, JobLineError> {
    let mut fields = line.rsplitn(3, FIELD_DELIMITER);
    let (name, duration, prompt) = match (fields.next(), fields.next(), fields.next()) {
        (Some(name), Some(duration), Some(prompt)) => (name, duration, prompt),
        _ => {
            return Err(JobLineError::FieldCount {
                found: line.split(FIELD_DELIMITER).count(),
            })
        }
    };

    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(JobLineError::EmptyPrompt);
    }

    let name = name.trim();
    if name.is_empty() {
        return Err(JobLineError::EmptyName);
    }

    let duration = duration.trim();
    let duration_secs = match duration.parse::<u32>() {
        Ok(secs) if secs > 0 => secs,
        _ => return Err(JobLineError::InvalidDuration(duration.to_string())),
    };

    Ok(Job {
        prompt: prompt.to_string(),
        duration_secs,
        base_name: name.to_string(),
    })
}

/// Parse a full job-definition text, keeping file order.
pub fn parse_job_spec(text: &str) -> ParsedJobs {
    let text = text.strip_prefix(BYTE_ORDER_MARK).unwrap_or(text);
    let mut parsed = ParsedJobs::default();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(COMMENT_MARKER) {
            continue;
        }

        match parse_job_line(line) {
            Ok(job) => parsed.jobs.push(job),
            Err(reason) => parsed.rejected.push(JobSpecError {
                line_number: index + 1,
                line: line.to_string(),
                reason,
            }),
        }
    }

    parsed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_simple_line() {
        let job = parse_job_line("calm piano melody ; 40 ; calm_piano").unwrap();
        assert_eq!(job.prompt(), "calm piano melody");
        assert_eq!(job.duration_secs(), 40);
        assert_eq!(job.base_name(), "calm_piano");
    }

    #[test]
    fn prompt_may_contain_delimiter() {
        let job = parse_job_line("lofi; rainy night; vinyl crackle;90;lofi_rain").unwrap();
        assert_eq!(job.prompt(), "lofi; rainy night; vinyl crackle");
        assert_eq!(job.duration_secs(), 90);
        assert_eq!(job.base_name(), "lofi_rain");
    }

    #[test]
    fn too_few_fields() {
        assert_matches!(
            parse_job_line("just a prompt;30"),
            Err(JobLineError::FieldCount { found: 2 })
        );
        assert_matches!(
            parse_job_line("just a prompt"),
            Err(JobLineError::FieldCount { found: 1 })
        );
    }

    #[test]
    fn zero_duration_rejected() {
        assert_matches!(
            parse_job_line("drums ; 0 ; drums"),
            Err(JobLineError::InvalidDuration(d)) if d == "0"
        );
    }

    #[test]
    fn negative_and_fractional_durations_rejected() {
        assert_matches!(
            parse_job_line("drums ; -5 ; drums"),
            Err(JobLineError::InvalidDuration(_))
        );
        assert_matches!(
            parse_job_line("drums ; 12.5 ; drums"),
            Err(JobLineError::InvalidDuration(_))
        );
        assert_matches!(
            parse_job_line("drums ; abc ; drums"),
            Err(JobLineError::InvalidDuration(_))
        );
    }

    #[test]
    fn empty_fields_rejected() {
        assert_matches!(parse_job_line(" ; 30 ; name"), Err(JobLineError::EmptyPrompt));
        assert_matches!(parse_job_line("prompt ; 30 ;  "), Err(JobLineError::EmptyName));
    }

    #[test]
    fn spec_skips_comments_and_blanks_and_keeps_order() {
        let text = "\
# ambient batch
calm piano melody ; 40 ; calm_piano

   # indented comment
upbeat synthwave ; 20 ; synthwave
";
        let parsed = parse_job_spec(text);
        assert!(parsed.rejected.is_empty());
        let names: Vec<_> = parsed.jobs.iter().map(Job::base_name).collect();
        assert_eq!(names, vec!["calm_piano", "synthwave"]);
    }

    #[test]
    fn spec_reports_bad_lines_and_continues() {
        let text = "good one ; 10 ; a\nbroken line\nanother ; zero ; b\nlast ; 5 ; c\n";
        let parsed = parse_job_spec(text);

        assert_eq!(parsed.jobs.len(), 2);
        assert_eq!(parsed.jobs[0].base_name(), "a");
        assert_eq!(parsed.jobs[1].base_name(), "c");

        assert_eq!(parsed.rejected.len(), 2);
        assert_eq!(parsed.rejected[0].line_number, 2);
        assert_eq!(parsed.rejected[1].line_number, 3);
        assert_matches!(parsed.rejected[1].reason, JobLineError::InvalidDuration(_));
    }

    #[test]
    fn spec_ignores_byte_order_mark() {
        let parsed = parse_job_spec("\u{feff}strings ; 15 ; strings\n");
        assert_eq!(parsed.jobs.len(), 1);
        assert_eq!(parsed.jobs[0].prompt(), "strings");
    }

    #[test]
    fn spec_handles_crlf() {
        let parsed = parse_job_spec("a ; 1 ; x\r\nb ; 2 ; y\r\n");
        assert_eq!(parsed.jobs.len(), 2);
        assert_eq!(parsed.jobs[1].base_name(), "y");
    }

    #[test]
    fn job_new_validates() {
        assert!(Job::new("prompt", 10, "name").is_some());
        assert!(Job::new("prompt", 0, "name").is_none());
        assert!(Job::new("  ", 10, "name").is_none());
        assert!(Job::new("prompt", 10, "").is_none());
    }
}
