//! Line-delimited event stream emitted by the external spec-generator
//! (§4.2 step 3). One JSON object per line: `{"event": "...", ...}`.

use serde::Deserialize;

#[derive(Debug, Clone)]
pub enum SpecGenEvent {
    Started,
    Complete {
        spec_path: String,
        task_count: Option<u32>,
        validation_passed: Option<bool>,
    },
    Failed {
        error: String,
    },
}

#[derive(Deserialize)]
struct RawEvent {
    event: String,
    #[serde(rename = "specPath")]
    spec_path: Option<String>,
    #[serde(rename = "taskCount")]
    task_count: Option<u32>,
    #[serde(rename = "validationPassed")]
    validation_passed: Option<bool>,
    error: Option<String>,
}

impl SpecGenEvent {
    /// Returns `None` for blank lines or lines that don't parse as a known
    /// event — the generator's own stdout chatter is tolerated, not an
    /// error.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let raw: RawEvent = serde_json::from_str(line).ok()?;
        match raw.event.as_str() {
            "spec_generation_started" => Some(SpecGenEvent::Started),
            "spec_generation_complete" => Some(SpecGenEvent::Complete {
                spec_path: raw.spec_path?,
                task_count: raw.task_count,
                validation_passed: raw.validation_passed,
            }),
            "spec_generation_failed" => Some(SpecGenEvent::Failed {
                error: raw.error.unwrap_or_else(|| "unknown error".to_string()),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_started_event() {
        assert!(matches!(
            SpecGenEvent::parse(r#"{"event":"spec_generation_started"}"#),
            Some(SpecGenEvent::Started)
        ));
    }

    #[test]
    fn parses_complete_event() {
        let event = SpecGenEvent::parse(
            r#"{"event":"spec_generation_complete","specPath":"/tmp/x/spec.md","taskCount":5,"validationPassed":true}"#,
        );
        match event {
            Some(SpecGenEvent::Complete { spec_path, task_count, validation_passed }) => {
                assert_eq!(spec_path, "/tmp/x/spec.md");
                assert_eq!(task_count, Some(5));
                assert_eq!(validation_passed, Some(true));
            }
            _ => panic!("expected a complete event"),
        }
    }

    #[test]
    fn parses_failed_event() {
        let event = SpecGenEvent::parse(r#"{"event":"spec_generation_failed","error":"boom"}"#);
        match event {
            Some(SpecGenEvent::Failed { error }) => assert_eq!(error, "boom"),
            _ => panic!("expected a failed event"),
        }
    }

    #[test]
    fn ignores_blank_and_unrecognized_lines() {
        assert!(SpecGenEvent::parse("").is_none());
        assert!(SpecGenEvent::parse("   ").is_none());
        assert!(SpecGenEvent::parse(r#"{"event":"some_debug_log"}"#).is_none());
        assert!(SpecGenEvent::parse("not json at all").is_none());
    }
}
