//! Branch-name derivation (§6.6).

use chrono::Utc;

/// Lowercase, non-alphanumerics collapsed to `-`, trimmed, capped at `max_len`.
pub fn slug(input: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_dash = false;
    for ch in input.to_lowercase().chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = out.trim_matches('-');
    let truncated: String = trimmed.chars().take(max_len).collect();
    truncated.trim_matches('-').to_string()
}

/// `ai/<source>-<sanitized-sourceRef>-<slug(title, 40)>`, or
/// `ai/<YYYYMMDDhhmmss>-<slug(title or "task", 40)>` when no provenance is
/// available.
pub fn derive(
    source: Option<&str>,
    source_ref: Option<&str>,
    title: Option<&str>,
) -> String {
    let title_slug = slug(title.unwrap_or("task"), 40);
    match (source, source_ref) {
        (Some(source), Some(source_ref)) => {
            format!("ai/{}-{}-{}", slug(source, 20), slug(source_ref, 20), title_slug)
        }
        _ => {
            let ts = Utc::now().format("%Y%m%d%H%M%S");
            format!("ai/{}-{}", ts, title_slug)
        }
    }
}

/// The default branch assigned when an item is submitted with a spec
/// directly (§4.1 `submit`).
pub fn default_queued_branch(work_item_id: uuid::Uuid) -> String {
    let short = work_item_id.to_string();
    format!("whim/{}", &short[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_lowercases_and_collapses_non_alphanumerics() {
        assert_eq!(slug("Add Login!!", 40), "add-login");
        assert_eq!(slug("  leading and trailing  ", 40), "leading-and-trailing");
    }

    #[test]
    fn slug_truncates_to_max_len() {
        let long = "a".repeat(100);
        assert_eq!(slug(&long, 40).len(), 40);
    }

    #[test]
    fn derive_uses_source_and_ref_when_present() {
        let branch = derive(Some("github"), Some("issue-42"), Some("Add login"));
        assert_eq!(branch, "ai/github-issue-42-add-login");
    }

    #[test]
    fn derive_falls_back_to_timestamp() {
        let branch = derive(None, None, Some("Add login"));
        assert!(branch.starts_with("ai/"));
        assert!(branch.ends_with("add-login"));
    }

    #[test]
    fn default_queued_branch_uses_first_eight_chars_of_id() {
        let id = uuid::Uuid::parse_str("12345678-1234-1234-1234-123456789abc").unwrap();
        assert_eq!(default_queued_branch(id), "whim/12345678");
    }
}
