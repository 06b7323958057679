//! Parsing of raw LLM output into a post.

use crate::domain::error::DomainError;

const TITLE: &str = "title:";
const SELF_TEXT: &str = "self_text:";
const SUBREDDIT: &str = "subreddit:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPost {
    pub title: String,
    pub self_text: String,
    pub subreddit: Option<String>,
}

/// Splits text on the `title:`, `self_text:` and `subreddit:` markers.
///
/// Markers match case-insensitively and may appear in any order; each field runs
/// until the next marker or the end of the text. All three must be present.
pub fn parse_generated_post(raw: &str) -> Result<GeneratedPost, DomainError> {
    // ASCII lowercasing keeps byte offsets aligned with `raw`.
    let folded = raw.to_ascii_lowercase();

    let mut markers = Vec::with_capacity(3);
    for marker in [TITLE, SELF_TEXT, SUBREDDIT] {
        let start = folded
            .find(marker)
            .ok_or(DomainError::MissingMarker { marker })?;
        markers.push((start, marker));
    }
    markers.sort_by_key(|(start, _)| *start);

    let mut title = String::new();
    let mut self_text = String::new();
    let mut subreddit = String::new();
    for (index, (start, marker)) in markers.iter().enumerate() {
        let value_start = start + marker.len();
        let value_end = markers
            .get(index + 1)
            .map(|(next, _)| *next)
            .unwrap_or(raw.len());
        let value = clean(&raw[value_start..value_end]);
        match *marker {
            TITLE => title = value,
            SELF_TEXT => self_text = value,
            _ => subreddit = value,
        }
    }

    if title.is_empty() {
        return Err(DomainError::validation("generated post has an empty title"));
    }

    Ok(GeneratedPost {
        title,
        self_text,
        subreddit: normalize_subreddit(&subreddit),
    })
}

fn clean(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c: char| c == '*' || c == '"')
        .trim()
        .to_string()
}

fn normalize_subreddit(value: &str) -> Option<String> {
    let first_line = value.lines().next().unwrap_or_default().trim();
    let name = first_line
        .strip_prefix("/r/")
        .or_else(|| first_line.strip_prefix("r/"))
        .unwrap_or(first_line)
        .trim();
    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_markers_and_strips_prefix() {
        let raw = "title: My cat learned to open doors\n\
                   self_text: It started on Tuesday.\nNow nothing is safe.\n\
                   subreddit: r/cats";
        let post = parse_generated_post(raw).expect("parse");
        assert_eq!(post.title, "My cat learned to open doors");
        assert_eq!(post.self_text, "It started on Tuesday.\nNow nothing is safe.");
        assert_eq!(post.subreddit.as_deref(), Some("cats"));
    }

    #[test]
    fn markers_may_be_reordered_and_capitalized() {
        let raw = "Subreddit: /r/AskReddit\nTitle: **Why?**\nSelf_text: because";
        let post = parse_generated_post(raw).expect("parse");
        assert_eq!(post.title, "Why?");
        assert_eq!(post.self_text, "because");
        assert_eq!(post.subreddit.as_deref(), Some("AskReddit"));
    }

    #[test]
    fn missing_marker_fails() {
        let err = parse_generated_post("title: hello\nself_text: body").expect_err("missing");
        assert_eq!(err, DomainError::MissingMarker { marker: SUBREDDIT });
    }

    #[test]
    fn empty_title_fails() {
        let err = parse_generated_post("title:\nself_text: body\nsubreddit: r/x")
            .expect_err("empty title");
        assert!(matches!(err, DomainError::Validation { .. }));
    }
}
