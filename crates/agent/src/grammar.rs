//! Parsing the reasoning service's raw answer into a validated action.
//!
//! The preferred answer is a JSON object:
//!
//! ```json
//! {"explanation": "Opening the search box", "action": "click(\"12\")", "note": "search is bid 12"}
//! ```
//!
//! Models drift, so prose ending in a single action call (optionally in
//! backticks or a fenced block) is accepted too. In that case the last
//! call found wins and the prose before it becomes the explanation.

use serde::Deserialize;
use voxpilot_core::action::{ActionKind, ActionRecord, ParseError};

/// A validated answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub record: ActionRecord,
    pub explanation: String,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default, alias = "thought", alias = "reasoning")]
    explanation: String,
    #[serde(default, alias = "code")]
    action: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

/// Parse one raw model answer.
pub fn parse_envelope(raw: &str) -> Result<Envelope, ParseError> {
    let text = strip_fences(raw.trim());
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    if let Some(json) = json_object(text)
        && let Ok(envelope) = serde_json::from_str::<RawEnvelope>(json)
    {
        return from_json(envelope);
    }

    from_prose(text)
}

fn from_json(envelope: RawEnvelope) -> Result<Envelope, ParseError> {
    let action = envelope
        .action
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or(ParseError::NoActionFound)?;

    let record = ActionRecord::parse(action.trim_matches('`'))?;
    Ok(Envelope {
        explanation: collapse(&envelope.explanation),
        note: envelope
            .note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        record,
    })
}

fn from_prose(text: &str) -> Result<Envelope, ParseError> {
    let lines: Vec<&str> = text.lines().collect();
    let mut first_error = None;

    for (idx, line) in lines.iter().enumerate().rev() {
        let Some(call) = extract_call(line) else {
            continue;
        };
        match ActionRecord::parse(call) {
            Ok(record) => {
                let prose = lines[..idx].join(" ");
                return Ok(Envelope {
                    explanation: collapse(&prose),
                    note: None,
                    record,
                });
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    Err(first_error.unwrap_or(ParseError::NoActionFound))
}

/// Find `name(...)` on a line where `name` is a known operation.
fn extract_call(line: &str) -> Option<&str> {
    let line = line.trim().trim_matches('`').trim();
    let close = line.rfind(')')?;

    for (open, _) in line.match_indices('(') {
        let head = &line[..open];
        let start = head
            .char_indices()
            .rev()
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
            .map_or(0, |(i, c)| i + c.len_utf8());
        let name = &head[start..];
        if open < close && ActionKind::from_name(name).is_some() {
            return Some(&line[start..=close]);
        }
    }
    None
}

/// Take the outermost `{...}` span.
fn json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line, if any.
    let rest = match rest.find('\n') {
        Some(nl) if !rest[..nl].contains('(') => &rest[nl + 1..],
        _ => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

fn collapse(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_envelope() {
        let raw = r#"{"explanation": "Clicking the search box", "action": "click(\"12\")"}"#;
        let env = parse_envelope(raw).unwrap();
        assert_eq!(env.record, ActionRecord::click("12"));
        assert_eq!(env.explanation, "Clicking the search box");
        assert_eq!(env.note, None);
    }

    #[test]
    fn accepts_code_alias_and_note() {
        let raw = r#"{"explanation":"Typing the query","code":"fill('7', 'rust async')","note":"  search box is 7 "}"#;
        let env = parse_envelope(raw).unwrap();
        assert_eq!(env.record, ActionRecord::type_text("7", "rust async"));
        assert_eq!(env.note.as_deref(), Some("search box is 7"));
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"explanation\":\"Done\",\"action\":\"done(\\\"Found it\\\")\"}\n```";
        let env = parse_envelope(raw).unwrap();
        assert_eq!(env.record, ActionRecord::done(Some("Found it".into())));
    }

    #[test]
    fn prose_takes_last_action_call() {
        let raw = "I could click(\"3\") but the link is better.\nOpening the first result.\n`click(\"21\")`";
        let env = parse_envelope(raw).unwrap();
        assert_eq!(env.record, ActionRecord::click("21"));
        assert!(env.explanation.starts_with("I could click"));
    }

    #[test]
    fn prose_with_prefix_label() {
        let env = parse_envelope("Action: navigate(\"news.ycombinator.com\")").unwrap();
        assert_eq!(
            env.record,
            ActionRecord::Navigate { url: "https://news.ycombinator.com".into() }
        );
    }

    #[test]
    fn json_without_action_is_rejected() {
        let err = parse_envelope(r#"{"explanation":"thinking..."}"#).unwrap_err();
        assert_eq!(err, ParseError::NoActionFound);
    }

    #[test]
    fn invalid_arguments_surface_the_grammar_error() {
        let err = parse_envelope(r#"{"explanation":"x","action":"click()"}"#).unwrap_err();
        assert!(matches!(err, ParseError::Arity { op: "click", .. }));
    }

    #[test]
    fn prose_without_call_is_rejected() {
        assert_eq!(
            parse_envelope("I am not sure what to do here.").unwrap_err(),
            ParseError::NoActionFound
        );
        assert_eq!(parse_envelope("   ").unwrap_err(), ParseError::Empty);
    }

    #[test]
    fn unknown_operation_in_json() {
        let err = parse_envelope(r#"{"explanation":"x","action":"hover(\"3\")"}"#).unwrap_err();
        assert_eq!(err, ParseError::UnknownOperation("hover".into()));
    }

    #[test]
    fn multibyte_punctuation_before_the_call() {
        let env = parse_envelope("Next step\u{2014}click(\"12\")").unwrap();
        assert_eq!(env.record, ActionRecord::click("12"));

        let env = parse_envelope("Action\u{2192}click(\"12\")").unwrap();
        assert_eq!(env.record, ActionRecord::click("12"));
    }

    #[test]
    fn non_ascii_prose_becomes_the_explanation() {
        let raw = "Je clique sur \u{ab} Rechercher \u{bb}, c\u{2019}est le bouton \u{e0} droite.\nclick(\"8\")";
        let env = parse_envelope(raw).unwrap();
        assert_eq!(env.record, ActionRecord::click("8"));
        assert_eq!(
            env.explanation,
            "Je clique sur \u{ab} Rechercher \u{bb}, c\u{2019}est le bouton \u{e0} droite."
        );
    }

    #[test]
    fn smart_quotes_are_a_syntax_error() {
        let err = parse_envelope("Opening it \u{2192} click(\u{201c}12\u{201d})").unwrap_err();
        assert!(matches!(err, ParseError::Syntax(_)));

        let err = parse_envelope(r#"{"explanation":"x","action":"click(\u201c12\u201d)"}"#).unwrap_err();
        assert!(matches!(err, ParseError::Syntax(_)));
    }

    #[test]
    fn fenced_prose_call_with_language_tag() {
        let env = parse_envelope("```python\nscroll(0, 600)\n```").unwrap();
        assert_eq!(env.record, ActionRecord::Scroll { delta_x: 0, delta_y: 600 });
        assert_eq!(env.explanation, "");
    }
}
