//! The action grammar: the closed set of operations the agent may perform.
//!
//! The reasoning service proposes actions as free text such as
//! `click("12")` or `type("searchbox", "hello")`. Nothing reaches the event
//! stream until it has been parsed into an [`ActionRecord`], so every
//! dispatched action is one of a fixed, typed set of variants.
//!
//! Grammar (informal):
//! ```text
//! call  = IDENT "(" [arg ("," arg)*] ")"
//! arg   = QUOTED_STRING | INTEGER
//!
//! click(target)            fill(target, text)  type(target, text)
//! navigate(url)            goto(url)
//! scroll(dx, dy)           scroll("down" | "up" | "left" | "right")
//! wait([ms])               noop([ms])
//! done([message])          send_msg_to_user(message)
//! clarify(question)        ask_user(question)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pixels scrolled by the direction shorthand `scroll("down")`.
pub const DEFAULT_SCROLL_PX: i32 = 600;

/// Wait used by a bare `wait()`.
pub const DEFAULT_WAIT_MS: u64 = 1000;

/// Longest wait the grammar accepts.
pub const MAX_WAIT_MS: u64 = 60_000;

/// A reference to an element in the accessibility tree (its `bid`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn new(bid: impl Into<String>) -> Self {
        Self(bid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operation kinds of the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Type,
    Navigate,
    Scroll,
    Wait,
    Done,
    Clarify,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Navigate => "navigate",
            ActionKind::Scroll => "scroll",
            ActionKind::Wait => "wait",
            ActionKind::Done => "done",
            ActionKind::Clarify => "clarify",
        }
    }

    /// Map an operation name (including accepted aliases) to its kind.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "click" => Some(ActionKind::Click),
            "type" | "fill" => Some(ActionKind::Type),
            "navigate" | "goto" => Some(ActionKind::Navigate),
            "scroll" => Some(ActionKind::Scroll),
            "wait" | "noop" => Some(ActionKind::Wait),
            "done" | "send_msg_to_user" => Some(ActionKind::Done),
            "clarify" | "ask_user" => Some(ActionKind::Clarify),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, typed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ActionRecord {
    Click { target: ElementRef },
    Type { target: ElementRef, text: String },
    Navigate { url: String },
    Scroll { delta_x: i32, delta_y: i32 },
    Wait { millis: u64 },
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Clarify { question: String },
}

impl ActionRecord {
    pub fn click(target: impl Into<String>) -> Self {
        ActionRecord::Click { target: ElementRef::new(target) }
    }

    pub fn type_text(target: impl Into<String>, text: impl Into<String>) -> Self {
        ActionRecord::Type {
            target: ElementRef::new(target),
            text: text.into(),
        }
    }

    pub fn done(message: Option<String>) -> Self {
        ActionRecord::Done { message }
    }

    pub fn clarify(question: impl Into<String>) -> Self {
        ActionRecord::Clarify { question: question.into() }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRecord::Click { .. } => ActionKind::Click,
            ActionRecord::Type { .. } => ActionKind::Type,
            ActionRecord::Navigate { .. } => ActionKind::Navigate,
            ActionRecord::Scroll { .. } => ActionKind::Scroll,
            ActionRecord::Wait { .. } => ActionKind::Wait,
            ActionRecord::Done { .. } => ActionKind::Done,
            ActionRecord::Clarify { .. } => ActionKind::Clarify,
        }
    }

    /// The element this action operates on, if any.
    pub fn target(&self) -> Option<&ElementRef> {
        match self {
            ActionRecord::Click { target } | ActionRecord::Type { target, .. } => Some(target),
            _ => None,
        }
    }

    /// `done` and `clarify` steer the agent loop; they are never sent to
    /// the browser layer.
    pub fn is_control(&self) -> bool {
        matches!(self, ActionRecord::Done { .. } | ActionRecord::Clarify { .. })
    }

    /// Parse a single action call, e.g. `type("7", "hello world")`.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let trimmed = input.trim().trim_end_matches(';').trim();
        if trimmed.is_empty() {
            return Err(ParseError::Empty);
        }
        let tokens = tokenize(trimmed)?;
        let (name, args) = parse_call(&tokens)?;
        build_record(&name, args)
    }
}

impl fmt::Display for ActionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionRecord::Click { target } => write!(f, "click({})", quote(target.as_str())),
            ActionRecord::Type { target, text } => {
                write!(f, "type({}, {})", quote(target.as_str()), quote(text))
            }
            ActionRecord::Navigate { url } => write!(f, "navigate({})", quote(url)),
            ActionRecord::Scroll { delta_x, delta_y } => write!(f, "scroll({delta_x}, {delta_y})"),
            ActionRecord::Wait { millis } => write!(f, "wait({millis})"),
            ActionRecord::Done { message: Some(m) } => write!(f, "done({})", quote(m)),
            ActionRecord::Done { message: None } => f.write_str("done()"),
            ActionRecord::Clarify { question } => write!(f, "clarify({})", quote(question)),
        }
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

/// Why a raw proposal failed to match the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty action")]
    Empty,

    #[error("no action call found in model output")]
    NoActionFound,

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("{op} expects {expected} argument(s), got {got}")]
    Arity {
        op: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("invalid argument {index} for {op}: {reason}")]
    InvalidArgument {
        op: &'static str,
        index: usize,
        reason: String,
    },
}

// ── Tokenizer ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '"' | '\'' => {
                let quote_char = c;
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(other) => s.push(other),
                            None => break,
                        },
                        _ if ch == quote_char => {
                            closed = true;
                            break;
                        }
                        _ => s.push(ch),
                    }
                }
                if !closed {
                    return Err(ParseError::Syntax("unterminated string literal".into()));
                }
                tokens.push(Token::Str(s));
            }
            _ if c.is_ascii_digit() || c == '-' => {
                let mut num_str = String::new();
                num_str.push(c);
                chars.next();
                while let Some(&nc) = chars.peek() {
                    if nc.is_ascii_digit() {
                        num_str.push(nc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match num_str.parse::<i64>() {
                    Ok(n) => tokens.push(Token::Int(n)),
                    Err(_) => return Err(ParseError::Syntax(format!("invalid number: {num_str}"))),
                }
            }
            _ if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&wc) = chars.peek() {
                    if wc.is_alphanumeric() || wc == '_' {
                        word.push(wc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(word));
            }
            _ => return Err(ParseError::Syntax(format!("unexpected character: {c}"))),
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Str(String),
    Int(i64),
}

impl Arg {
    /// Element references may be written as strings or bare integers.
    fn into_text(self) -> String {
        match self {
            Arg::Str(s) => s,
            Arg::Int(n) => n.to_string(),
        }
    }
}

fn parse_call(tokens: &[Token]) -> Result<(String, Vec<Arg>), ParseError> {
    let name = match tokens.first() {
        Some(Token::Ident(name)) => name.clone(),
        other => return Err(ParseError::Syntax(format!("expected operation name, got {other:?}"))),
    };
    if tokens.get(1) != Some(&Token::LParen) {
        return Err(ParseError::Syntax(format!("expected '(' after {name}")));
    }

    let mut args = Vec::new();
    let mut rest = &tokens[2..];
    let mut expect_arg = true;
    loop {
        match rest.first() {
            Some(Token::RParen) => {
                rest = &rest[1..];
                break;
            }
            Some(Token::Str(s)) if expect_arg => args.push(Arg::Str(s.clone())),
            Some(Token::Int(n)) if expect_arg => args.push(Arg::Int(*n)),
            Some(Token::Comma) if !expect_arg => {}
            Some(other) => return Err(ParseError::Syntax(format!("unexpected token {other:?}"))),
            None => return Err(ParseError::Syntax("expected closing parenthesis".into())),
        }
        expect_arg = !expect_arg;
        rest = &rest[1..];
    }

    if !rest.is_empty() {
        return Err(ParseError::Syntax(format!("trailing input after {name}(...)")));
    }
    Ok((name, args))
}

fn build_record(name: &str, args: Vec<Arg>) -> Result<ActionRecord, ParseError> {
    let kind = ActionKind::from_name(name).ok_or_else(|| ParseError::UnknownOperation(name.to_string()))?;
    let op = kind.as_str();
    let got = args.len();
    let mut args = args.into_iter();

    let record = match (kind, got) {
        (ActionKind::Click, 1) => ActionRecord::Click {
            target: element(op, 0, args.next())?,
        },
        (ActionKind::Click, _) => return Err(ParseError::Arity { op, expected: "1", got }),

        (ActionKind::Type, 2) => {
            let target = element(op, 0, args.next())?;
            let text = match args.next() {
                Some(arg) => arg.into_text(),
                None => String::new(),
            };
            ActionRecord::Type { target, text }
        }
        (ActionKind::Type, _) => return Err(ParseError::Arity { op, expected: "2", got }),

        (ActionKind::Navigate, 1) => ActionRecord::Navigate {
            url: normalize_url(op, args.next())?,
        },
        (ActionKind::Navigate, _) => return Err(ParseError::Arity { op, expected: "1", got }),

        (ActionKind::Scroll, 1) => {
            let (delta_x, delta_y) = match args.next() {
                Some(Arg::Str(dir)) => match dir.to_ascii_lowercase().as_str() {
                    "down" => (0, DEFAULT_SCROLL_PX),
                    "up" => (0, -DEFAULT_SCROLL_PX),
                    "right" => (DEFAULT_SCROLL_PX, 0),
                    "left" => (-DEFAULT_SCROLL_PX, 0),
                    other => {
                        return Err(ParseError::InvalidArgument {
                            op,
                            index: 0,
                            reason: format!("unknown direction '{other}'"),
                        });
                    }
                },
                _ => {
                    return Err(ParseError::InvalidArgument {
                        op,
                        index: 0,
                        reason: "expected a direction string".into(),
                    });
                }
            };
            ActionRecord::Scroll { delta_x, delta_y }
        }
        (ActionKind::Scroll, 2) => ActionRecord::Scroll {
            delta_x: pixels(op, 0, args.next())?,
            delta_y: pixels(op, 1, args.next())?,
        },
        (ActionKind::Scroll, _) => return Err(ParseError::Arity { op, expected: "1 or 2", got }),

        (ActionKind::Wait, 0) => ActionRecord::Wait { millis: DEFAULT_WAIT_MS },
        (ActionKind::Wait, 1) => match args.next() {
            Some(Arg::Int(ms)) if (0..=MAX_WAIT_MS as i64).contains(&ms) => {
                ActionRecord::Wait { millis: ms as u64 }
            }
            _ => {
                return Err(ParseError::InvalidArgument {
                    op,
                    index: 0,
                    reason: format!("expected milliseconds between 0 and {MAX_WAIT_MS}"),
                });
            }
        },
        (ActionKind::Wait, _) => return Err(ParseError::Arity { op, expected: "0 or 1", got }),

        (ActionKind::Done, 0) => ActionRecord::Done { message: None },
        (ActionKind::Done, 1) => {
            let message = args.next().map(Arg::into_text).filter(|m| !m.trim().is_empty());
            ActionRecord::Done { message }
        }
        (ActionKind::Done, _) => return Err(ParseError::Arity { op, expected: "0 or 1", got }),

        (ActionKind::Clarify, 1) => {
            let question = args.next().map(Arg::into_text).unwrap_or_default();
            if question.trim().is_empty() {
                return Err(ParseError::InvalidArgument {
                    op,
                    index: 0,
                    reason: "question must not be empty".into(),
                });
            }
            ActionRecord::Clarify { question }
        }
        (ActionKind::Clarify, _) => return Err(ParseError::Arity { op, expected: "1", got }),
    };

    Ok(record)
}

fn element(op: &'static str, index: usize, arg: Option<Arg>) -> Result<ElementRef, ParseError> {
    let text = arg.map(Arg::into_text).unwrap_or_default();
    let text = text.trim();
    if text.is_empty() || text.chars().any(char::is_whitespace) {
        return Err(ParseError::InvalidArgument {
            op,
            index,
            reason: "element reference must be a non-empty bid without spaces".into(),
        });
    }
    Ok(ElementRef::new(text))
}

fn pixels(op: &'static str, index: usize, arg: Option<Arg>) -> Result<i32, ParseError> {
    match arg {
        Some(Arg::Int(n)) => i32::try_from(n).map_err(|_| ParseError::InvalidArgument {
            op,
            index,
            reason: format!("{n} is out of range"),
        }),
        _ => Err(ParseError::InvalidArgument {
            op,
            index,
            reason: "expected an integer pixel delta".into(),
        }),
    }
}

fn normalize_url(op: &'static str, arg: Option<Arg>) -> Result<String, ParseError> {
    let raw = match arg {
        Some(Arg::Str(s)) => s.trim().to_string(),
        _ => {
            return Err(ParseError::InvalidArgument {
                op,
                index: 0,
                reason: "expected a URL string".into(),
            });
        }
    };
    if raw.is_empty() || raw.chars().any(char::is_whitespace) {
        return Err(ParseError::InvalidArgument {
            op,
            index: 0,
            reason: format!("'{raw}' is not a URL"),
        });
    }
    if raw.contains("://") || raw.starts_with("about:") {
        Ok(raw)
    } else {
        Ok(format!("https://{raw}"))
    }
}

/// Human-readable grammar description included in every selector prompt.
pub fn grammar_description() -> &'static str {
    r#"Exactly one of these actions per answer:
- click("<bid>")                  click the element with that bid
- type("<bid>", "<text>")         focus the element and type text into it
- navigate("<url>")               open a URL in the current tab
- scroll(<dx>, <dy>) or scroll("down"|"up"|"left"|"right")
- wait(<milliseconds>)            let the page settle
- done("<message for the user>")  the goal is accomplished
- clarify("<question>")           you cannot proceed without the user's help"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_click_with_string_bid() {
        let record = ActionRecord::parse(r#"click("12")"#).unwrap();
        assert_eq!(record, ActionRecord::click("12"));
        assert_eq!(record.kind(), ActionKind::Click);
        assert_eq!(record.target().unwrap().as_str(), "12");
    }

    #[test]
    fn parse_click_with_integer_bid() {
        assert_eq!(ActionRecord::parse("click(12)").unwrap(), ActionRecord::click("12"));
    }

    #[test]
    fn parse_type_and_fill_alias() {
        let a = ActionRecord::parse(r#"type("searchbox", "hello world")"#).unwrap();
        let b = ActionRecord::parse(r#"fill('searchbox', 'hello world')"#).unwrap();
        assert_eq!(a, ActionRecord::type_text("searchbox", "hello world"));
        assert_eq!(a, b);
    }

    #[test]
    fn parse_string_escapes() {
        let record = ActionRecord::parse(r#"type("q", "say \"hi\"\n")"#).unwrap();
        assert_eq!(record, ActionRecord::type_text("q", "say \"hi\"\n"));
    }

    #[test]
    fn navigate_adds_scheme() {
        let record = ActionRecord::parse(r#"goto("youtube.com")"#).unwrap();
        assert_eq!(record, ActionRecord::Navigate { url: "https://youtube.com".into() });
        let record = ActionRecord::parse(r#"navigate("about:blank")"#).unwrap();
        assert_eq!(record, ActionRecord::Navigate { url: "about:blank".into() });
    }

    #[test]
    fn scroll_forms() {
        assert_eq!(
            ActionRecord::parse("scroll(0, -300)").unwrap(),
            ActionRecord::Scroll { delta_x: 0, delta_y: -300 }
        );
        assert_eq!(
            ActionRecord::parse(r#"scroll("down")"#).unwrap(),
            ActionRecord::Scroll { delta_x: 0, delta_y: DEFAULT_SCROLL_PX }
        );
        assert!(matches!(
            ActionRecord::parse(r#"scroll("sideways")"#),
            Err(ParseError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn wait_bounds() {
        assert_eq!(ActionRecord::parse("wait()").unwrap(), ActionRecord::Wait { millis: DEFAULT_WAIT_MS });
        assert_eq!(ActionRecord::parse("noop(250)").unwrap(), ActionRecord::Wait { millis: 250 });
        assert!(ActionRecord::parse("wait(999999)").is_err());
        assert!(ActionRecord::parse("wait(-1)").is_err());
    }

    #[test]
    fn done_and_send_msg_alias() {
        assert_eq!(ActionRecord::parse("done()").unwrap(), ActionRecord::done(None));
        assert_eq!(
            ActionRecord::parse(r#"send_msg_to_user("$279.49")"#).unwrap(),
            ActionRecord::done(Some("$279.49".into()))
        );
        assert!(ActionRecord::parse("done()").unwrap().is_control());
    }

    #[test]
    fn clarify_requires_question() {
        assert!(ActionRecord::parse(r#"clarify("  ")"#).is_err());
        let record = ActionRecord::parse(r#"ask_user("Which account?")"#).unwrap();
        assert_eq!(record, ActionRecord::clarify("Which account?"));
    }

    #[test]
    fn rejects_unknown_operation() {
        assert_eq!(
            ActionRecord::parse(r#"hover("3")"#),
            Err(ParseError::UnknownOperation("hover".into()))
        );
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(matches!(ActionRecord::parse(r#"click("1", "2")"#), Err(ParseError::Arity { .. })));
        assert!(matches!(ActionRecord::parse(r#"type("1")"#), Err(ParseError::Arity { .. })));
    }

    #[test]
    fn rejects_malformed_syntax() {
        assert!(matches!(ActionRecord::parse(r#"click("12""#), Err(ParseError::Syntax(_))));
        assert!(matches!(ActionRecord::parse(r#"click "12""#), Err(ParseError::Syntax(_))));
        assert!(matches!(ActionRecord::parse(r#"click("12") and more"#), Err(ParseError::Syntax(_))));
        assert!(matches!(ActionRecord::parse(r#"click("a",,"b")"#), Err(ParseError::Syntax(_))));
        assert_eq!(ActionRecord::parse("   "), Err(ParseError::Empty));
    }

    #[test]
    fn rejects_bid_with_spaces() {
        assert!(matches!(
            ActionRecord::parse(r#"click("search box")"#),
            Err(ParseError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn display_renders_canonical_call() {
        let record = ActionRecord::type_text("7", "hello \"you\"");
        let rendered = record.to_string();
        assert_eq!(rendered, r#"type("7", "hello \"you\"")"#);
        assert_eq!(ActionRecord::parse(&rendered).unwrap(), record);
    }

    #[test]
    fn record_serializes_with_op_tag() {
        let json = serde_json::to_string(&ActionRecord::click("5")).unwrap();
        assert_eq!(json, r#"{"op":"click","target":"5"}"#);
    }
}
