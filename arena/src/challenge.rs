//! Challenge and attempt parsing.
//!
//! Pure functions over model output; nothing here touches the network or the
//! verifier, and nothing here fails loudly. Malformed input yields an empty
//! [`Challenge`] or [`Candidate::Missing`], which the match engine turns into
//! an `unparseable` round or a `fail` verdict.
//!
//! # Grammar
//!
//! ```text
//! response   := .* START block END .*        (see block selection below)
//! START      := "[Start of code]"
//! END        := "[End of code]"
//! block      := line*
//! line       := visible-marker | hidden-marker | assertion | other
//! visible-marker := ws* "#" ws* "Visible test cases" .*   (case-insensitive)
//! hidden-marker  := ws* "#" ws* "Hidden test cases" .*    (case-insensitive)
//! assertion  := ws* "assert" (ws | "(") .*
//! ```
//!
//! A block whose `START` and `END` each sit on a line of their own wins over
//! tags mentioned inline in prose; the first such block is taken. Without
//! one, the last inline `START`…`END` span is used, and without any span the
//! whole text is parsed.
//!
//! Assertions before any marker count as visible. Each kept assertion is
//! trimmed and has any trailing `# comment` removed (string literals are
//! respected). If the block declares `def test_<name>():` and `<name>` is
//! not `X`, calls to `<name>(` are rewritten to `X(` so the predicates match
//! the function every attempt is asked to define. Otherwise, if every
//! assertion that opens with a call calls the same single non-builtin name,
//! that name is taken to be the function under test and renamed to `X`.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const CODE_START: &str = "[Start of code]";
pub const CODE_END: &str = "[End of code]";

/// Name every challenge function must use.
pub const FUNCTION_NAME: &str = "X";

/// Visible and hidden test predicates for an implicit function `X`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Shown to whoever attempts the challenge.
    pub visible: Vec<String>,
    /// Withheld until verification.
    pub hidden: Vec<String>,
}

impl Challenge {
    /// A challenge with no predicates at all cannot be played.
    pub fn is_valid(&self) -> bool {
        !(self.visible.is_empty() && self.hidden.is_empty())
    }

    /// Visible predicates joined one per line, as shown in the attempt prompt.
    pub fn visible_listing(&self) -> String {
        self.visible.join("\n")
    }

    pub fn len(&self) -> usize {
        self.visible.len() + self.hidden.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Candidate solution extracted from an attempt response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "code")]
pub enum Candidate {
    Code(String),
    /// No delimited code block was found; always verifies as `fail`.
    Missing,
}

impl Candidate {
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Code(code) => Some(code),
            Self::Missing => None,
        }
    }
}

static VISIBLE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^#\s*visible\s+test\s+cases").expect("VISIBLE_MARKER_RE regex should compile")
});

static HIDDEN_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^#\s*hidden\s+test\s+cases").expect("HIDDEN_MARKER_RE regex should compile")
});

/// Matches `def test_<name>(` and captures `<name>`.
static TEST_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^def\s+test_(\w+)\s*\(").expect("TEST_DECL_RE regex should compile")
});

/// Matches `assert <name>(` and captures `<name>`.
static LEADING_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^assert\s*\(?\s*([A-Za-z_]\w*)\s*\(").expect("LEADING_CALL_RE regex should compile")
});

/// Callees that never name the function under test.
const BUILTINS: &[&str] = &[
    "abs", "all", "any", "bool", "callable", "dict", "float", "frozenset", "int", "isinstance",
    "len", "list", "max", "min", "repr", "round", "set", "sorted", "str", "sum", "tuple", "type",
];

/// The delimited code block of `text`, trimmed.
///
/// Prefers the first block whose tags stand on their own lines, so prose
/// such as "between [Start of code] and [End of code]" is skipped. Falls back
/// to the last inline span.
pub fn extract_code_block(text: &str) -> Option<&str> {
    own_line_block(text).or_else(|| last_inline_block(text))
}

fn own_line_block(text: &str) -> Option<&str> {
    let mut offset = 0;
    let mut body_start: Option<usize> = None;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        match body_start {
            None if trimmed == CODE_START => body_start = Some(offset + line.len()),
            Some(start) if trimmed == CODE_END => return Some(text[start..offset].trim()),
            _ => {}
        }
        offset += line.len();
    }
    None
}

fn last_inline_block(text: &str) -> Option<&str> {
    text.rmatch_indices(CODE_START).find_map(|(idx, _)| {
        let start = idx + CODE_START.len();
        let len = text[start..].find(CODE_END)?;
        Some(text[start..start + len].trim())
    })
}

/// Extract visible and hidden predicates from a challenge response.
///
/// Never fails: unrecognisable input produces an empty (invalid) challenge.
pub fn parse_challenge(raw: &str) -> Challenge {
    let body = extract_code_block(raw).unwrap_or(raw);

    let mut challenge = Challenge::default();
    let mut in_hidden = false;
    let mut declared_name: Option<String> = None;

    for line in body.lines() {
        let trimmed = line.trim();
        if VISIBLE_MARKER_RE.is_match(trimmed) {
            in_hidden = false;
            continue;
        }
        if HIDDEN_MARKER_RE.is_match(trimmed) {
            in_hidden = true;
            continue;
        }
        if declared_name.is_none() {
            if let Some(caps) = TEST_DECL_RE.captures(trimmed) {
                declared_name = Some(caps[1].to_string());
                continue;
            }
        }
        if !is_assertion(trimmed) {
            continue;
        }

        let predicate = strip_trailing_comment(trimmed).trim_end().to_string();
        if in_hidden {
            challenge.hidden.push(predicate);
        } else {
            challenge.visible.push(predicate);
        }
    }

    let target = declared_name
        .filter(|n| n != FUNCTION_NAME)
        .or_else(|| sole_leading_callee(&challenge));
    if let Some(name) = target {
        rename_function(&mut challenge.visible, &name);
        rename_function(&mut challenge.hidden, &name);
    }

    challenge
}

/// Extract the candidate code block from an attempt response.
pub fn parse_attempt(raw: &str) -> Candidate {
    match extract_code_block(raw) {
        Some(code) if !code.is_empty() => Candidate::Code(code.to_string()),
        _ => Candidate::Missing,
    }
}

/// The one non-builtin name called right after `assert`, if there is exactly one.
///
/// `None` when `X` is already called that way or when callees disagree.
fn sole_leading_callee(challenge: &Challenge) -> Option<String> {
    let mut callee: Option<&str> = None;
    for predicate in challenge.visible.iter().chain(challenge.hidden.iter()) {
        let Some(caps) = LEADING_CALL_RE.captures(predicate) else {
            continue;
        };
        let name = caps.get(1).map_or("", |m| m.as_str());
        if BUILTINS.contains(&name) {
            continue;
        }
        match callee {
            None => callee = Some(name),
            Some(seen) if seen == name => {}
            Some(_) => return None,
        }
    }
    callee.filter(|&n| n != FUNCTION_NAME).map(str::to_string)
}

fn is_assertion(line: &str) -> bool {
    line.strip_prefix("assert")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_whitespace() || c == '(')
}

/// Drop a trailing `# comment`, ignoring `#` inside string literals.
fn strip_trailing_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => quote = Some(ch),
                '#' => return &line[..idx],
                _ => {}
            },
        }
    }
    line
}

fn rename_function(predicates: &mut [String], from: &str) {
    let pattern = format!(r"\b{}\s*\(", regex::escape(from));
    let Ok(re) = Regex::new(&pattern) else {
        return;
    };
    let replacement = format!("{FUNCTION_NAME}(");
    for predicate in predicates.iter_mut() {
        *predicate = re.replace_all(predicate, replacement.as_str()).into_owned();
    }
}
