use regex::Regex;
use std::sync::LazyLock;

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)\}").expect("valid reference pattern")
});

/// One piece of a template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    /// Path segments of a `${a.b.c}` reference.
    Reference(Vec<String>),
}

impl Token {
    pub fn reference(&self) -> Option<&[String]> {
        match self {
            Token::Reference(path) => Some(path),
            Token::Literal(_) => None,
        }
    }
}

/// Splits `text` into literal runs and `${...}` references.
///
/// Characters that do not complete a reference stay in the surrounding literal.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for caps in REFERENCE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            tokens.push(Token::Literal(text[last..whole.start()].to_string()));
        }
        let path = caps[1].split('.').map(str::to_string).collect();
        tokens.push(Token::Reference(path));
        last = whole.end();
    }
    if last < text.len() {
        tokens.push(Token::Literal(text[last..].to_string()));
    }
    tokens
}

/// All reference paths found in `text`, in order of appearance.
pub fn references(text: &str) -> Vec<Vec<String>> {
    tokenize(text)
        .into_iter()
        .filter_map(|t| match t {
            Token::Reference(path) => Some(path),
            Token::Literal(_) => None,
        })
        .collect()
}

/// The path of `text` if it is exactly one reference and nothing else.
pub fn single_reference(text: &str) -> Option<Vec<String>> {
    let mut tokens = tokenize(text);
    if tokens.len() == 1 {
        if let Some(Token::Reference(path)) = tokens.pop() {
            return Some(path);
        }
    }
    None
}

pub fn format_reference(path: &[String]) -> String {
    format!("${{{}}}", path.join("."))
}
