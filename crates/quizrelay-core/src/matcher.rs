//! Keyword matcher: compiles configured keyword variants into one
//! case-insensitive pattern.
//!
//! Keywords come from host configuration and may contain any unicode or
//! punctuation, so every character is matched literally. The only
//! flexibility is whitespace: a run of whitespace inside a keyword matches
//! any run of whitespace in the input. Matching is containment, not a full
//! match, so `"spartak"` accepts `"I support Spartak!!"`.

use regex::{Regex, RegexBuilder};

use crate::error::MatcherError;

/// Compiled, immutable keyword set.
#[derive(Debug, Clone)]
pub struct Matcher {
    /// `None` when the keyword list had no usable entries.
    pattern: Option<Regex>,
    keywords: Vec<String>,
}

impl Matcher {
    /// Compile a list of keyword variants. Blank entries are skipped.
    pub fn compile<I, S>(keywords: I) -> Result<Self, MatcherError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_owned())
            .filter(|k| !k.is_empty())
            .collect();

        if keywords.is_empty() {
            return Ok(Self {
                pattern: None,
                keywords,
            });
        }

        let alternation = keywords
            .iter()
            .map(|k| keyword_pattern(k))
            .collect::<Vec<_>>()
            .join("|");

        let pattern = RegexBuilder::new(&format!("(?:{alternation})"))
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            pattern: Some(pattern),
            keywords,
        })
    }

    /// Compile a comma-separated keyword list, the form used in host
    /// configuration (`"Moscow, Москва"`).
    pub fn from_csv(list: &str) -> Result<Self, MatcherError> {
        Self::compile(list.split(','))
    }

    /// A matcher that never matches.
    pub fn empty() -> Self {
        Self {
            pattern: None,
            keywords: Vec::new(),
        }
    }

    pub fn test(&self, input: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(input))
    }

    /// The trimmed keyword variants this matcher was built from.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

/// Literal pattern for one trimmed keyword; inner whitespace runs become
/// `\s+`.
fn keyword_pattern(keyword: &str) -> String {
    keyword
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+")
}
