//! Audience message parsing.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Minimum length, in characters, of a player or team name.
pub const MIN_NAME_LEN: usize = 4;

static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));
static PLAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^play\s+(.+?)\s*$").expect("valid play pattern"));
static TEAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^team\s+(.+?)\s*$").expect("valid team pattern"));

/// One inbound text message as delivered by the carrier adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceMessage {
    /// Carrier account the message was delivered to.
    pub account: String,
    /// Sender address; becomes the player id.
    pub from: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudienceCommand {
    /// `play <name>`
    Play(String),
    /// `team <name>`
    Team(String),
    /// Anything else.
    Answer(String),
}

impl AudienceCommand {
    /// Classify an already tag-stripped body.
    pub fn parse(text: &str) -> Self {
        if let Some(c) = TEAM.captures(text) {
            return Self::Team(c[1].to_owned());
        }
        if let Some(c) = PLAY.captures(text) {
            return Self::Play(c[1].to_owned());
        }
        Self::Answer(text.to_owned())
    }
}

pub fn strip_tags(body: &str) -> String {
    TAGS.replace_all(body, "").into_owned()
}

pub fn is_full_name(name: &str) -> bool {
    name.chars().count() >= MIN_NAME_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup() {
        assert_eq!(strip_tags("<b>team</b> Spartak<br/>"), "team Spartak");
        assert_eq!(strip_tags("1 < 2"), "1 < 2");
    }

    #[test]
    fn commands_are_case_insensitive() {
        assert_eq!(
            AudienceCommand::parse("PLAY Alice Smith"),
            AudienceCommand::Play("Alice Smith".into())
        );
        assert_eq!(
            AudienceCommand::parse("Team  spartak  "),
            AudienceCommand::Team("spartak".into())
        );
    }

    #[test]
    fn anything_else_is_an_answer() {
        assert_eq!(
            AudienceCommand::parse("Moscow"),
            AudienceCommand::Answer("Moscow".into())
        );
        assert_eq!(
            AudienceCommand::parse("player one"),
            AudienceCommand::Answer("player one".into())
        );
        assert_eq!(
            AudienceCommand::parse("team"),
            AudienceCommand::Answer("team".into())
        );
    }

    #[test]
    fn name_length_counts_characters() {
        assert!(is_full_name("Иван"));
        assert!(!is_full_name("Bob"));
    }
}
