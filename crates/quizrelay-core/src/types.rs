use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::matcher::Matcher;

// ─── Identifiers ──────────────────────────────────────────────────

/// Prefix of the reserved round class (playoff rounds). Reserved rounds
/// never open for audience submissions.
pub const RESERVED_ROUND_PREFIX: &str = "playoff ";

/// Opaque round identifier.
///
/// On the wire a round number is either a JSON number (`5`) or a string
/// (`"playoff 2"`). The canonical form is the trimmed text; all-digit ids
/// serialize back to numbers. `0` and the empty string mean "no round".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoundId(String);

impl RoundId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let text = raw.as_ref().trim();
        if !text.is_empty()
            && text.bytes().all(|b| b.is_ascii_digit())
            && let Ok(n) = text.parse::<u64>()
        {
            return Self::from(n);
        }
        Self(text.to_owned())
    }

    pub fn unset() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unset(&self) -> bool {
        self.0.is_empty() || self.0.bytes().all(|b| b == b'0')
    }

    pub fn is_reserved(&self) -> bool {
        self.0.starts_with(RESERVED_ROUND_PREFIX)
    }

    /// A round that may be armed: set and outside the reserved class.
    pub fn is_playable(&self) -> bool {
        !self.is_unset() && !self.is_reserved()
    }

    fn as_number(&self) -> Option<u64> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.0.parse().ok()
    }
}

impl From<u64> for RoundId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl From<&str> for RoundId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("0")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl Serialize for RoundId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_empty() {
            return serializer.serialize_u64(0);
        }
        match self.as_number() {
            Some(n) => serializer.serialize_u64(n),
            None => serializer.serialize_str(&self.0),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRoundId {
    Number(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for RoundId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<RawRoundId>::deserialize(deserializer)? {
            Some(RawRoundId::Number(n)) => Self::from(n),
            Some(RawRoundId::Text(s)) => Self::new(s),
            None => Self::unset(),
        })
    }
}

/// External participant identifier (the audience member's address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamHandle(String);

impl TeamHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Answer ───────────────────────────────────────────────────────

/// A stored round submission. Never mutated once it sits in a
/// [`Player`]'s answer map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    #[serde(rename = "number")]
    pub round: RoundId,
    #[serde(default)]
    pub elapsed_nanos: u64,
    pub text: String,
}

impl Answer {
    pub fn new(round: RoundId, elapsed_nanos: u64, text: impl Into<String>) -> Self {
        Self {
            round,
            elapsed_nanos,
            text: text.into(),
        }
    }
}

// ─── Player ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    id: PlayerId,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    team: Option<TeamHandle>,
    #[serde(default)]
    answered: BTreeMap<RoundId, Answer>,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            team: None,
            answered: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &PlayerId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn team(&self) -> Option<&TeamHandle> {
        self.team.as_ref()
    }

    pub fn answers(&self) -> &BTreeMap<RoundId, Answer> {
        &self.answered
    }

    pub fn has_answered(&self, round: &RoundId) -> bool {
        self.answered.contains_key(round)
    }

    /// Set the favourite team. Returns `false` when the player already
    /// supports `handle` (nothing changed).
    pub fn assign_team(&mut self, handle: TeamHandle) -> bool {
        if self.team.as_ref() == Some(&handle) {
            return false;
        }
        self.team = Some(handle);
        true
    }

    /// Store an answer unless the round already has one. The first answer
    /// for a round always wins.
    pub fn record_answer(&mut self, answer: Answer) -> Option<&Answer> {
        match self.answered.entry(answer.round.clone()) {
            Entry::Vacant(slot) => Some(slot.insert(answer)),
            Entry::Occupied(_) => None,
        }
    }
}

// ─── Team ─────────────────────────────────────────────────────────

/// A team the audience can support. Built once from the host handshake.
#[derive(Debug, Clone)]
pub struct Team {
    handle: TeamHandle,
    display_name: String,
    matcher: Matcher,
}

impl Team {
    pub fn new(handle: TeamHandle, display_name: impl Into<String>, matcher: Matcher) -> Self {
        Self {
            handle,
            display_name: display_name.into(),
            matcher,
        }
    }

    pub fn handle(&self) -> &TeamHandle {
        &self.handle
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn matches(&self, free_text: &str) -> bool {
        self.matcher.test(free_text)
    }
}

/// Successful team selection, returned to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamAssignment {
    pub id: PlayerId,
    pub team: TeamHandle,
    pub display_name: String,
}

// ─── Round snapshot ───────────────────────────────────────────────

/// The part of the round state the gateway needs: is a round open, and
/// which one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub number: RoundId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_id_numeric_roundtrips_as_number() {
        let id: RoundId = serde_json::from_str("5").unwrap();
        assert_eq!(id, RoundId::from(5));
        assert_eq!(serde_json::to_string(&id).unwrap(), "5");
    }

    #[test]
    fn round_id_text_stays_text() {
        let id: RoundId = serde_json::from_str("\"playoff 2\"").unwrap();
        assert!(id.is_reserved());
        assert!(!id.is_playable());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"playoff 2\"");
    }

    #[test]
    fn round_id_numeric_string_equals_number() {
        let a: RoundId = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(a, RoundId::from(7));
    }

    #[test]
    fn round_id_leading_zeros_collapse() {
        let padded = RoundId::new("05");
        assert_eq!(padded, RoundId::from(5));
        let json = serde_json::to_string(&padded).unwrap();
        assert_eq!(json, "5");
        assert_eq!(serde_json::from_str::<RoundId>(&json).unwrap(), padded);
        assert_eq!(RoundId::new(" 007 ").as_str(), "7");
    }

    #[test]
    fn round_id_unset_forms() {
        assert!(RoundId::unset().is_unset());
        assert!(RoundId::from(0).is_unset());
        let null: RoundId = serde_json::from_str("null").unwrap();
        assert!(null.is_unset());
        assert_eq!(serde_json::to_string(&RoundId::unset()).unwrap(), "0");
    }

    #[test]
    fn player_answer_map_uses_round_keys() {
        let mut player = Player::new(PlayerId::new("+100"), "Alice");
        player.record_answer(Answer::new(RoundId::from(3), 12, "moscow"));
        let json = serde_json::to_value(&player).unwrap();
        assert_eq!(json["answered"]["3"]["text"], "moscow");
        assert_eq!(json["answered"]["3"]["elapsedNanos"], 12);

        let back: Player = serde_json::from_value(json).unwrap();
        assert!(back.has_answered(&RoundId::from(3)));
    }

    #[test]
    fn player_first_answer_wins() {
        let mut player = Player::new(PlayerId::new("+100"), "Alice");
        assert!(
            player
                .record_answer(Answer::new(RoundId::from(1), 5, "first"))
                .is_some()
        );
        assert!(
            player
                .record_answer(Answer::new(RoundId::from(1), 9, "second"))
                .is_none()
        );
        assert_eq!(player.answers()[&RoundId::from(1)].text, "first");
    }

    #[test]
    fn player_assign_same_team_is_noop() {
        let mut player = Player::new(PlayerId::new("+100"), "Alice");
        assert!(player.assign_team(TeamHandle::new("A")));
        assert!(!player.assign_team(TeamHandle::new("A")));
        assert!(player.assign_team(TeamHandle::new("B")));
        assert_eq!(player.team(), Some(&TeamHandle::new("B")));
    }
}
