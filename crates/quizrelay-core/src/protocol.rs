//! Event vocabulary and payload shapes exchanged between host, mediator and
//! gateway.
//!
//! Payloads arrive as untyped JSON from the link layer; the `parse`
//! functions here turn an `(event, data)` pair into a typed event or a
//! [`ProtocolError`].

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::{Answer, Player, PlayerId, RoundId, TeamAssignment, TeamHandle};

// ─── Event names ──────────────────────────────────────────────────

pub const HELO: &str = "helo";
pub const STATE: &str = "state";
pub const ON: &str = "on";
pub const OFF: &str = "off";
pub const TIMER: &str = "timer";
pub const PLAYER_NEW: &str = "player:new";
pub const PLAYER_TEAM: &str = "player:team";
pub const PLAYER_ANSWER: &str = "player:answer";
pub const PLAYERS_DUMP: &str = "players:dump";

/// Identity the mediator announces in its host handshake.
pub const HOST_CLIENT_ROLE: &str = "admin";

// ─── Host payloads ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostHello {
    pub me: String,
}

impl Default for HostHello {
    fn default() -> Self {
        Self {
            me: HOST_CLIENT_ROLE.to_owned(),
        }
    }
}

/// Which part of a round a lifecycle event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Item {
    Question,
    Answer,
    #[serde(other)]
    Other,
}

/// `on` / `off` payload, also the `current` field of the host snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub item: Item,
    #[serde(default)]
    pub number: RoundId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerTick {
    pub time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AnswerKeywords {
    #[serde(default)]
    pub keyword: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QuestionConfig {
    #[serde(default)]
    pub answer: AnswerKeywords,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub questions: BTreeMap<RoundId, QuestionConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TeamConfig {
    /// Display name.
    #[serde(default)]
    pub short: String,
    /// Comma-separated keyword variants.
    #[serde(default)]
    pub keyword: String,
    /// Collective (aggregate) teams cannot be chosen by the audience.
    #[serde(default)]
    pub collective: bool,
}

/// Reply to the mediator's host handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HostSnapshot {
    #[serde(default)]
    pub current: Option<Lifecycle>,
    #[serde(default)]
    pub content: Content,
    /// Keyed by team handle; decoded into a sorted map, which fixes the
    /// team scan order for the lifetime of the process.
    #[serde(default)]
    pub teams: BTreeMap<TeamHandle, TeamConfig>,
}

/// Events the host pushes to the mediator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    On(Lifecycle),
    Off(Lifecycle),
    Timer(TimerTick),
}

impl HostEvent {
    pub fn parse(event: &str, data: Value) -> Result<Self, ProtocolError> {
        match event {
            ON => Ok(Self::On(decode(event, data)?)),
            OFF => Ok(Self::Off(decode(event, data)?)),
            TIMER => Ok(Self::Timer(decode(event, data)?)),
            other => Err(ProtocolError::UnknownEvent(other.to_owned())),
        }
    }
}

// ─── Gateway payloads ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlayer {
    pub id: PlayerId,
    pub name: String,
}

/// Raw `player:team` request. Both fields are optional on the wire so a
/// missing field can be answered with a bad-request code instead of a
/// decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
}

impl TeamRequest {
    /// Both fields present and non-empty.
    pub fn validate(&self) -> Result<(&PlayerId, &str), ProtocolError> {
        let id = self
            .id
            .as_ref()
            .filter(|id| !id.as_str().is_empty())
            .ok_or(ProtocolError::MissingField {
                event: PLAYER_TEAM.to_owned(),
                field: "id",
            })?;
        let team = self
            .team
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ProtocolError::MissingField {
                event: PLAYER_TEAM.to_owned(),
                field: "team",
            })?;
        Ok((id, team))
    }
}

/// Outcome code of a `player:team` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeamOutcome {
    Assigned,
    NoChange,
    BadRequest,
    NotFound,
}

impl TeamOutcome {
    pub fn code(self) -> u16 {
        match self {
            Self::Assigned => 0,
            Self::NoChange => 204,
            Self::BadRequest => 400,
            Self::NotFound => 404,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Assigned),
            204 => Some(Self::NoChange),
            400 => Some(Self::BadRequest),
            404 => Some(Self::NotFound),
            _ => None,
        }
    }
}

/// Acknowledgment payload for `player:team`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamReply {
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamAssignment>,
}

impl TeamReply {
    pub fn assigned(assignment: TeamAssignment) -> Self {
        Self {
            code: TeamOutcome::Assigned.code(),
            team: Some(assignment),
        }
    }

    pub fn status(outcome: TeamOutcome) -> Self {
        Self {
            code: outcome.code(),
            team: None,
        }
    }

    pub fn outcome(&self) -> Option<TeamOutcome> {
        TeamOutcome::from_code(self.code)
    }
}

/// Team change notice the mediator sends to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamNotice {
    pub id: PlayerId,
    pub team: TeamHandle,
}

/// `player:answer` as sent by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSubmission {
    pub id: PlayerId,
    #[serde(default)]
    pub name: String,
    pub data: Answer,
}

/// `player:answer` as forwarded to the host, with the mediator's grading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradedAnswer {
    #[serde(flatten)]
    pub submission: AnswerSubmission,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,
}

/// Roster keyed by player id, as exchanged in `players:dump` and the
/// gateway handshake reply.
pub type Roster = BTreeMap<PlayerId, Player>;

/// Events the gateway pushes to the mediator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    NewPlayer(NewPlayer),
    Team(TeamRequest),
    Answer(AnswerSubmission),
}

impl GatewayEvent {
    pub fn parse(event: &str, data: Value) -> Result<Self, ProtocolError> {
        match event {
            PLAYER_NEW => Ok(Self::NewPlayer(decode(event, data)?)),
            PLAYER_TEAM => Ok(Self::Team(decode(event, data)?)),
            PLAYER_ANSWER => Ok(Self::Answer(decode(event, data)?)),
            other => Err(ProtocolError::UnknownEvent(other.to_owned())),
        }
    }
}

/// Decode a payload, tagging failures with the event name.
pub fn decode<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::Malformed {
        event: event.to_owned(),
        source,
    })
}
