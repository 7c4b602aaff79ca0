//! Player and team registry.
//!
//! Owns every [`Player`] and [`Team`] for the lifetime of the process and
//! enforces the registration rules:
//!
//! - a display name belongs to at most one player id;
//! - re-registering a known id is a no-op;
//! - a team re-selection of the current team reports `NoChange`;
//! - each player has at most one answer per round, and only while that
//!   round is open.
//!
//! Teams are scanned in a fixed order (the order they were loaded in) and
//! the first matching team wins.

use std::collections::HashMap;

use crate::error::{MatcherError, RegistryError};
use crate::matcher::Matcher;
use crate::protocol::{HostSnapshot, Roster};
use crate::round::RoundState;
use crate::types::{Answer, Player, PlayerId, RoundId, Team, TeamAssignment, TeamHandle};

/// Result of a successful [`Registry::register_player`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration<'a> {
    /// A new player was created.
    Created(&'a Player),
    /// The id was already registered; nothing changed.
    Existing,
}

/// Result of a successful [`Registry::choose_team`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamChoice {
    Assigned(TeamAssignment),
    NoChange,
}

#[derive(Debug, Default)]
pub struct Registry {
    players: HashMap<PlayerId, Player>,
    /// Display name → owning player id.
    names: HashMap<String, PlayerId>,
    teams: Vec<Team>,
    /// Answer keywords per playable round, used for grading.
    questions: HashMap<RoundId, Matcher>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Players ─────────────────────────────────────────────────────

    pub fn register_player(
        &mut self,
        id: PlayerId,
        name: &str,
    ) -> Result<Registration<'_>, RegistryError> {
        if self.players.contains_key(&id) {
            return Ok(Registration::Existing);
        }
        if let Some(owner) = self.names.get(name)
            && owner != &id
        {
            return Err(RegistryError::NameConflict {
                name: name.to_owned(),
            });
        }

        self.names.insert(name.to_owned(), id.clone());
        let player = self
            .players
            .entry(id.clone())
            .or_insert_with(|| Player::new(id, name));
        Ok(Registration::Created(player))
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Snapshot of every player, keyed by id.
    pub fn roster(&self) -> Roster {
        self.players
            .iter()
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect()
    }

    /// Replace the player set with a roster received from the gateway.
    /// Name ownership is rebuilt; on a duplicated name the first id (in
    /// roster order) keeps it.
    pub fn load_roster(&mut self, roster: Roster) {
        self.players.clear();
        self.names.clear();
        for (id, player) in roster {
            self.names
                .entry(player.name().to_owned())
                .or_insert_with(|| id.clone());
            self.players.insert(id, player);
        }
    }

    // ── Teams ───────────────────────────────────────────────────────

    pub fn load_teams(&mut self, teams: Vec<Team>) {
        self.teams = teams;
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    /// Resolve free text to a team and assign it to the player.
    pub fn choose_team(
        &mut self,
        player_id: &PlayerId,
        free_text: &str,
    ) -> Result<TeamChoice, RegistryError> {
        let player = self
            .players
            .get_mut(player_id)
            .ok_or_else(|| RegistryError::PlayerNotFound(player_id.clone()))?;

        let team = self
            .teams
            .iter()
            .find(|t| t.matches(free_text))
            .ok_or_else(|| RegistryError::TeamNotFound(free_text.to_owned()))?;

        if !player.assign_team(team.handle().clone()) {
            return Ok(TeamChoice::NoChange);
        }

        Ok(TeamChoice::Assigned(TeamAssignment {
            id: player_id.clone(),
            team: team.handle().clone(),
            display_name: team.display_name().to_owned(),
        }))
    }

    /// Apply a team decided elsewhere (the gateway mirrors the mediator's
    /// verdict). Returns `false` when the player already had that team.
    pub fn assign_team(
        &mut self,
        player_id: &PlayerId,
        team: TeamHandle,
    ) -> Result<bool, RegistryError> {
        self.players
            .get_mut(player_id)
            .map(|p| p.assign_team(team))
            .ok_or_else(|| RegistryError::PlayerNotFound(player_id.clone()))
    }

    // ── Answers ─────────────────────────────────────────────────────

    pub fn load_questions(&mut self, questions: HashMap<RoundId, Matcher>) {
        self.questions = questions;
    }

    /// Store an answer if its round is open and the player has not
    /// answered it yet. Returns the stored answer for forwarding.
    pub fn record_answer(
        &mut self,
        round: &RoundState,
        player_id: &PlayerId,
        answer: Answer,
    ) -> Result<&Answer, RegistryError> {
        let player = self
            .players
            .get_mut(player_id)
            .ok_or_else(|| RegistryError::PlayerNotFound(player_id.clone()))?;

        if !round.is_accepting_for(&answer.round) {
            return Err(RegistryError::RoundNotAcceptingSubmissions(answer.round));
        }
        if player.has_answered(&answer.round) {
            return Err(RegistryError::DuplicateSubmission {
                player: player_id.clone(),
                round: answer.round,
            });
        }

        let round_id = answer.round.clone();
        player
            .record_answer(answer)
            .ok_or(RegistryError::DuplicateSubmission {
                player: player_id.clone(),
                round: round_id,
            })
    }

    /// Grade an answer against its round's keywords. `None` when the round
    /// has no keyword set.
    pub fn grade(&self, answer: &Answer) -> Option<bool> {
        self.questions
            .get(&answer.round)
            .filter(|m| !m.keywords().is_empty())
            .map(|m| m.test(&answer.text))
    }

    // ── Host configuration ──────────────────────────────────────────

    /// Compile teams and question keywords from the host handshake.
    /// Collective teams and reserved rounds are skipped.
    pub fn configure(&mut self, snapshot: &HostSnapshot) -> Result<(), MatcherError> {
        let mut teams = Vec::with_capacity(snapshot.teams.len());
        for (handle, config) in &snapshot.teams {
            if config.collective {
                continue;
            }
            teams.push(Team::new(
                handle.clone(),
                config.short.clone(),
                Matcher::from_csv(&config.keyword)?,
            ));
        }

        let mut questions = HashMap::new();
        for (round, question) in &snapshot.content.questions {
            if round.is_reserved() {
                continue;
            }
            questions.insert(round.clone(), Matcher::from_csv(&question.answer.keyword)?);
        }

        self.load_teams(teams);
        self.load_questions(questions);
        Ok(())
    }
}
