//! The gateway context: player cache, mirrored round state, master link.
//!
//! Audience messages are handled locally first (name checks, answer
//! acceptance, duplicate suppression) and then forwarded to the master
//! (the mediator). Team choices are the exception: only the master knows
//! the teams, so the node sends a request and applies the verdict when the
//! reply comes back through [`GatewayNode::on_team_reply`].

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;

use quizrelay_core::protocol::{
    self, AnswerSubmission, HELO, NewPlayer, PLAYER_ANSWER, PLAYER_NEW, PLAYER_TEAM, STATE,
    TeamOutcome, TeamReply, TeamRequest,
};
use quizrelay_core::types::{Answer, PlayerId, RoundSnapshot};
use quizrelay_core::{Registration, Registry, RegistryError, RoundState};
use quizrelay_link::{DrainStep, Inbound, Link, LinkError, LinkState, PeerHandle, Responder};

use crate::command::{self, AudienceCommand, AudienceMessage};
use crate::error::StoreError;
use crate::outbox::{Notice, Outbox};
use crate::store::{KvStore, Persister};

const REGISTER_HINT: &str = "Please register your name by sending \"play Your Name\".";
const SHORT_NAME: &str = "Please enter at least 4 characters for your name.";
const SHORT_TEAM: &str = "Please provide full team name.";

/// A team request waiting for the master's verdict.
#[derive(Debug)]
pub struct PendingTeam {
    pub player: PlayerId,
    pub requested: String,
    pub reply: oneshot::Receiver<Value>,
}

pub struct GatewayNode<S, O> {
    account: String,
    registry: Registry,
    round: RoundState,
    master: Link,
    /// Connection id and link generation of the current master.
    master_conn: Option<(u64, u64)>,
    /// Connected peers that have not (yet) identified as master.
    peers: HashMap<u64, PeerHandle>,
    store: Persister<S>,
    outbox: O,
}

impl<S: KvStore, O: Outbox> GatewayNode<S, O> {
    /// `account` is the carrier account audience messages must be
    /// addressed to.
    pub fn new(account: impl Into<String>, store: Persister<S>, outbox: O) -> Self {
        Self {
            account: account.into(),
            registry: Registry::new(),
            round: RoundState::new(),
            master: Link::new("master"),
            master_conn: None,
            peers: HashMap::new(),
            store,
            outbox,
        }
    }

    /// Rebuild the player cache from the attached store.
    pub fn load_players(&mut self) -> Result<usize, StoreError> {
        let players = self.store.load_players()?;
        let count = players.len();
        self.registry.load_roster(
            players
                .into_iter()
                .map(|p| (p.id().clone(), p))
                .collect(),
        );
        tracing::info!(players = count, "player cache loaded");
        Ok(count)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn round(&self) -> &RoundState {
        &self.round
    }

    pub fn master(&self) -> &Link {
        &self.master
    }

    pub fn outbox(&self) -> &O {
        &self.outbox
    }

    pub fn outbox_mut(&mut self) -> &mut O {
        &mut self.outbox
    }

    pub fn store(&self) -> &Persister<S> {
        &self.store
    }

    // ─── Master side ──────────────────────────────────────────────

    pub fn peer_connected(&mut self, conn: u64, handle: PeerHandle) {
        tracing::debug!(conn, "peer connected");
        self.peers.insert(conn, handle);
    }

    pub fn peer_disconnected(&mut self, conn: u64) {
        self.peers.remove(&conn);
        if let Some((master_conn, generation)) = self.master_conn
            && master_conn == conn
        {
            self.master_conn = None;
            self.master.detach(generation);
        }
    }

    /// Handle a message from a connected peer. Returns `true` when the
    /// master link has a backlog to replay.
    pub fn on_peer(&mut self, conn: u64, inbound: Inbound) -> bool {
        let Inbound {
            event,
            data,
            responder,
        } = inbound;

        if event == HELO {
            return self.on_master_hello(conn, data, responder);
        }
        if self.master_conn.map(|(c, _)| c) != Some(conn) {
            tracing::debug!(conn, event = %event, "ignoring event from non-master peer");
            return false;
        }

        match event.as_str() {
            STATE => match protocol::decode::<RoundSnapshot>(STATE, data) {
                Ok(snapshot) => {
                    tracing::info!(ready = snapshot.ready, round = %snapshot.number, "round state");
                    self.round.apply_snapshot(snapshot);
                }
                Err(e) => tracing::warn!(error = %e, "dropping state"),
            },
            other => tracing::debug!(event = other, "ignoring master event"),
        }
        false
    }

    fn on_master_hello(
        &mut self,
        conn: u64,
        data: Value,
        responder: Option<Responder>,
    ) -> bool {
        let Some(handle) = self.peers.get(&conn).cloned() else {
            tracing::warn!(conn, "helo from unknown connection");
            return false;
        };
        let snapshot: RoundSnapshot = match protocol::decode(HELO, data) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(conn, error = %e, "malformed master helo");
                return false;
            }
        };

        let generation = self.master.attach(handle);
        self.master_conn = Some((conn, generation));

        if let Some(responder) = responder
            && let Err(e) = responder.reply(&self.registry.roster())
        {
            tracing::warn!(conn, error = %e, "roster reply not delivered");
        }
        self.round.apply_snapshot(snapshot);
        tracing::info!(
            conn,
            generation,
            ready = self.round.is_ready(),
            round = %self.round.number(),
            "master joined"
        );
        self.master.complete_handshake(generation)
    }

    /// Replay one queued master message. Returns `true` while more remain.
    pub fn drain_master(&mut self) -> bool {
        if self.master.drain_step() == DrainStep::Stalled {
            return false;
        }
        self.master.state() == LinkState::Draining
    }

    // ─── Audience side ────────────────────────────────────────────

    /// Handle one audience message. Returns a pending team request when
    /// the master has to decide.
    pub fn on_audience(&mut self, msg: AudienceMessage) -> Option<PendingTeam> {
        if msg.account != self.account {
            tracing::debug!(account = %msg.account, "message for another account ignored");
            return None;
        }
        let text = command::strip_tags(&msg.body).trim().to_owned();
        if text.is_empty() {
            return None;
        }
        let from = PlayerId::new(msg.from);

        if self.registry.player(&from).is_some() {
            match AudienceCommand::parse(&text) {
                AudienceCommand::Team(name) => return self.request_team(from, name),
                AudienceCommand::Play(_) | AudienceCommand::Answer(_) => {
                    self.submit_answer(from, text)
                }
            }
        } else {
            match AudienceCommand::parse(&text) {
                AudienceCommand::Play(name) => self.register(from, name),
                AudienceCommand::Team(_) | AudienceCommand::Answer(_) => {
                    self.notify(&from, REGISTER_HINT)
                }
            }
        }
        None
    }

    fn register(&mut self, from: PlayerId, name: String) {
        if !command::is_full_name(&name) {
            self.notify(&from, SHORT_NAME);
            return;
        }
        match self.registry.register_player(from.clone(), &name) {
            Ok(Registration::Created(player)) => {
                let player = player.clone();
                tracing::info!(player = %from, name = %name, "new player");
                self.store.put_player(&player);
                self.store.put_name_ref(&player);
                self.emit(
                    PLAYER_NEW,
                    &NewPlayer {
                        id: from,
                        name: player.name().to_owned(),
                    },
                );
            }
            Ok(Registration::Existing) => {}
            Err(RegistryError::NameConflict { name }) => {
                let text = format!("Please choose different name, \"{name}\" already taken.");
                self.notify(&from, &text);
            }
            Err(e) => tracing::warn!(player = %from, error = %e, "registration failed"),
        }
    }

    fn request_team(&mut self, from: PlayerId, name: String) -> Option<PendingTeam> {
        if !command::is_full_name(&name) {
            self.notify(&from, SHORT_TEAM);
            return None;
        }
        let request = TeamRequest {
            id: Some(from.clone()),
            team: Some(name.clone()),
        };
        let data = match serde_json::to_value(&request) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(player = %from, error = %e, "team request not serializable");
                return None;
            }
        };
        let reply = self.master.request(PLAYER_TEAM, data);
        Some(PendingTeam {
            player: from,
            requested: name,
            reply,
        })
    }

    /// Apply the master's verdict on a team request.
    pub fn on_team_reply(
        &mut self,
        player: PlayerId,
        requested: &str,
        reply: Result<Value, LinkError>,
    ) {
        let reply: TeamReply = match reply
            .map_err(|e| e.to_string())
            .and_then(|v| protocol::decode::<TeamReply>(PLAYER_TEAM, v).map_err(|e| e.to_string()))
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(player = %player, error = %e, "team reply lost");
                return;
            }
        };

        match (reply.outcome(), reply.team) {
            (Some(TeamOutcome::Assigned), Some(assignment)) => {
                match self.registry.assign_team(&player, assignment.team) {
                    Ok(_) => {
                        if let Some(p) = self.registry.player(&player) {
                            let p = p.clone();
                            self.store.put_player(&p);
                        }
                        let text = format!("Your favorite team is \"{}\".", assignment.display_name);
                        self.notify(&player, &text);
                    }
                    Err(e) => tracing::warn!(player = %player, error = %e, "team not applied"),
                }
            }
            (Some(TeamOutcome::NoChange), _) => {}
            (Some(TeamOutcome::BadRequest), _) => {
                let text = format!("Unable to register provided team \"{requested}\".");
                self.notify(&player, &text);
            }
            (Some(TeamOutcome::NotFound), _) => {
                let text = format!("Unable to find requested team \"{requested}\".");
                self.notify(&player, &text);
            }
            (outcome, _) => {
                tracing::warn!(player = %player, code = reply.code, ?outcome, "unrecognized team reply");
            }
        }
    }

    fn submit_answer(&mut self, from: PlayerId, text: String) {
        let answer = Answer::new(
            self.round.number().clone(),
            self.round.elapsed_nanos(),
            text,
        );
        let stored = match self.registry.record_answer(&self.round, &from, answer) {
            Ok(a) => a.clone(),
            Err(e) if e.is_silent() => {
                tracing::debug!(player = %from, error = %e, "answer dropped");
                return;
            }
            Err(e) => {
                tracing::warn!(player = %from, error = %e, "answer rejected");
                return;
            }
        };

        let Some(player) = self.registry.player(&from).cloned() else {
            return;
        };
        tracing::info!(player = %from, round = %stored.round, "answer");
        self.store.put_player(&player);
        self.emit(
            PLAYER_ANSWER,
            &AnswerSubmission {
                id: from,
                name: player.name().to_owned(),
                data: stored,
            },
        );
    }

    fn notify(&mut self, to: &PlayerId, text: &str) {
        self.outbox.send(Notice::new(to.as_str(), text));
    }

    fn emit<T: Serialize>(&mut self, event: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(data) => self.master.emit(event, data),
            Err(e) => tracing::error!(event, error = %e, "payload not serializable"),
        }
    }
}
