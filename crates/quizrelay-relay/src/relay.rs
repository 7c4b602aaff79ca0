//! The mediator context.
//!
//! Host events drive the round state, which is mirrored to the gateway.
//! Gateway events are validated against the registry and forwarded to the
//! host. Nothing here awaits: every outbound message goes through a
//! [`Link`], which either dispatches it or queues it for replay.

use serde::Serialize;
use serde_json::Value;

use quizrelay_core::protocol::{
    self, AnswerSubmission, GatewayEvent, GradedAnswer, HELO, HostEvent, HostHello, HostSnapshot,
    Item, Lifecycle, NewPlayer, PLAYER_ANSWER, PLAYER_NEW, PLAYER_TEAM, PLAYERS_DUMP, Roster,
    STATE, TeamNotice, TeamOutcome, TeamReply, TeamRequest,
};
use quizrelay_core::types::{Answer, PlayerId};
use quizrelay_core::{Registration, Registry, RegistryError, RoundState, TeamChoice};
use quizrelay_link::{DrainStep, Inbound, Link, LinkError, LinkState, Outbound, PeerHandle};
use tokio::sync::oneshot;

use crate::error::RelayError;
use crate::event::Side;

/// A `helo` in flight. The driver waits on `reply` and hands the result
/// back through [`Relay::complete_handshake`].
#[derive(Debug)]
pub struct PendingHandshake {
    pub side: Side,
    pub generation: u64,
    pub reply: oneshot::Receiver<Value>,
}

#[derive(Debug)]
pub struct Relay {
    registry: Registry,
    round: RoundState,
    host: Link,
    gateway: Link,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            round: RoundState::new(),
            host: Link::new(Side::Host.to_string()),
            gateway: Link::new(Side::Gateway.to_string()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn round(&self) -> &RoundState {
        &self.round
    }

    pub fn link(&self, side: Side) -> &Link {
        match side {
            Side::Host => &self.host,
            Side::Gateway => &self.gateway,
        }
    }

    fn link_mut(&mut self, side: Side) -> &mut Link {
        match side {
            Side::Host => &mut self.host,
            Side::Gateway => &mut self.gateway,
        }
    }

    // ─── Connection lifecycle ─────────────────────────────────────

    /// Attach a fresh connection and send it our `helo`.
    pub fn connect(
        &mut self,
        side: Side,
        handle: PeerHandle,
    ) -> Result<PendingHandshake, RelayError> {
        let payload = match side {
            Side::Host => serde_json::to_value(HostHello::default()).map_err(LinkError::from)?,
            Side::Gateway => serde_json::to_value(self.round.snapshot()).map_err(LinkError::from)?,
        };
        let (hello, reply) = Outbound::with_ack(HELO, payload);

        let link = self.link_mut(side);
        let generation = link.attach(handle);
        link.dispatch_now(hello).map_err(|_| LinkError::Closed)?;

        Ok(PendingHandshake {
            side,
            generation,
            reply,
        })
    }

    /// Apply the peer's `helo` reply. Returns `true` when the link has a
    /// backlog to replay. A stale generation is ignored.
    pub fn complete_handshake(
        &mut self,
        side: Side,
        generation: u64,
        reply: Value,
    ) -> Result<bool, RelayError> {
        let link = self.link(side);
        if !link.is_current(generation) || link.state() != LinkState::Handshaking {
            tracing::debug!(peer = %side, generation, "stale handshake reply ignored");
            return Ok(false);
        }

        match side {
            Side::Host => self.adopt_host_snapshot(reply)?,
            Side::Gateway => self.adopt_gateway_roster(reply)?,
        }

        let needs_drain = self.link_mut(side).complete_handshake(generation);
        tracing::info!(
            peer = %side,
            generation,
            players = self.registry.player_count(),
            teams = self.registry.teams().len(),
            "handshake complete"
        );

        if side == Side::Host {
            // The gateway mirrors whatever round the host reported.
            self.forward_state();
        }
        Ok(needs_drain)
    }

    fn adopt_host_snapshot(&mut self, reply: Value) -> Result<(), RelayError> {
        let snapshot: HostSnapshot = protocol::decode(HELO, reply)?;
        self.registry.configure(&snapshot)?;

        match snapshot.current {
            Some(Lifecycle {
                item: Item::Question,
                number,
            }) if number.is_playable() => {
                self.round.arm(number);
            }
            _ => self.round.reset(),
        }

        // The host rebuilds its player table from this dump, so it must
        // precede any replayed player events.
        let dump = serde_json::to_value(self.registry.roster()).map_err(LinkError::from)?;
        self.host
            .dispatch_now(Outbound::event(PLAYERS_DUMP, dump))
            .map_err(|_| LinkError::Closed)?;
        Ok(())
    }

    fn adopt_gateway_roster(&mut self, reply: Value) -> Result<(), RelayError> {
        let roster: Roster = if reply.is_null() {
            Roster::new()
        } else {
            protocol::decode(HELO, reply)?
        };
        let previous = self.registry.roster();
        self.registry.load_roster(roster);
        self.announce_roster_changes(&previous);
        Ok(())
    }

    /// The gateway keeps accepting players and answers while we are away,
    /// and its roster already holds them by the time their queued events
    /// replay. Forward to the host whatever `previous` did not know, the
    /// same way the live events would have been forwarded.
    fn announce_roster_changes(&mut self, previous: &Roster) {
        let mut joined = Vec::new();
        let mut answered = Vec::new();
        for (id, player) in self.registry.roster() {
            let known = previous.get(&id);
            if known.is_none() {
                joined.push(NewPlayer {
                    id: id.clone(),
                    name: player.name().to_owned(),
                });
            }
            for (round, answer) in player.answers() {
                if known.is_some_and(|p| p.has_answered(round))
                    || !self.round.is_accepting_for(round)
                {
                    continue;
                }
                answered.push((id.clone(), player.name().to_owned(), answer.clone()));
            }
        }

        if !joined.is_empty() || !answered.is_empty() {
            tracing::info!(
                players = joined.len(),
                answers = answered.len(),
                "gateway roster brought submissions made while away"
            );
        }
        for notice in joined {
            self.emit(Side::Host, PLAYER_NEW, &notice);
        }
        for (id, name, answer) in answered {
            self.forward_answer(id, name, answer);
        }
    }

    /// The handshake did not finish; drop the connection.
    pub fn abandon_handshake(&mut self, side: Side, generation: u64, reason: &LinkError) {
        if self.link_mut(side).detach(generation) {
            tracing::warn!(peer = %side, generation, error = %reason, "handshake failed");
        }
    }

    pub fn disconnected(&mut self, side: Side, generation: u64) {
        self.link_mut(side).detach(generation);
    }

    /// Replay one queued message. Returns `true` while more remain.
    pub fn drain_step(&mut self, side: Side) -> bool {
        let link = self.link_mut(side);
        if link.drain_step() == DrainStep::Stalled {
            return false;
        }
        link.state() == LinkState::Draining
    }

    // ─── Inbound dispatch ─────────────────────────────────────────

    pub fn handle_inbound(&mut self, side: Side, inbound: Inbound) {
        let Inbound {
            event,
            data,
            responder,
        } = inbound;

        match side {
            Side::Host => match HostEvent::parse(&event, data) {
                Ok(ev) => self.on_host_event(ev),
                Err(e) => tracing::warn!(peer = %side, error = %e, "dropping host event"),
            },
            Side::Gateway => match GatewayEvent::parse(&event, data) {
                Ok(GatewayEvent::NewPlayer(p)) => self.on_new_player(p),
                Ok(GatewayEvent::Team(req)) => {
                    let reply = self.on_team_request(&req);
                    match responder {
                        Some(responder) => {
                            if let Err(e) = responder.reply(&reply) {
                                tracing::warn!(peer = %side, error = %e, "team reply not delivered");
                            }
                        }
                        None => tracing::debug!(code = reply.code, "team request without ack"),
                    }
                }
                Ok(GatewayEvent::Answer(sub)) => self.on_answer(sub),
                Err(e) => {
                    tracing::warn!(peer = %side, error = %e, "dropping gateway event");
                    // A malformed team request still gets its verdict.
                    if event == PLAYER_TEAM
                        && let Some(responder) = responder
                        && let Err(e) = responder.reply(&TeamReply::status(TeamOutcome::BadRequest))
                    {
                        tracing::warn!(peer = %side, error = %e, "team reply not delivered");
                    }
                }
            },
        }
    }

    // ── Host policy ─────────────────────────────────────────────────

    fn on_host_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::On(Lifecycle {
                item: Item::Question,
                number,
            }) => {
                if self.round.arm(number.clone()) {
                    tracing::info!(round = %number, "round armed");
                    self.forward_state();
                } else {
                    tracing::debug!(round = %number, "round not playable, ignored");
                }
            }
            HostEvent::On(Lifecycle {
                item: Item::Answer, ..
            }) => {
                self.round.disarm();
                tracing::info!(round = %self.round.number(), "round closed");
                self.forward_state();
            }
            HostEvent::Off(Lifecycle {
                item: Item::Question | Item::Answer,
                ..
            }) => {
                self.round.reset();
                tracing::info!("round reset");
                self.forward_state();
            }
            HostEvent::On(_) | HostEvent::Off(_) => {}
            HostEvent::Timer(tick) => self.round.set_timer(tick.time),
        }
    }

    fn forward_state(&mut self) {
        let snapshot = self.round.snapshot();
        self.emit(Side::Gateway, STATE, &snapshot);
    }

    // ── Gateway policy ──────────────────────────────────────────────

    fn on_new_player(&mut self, NewPlayer { id, name }: NewPlayer) {
        match self.registry.register_player(id.clone(), &name) {
            Ok(Registration::Created(player)) => {
                tracing::info!(player = %id, name = %name, "player registered");
                let notice = NewPlayer {
                    id: player.id().clone(),
                    name: player.name().to_owned(),
                };
                self.emit(Side::Host, PLAYER_NEW, &notice);
            }
            Ok(Registration::Existing) => {
                tracing::debug!(player = %id, "player already registered");
            }
            Err(e) => tracing::warn!(player = %id, error = %e, "registration rejected"),
        }
    }

    fn on_team_request(&mut self, req: &TeamRequest) -> TeamReply {
        let (id, text) = match req.validate() {
            Ok(fields) => fields,
            Err(e) => {
                tracing::debug!(error = %e, "team request rejected");
                return TeamReply::status(TeamOutcome::BadRequest);
            }
        };

        match self.registry.choose_team(id, text) {
            Ok(TeamChoice::Assigned(assignment)) => {
                tracing::info!(player = %id, team = %assignment.team, "team assigned");
                let notice = TeamNotice {
                    id: assignment.id.clone(),
                    team: assignment.team.clone(),
                };
                self.emit(Side::Host, PLAYER_TEAM, &notice);
                TeamReply::assigned(assignment)
            }
            Ok(TeamChoice::NoChange) => TeamReply::status(TeamOutcome::NoChange),
            Err(RegistryError::TeamNotFound(_)) => TeamReply::status(TeamOutcome::NotFound),
            Err(e) => {
                tracing::debug!(player = %id, error = %e, "team request rejected");
                TeamReply::status(TeamOutcome::BadRequest)
            }
        }
    }

    fn on_answer(&mut self, AnswerSubmission { id, name, data }: AnswerSubmission) {
        let answer = match self.registry.record_answer(&self.round, &id, data) {
            Ok(answer) => answer.clone(),
            Err(e) if e.is_silent() => {
                tracing::debug!(player = %id, error = %e, "answer dropped");
                return;
            }
            Err(e) => {
                tracing::warn!(player = %id, error = %e, "answer rejected");
                return;
            }
        };

        self.forward_answer(id, name, answer);
    }

    fn forward_answer(&mut self, id: PlayerId, name: String, answer: Answer) {
        let correct = self.registry.grade(&answer);
        tracing::info!(player = %id, round = %answer.round, ?correct, "answer recorded");
        let graded = GradedAnswer {
            submission: AnswerSubmission {
                id,
                name,
                data: answer,
            },
            correct,
        };
        self.emit(Side::Host, PLAYER_ANSWER, &graded);
    }

    fn emit<T: Serialize>(&mut self, side: Side, event: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(data) => self.link_mut(side).emit(event, data),
            Err(e) => tracing::error!(peer = %side, event, error = %e, "payload not serializable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizrelay_core::types::RoundId;
    use quizrelay_link::Outgoing;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn take(rx: &mut UnboundedReceiver<Outgoing>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Outgoing::Emit(m) = msg {
                out.push(m);
            }
        }
        out
    }

    // ── 1. Host handshake ───────────────────────────────────────────

    #[test]
    fn host_handshake_arms_current_round_and_dumps_roster() {
        let mut relay = Relay::new();
        let (handle, mut rx) = PeerHandle::channel();
        let pending = relay.connect(Side::Host, handle).unwrap();

        let sent = take(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event, HELO);
        assert_eq!(sent[0].data, json!({"me": "admin"}));
        assert!(sent[0].ack.is_some());

        let reply = json!({
            "current": {"item": "question", "number": 4},
            "content": {"questions": {}},
            "teams": {"a": {"short": "Spartak", "keyword": "spartak"}}
        });
        assert!(
            !relay
                .complete_handshake(Side::Host, pending.generation, reply)
                .unwrap()
        );

        assert!(relay.round().is_accepting_for(&RoundId::from(4)));
        let sent = take(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event, PLAYERS_DUMP);
        assert!(relay.link(Side::Host).is_usable());
        // Gateway is not connected yet: the state waits in its queue.
        assert_eq!(relay.link(Side::Gateway).pending(), 1);
    }

    #[test]
    fn host_handshake_with_playoff_round_resets() {
        let mut relay = Relay::new();
        let (handle, _rx) = PeerHandle::channel();
        let pending = relay.connect(Side::Host, handle).unwrap();
        let reply = json!({"current": {"item": "question", "number": "playoff 1"}});
        relay
            .complete_handshake(Side::Host, pending.generation, reply)
            .unwrap();
        assert!(!relay.round().is_ready());
        assert!(relay.round().number().is_unset());
    }

    #[test]
    fn malformed_host_snapshot_is_an_error() {
        let mut relay = Relay::new();
        let (handle, _rx) = PeerHandle::channel();
        let pending = relay.connect(Side::Host, handle).unwrap();
        let err = relay
            .complete_handshake(Side::Host, pending.generation, json!({"teams": 3}))
            .unwrap_err();
        assert!(matches!(err, RelayError::Protocol(_)));
        assert_eq!(relay.link(Side::Host).state(), LinkState::Handshaking);
    }

    // ── 2. Gateway handshake ────────────────────────────────────────

    #[test]
    fn gateway_handshake_sends_round_and_loads_roster() {
        let mut relay = Relay::new();
        let (handle, mut rx) = PeerHandle::channel();
        let pending = relay.connect(Side::Gateway, handle).unwrap();

        let sent = take(&mut rx);
        assert_eq!(sent[0].data, json!({"ready": false, "number": 0}));

        let roster = json!({"+1": {"id": "+1", "name": "Alice"}});
        relay
            .complete_handshake(Side::Gateway, pending.generation, roster)
            .unwrap();
        assert_eq!(relay.registry().player_count(), 1);
        assert!(relay.registry().player(&PlayerId::new("+1")).is_some());
    }

    #[test]
    fn null_roster_is_empty() {
        let mut relay = Relay::new();
        let (handle, _rx) = PeerHandle::channel();
        let pending = relay.connect(Side::Gateway, handle).unwrap();
        relay
            .complete_handshake(Side::Gateway, pending.generation, Value::Null)
            .unwrap();
        assert_eq!(relay.registry().player_count(), 0);
    }

    // ── 3. Host policy ──────────────────────────────────────────────

    #[test]
    fn timer_only_sets_timer() {
        let mut relay = Relay::new();
        relay.handle_inbound(Side::Host, Inbound::notify("timer", json!({"time": 30})));
        assert_eq!(relay.round().timer(), Some(30));
        assert_eq!(relay.link(Side::Gateway).pending(), 0);
    }

    #[test]
    fn off_with_unknown_item_is_ignored() {
        let mut relay = Relay::new();
        relay.handle_inbound(
            Side::Host,
            Inbound::notify("on", json!({"item": "question", "number": 2})),
        );
        relay.handle_inbound(Side::Host, Inbound::notify("off", json!({"item": "video"})));
        assert!(relay.round().is_ready());
        assert_eq!(relay.link(Side::Gateway).pending(), 1);
    }

    // ── 4. Team requests ────────────────────────────────────────────

    #[test]
    fn team_request_missing_field_is_bad_request() {
        let mut relay = Relay::new();
        let (msg, mut reply) = Inbound::request("player:team", json!({"id": "+1"}));
        relay.handle_inbound(Side::Gateway, msg);
        assert_eq!(reply.try_recv().unwrap(), json!({"code": 400}));
    }

    #[test]
    fn team_request_unknown_player_is_bad_request() {
        let mut relay = Relay::new();
        let (msg, mut reply) =
            Inbound::request("player:team", json!({"id": "+1", "team": "spartak"}));
        relay.handle_inbound(Side::Gateway, msg);
        assert_eq!(reply.try_recv().unwrap(), json!({"code": 400}));
    }

    #[test]
    fn undecodable_team_request_is_bad_request() {
        let mut relay = Relay::new();
        for data in [Value::Null, json!({"id": "+1", "team": 42}), json!({"id": 7})] {
            let (msg, mut reply) = Inbound::request("player:team", data);
            relay.handle_inbound(Side::Gateway, msg);
            assert_eq!(reply.try_recv().unwrap(), json!({"code": 400}));
        }
    }
}
