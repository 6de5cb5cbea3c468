//! Session orchestration: owns the state and transcript stores and drives
//! the chat-turn and gate-verification cycles.
//!
//! Each remote cycle is split into a `begin_*` half that validates
//! preconditions and composes the request, and a `complete_*` half that
//! applies the result. Callers that cannot hold the session across the
//! remote call (the web server) drive the halves themselves; everyone else
//! uses [`Session::send`] and [`Session::verify`].

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::directive::parse_verdict;
use crate::core::document::{DocumentView, parse_document};
use crate::core::gate::{GatePhase, GateRequest, apply_gate, open_gate};
use crate::core::reconcile::{reconcile_json, reconcile_markdown};
use crate::core::stack::seed_stack;
use crate::core::transcript::Transcript;
use crate::core::types::{ConversationTurn, GateVerdict, Protocol, Role, StackNode, TurnAction};
use crate::io::prompt::{GateInputs, PromptComposer, StateView, TurnInputs};
use crate::io::service::{GenerateRequest, ReasoningService, ResponseFormat, ServiceError};

/// Errors surfaced to the user by session operations. None of them ends the
/// session; every one leaves it ready for another attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("missing API key: supply one before starting a conversation")]
    MissingCredential,

    #[error("a reply is still pending; wait for it before sending again")]
    Busy,

    #[error("the knowledge gate is only available with the json protocol")]
    GateUnsupported,

    #[error("no knowledge gate is open")]
    NoGate,

    #[error("the synthesis is already being verified")]
    GateBusy,

    #[error("the gate was already approved")]
    GateAlreadyApproved,

    #[error("the gate has no approved verdict to apply")]
    NoPendingApproval,

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("the stack changed while the gate was open: {0}")]
    StaleGate(String),

    #[error("could not compose prompt: {0}")]
    Prompt(String),

    #[error("the reply belongs to a request that is no longer pending")]
    StaleReply,
}

/// Authoritative learning state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum StackState {
    Markdown { document: String },
    Json { stack: Vec<StackNode> },
}

impl StackState {
    fn initial(protocol: Protocol, goal: &str) -> Self {
        match protocol {
            Protocol::Markdown => StackState::Markdown {
                document: String::new(),
            },
            Protocol::Json => StackState::Json {
                stack: seed_stack(goal),
            },
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            StackState::Markdown { .. } => Protocol::Markdown,
            StackState::Json { .. } => Protocol::Json,
        }
    }

    fn view(&self) -> StateView<'_> {
        match self {
            StackState::Markdown { document } => StateView::Document(document),
            StackState::Json { stack } => StateView::Stack(stack),
        }
    }

    /// Raw serialized state, as exported to the user.
    pub fn export(&self) -> String {
        match self {
            StackState::Markdown { document } => document.clone(),
            StackState::Json { stack } => {
                serde_json::to_string_pretty(stack).unwrap_or_else(|_| "[]".to_string())
            }
        }
    }
}

/// A main-turn request that has been composed but not yet answered.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    turn_id: u64,
    request: GenerateRequest,
}

impl PendingTurn {
    pub fn request(&self) -> &GenerateRequest {
        &self.request
    }
}

/// A gate verification request that has been composed but not yet answered.
#[derive(Debug, Clone)]
pub struct PendingVerification {
    gate_id: u64,
    request: GenerateRequest,
}

impl PendingVerification {
    pub fn request(&self) -> &GenerateRequest {
        &self.request
    }
}

/// What a completed turn did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The state store was replaced.
    pub state_changed: bool,
    /// Model-declared action (JSON protocol, when the block parsed).
    pub action: Option<TurnAction>,
    /// The remote call failed; an error entry was appended instead.
    pub service_failed: bool,
}

/// Serializable read model of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub goal: String,
    pub protocol: Protocol,
    pub state: StackState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_view: Option<DocumentView>,
    pub transcript: Vec<ConversationTurn>,
    pub loading: bool,
    pub gate: Option<GateRequest>,
}

/// One learning session: goal, credential, state, transcript, and the
/// transient gate.
#[derive(Debug, Clone)]
pub struct Session {
    goal: String,
    api_key: String,
    composer: PromptComposer,
    source_context: Option<String>,
    state: StackState,
    transcript: Transcript,
    turn_in_flight: bool,
    /// Id of the most recently issued turn.
    turn_seq: u64,
    gate: Option<GateRequest>,
    /// Id of the most recently opened gate.
    gate_seq: u64,
}

impl Session {
    pub fn new(goal: impl Into<String>, api_key: impl Into<String>, protocol: Protocol) -> Self {
        let goal = goal.into().trim().to_string();
        Self {
            state: StackState::initial(protocol, &goal),
            goal,
            api_key: api_key.into().trim().to_string(),
            composer: PromptComposer::default(),
            source_context: None,
            transcript: Transcript::new(),
            turn_in_flight: false,
            turn_seq: 0,
            gate: None,
            gate_seq: 0,
        }
    }

    pub fn with_composer(mut self, composer: PromptComposer) -> Self {
        self.composer = composer;
        self
    }

    /// Attach source material sent with every turn (truncated by the composer).
    pub fn with_source_context(mut self, source: impl Into<String>) -> Self {
        let source = source.into();
        self.source_context = (!source.trim().is_empty()).then_some(source);
        self
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn protocol(&self) -> Protocol {
        self.state.protocol()
    }

    pub fn state(&self) -> &StackState {
        &self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn gate(&self) -> Option<&GateRequest> {
        self.gate.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.turn_in_flight
    }

    /// Opening message the interactive front-ends send on the learner's behalf.
    pub fn kickoff_message(&self) -> String {
        format!("I want to learn: {}", self.goal)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let document_view = match &self.state {
            StackState::Markdown { document } => Some(parse_document(document)),
            StackState::Json { .. } => None,
        };
        SessionSnapshot {
            goal: self.goal.clone(),
            protocol: self.protocol(),
            state: self.state.clone(),
            document_view,
            transcript: self.transcript.turns().to_vec(),
            loading: self.turn_in_flight,
            gate: self.gate.clone(),
        }
    }

    fn require_credential(&self) -> Result<(), SessionError> {
        if self.api_key.is_empty() {
            return Err(SessionError::MissingCredential);
        }
        Ok(())
    }

    // ---- main turn ------------------------------------------------------

    /// Validate preconditions, record the user turn and compose the request.
    ///
    /// Rejected attempts leave no trace in the transcript.
    /// `source_context` overrides the session's default source material for
    /// this turn only.
    pub fn begin_turn(
        &mut self,
        message: &str,
        source_context: Option<&str>,
    ) -> Result<PendingTurn, SessionError> {
        self.require_credential()?;
        if self.turn_in_flight {
            debug!("rejecting send while a turn is in flight");
            return Err(SessionError::Busy);
        }

        let source_context = source_context
            .filter(|source| !source.trim().is_empty())
            .or(self.source_context.as_deref());
        let prompt = self
            .composer
            .compose_turn(&TurnInputs {
                goal: &self.goal,
                state: self.state.view(),
                source_context,
                message,
            })
            .map_err(|err| SessionError::Prompt(format!("{err:#}")))?;
        self.transcript.push(Role::User, message.trim());
        self.turn_in_flight = true;
        self.turn_seq += 1;

        Ok(PendingTurn {
            turn_id: self.turn_seq,
            request: GenerateRequest {
                api_key: self.api_key.clone(),
                prompt,
                format: ResponseFormat::Text,
            },
        })
    }

    /// Apply the service result for a pending turn and clear the loading flag.
    ///
    /// Only the most recently issued turn can be completed, and only once.
    pub fn complete_turn(
        &mut self,
        pending: PendingTurn,
        result: Result<String, ServiceError>,
    ) -> Result<TurnOutcome, SessionError> {
        if !self.turn_in_flight || pending.turn_id != self.turn_seq {
            debug!(
                turn_id = pending.turn_id,
                "discarding reply for a turn that is not pending"
            );
            return Err(SessionError::StaleReply);
        }
        self.turn_in_flight = false;
        Ok(self.apply_reply(result))
    }

    fn apply_reply(&mut self, result: Result<String, ServiceError>) -> TurnOutcome {

        let raw = match result {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "turn failed");
                self.transcript.push(Role::Error, err.to_string());
                return TurnOutcome {
                    state_changed: false,
                    action: None,
                    service_failed: true,
                };
            }
        };

        match &mut self.state {
            StackState::Markdown { document } => {
                let outcome = reconcile_markdown(&raw);
                let state_changed = outcome.document.is_some();
                if let Some(next) = outcome.document {
                    *document = next;
                }
                self.transcript.push(Role::Assistant, outcome.commentary);
                TurnOutcome {
                    state_changed,
                    action: None,
                    service_failed: false,
                }
            }
            StackState::Json { stack } => {
                let outcome = reconcile_json(&raw, stack);
                let state_changed = outcome.stack.is_some();
                if let Some(next) = outcome.stack {
                    *stack = next;
                }
                self.transcript.push(Role::Assistant, outcome.commentary);
                for note in outcome.notes {
                    self.transcript.push(Role::System, note);
                }
                TurnOutcome {
                    state_changed,
                    action: outcome.action,
                    service_failed: false,
                }
            }
        }
    }

    /// Run one full turn synchronously.
    #[instrument(skip_all, fields(protocol = %self.protocol()))]
    pub fn send<S: ReasoningService + ?Sized>(
        &mut self,
        service: &S,
        message: &str,
        source_context: Option<&str>,
    ) -> Result<TurnOutcome, SessionError> {
        let pending = self.begin_turn(message, source_context)?;
        let result = service.generate(&pending.request);
        let outcome = self.complete_turn(pending, result)?;
        info!(
            state_changed = outcome.state_changed,
            action = ?outcome.action,
            service_failed = outcome.service_failed,
            "turn complete"
        );
        Ok(outcome)
    }

    // ---- knowledge gate -------------------------------------------------

    fn json_stack(&self) -> Result<&[StackNode], SessionError> {
        match &self.state {
            StackState::Json { stack } => Ok(stack),
            StackState::Markdown { .. } => Err(SessionError::GateUnsupported),
        }
    }

    /// Open a gate when `node_id` is an eligible parent of the active node.
    ///
    /// Returns `Ok(None)` (and changes nothing) when the node is not eligible
    /// or a gate is already open.
    pub fn select_node(&mut self, node_id: &str) -> Result<Option<&GateRequest>, SessionError> {
        let stack = self.json_stack()?;
        if self.gate.is_some() {
            debug!(node_id, "gate already open; ignoring selection");
            return Ok(None);
        }
        let Some(gate) = open_gate(stack, node_id) else {
            debug!(node_id, "node is not an eligible parent");
            return Ok(None);
        };
        self.gate_seq += 1;
        info!(
            gate_id = self.gate_seq,
            child = %gate.child.id,
            parent = %gate.parent.id,
            "gate opened"
        );
        self.gate = Some(gate);
        Ok(self.gate.as_ref())
    }

    pub fn dismiss_gate(&mut self) -> Result<(), SessionError> {
        match self.gate.take() {
            Some(gate) => {
                debug!(child = %gate.child.id, "gate dismissed");
                Ok(())
            }
            None => Err(SessionError::NoGate),
        }
    }

    /// Record the synthesis and compose the verification request.
    pub fn begin_gate_verification(
        &mut self,
        synthesis: &str,
    ) -> Result<PendingVerification, SessionError> {
        self.json_stack()?;
        self.require_credential()?;
        let gate = self.gate.as_mut().ok_or(SessionError::NoGate)?;
        match gate.phase {
            GatePhase::Collecting => {}
            GatePhase::Verifying => return Err(SessionError::GateBusy),
            GatePhase::Approved => return Err(SessionError::GateAlreadyApproved),
        }

        let synthesis = synthesis.trim();
        let prompt = self
            .composer
            .compose_gate(&GateInputs {
                child: &gate.child.topic,
                parent: &gate.parent.topic,
                synthesis,
            })
            .map_err(|err| SessionError::Prompt(format!("{err:#}")))?;
        gate.synthesis = synthesis.to_string();
        gate.phase = GatePhase::Verifying;

        Ok(PendingVerification {
            gate_id: self.gate_seq,
            request: GenerateRequest {
                api_key: self.api_key.clone(),
                prompt,
                format: ResponseFormat::Json,
            },
        })
    }

    /// Apply a verification result to the gate it was issued for.
    ///
    /// Failures return the gate to `Collecting` so the user can retry. A
    /// result for a gate that was dismissed (even if the same pair was opened
    /// again since) is discarded.
    pub fn complete_gate_verification(
        &mut self,
        pending: PendingVerification,
        result: Result<String, ServiceError>,
    ) -> Result<GateVerdict, SessionError> {
        let gate = self.gate.as_mut().ok_or(SessionError::NoGate)?;
        if pending.gate_id != self.gate_seq || gate.phase != GatePhase::Verifying {
            debug!(
                gate_id = pending.gate_id,
                "discarding verdict for a gate that is not verifying"
            );
            return Err(SessionError::StaleReply);
        }

        let verdict = result
            .map_err(|err| err.to_string())
            .and_then(|raw| parse_verdict(&raw));
        let verdict = match verdict {
            Ok(verdict) => verdict,
            Err(reason) => {
                warn!(error = %reason, "gate verification failed");
                gate.phase = GatePhase::Collecting;
                return Err(SessionError::VerificationFailed(reason));
            }
        };

        gate.phase = if verdict.approved {
            GatePhase::Approved
        } else {
            GatePhase::Collecting
        };
        gate.verdict = Some(verdict.clone());
        info!(approved = verdict.approved, "gate verdict received");
        Ok(verdict)
    }

    /// Verify a synthesis synchronously.
    #[instrument(skip_all)]
    pub fn verify<S: ReasoningService + ?Sized>(
        &mut self,
        service: &S,
        synthesis: &str,
    ) -> Result<GateVerdict, SessionError> {
        let pending = self.begin_gate_verification(synthesis)?;
        let result = service.generate(&pending.request);
        self.complete_gate_verification(pending, result)
    }

    /// Apply an approved gate: pop the child, reactivate the parent, close
    /// the gate. Returns the topic that is active afterwards.
    ///
    /// The gate is consumed whether or not the snapshot still holds, so an
    /// approval can pop at most one node.
    pub fn finish_gate(&mut self) -> Result<String, SessionError> {
        if !matches!(
            self.gate.as_ref().map(|gate| gate.phase),
            Some(GatePhase::Approved)
        ) {
            return Err(SessionError::NoPendingApproval);
        }
        let Some(gate) = self.gate.take() else {
            return Err(SessionError::NoPendingApproval);
        };
        let StackState::Json { stack } = &mut self.state else {
            return Err(SessionError::GateUnsupported);
        };

        match apply_gate(stack, &gate) {
            Ok(next) => {
                *stack = next;
                let topic = gate.parent.topic.clone();
                info!(child = %gate.child.id, parent = %gate.parent.id, "gate passed; frame popped");
                self.transcript.push(
                    Role::System,
                    format!(
                        "Gate passed: \"{}\" archived. Back to \"{}\".",
                        gate.child.topic, topic
                    ),
                );
                Ok(topic)
            }
            Err(reason) => {
                warn!(error = %reason, "discarding stale gate");
                self.transcript.push(
                    Role::System,
                    format!("The gate was closed because the stack changed ({reason})."),
                );
                Err(SessionError::StaleGate(reason))
            }
        }
    }
}
