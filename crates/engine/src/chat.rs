//! The per-request pipeline: security gate, follow-up resolution, retrieval,
//! persona enrichment, prompt synthesis, generation, vocabulary enforcement,
//! state update, analytics.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use terrace_config::AppConfig;
use terrace_conversation::{resolve, ConversationMap, ConversationState};
use terrace_llm::{GenerationRequest, Generator, HistoryTurn, TokenUsage};
use terrace_persona::{Enricher, Enrichment};
use terrace_retrieval::{
    fingerprint, Intent, RetrievalError, Retriever, SourceKind, SourceRef,
};
use terrace_security::{lockdown, snap_back, GateAction, GateOutcome, TrustMachine};
use terrace_store::{AnalyticsRecord, PersonaIdentity, Store, TeamRef};

use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::prompt::build_system_prompt;
use crate::sanitize::sanitize;
use crate::vocabulary::enforce_vocabulary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: Option<String>,
    pub persona_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub conversation_id: String,
    pub sources: Vec<SourceRef>,
    pub confidence: f64,
    pub usage: Option<TokenUsage>,
    pub metadata: ResponseMetadata,
}

/// `trust_level` value reported when the security gate could not reach the
/// store: no level was computed for the turn, so none is claimed.
pub const UNVERIFIED_TRUST_LEVEL: &str = "unverified";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub intent: Option<String>,
    /// The session trust level the turn was handled at, or
    /// [`UNVERIFIED_TRUST_LEVEL`] for a degraded turn whose gate never ran.
    pub trust_level: String,
    pub deflected: bool,
    /// Store or generator trouble produced a fallback answer.
    pub degraded: bool,
    pub fallback_step: u8,
    pub enrichments: Vec<String>,
    pub persona_cache_hit: bool,
    pub latency_ms: u64,
}

pub struct ChatEngine {
    config: AppConfig,
    store: Arc<Store>,
    retriever: Retriever,
    enricher: Enricher,
    conversations: ConversationMap,
    trust: TrustMachine,
    generator: Arc<dyn Generator>,
}

impl ChatEngine {
    pub fn new(
        config: AppConfig,
        store: Arc<Store>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self, EngineError> {
        let retriever = Retriever::new(
            Arc::clone(&store),
            config.retrieval.clone(),
            config.engine.max_input_chars,
        )
        .map_err(|err| {
            warn!(?err, "entity dictionary build failed");
            EngineError::StoreUnavailable
        })?;
        Ok(Self {
            enricher: Enricher::with_mood_policy(
                Arc::clone(&store),
                config.persona.mood_from_form,
            ),
            conversations: ConversationMap::new(config.conversation.capacity),
            trust: TrustMachine::new(Arc::clone(&store), config.security.clone()),
            retriever,
            store,
            generator,
            config,
        })
    }

    /// One-shot variant: runs the streaming pipeline with a throwaway channel.
    pub async fn chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, EngineError> {
        let (tx, _rx) = mpsc::channel(64);
        self.chat_stream(request, cancel, tx).await
    }

    /// Full pipeline with chunk streaming. The returned value and the final
    /// `Done`/`Error` event carry the same outcome.
    #[instrument(skip(self, request, cancel, tx), fields(persona = ?request.persona_id, msg_len = request.message.len()))]
    pub async fn chat_stream(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
        tx: mpsc::Sender<EngineEvent>,
    ) -> Result<ChatResponse, EngineError> {
        let result = self.run(&request, &cancel, &tx).await;
        match &result {
            Ok(response) => {
                let _ = tx
                    .send(EngineEvent::Done {
                        response: response.clone(),
                    })
                    .await;
            }
            Err(err) => {
                let _ = tx
                    .send(EngineEvent::Error {
                        error: err.to_string(),
                    })
                    .await;
            }
        }
        result
    }

    /// Inspect a live conversation's state, e.g. for admin tooling.
    pub fn conversation(&self, id: &str) -> Option<terrace_conversation::SharedConversation> {
        self.conversations.get(id)
    }

    /// Sweep conversations idle past the configured timeout.
    pub fn evict_idle_conversations(&self) -> usize {
        self.conversations
            .evict_idle(chrono::Duration::minutes(
                self.config.conversation.idle_minutes as i64,
            ))
    }

    async fn run(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<EngineEvent>,
    ) -> Result<ChatResponse, EngineError> {
        let started = Instant::now();
        let today = Utc::now().date_naive();

        // 1. Sanitize. Rejection mutates nothing.
        let message = sanitize(&request.message, self.config.engine.max_input_chars)?;
        let persona_id = self.validate_persona_id(request.persona_id.as_deref())?;

        let (conversation_id, entry) = self
            .conversations
            .get_or_create(request.conversation_id.as_deref(), persona_id.as_deref());

        // 2. Security gate. The trust transition commits here; a later
        // cancellation never rolls it back. If the gate itself cannot reach
        // the store, no trust level was computed for this turn: degrade
        // rather than fail, and report the level as unverified.
        let gate = match self.trust.gate(&conversation_id, &message) {
            Ok(gate) => gate,
            Err(err) => {
                warn!(?err, "security gate could not reach the store");
                let mut state = entry.lock().await;
                let persona_id = state.persona_id.clone();
                return Ok(self.degraded_response(
                    &mut state,
                    &conversation_id,
                    persona_id.as_deref(),
                    UNVERIFIED_TRUST_LEVEL,
                    started,
                    false,
                    store_trouble_text(),
                ));
            }
        };

        // Rate-limit stall happens before any conversation lock is taken.
        if gate.delay_ms > 0 {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.append_analytics(&conversation_id, persona_id.as_deref(), None, 0, 0.0, started, false, true);
                    return Err(EngineError::Cancelled);
                }
                _ = tokio::time::sleep(Duration::from_millis(gate.delay_ms)) => {}
            }
        }

        if gate.action != GateAction::Proceed {
            return self
                .deflected_response(&conversation_id, &entry, &gate, started)
                .await;
        }

        // Turns of one conversation serialize here.
        let mut state = entry.lock().await;

        // The persona fixed at conversation creation wins over whatever this
        // request carries; persona identity is stable for the conversation.
        let persona_id = state.persona_id.clone();

        // Persona bundle: loaded once per conversation, under the entry lock.
        let persona_cache_hit = state.persona.is_some();
        let persona = match self.ensure_persona(&mut state, persona_id.as_deref()) {
            Ok(persona) => persona,
            Err(err) => {
                warn!(?err, "persona bundle load failed");
                return Ok(self.degraded_response(
                    &mut state,
                    &conversation_id,
                    persona_id.as_deref(),
                    gate.level.as_str(),
                    started,
                    persona_cache_hit,
                    store_trouble_text(),
                ));
            }
        };

        // 3. Follow-up resolution against stored entities.
        let resolved = resolve(&message, &state, state.persona_team_name.as_deref());
        if resolved != message {
            debug!(resolved = %resolved, "follow-up resolved");
        }

        // 4. Retrieval.
        let retrieved = match self.retriever.retrieve(&resolved, persona.as_deref(), today) {
            Ok(retrieved) => retrieved,
            Err(RetrievalError::InvalidQuery(reason)) => {
                return Err(EngineError::InvalidInput(reason));
            }
            Err(RetrievalError::Store(err)) => {
                warn!(?err, "retrieval store failure");
                return Ok(self.degraded_response(
                    &mut state,
                    &conversation_id,
                    persona_id.as_deref(),
                    gate.level.as_str(),
                    started,
                    persona_cache_hit,
                    store_trouble_text(),
                ));
            }
        };

        // 5. Persona enrichment.
        let enrichment: Option<Enrichment> = match persona.as_deref() {
            Some(identity) => match self.enricher.enrich(&resolved, identity, today) {
                Ok(enrichment) => Some(enrichment),
                Err(err) => {
                    warn!(?err, "enrichment store failure");
                    return Ok(self.degraded_response(
                        &mut state,
                        &conversation_id,
                        persona_id.as_deref(),
                        gate.level.as_str(),
                        started,
                        persona_cache_hit,
                        store_trouble_text(),
                    ));
                }
            },
            None => None,
        };

        // 6. Drop facts this conversation has already delivered.
        let mut context_lines: Vec<String> = Vec::new();
        let mut sources: Vec<SourceRef> = Vec::new();
        for line in &retrieved.lines {
            if state.has_discussed(&fingerprint(&line.text)) {
                continue;
            }
            if line.source.kind != SourceKind::Sentinel {
                sources.push(line.source);
            }
            context_lines.push(line.text.clone());
        }

        // 7. Prompt synthesis.
        let system_prompt = build_system_prompt(
            persona.as_deref(),
            state.persona_team_name.as_deref(),
            enrichment.as_ref(),
            &context_lines,
        );
        let turns: Vec<(&str, &str)> = state.recent_turns().collect();
        let skip = turns
            .len()
            .saturating_sub(self.config.conversation.history_turns);
        let history: Vec<HistoryTurn> = turns[skip..]
            .iter()
            .map(|(user, assistant)| HistoryTurn {
                user: user.to_string(),
                assistant: assistant.to_string(),
            })
            .collect();

        // 8. Generation, retried once, racing the cancellation signal.
        let generation_request = GenerationRequest {
            system_prompt,
            user_message: message.clone(),
            history,
        };
        let generation = {
            let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(128);
            let forward_tx = tx.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(text) = chunk_rx.recv().await {
                    let _ = forward_tx.send(EngineEvent::Chunk { text }).await;
                }
            });

            let mut outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    self.append_analytics(&conversation_id, persona_id.as_deref(), Some(retrieved.metadata.intent), 0, 0.0, started, persona_cache_hit, true);
                    forwarder.abort();
                    return Err(EngineError::Cancelled);
                }
                result = self.generator.generate_stream(&generation_request, chunk_tx.clone()) => result,
            };
            if let Err(err) = &outcome {
                warn!(%err, "generator failed, retrying once");
                outcome = tokio::select! {
                    _ = cancel.cancelled() => {
                        self.append_analytics(&conversation_id, persona_id.as_deref(), Some(retrieved.metadata.intent), 0, 0.0, started, persona_cache_hit, true);
                        forwarder.abort();
                        return Err(EngineError::Cancelled);
                    }
                    result = self.generator.generate_stream(&generation_request, chunk_tx.clone()) => result,
                };
            }
            drop(chunk_tx);
            let _ = forwarder.await;
            outcome
        };

        let generation = match generation {
            Ok(generation) => generation,
            Err(err) => {
                warn!(%err, "generator failed after retry");
                // Persona-flavored apology; the discussed-fact set stays
                // untouched so the facts can be delivered next turn.
                return Ok(self.degraded_response(
                    &mut state,
                    &conversation_id,
                    persona_id.as_deref(),
                    gate.level.as_str(),
                    started,
                    persona_cache_hit,
                    generator_apology(persona.as_deref()),
                ));
            }
        };

        // 9. Vocabulary enforcement.
        let text = match persona.as_deref() {
            Some(identity) => enforce_vocabulary(&generation.text, &identity.vocabulary),
            None => generation.text.clone(),
        };

        // 10. Conversation update.
        state.update(&retrieved.entities, retrieved.metadata.intent, &context_lines);
        state.note_turn(&message, &text);
        drop(state);

        let confidence = self.confidence_for(sources.len());
        let latency_ms = started.elapsed().as_millis() as u64;

        // 11. Analytics.
        self.append_analytics(
            &conversation_id,
            persona_id.as_deref(),
            Some(retrieved.metadata.intent),
            sources.len(),
            confidence,
            started,
            persona_cache_hit,
            false,
        );

        info!(
            conversation = %conversation_id,
            intent = retrieved.metadata.intent.as_str(),
            sources = sources.len(),
            confidence,
            latency_ms,
            "turn complete"
        );

        Ok(ChatResponse {
            text,
            conversation_id,
            sources,
            confidence,
            usage: generation.usage,
            metadata: ResponseMetadata {
                intent: Some(retrieved.metadata.intent.as_str().to_string()),
                trust_level: gate.level.as_str().to_string(),
                deflected: false,
                degraded: false,
                fallback_step: retrieved.metadata.fallback_step,
                enrichments: enrichment
                    .as_ref()
                    .map(|e| e.applied.iter().map(|k| k.as_str().to_string()).collect())
                    .unwrap_or_default(),
                persona_cache_hit,
                latency_ms,
            },
        })
    }

    // ── Pipeline helpers ─────────────────────────────────────────────────────

    fn validate_persona_id(
        &self,
        persona_id: Option<&str>,
    ) -> Result<Option<String>, EngineError> {
        let Some(id) = persona_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        if self.config.persona_team(id).is_some() {
            return Ok(Some(id.to_string()));
        }
        if self.config.persona.reject_unknown_persona {
            Err(EngineError::InvalidInput(format!("unknown persona id: {id}")))
        } else {
            warn!(persona = id, "unknown persona id, answering without one");
            Ok(None)
        }
    }

    /// Load and cache the persona bundle on the conversation state.
    fn ensure_persona(
        &self,
        state: &mut ConversationState,
        persona_id: Option<&str>,
    ) -> Result<Option<Arc<PersonaIdentity>>, terrace_store::StoreError> {
        if let Some(cached) = &state.persona {
            return Ok(Some(Arc::clone(cached)));
        }
        let Some(team_id) = persona_id.and_then(|id| self.config.persona_team(id)) else {
            return Ok(None);
        };
        let Some(identity) = self.store.load_persona(team_id)? else {
            warn!(team_id, "no persona bundle ingested for team");
            return Ok(None);
        };
        let team_name = self
            .store
            .get_team(TeamRef::Id(team_id))?
            .map(|team| team.name);

        let identity = Arc::new(identity);
        state.persona = Some(Arc::clone(&identity));
        state.persona_team_name = team_name;
        Ok(Some(identity))
    }

    async fn deflected_response(
        &self,
        conversation_id: &str,
        entry: &terrace_conversation::SharedConversation,
        gate: &GateOutcome,
        started: Instant,
    ) -> Result<ChatResponse, EngineError> {
        let mut state = entry.lock().await;
        let persona_id = state.persona_id.clone();
        let nickname = match self.ensure_persona(&mut state, persona_id.as_deref()) {
            Ok(persona) => persona.map(|identity| identity.nickname.clone()),
            // Deflections must not fail on store trouble; fall back to the
            // persona-free template.
            Err(err) => {
                warn!(?err, "persona load failed during deflection");
                None
            }
        };
        let text = match gate.action {
            GateAction::Lockdown => lockdown().to_string(),
            _ => snap_back(nickname.as_deref(), gate.strike_count),
        };
        // A deflected turn still counts as a turn.
        state.bump_turn();
        drop(state);

        self.append_analytics(
            conversation_id,
            persona_id.as_deref(),
            None,
            0,
            0.0,
            started,
            false,
            false,
        );

        Ok(ChatResponse {
            text,
            conversation_id: conversation_id.to_string(),
            sources: vec![],
            confidence: 0.0,
            usage: None,
            metadata: ResponseMetadata {
                intent: None,
                trust_level: gate.level.as_str().to_string(),
                deflected: true,
                degraded: false,
                fallback_step: 0,
                enrichments: vec![],
                persona_cache_hit: false,
                latency_ms: started.elapsed().as_millis() as u64,
            },
        })
    }

    /// Graceful fallback when the store or generator gives out mid-turn.
    /// The turn counter advances; entities and facts are not committed.
    /// `trust_level` is the computed level when the gate ran, or
    /// [`UNVERIFIED_TRUST_LEVEL`] when the gate itself was the failure.
    #[allow(clippy::too_many_arguments)]
    fn degraded_response(
        &self,
        state: &mut ConversationState,
        conversation_id: &str,
        persona_id: Option<&str>,
        trust_level: &str,
        started: Instant,
        persona_cache_hit: bool,
        text: String,
    ) -> ChatResponse {
        state.bump_turn();
        self.append_analytics(conversation_id, persona_id, None, 0, 0.0, started, persona_cache_hit, false);
        ChatResponse {
            text,
            conversation_id: conversation_id.to_string(),
            sources: vec![],
            confidence: 0.0,
            usage: None,
            metadata: ResponseMetadata {
                intent: None,
                trust_level: trust_level.to_string(),
                deflected: false,
                degraded: true,
                fallback_step: 0,
                enrichments: vec![],
                persona_cache_hit,
                latency_ms: started.elapsed().as_millis() as u64,
            },
        }
    }

    fn confidence_for(&self, source_count: usize) -> f64 {
        if source_count == 0 {
            return 0.0;
        }
        let target = self.config.engine.confidence_source_target.max(1) as f64;
        (source_count as f64 / target).clamp(0.0, 1.0)
    }

    #[allow(clippy::too_many_arguments)]
    fn append_analytics(
        &self,
        conversation_id: &str,
        persona_id: Option<&str>,
        intent: Option<Intent>,
        source_count: usize,
        confidence: f64,
        started: Instant,
        cache_hit: bool,
        cancelled: bool,
    ) {
        let record = AnalyticsRecord {
            at: Utc::now(),
            conversation_id: conversation_id.to_string(),
            persona_id: persona_id.map(|id| id.to_string()),
            intent: intent.map(|i| i.as_str().to_string()),
            source_count,
            confidence,
            latency_ms: started.elapsed().as_millis() as u64,
            cache_hit,
            cancelled,
        };
        if let Err(err) = self.store.append_analytics(&record) {
            warn!(?err, "analytics append failed");
        }
    }
}

fn store_trouble_text() -> String {
    "No data available right now. The club records are temporarily out of reach; \
     ask me again shortly."
        .to_string()
}

fn generator_apology(persona: Option<&PersonaIdentity>) -> String {
    match persona {
        Some(identity) => format!(
            "Sorry, lost my train of thought there, happens to the best of us {}s. \
             Ask me that one again in a minute.",
            identity.nickname
        ),
        None => "Sorry, I dropped the thread of that one. Please ask again in a moment."
            .to_string(),
    }
}
