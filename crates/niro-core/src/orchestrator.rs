use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::astro::{AstroApi, AstroGateway, Geocoder};
use crate::compose::{self, ReplyComposer};
use crate::config::SessionConfig;
use crate::error::{NiroError, Result};
use crate::extract;
use crate::llm::TextGenerator;
use crate::model::{
    BirthDetails, ChatRequest, ChatResponse, ConversationMode, NiroReply, SessionState,
};
use crate::router;
use crate::session::SessionStore;
use crate::topics::{self, Topic};
use crate::features;

/// Snapshot returned by the session inspection endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub has_birth_details: bool,
    pub has_done_retro: bool,
    pub message_count: u64,
}

/// Runs one conversation turn end to end: extraction, routing,
/// classification, astro lookup, feature building, and reply composition.
///
/// Per-session locks serialize turns so that two concurrent messages on the
/// same session never interleave their state mutations; turns on different
/// sessions run independently. A turn commits its session update through a
/// single store put after the reply is composed, so an aborted turn leaves
/// the session untouched.
pub struct Orchestrator<S, A, G>
where
    S: SessionStore,
    A: AstroApi,
    G: TextGenerator,
{
    store: S,
    gateway: AstroGateway<A>,
    geocoder: Geocoder,
    composer: ReplyComposer<G>,
    max_history_turns: usize,
    max_message_chars: usize,
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S, A, G> Orchestrator<S, A, G>
where
    S: SessionStore,
    A: AstroApi,
    G: TextGenerator,
{
    pub fn new(
        store: S,
        gateway: AstroGateway<A>,
        geocoder: Geocoder,
        composer: ReplyComposer<G>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            geocoder,
            composer,
            max_history_turns: config.max_history_turns,
            max_message_chars: config.max_message_chars,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn process_message(&self, request: ChatRequest) -> Result<ChatResponse> {
        if request.session_id.trim().is_empty() {
            return Err(NiroError::InvalidInput(
                "sessionId must not be empty".to_string(),
            ));
        }
        if request.message.chars().count() > self.max_message_chars {
            return Err(NiroError::InvalidInput(format!(
                "message exceeds {} characters",
                self.max_message_chars
            )));
        }

        let turn_lock = self.turn_lock(&request.session_id).await;
        let _turn = turn_lock.lock().await;

        let mut session = self
            .store
            .get(&request.session_id)
            .await?
            .unwrap_or_else(|| SessionState::new(&request.session_id));

        let message = request.message.trim();
        let action_id = request.action_id.as_deref();

        // Birth-detail extraction runs only while details are incomplete.
        // A blank message has nothing to extract and must not trigger any
        // external call.
        let mut location_unresolved = false;
        if session.birth_details.is_none() && !message.is_empty() {
            let extraction =
                extract::extract(message, &session.partial_birth, self.composer.primary()).await;
            tracing::debug!(
                method = extraction.method.as_str(),
                confidence = extraction.confidence,
                "birth extraction"
            );
            session.partial_birth.merge(&extraction.found);

            if session.partial_birth.is_complete() {
                location_unresolved = !self.resolve_birth(&mut session).await;
            }
        }

        // Topics matter only once birth details are known and the one-time
        // retrospective has been delivered.
        let classification = if router::needs_topic(&session)
            && (!message.is_empty() || action_id.is_some())
        {
            Some(topics::classify(message, action_id, session.focus, self.composer.primary()).await)
        } else {
            None
        };

        let (mode, focus) = router::route(&session, action_id, classification.as_ref());
        let topic = focus.unwrap_or(match mode {
            ConversationMode::DailyGuidance => Topic::DailyGuidance,
            _ => Topic::General,
        });

        let reply = if mode == ConversationMode::BirthCollection {
            compose::birth_collection_reply(
                &session.partial_birth.missing_fields(),
                location_unresolved,
            )
        } else {
            let features = self.build_features(&session, mode, topic).await;
            self.composer
                .compose(mode, topic, message, features.as_ref())
                .await
        };

        self.commit_turn(&mut session, mode, focus, message, action_id, &reply)
            .await?;

        Ok(ChatResponse {
            session_id: request.session_id,
            mode,
            focus,
            reply,
            suggested_actions: compose::suggested_actions(mode, focus),
        })
    }

    pub async fn session_summary(&self, session_id: &str) -> Result<Option<SessionSummary>> {
        Ok(self.store.get(session_id).await?.map(|s| SessionSummary {
            has_birth_details: s.birth_details.is_some(),
            has_done_retro: s.has_done_retro,
            message_count: s.message_count,
        }))
    }

    pub async fn session_count(&self) -> Result<usize> {
        self.store.count().await
    }

    /// Clears session state. Unknown ids are a no-op.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let deleted = self.store.delete(session_id).await?;
        let mut locks = self.turn_locks.lock().await;
        locks.remove(session_id);
        Ok(deleted)
    }

    async fn turn_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        Arc::clone(locks.entry(session_id.to_string()).or_default())
    }

    /// Resolve the collected location to coordinates and promote the partial
    /// details to a full `BirthDetails`. Returns false when the place could
    /// not be resolved, in which case the location field is cleared so the
    /// next turn can collect a better one.
    async fn resolve_birth(&self, session: &mut SessionState) -> bool {
        let (Some(dob), Some(tob), Some(location)) = (
            session.partial_birth.dob,
            session.partial_birth.tob.clone(),
            session.partial_birth.location.clone(),
        ) else {
            return false;
        };

        match self.geocoder.resolve(&location).await {
            Ok(place) => {
                tracing::info!(location = %place.display_name, "birth details complete");
                session.birth_details = Some(BirthDetails {
                    dob,
                    tob,
                    location,
                    latitude: place.latitude,
                    longitude: place.longitude,
                    tz_offset: place.tz_offset,
                });
                true
            }
            Err(e) => {
                tracing::warn!(location, error = %e, "location could not be resolved");
                session.partial_birth.location = None;
                false
            }
        }
    }

    /// Fetch chart and transits and build topic features. Astro failures
    /// degrade to composing without features; they never fail the turn.
    async fn build_features(
        &self,
        session: &SessionState,
        mode: ConversationMode,
        topic: Topic,
    ) -> Option<features::AstroFeatures> {
        if !mode.uses_astro_data() {
            return None;
        }
        let birth = session.birth_details.as_ref()?;
        let today = Utc::now().date_naive();

        let profile = match self.gateway.profile(birth).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "profile unavailable, composing without astro data");
                return None;
            }
        };
        let transits = match self.gateway.transits(birth, today).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "transits unavailable, composing without astro data");
                return None;
            }
        };

        Some(features::build(topic, mode, &profile, &transits, today))
    }

    /// All session mutation for the turn lands here and is committed through
    /// one store put. Only the store error propagates to the caller.
    async fn commit_turn(
        &self,
        session: &mut SessionState,
        mode: ConversationMode,
        focus: Option<Topic>,
        message: &str,
        action_id: Option<&str>,
        reply: &NiroReply,
    ) -> Result<()> {
        session.mode = mode;
        if focus.is_some() {
            session.focus = focus;
        }
        // The one-time retrospective flag flips with the turn that delivered it.
        if mode == ConversationMode::PastThemes {
            session.has_done_retro = true;
        }
        session.message_count += 1;

        if !message.is_empty() {
            session.push_turn("user", message);
        } else if let Some(action) = action_id {
            session.push_turn("user", &format!("[{action}]"));
        }
        session.push_turn("assistant", &reply.summary);
        session.trim_history(self.max_history_turns);
        session.updated_at = Utc::now();

        self.store.put(session.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro::client::AstroApi;
    use crate::config::AstroConfig;
    use crate::model::{AstroProfile, AstroTransits};
    use crate::session::InMemorySessionStore;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeAstroApi {
        profile_calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl FakeAstroApi {
        fn new() -> Self {
            Self {
                profile_calls: Arc::new(AtomicUsize::new(0)),
                fail: false,
            }
        }
    }

    impl AstroApi for FakeAstroApi {
        async fn fetch_profile(&self, _birth: &BirthDetails) -> Result<AstroProfile> {
            self.profile_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(NiroError::Astro("503 unavailable".to_string()));
            }
            Ok(AstroProfile {
                ascendant: "Sagittarius".to_string(),
                moon_sign: "Taurus".to_string(),
                sun_sign: "Capricorn".to_string(),
                moon_nakshatra: Some("Rohini".to_string()),
                planets: vec![],
                houses: vec![],
                mahadasha: None,
                antardasha: None,
                dasha_timeline: vec![],
                yogas: vec![],
            })
        }

        async fn fetch_transits(
            &self,
            _birth: &BirthDetails,
            from: NaiveDate,
            to: NaiveDate,
        ) -> Result<AstroTransits> {
            if self.fail {
                return Err(NiroError::Astro("503 unavailable".to_string()));
            }
            Ok(AstroTransits {
                from_date: from,
                to_date: to,
                computed_at: Utc::now(),
                events: vec![],
            })
        }
    }

    struct NoLlm;

    impl TextGenerator for NoLlm {
        async fn generate(&self, _prompt: &str, _system: Option<&str>) -> Result<String> {
            Err(NiroError::Llm("no provider".to_string()))
        }

        fn id(&self) -> &str {
            "none"
        }
    }

    fn orchestrator(
        api: FakeAstroApi,
    ) -> Orchestrator<InMemorySessionStore, FakeAstroApi, NoLlm> {
        Orchestrator::new(
            InMemorySessionStore::new(),
            AstroGateway::new(api, &AstroConfig::default()),
            Geocoder::builtin(),
            ReplyComposer::new(vec![]),
            &SessionConfig::default(),
        )
    }

    fn chat(session_id: &str, message: &str, action_id: Option<&str>) -> ChatRequest {
        ChatRequest {
            session_id: session_id.to_string(),
            message: message.to_string(),
            action_id: action_id.map(str::to_string),
        }
    }

    const ROHTAK_MSG: &str =
        "My name is X. I was born on 24/01/1986 at 06:32 am in Rohtak, Haryana.";

    #[tokio::test]
    async fn test_first_complete_message_routes_to_past_themes() {
        let orch = orchestrator(FakeAstroApi::new());

        let response = orch.process_message(chat("s1", ROHTAK_MSG, None)).await.unwrap();
        assert_eq!(response.mode, ConversationMode::PastThemes);
        assert_eq!(response.focus, None);
        assert!(!response.reply.summary.is_empty());

        let stored = orch.store.get("s1").await.unwrap().unwrap();
        assert!(stored.has_done_retro);
        let birth = stored.birth_details.unwrap();
        assert_eq!(birth.dob, NaiveDate::from_ymd_opt(1986, 1, 24).unwrap());
        assert_eq!(birth.tob, "06:32");
        assert!((birth.latitude - 28.8955).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_empty_message_on_fresh_session() {
        let api = FakeAstroApi::new();
        let calls = Arc::clone(&api.profile_calls);
        let orch = orchestrator(api);

        let response = orch.process_message(chat("s1", "  ", None)).await.unwrap();
        assert_eq!(response.mode, ConversationMode::BirthCollection);
        assert!(response.reply.summary.contains("date of birth"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retro_happens_exactly_once() {
        let orch = orchestrator(FakeAstroApi::new());

        let first = orch.process_message(chat("s1", ROHTAK_MSG, None)).await.unwrap();
        assert_eq!(first.mode, ConversationMode::PastThemes);

        let second = orch
            .process_message(chat("s1", "How is my career looking?", None))
            .await
            .unwrap();
        assert_eq!(second.mode, ConversationMode::FocusReading);
        assert_eq!(second.focus, Some(Topic::Career));
    }

    #[tokio::test]
    async fn test_daily_guidance_chip_after_retro() {
        let orch = orchestrator(FakeAstroApi::new());
        orch.process_message(chat("s1", ROHTAK_MSG, None)).await.unwrap();

        let response = orch
            .process_message(chat("s1", "what about my career today", Some("daily_guidance")))
            .await
            .unwrap();
        assert_eq!(response.mode, ConversationMode::DailyGuidance);
        assert_eq!(response.focus, None);
    }

    #[tokio::test]
    async fn test_astro_failure_degrades_to_stub_reply() {
        let mut api = FakeAstroApi::new();
        api.fail = true;
        let orch = orchestrator(api);

        let response = orch.process_message(chat("s1", ROHTAK_MSG, None)).await.unwrap();
        assert_eq!(response.mode, ConversationMode::PastThemes);
        assert!(!response.reply.summary.is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_location_asks_for_clarification() {
        let orch = orchestrator(FakeAstroApi::new());

        let response = orch
            .process_message(chat(
                "s1",
                "I was born on 24/01/1986 at 06:32 am in Atlantis",
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.mode, ConversationMode::BirthCollection);
        assert!(response.reply.summary.contains("location"));

        let stored = orch.store.get("s1").await.unwrap().unwrap();
        assert!(stored.birth_details.is_none());
        assert!(stored.partial_birth.location.is_none());
        assert!(stored.partial_birth.dob.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_turns_on_same_session_serialize() {
        let orch = Arc::new(orchestrator(FakeAstroApi::new()));

        let a = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                orch.process_message(chat("s1", "I was born on 24/01/1986", None))
                    .await
            })
        };
        let b = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                orch.process_message(chat("s1", "at 06:32 am in Rohtak, Haryana", None))
                    .await
            })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let stored = orch.store.get("s1").await.unwrap().unwrap();
        assert_eq!(stored.message_count, 2);
        // both turns' extractions landed, in whichever order they ran
        assert!(stored.partial_birth.dob.is_some());
        assert!(stored.partial_birth.tob.is_some());
    }

    #[tokio::test]
    async fn test_blank_session_id_rejected() {
        let orch = orchestrator(FakeAstroApi::new());
        let err = orch.process_message(chat("  ", "hello", None)).await.unwrap_err();
        assert!(matches!(err, NiroError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let orch = orchestrator(FakeAstroApi::new());
        let huge = "x".repeat(3000);
        let err = orch.process_message(chat("s1", &huge, None)).await.unwrap_err();
        assert!(matches!(err, NiroError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_session_summary_and_delete() {
        let orch = orchestrator(FakeAstroApi::new());
        assert!(orch.session_summary("s1").await.unwrap().is_none());

        orch.process_message(chat("s1", ROHTAK_MSG, None)).await.unwrap();
        let summary = orch.session_summary("s1").await.unwrap().unwrap();
        assert!(summary.has_birth_details);
        assert!(summary.has_done_retro);
        assert_eq!(summary.message_count, 1);

        assert!(orch.delete_session("s1").await.unwrap());
        assert!(orch.session_summary("s1").await.unwrap().is_none());
        assert!(!orch.delete_session("s1").await.unwrap());
    }
}
