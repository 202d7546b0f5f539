use serde_json::json;

use crate::features::AstroFeatures;
use crate::llm::TextGenerator;
use crate::model::{ConversationMode, NiroReply, SuggestedAction};
use crate::topics::Topic;

const NIRO_SYSTEM_PROMPT: &str = r#"You are NIRO, a concise and insightful Vedic astrologer.

Your purpose:
1. Answer ONLY the user's question directly and concisely
2. Use ONLY the astro data provided as your astrological data source
3. If data is missing or inconclusive, state uncertainty instead of guessing
4. Never generate full reports unless explicitly asked
5. Use the topic/focus to scope your answer appropriately

MANDATORY RESPONSE STRUCTURE:

SUMMARY:
[2-3 concise lines directly answering the user's question]

REASONS:
- [Chart Factor] -> [Effect] -> [Interpretation]
(2-4 bullets maximum, using ONLY the provided astro data)

REMEDIES:
(Only include if the chart shows a clear challenge)
- [Simple remedy 1]
- [Simple remedy 2]

RULES:
- Use possibility language: "This phase tends to...", "You may experience..."
- Never claim certainty: avoid "This will happen"
- Stay warm, grounded, conversational
- Be extremely concise"#;

const MAX_REASONS: usize = 4;
const MAX_REMEDIES: usize = 2;

/// Turns mode/topic/features into a user-facing reply. Tries each provider
/// in order; when every provider fails, a deterministic stub reply keyed by
/// topic is produced instead. This never returns an error.
pub struct ReplyComposer<G: TextGenerator> {
    providers: Vec<G>,
}

impl<G: TextGenerator> ReplyComposer<G> {
    pub fn new(providers: Vec<G>) -> Self {
        Self { providers }
    }

    /// First provider in the fallback order, when any is configured. The
    /// orchestrator reuses it for extraction and classification calls.
    pub fn primary(&self) -> Option<&G> {
        self.providers.first()
    }

    pub async fn compose(
        &self,
        mode: ConversationMode,
        topic: Topic,
        user_question: &str,
        features: Option<&AstroFeatures>,
    ) -> NiroReply {
        let prompt = build_user_prompt(mode, topic, user_question, features);

        for provider in &self.providers {
            match provider.generate(&prompt, Some(NIRO_SYSTEM_PROMPT)).await {
                Ok(text) => return parse_sections(&text),
                Err(e) => {
                    tracing::warn!(provider = provider.id(), error = %e, "reply provider failed");
                }
            }
        }

        if !self.providers.is_empty() {
            tracing::warn!("all reply providers failed, using stub reply");
        }
        stub_reply(topic, features)
    }
}

fn build_user_prompt(
    mode: ConversationMode,
    topic: Topic,
    user_question: &str,
    features: Option<&AstroFeatures>,
) -> String {
    let astro_data = match features {
        Some(f) if f.has_features => serde_json::to_string_pretty(f)
            .unwrap_or_else(|_| json!({"error": "unserializable"}).to_string()),
        Some(f) => format!(
            "Core chart only (no topic-specific factors found):\n\
             - Ascendant: {}\n- Moon Sign: {}\n- Sun Sign: {}",
            f.ascendant, f.moon_sign, f.sun_sign
        ),
        None => "No astro data is available for this turn.".to_string(),
    };

    format!(
        "CONTEXT:\nMode: {}\nTopic: {}\n\nUSER QUESTION:\n{}\n\nASTRO DATA:\n{}\n\n\
         INSTRUCTIONS:\n- Answer ONLY the user question above\n\
         - Use ONLY the astro data provided\n\
         - Follow the 3-part structure: SUMMARY, REASONS, REMEDIES",
        mode.as_str(),
        topic.as_str(),
        user_question,
        astro_data
    )
}

/// Parse the model's `SUMMARY / REASONS / REMEDIES` sectioned text. Missing
/// sections are tolerated: text before any header counts toward the summary,
/// and an absent REMEDIES section yields an empty list.
pub fn parse_sections(text: &str) -> NiroReply {
    #[derive(PartialEq)]
    enum Section {
        None,
        Summary,
        Reasons,
        Remedies,
    }

    let mut summary = String::new();
    let mut reasons = Vec::new();
    let mut remedies = Vec::new();
    let mut section = Section::None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let lower = line.to_lowercase();
        if lower.contains("summary") && line.contains(':') {
            section = Section::Summary;
            if let Some(after) = line.split_once(':').map(|(_, a)| a.trim()) {
                if !after.is_empty() {
                    summary = after.to_string();
                }
            }
            continue;
        }
        if lower.contains("reason") && line.contains(':') {
            section = Section::Reasons;
            continue;
        }
        if lower.contains("remed") && line.contains(':') {
            section = Section::Remedies;
            continue;
        }

        match section {
            Section::Summary | Section::None => {
                if summary.is_empty() {
                    summary = line.to_string();
                } else {
                    summary.push(' ');
                    summary.push_str(line);
                }
            }
            Section::Reasons => {
                let clean = strip_bullet(line);
                if clean.len() > 10 {
                    reasons.push(clean.to_string());
                }
            }
            Section::Remedies => {
                let clean = strip_bullet(line);
                if clean.len() > 10 {
                    remedies.push(clean.to_string());
                }
            }
        }
    }

    if summary.is_empty() {
        summary = text.chars().take(300).collect();
    }
    reasons.truncate(MAX_REASONS);
    remedies.truncate(MAX_REMEDIES);

    NiroReply {
        summary,
        reasons,
        remedies,
        raw_text: text.to_string(),
    }
}

fn strip_bullet(line: &str) -> &str {
    line.trim_start_matches(|c: char| {
        c == '-' || c == '*' || c == '.' || c == ')' || c.is_ascii_digit() || c.is_whitespace()
    })
    .trim()
}

/// Deterministic reply used when no provider is configured or every
/// provider failed. Keyed by topic so the degraded answer still matches
/// what was asked.
pub fn stub_reply(topic: Topic, features: Option<&AstroFeatures>) -> NiroReply {
    let (ascendant, moon_sign, mahadasha) = match features {
        Some(f) => (
            f.ascendant.as_str(),
            f.moon_sign.as_str(),
            f.mahadasha
                .as_ref()
                .map(|d| d.planet.as_str())
                .unwrap_or("the current"),
        ),
        None => ("your", "your", "the current"),
    };

    let area = topic_phrase(topic);
    let summary = format!(
        "With {ascendant} Ascendant and {moon_sign} Moon, your {area} themes are \
         shaped by {mahadasha} Mahadasha. A full reading is temporarily unavailable, \
         but these core placements set the tone for this area."
    );

    NiroReply {
        raw_text: summary.clone(),
        summary,
        reasons: vec![
            format!("{ascendant} Ascendant shapes your natural approach to {area}"),
            format!("{moon_sign} Moon colors the emotional side of {area} decisions"),
        ],
        remedies: vec![],
    }
}

fn topic_phrase(topic: Topic) -> &'static str {
    match topic {
        Topic::SelfPsychology => "inner growth",
        Topic::Career => "career",
        Topic::Money => "financial",
        Topic::RomanticRelationships => "relationship",
        Topic::MarriagePartnership => "marriage",
        Topic::FamilyHome => "family and home",
        Topic::FriendsSocial => "social",
        Topic::LearningEducation => "learning",
        Topic::HealthEnergy => "health",
        Topic::Spirituality => "spiritual",
        Topic::TravelRelocation => "travel",
        Topic::LegalContracts => "legal",
        Topic::DailyGuidance => "day-to-day",
        Topic::General => "life",
    }
}

pub fn birth_collection_reply(missing: &[&'static str], location_unresolved: bool) -> NiroReply {
    let summary = if location_unresolved {
        "I couldn't place your birth location on the map. Could you give the \
         nearest major city, for example \"Rohtak, Haryana\"?"
            .to_string()
    } else if missing.is_empty() {
        "Thank you, I have your birth details. Let me look at your chart.".to_string()
    } else {
        format!(
            "To read your chart accurately I still need your {}. You can share it \
             like: \"I was born on 24/01/1986 at 06:32 am in Rohtak, Haryana\".",
            missing.join(" and ")
        )
    };

    NiroReply {
        raw_text: summary.clone(),
        summary,
        reasons: vec![
            "The ascendant is calculated from the exact birth time".to_string(),
            "Planetary positions come from the birth date and place".to_string(),
        ],
        remedies: vec![],
    }
}

/// Follow-up chips for a given mode and topic. A static lookup keeps every
/// emitted chip id routable.
pub fn suggested_actions(mode: ConversationMode, topic: Option<Topic>) -> Vec<SuggestedAction> {
    match mode {
        ConversationMode::Welcome | ConversationMode::BirthCollection | ConversationMode::Error => {
            vec![]
        }
        ConversationMode::PastThemes => vec![
            SuggestedAction::new("focus_career", "Career insights"),
            SuggestedAction::new("focus_relationship", "Relationships"),
            SuggestedAction::new("focus_money", "Money & finances"),
            SuggestedAction::new("focus_health", "Health"),
        ],
        ConversationMode::DailyGuidance => vec![
            SuggestedAction::new("weekly_outlook", "This week's outlook"),
            SuggestedAction::new("focus_career", "Career today"),
            SuggestedAction::new("focus_relationship", "Love today"),
            SuggestedAction::new("focus_money", "Money today"),
        ],
        ConversationMode::FocusReading => match topic {
            Some(Topic::Career) => vec![
                SuggestedAction::new("ask_timing", "Best timing for changes"),
                SuggestedAction::new("deep_dive", "Go deeper on career"),
                SuggestedAction::new("focus_money", "Ask about money"),
                SuggestedAction::new("daily_guidance", "Daily guidance"),
            ],
            Some(Topic::RomanticRelationships) | Some(Topic::MarriagePartnership) => vec![
                SuggestedAction::new("ask_timing", "Timing for relationships"),
                SuggestedAction::new("deep_dive", "Go deeper on love"),
                SuggestedAction::new("compatibility", "Compatibility insights"),
                SuggestedAction::new("focus_career", "Ask about career"),
            ],
            Some(Topic::Money) => vec![
                SuggestedAction::new("ask_timing", "Best timing for investments"),
                SuggestedAction::new("deep_dive", "Go deeper on finances"),
                SuggestedAction::new("focus_career", "Career & income"),
                SuggestedAction::new("daily_guidance", "Daily guidance"),
            ],
            Some(Topic::HealthEnergy) => vec![
                SuggestedAction::new("deep_dive", "Go deeper on health"),
                SuggestedAction::new("focus_career", "Ask about career"),
                SuggestedAction::new("daily_guidance", "Daily guidance"),
            ],
            _ => vec![
                SuggestedAction::new("focus_career", "Career"),
                SuggestedAction::new("focus_relationship", "Relationships"),
                SuggestedAction::new("focus_money", "Money"),
                SuggestedAction::new("daily_guidance", "Daily guidance"),
            ],
        },
    }
}
