use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::topics::Topic;

/// Where the conversation currently stands. Drives both reply composition
/// and which suggested actions surface in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationMode {
    Welcome,
    BirthCollection,
    PastThemes,
    FocusReading,
    DailyGuidance,
    Error,
}

impl ConversationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "WELCOME",
            Self::BirthCollection => "BIRTH_COLLECTION",
            Self::PastThemes => "PAST_THEMES",
            Self::FocusReading => "FOCUS_READING",
            Self::DailyGuidance => "DAILY_GUIDANCE",
            Self::Error => "ERROR",
        }
    }

    /// Modes that read the natal chart and transits before composing.
    pub fn uses_astro_data(&self) -> bool {
        matches!(
            self,
            Self::PastThemes | Self::FocusReading | Self::DailyGuidance
        )
    }
}

/// Birth details as they accumulate across turns. All three fields must be
/// present before a chart can be computed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialBirthDetails {
    pub dob: Option<NaiveDate>,
    /// 24h "HH:MM".
    pub tob: Option<String>,
    pub location: Option<String>,
}

impl PartialBirthDetails {
    pub fn is_complete(&self) -> bool {
        self.dob.is_some() && self.tob.is_some() && self.location.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.dob.is_none() && self.tob.is_none() && self.location.is_none()
    }

    /// Human-readable names of the fields still missing, in display order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.dob.is_none() {
            missing.push("date of birth");
        }
        if self.tob.is_none() {
            missing.push("time of birth");
        }
        if self.location.is_none() {
            missing.push("place of birth");
        }
        missing
    }

    /// Merge newly extracted values over the current ones. New non-empty
    /// values win, so a user correcting a typo gets the correction.
    pub fn merge(&mut self, newer: &PartialBirthDetails) {
        if newer.dob.is_some() {
            self.dob = newer.dob;
        }
        if newer.tob.is_some() {
            self.tob = newer.tob.clone();
        }
        if newer.location.is_some() {
            self.location = newer.location.clone();
        }
    }
}

/// Complete, geocoded birth details. The unit of identity for chart caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BirthDetails {
    pub dob: NaiveDate,
    /// 24h "HH:MM".
    pub tob: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    /// UTC offset in hours, e.g. 5.5 for IST.
    pub tz_offset: f64,
}

impl BirthDetails {
    /// Stable in-process cache key over the identity fields. Coordinates are
    /// derived from `location`, so they stay out of the hash.
    pub fn cache_key(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.dob.hash(&mut hasher);
        self.tob.hash(&mut hasher);
        self.location.trim().to_lowercase().hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Everything the orchestrator knows about one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub mode: ConversationMode,
    /// Topic of the most recent focused reading, if any.
    pub focus: Option<Topic>,
    #[serde(default)]
    pub partial_birth: PartialBirthDetails,
    pub birth_details: Option<BirthDetails>,
    /// Set once the one-time past-themes reading has been delivered.
    #[serde(default)]
    pub has_done_retro: bool,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub history: Vec<TurnRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            mode: ConversationMode::Welcome,
            focus: None,
            partial_birth: PartialBirthDetails::default(),
            birth_details: None,
            has_done_retro: false,
            message_count: 0,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push_turn(&mut self, role: &str, content: &str) {
        self.history.push(TurnRecord {
            role: role.to_string(),
            content: content.to_string(),
            at: Utc::now(),
        });
    }

    /// Keep at most `max_turns` user/assistant exchanges.
    pub fn trim_history(&mut self, max_turns: usize) {
        let max_records = max_turns * 2;
        if self.history.len() > max_records {
            let excess = self.history.len() - max_records;
            self.history.drain(..excess);
        }
    }
}
