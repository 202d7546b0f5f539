use serde::{Deserialize, Serialize};

use crate::llm::{strip_code_fences, TextGenerator};

/// Topic taxonomy for Niro conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    SelfPsychology,
    Career,
    Money,
    RomanticRelationships,
    MarriagePartnership,
    FamilyHome,
    FriendsSocial,
    LearningEducation,
    HealthEnergy,
    Spirituality,
    TravelRelocation,
    LegalContracts,
    DailyGuidance,
    General,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfPsychology => "self_psychology",
            Self::Career => "career",
            Self::Money => "money",
            Self::RomanticRelationships => "romantic_relationships",
            Self::MarriagePartnership => "marriage_partnership",
            Self::FamilyHome => "family_home",
            Self::FriendsSocial => "friends_social",
            Self::LearningEducation => "learning_education",
            Self::HealthEnergy => "health_energy",
            Self::Spirituality => "spirituality",
            Self::TravelRelocation => "travel_relocation",
            Self::LegalContracts => "legal_contracts",
            Self::DailyGuidance => "daily_guidance",
            Self::General => "general",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug.trim() {
            "self_psychology" => Some(Self::SelfPsychology),
            "career" => Some(Self::Career),
            "money" => Some(Self::Money),
            "romantic_relationships" => Some(Self::RomanticRelationships),
            "marriage_partnership" => Some(Self::MarriagePartnership),
            "family_home" => Some(Self::FamilyHome),
            "friends_social" => Some(Self::FriendsSocial),
            "learning_education" => Some(Self::LearningEducation),
            "health_energy" => Some(Self::HealthEnergy),
            "spirituality" => Some(Self::Spirituality),
            "travel_relocation" => Some(Self::TravelRelocation),
            "legal_contracts" => Some(Self::LegalContracts),
            "daily_guidance" => Some(Self::DailyGuidance),
            "general" => Some(Self::General),
            _ => None,
        }
    }

    pub const ALL: &'static [Topic] = &[
        Self::SelfPsychology,
        Self::Career,
        Self::Money,
        Self::RomanticRelationships,
        Self::MarriagePartnership,
        Self::FamilyHome,
        Self::FriendsSocial,
        Self::LearningEducation,
        Self::HealthEnergy,
        Self::Spirituality,
        Self::TravelRelocation,
        Self::LegalContracts,
        Self::DailyGuidance,
        Self::General,
    ];
}

/// How a classification was produced, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Chip,
    Llm,
    Keyword,
    Fallback,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chip => "chip",
            Self::Llm => "llm",
            Self::Keyword => "keyword",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicClassification {
    pub primary: Topic,
    pub secondary: Vec<Topic>,
    pub confidence: f32,
    pub source: ClassificationSource,
    pub needs_clarification: bool,
}

impl TopicClassification {
    fn chip(topic: Topic) -> Self {
        Self {
            primary: topic,
            secondary: Vec::new(),
            confidence: 1.0,
            source: ClassificationSource::Chip,
            needs_clarification: false,
        }
    }
}

/// Chip ids that map directly to a topic.
pub const ACTION_TOPICS: &[(&str, Topic)] = &[
    // Focus actions
    ("focus_career", Topic::Career),
    ("focus_relationship", Topic::RomanticRelationships),
    ("focus_marriage", Topic::MarriagePartnership),
    ("focus_money", Topic::Money),
    ("focus_finance", Topic::Money),
    ("focus_health", Topic::HealthEnergy),
    ("focus_family", Topic::FamilyHome),
    ("focus_education", Topic::LearningEducation),
    ("focus_spirituality", Topic::Spirituality),
    ("focus_travel", Topic::TravelRelocation),
    // Ask actions
    ("ask_career", Topic::Career),
    ("ask_relationship", Topic::RomanticRelationships),
    ("ask_money", Topic::Money),
    ("ask_health", Topic::HealthEnergy),
    // Time-based actions
    ("daily_guidance", Topic::DailyGuidance),
    ("weekly_outlook", Topic::DailyGuidance),
    ("ask_timing", Topic::General),
    // Compatibility
    ("compatibility", Topic::RomanticRelationships),
];

/// Chip ids that keep the conversation on its current topic.
pub const PRESERVE_TOPIC_ACTIONS: &[&str] = &["deep_dive", "go_deeper"];

pub fn action_topic(action_id: &str) -> Option<Topic> {
    ACTION_TOPICS
        .iter()
        .find(|(id, _)| *id == action_id)
        .map(|(_, topic)| *topic)
}

/// Keyword table scanned top to bottom; the first topic with any keyword hit
/// wins. Order is the documented tie-break: more specific life areas come
/// before broader ones, and daily guidance sits last so that "my career
/// today" still reads as a career question.
const KEYWORD_TABLE: &[(Topic, &[&str])] = &[
    (
        Topic::MarriagePartnership,
        &[
            "marriage", "husband", "wife", "spouse", "wedding", "married", "divorce",
            "engagement", "matrimony", "manglik", "kundli matching", "vivah", "shaadi",
        ],
    ),
    (
        Topic::RomanticRelationships,
        &[
            "love", "crush", "dating", "boyfriend", "girlfriend", "romantic", "attraction",
            "relationship", "romance", "flirt", "breakup", "soulmate", "twin flame",
        ],
    ),
    (
        Topic::Career,
        &[
            "job", "career", "work", "office", "boss", "promotion", "startup", "company",
            "profession", "employment", "colleague", "interview", "resign", "fired", "hired",
            "workplace", "business", "venture", "entrepreneur", "salary hike", "appraisal",
        ],
    ),
    (
        Topic::Money,
        &[
            "money", "income", "salary", "finance", "investment", "debt", "loan", "wealth",
            "savings", "stock", "trading", "real estate", "inheritance", "financial", "profit",
            "expense", "budget", "crypto", "mutual fund",
        ],
    ),
    (
        Topic::HealthEnergy,
        &[
            "health", "tired", "energy", "fitness", "diet", "stress", "sleep", "illness",
            "disease", "doctor", "hospital", "medicine", "surgery", "anxiety", "depression",
            "wellness", "fatigue", "recovery",
        ],
    ),
    (
        Topic::FamilyHome,
        &[
            "family", "mother", "father", "parents", "home", "house", "children", "kids",
            "son", "daughter", "sibling", "brother", "sister", "relatives", "in-laws",
            "ancestral", "property", "household",
        ],
    ),
    (
        Topic::LearningEducation,
        &[
            "study", "exam", "college", "university", "course", "degree", "learning",
            "education", "school", "student", "training", "certification", "academic",
            "research", "competitive exam", "upsc", "gmat",
        ],
    ),
    (
        Topic::TravelRelocation,
        &[
            "travel", "trip", "abroad", "relocate", "relocation", "foreign", "immigration",
            "visa", "overseas", "settle", "migration", "shifting",
        ],
    ),
    (
        Topic::LegalContracts,
        &[
            "court", "legal", "contract", "lawsuit", "lawyer", "litigation", "dispute",
            "agreement", "settlement", "judge", "police",
        ],
    ),
    (
        Topic::Spirituality,
        &[
            "spiritual", "meditation", "karma", "soul", "enlightenment", "guru", "temple",
            "prayer", "mantra", "moksha", "dharma", "divine", "consciousness", "awakening",
            "past life", "intuition",
        ],
    ),
    (
        Topic::FriendsSocial,
        &[
            "friend", "friends", "social", "networking", "community", "circle",
            "acquaintance", "peers",
        ],
    ),
    (
        Topic::SelfPsychology,
        &[
            "personality", "character", "myself", "identity", "confidence", "self-esteem",
            "who am i", "life path", "destiny", "potential", "strengths", "weaknesses",
        ],
    ),
    (
        Topic::DailyGuidance,
        &[
            "today", "daily", "this week", "this month", "right now", "tomorrow",
        ],
    ),
];

const CLASSIFY_SYSTEM_PROMPT: &str = "You classify a user's astrology question into one topic. \
Respond with strict JSON only, no prose, no markdown: \
{\"topic\": \"<slug>\", \"secondary\": [\"<slug>\"], \"confidence\": 0.0, \"needs_clarification\": false}";

#[derive(Debug, Deserialize)]
struct LlmClassification {
    topic: String,
    #[serde(default)]
    secondary: Vec<String>,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    needs_clarification: bool,
}

/// Classify the topic a turn is about.
///
/// Cascade: chip id, then LLM, then the keyword table, then "general".
/// The LLM layer is skipped entirely when a chip decided the topic.
pub async fn classify<G: TextGenerator>(
    message: &str,
    action_id: Option<&str>,
    last_topic: Option<Topic>,
    llm: Option<&G>,
) -> TopicClassification {
    // 1. Chip wins outright
    if let Some(action) = action_id {
        if let Some(topic) = action_topic(action) {
            tracing::debug!(action, topic = topic.as_str(), "topic from chip");
            return TopicClassification::chip(topic);
        }
        if PRESERVE_TOPIC_ACTIONS.contains(&action) {
            let topic = last_topic.unwrap_or(Topic::General);
            tracing::debug!(action, topic = topic.as_str(), "deep dive keeps topic");
            return TopicClassification::chip(topic);
        }
        tracing::debug!(action, "unknown action id, classifying message instead");
    }

    // 2. LLM classification
    if let Some(llm) = llm {
        if !message.trim().is_empty() {
            match classify_llm(message, last_topic, llm).await {
                Some(classification) => return classification,
                None => {
                    tracing::debug!("LLM classification unusable, falling back to keywords");
                }
            }
        }
    }

    // 3. Keyword table
    if let Some(classification) = classify_keywords(message) {
        return classification;
    }

    // 4. Nothing matched
    TopicClassification {
        primary: Topic::General,
        secondary: Vec::new(),
        confidence: 0.35,
        source: ClassificationSource::Fallback,
        needs_clarification: !message.trim().is_empty(),
    }
}

async fn classify_llm<G: TextGenerator>(
    message: &str,
    last_topic: Option<Topic>,
    llm: &G,
) -> Option<TopicClassification> {
    let taxonomy: Vec<&str> = Topic::ALL.iter().map(|t| t.as_str()).collect();
    let prompt = format!(
        "Topics: {}\nPrevious topic: {}\nMessage: {}",
        taxonomy.join(", "),
        last_topic.map_or("none", |t| t.as_str()),
        message,
    );

    let raw = match llm.generate(&prompt, Some(CLASSIFY_SYSTEM_PROMPT)).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(provider = llm.id(), error = %e, "topic classification call failed");
            return None;
        }
    };

    let parsed: LlmClassification = serde_json::from_str(strip_code_fences(&raw)).ok()?;
    // A topic outside the taxonomy is a collaborator failure, not a result
    let primary = Topic::from_slug(&parsed.topic)?;
    let secondary: Vec<Topic> = parsed
        .secondary
        .iter()
        .filter_map(|s| Topic::from_slug(s))
        .filter(|t| *t != primary)
        .take(2)
        .collect();

    Some(TopicClassification {
        primary,
        secondary,
        // 1.0 is reserved for chips
        confidence: parsed.confidence.clamp(0.0, 0.95),
        source: ClassificationSource::Llm,
        needs_clarification: parsed.needs_clarification,
    })
}

fn classify_keywords(message: &str) -> Option<TopicClassification> {
    let message_lower = message.to_lowercase();
    let words: Vec<&str> = message_lower
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .collect();

    let matches_topic = |keywords: &[&str]| {
        keywords.iter().any(|kw| {
            if kw.contains(' ') {
                message_lower.contains(kw)
            } else {
                words.contains(kw)
            }
        })
    };

    let mut hits = KEYWORD_TABLE
        .iter()
        .filter(|(_, keywords)| matches_topic(keywords))
        .map(|(topic, _)| *topic);

    let primary = hits.next()?;
    let secondary: Vec<Topic> = hits.take(2).collect();
    tracing::debug!(topic = primary.as_str(), "topic from keywords");

    Some(TopicClassification {
        primary,
        secondary,
        confidence: 0.7,
        source: ClassificationSource::Keyword,
        needs_clarification: false,
    })
}
