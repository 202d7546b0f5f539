use crate::model::{ConversationMode, SessionState};
use crate::topics::{self, Topic, TopicClassification};

/// Whether this turn needs the Topic Classifier at all. Birth collection and
/// the one-time retrospective ignore topics entirely.
pub fn needs_topic(session: &SessionState) -> bool {
    session.birth_details.is_some() && session.has_done_retro
}

/// Decide the mode and focus for one turn. Pure: the result is fully
/// determined by session fields, the chip id, and the classification.
///
/// Priority order:
/// 1. Birth details incomplete → BIRTH_COLLECTION, regardless of input.
/// 2. Details complete but no retrospective delivered yet → PAST_THEMES.
/// 3. Chip id decides: daily-guidance chips → DAILY_GUIDANCE, topic chips →
///    FOCUS_READING on that topic.
/// 4. Otherwise FOCUS_READING on the classified topic, except that a
///    daily_guidance classification switches to DAILY_GUIDANCE.
pub fn route(
    session: &SessionState,
    action_id: Option<&str>,
    classification: Option<&TopicClassification>,
) -> (ConversationMode, Option<Topic>) {
    // Rule 1: nothing works without birth details
    if session.birth_details.is_none() {
        return (ConversationMode::BirthCollection, None);
    }

    // Rule 2: one-time retrospective
    if !session.has_done_retro {
        return (ConversationMode::PastThemes, None);
    }

    // Rule 3: explicit chip
    if let Some(action) = action_id {
        if let Some(topic) = topics::action_topic(action) {
            return mode_for_topic(topic);
        }
        if topics::PRESERVE_TOPIC_ACTIONS.contains(&action) {
            let topic = session.focus.unwrap_or(Topic::General);
            return (ConversationMode::FocusReading, Some(topic));
        }
    }

    // Rule 4: classified topic
    let topic = classification.map_or(Topic::General, |c| c.primary);
    mode_for_topic(topic)
}

fn mode_for_topic(topic: Topic) -> (ConversationMode, Option<Topic>) {
    if topic == Topic::DailyGuidance {
        (ConversationMode::DailyGuidance, None)
    } else {
        (ConversationMode::FocusReading, Some(topic))
    }
}
