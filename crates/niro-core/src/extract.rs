use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use serde::Deserialize;

use crate::llm::{strip_code_fences, TextGenerator};
use crate::model::PartialBirthDetails;

// DD/MM/YYYY, DD-MM-YYYY, DD.MM.YYYY
static DATE_NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})[/\-.](\d{1,2})[/\-.](\d{4})\b").unwrap());

// "24 Jan 1986", "24th January, 1986"
static DATE_MONTH_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+(\d{4})\b",
    )
    .unwrap()
});

// "06:32 am", "18:45"
static TIME_COLON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2}):(\d{2})\s*(am|pm)?\b").unwrap());

// "6 pm"
static TIME_MERIDIEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})\s*(am|pm)\b").unwrap());

// "0632 hrs"
static TIME_COMPACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{2})(\d{2})\s*(?:hrs|hours)\b").unwrap());

// "in Rohtak, Haryana" / "at Mumbai" / "from New Delhi"
static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[Ii]n|[Aa]t|[Ff]rom)\s+([A-Z][a-zA-Z]+(?:,?\s+[A-Z][a-zA-Z]+)*)").unwrap()
});

const MONTHS: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// How the details in a `BirthExtraction` were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// Everything came from deterministic patterns.
    Pattern,
    /// Everything came from the LLM fallback.
    Llm,
    /// Patterns found some fields, the LLM filled others.
    Mixed,
    /// The message carried no recognizable birth details.
    NoMatch,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Llm => "llm",
            Self::Mixed => "mixed",
            Self::NoMatch => "no_match",
        }
    }
}

/// Fields found in one message, with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct BirthExtraction {
    pub found: PartialBirthDetails,
    pub confidence: f32,
    pub method: ExtractionMethod,
}

const EXTRACT_SYSTEM_PROMPT: &str = "Extract birth details ONLY. Respond with strict JSON, no \
prose, no markdown: {\"dob\": \"YYYY-MM-DD\" or null, \"tob\": \"HH:MM\" 24h or null, \
\"location\": \"<place>\" or null}. Never guess a field the text does not state.";

#[derive(Debug, Deserialize)]
struct LlmExtraction {
    #[serde(default)]
    dob: Option<String>,
    #[serde(default)]
    tob: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

/// Extract birth details from one message.
///
/// Deterministic patterns run first. The LLM is invoked only when the prior
/// details merged with the pattern result are still incomplete; a message
/// carrying all three fields in parseable form never costs an LLM call.
/// Pattern-found fields win over LLM-found fields on conflict.
pub async fn extract<G: TextGenerator>(
    message: &str,
    prior: &PartialBirthDetails,
    llm: Option<&G>,
) -> BirthExtraction {
    let (pattern_found, confidence) = extract_patterns(message);

    let mut candidate = prior.clone();
    candidate.merge(&pattern_found);
    if candidate.is_complete() {
        tracing::debug!(confidence, "pattern extraction complete, skipping LLM");
        return BirthExtraction {
            found: pattern_found,
            confidence,
            method: ExtractionMethod::Pattern,
        };
    }

    let Some(llm) = llm else {
        return pattern_only_result(pattern_found, confidence);
    };
    if message.trim().is_empty() {
        return pattern_only_result(pattern_found, confidence);
    }

    match extract_llm(message, &candidate, llm).await {
        Some(llm_found) => {
            let mut found = llm_found;
            // Deterministic fields take precedence
            found.merge(&pattern_found);
            let method = if pattern_found.is_empty() {
                ExtractionMethod::Llm
            } else {
                ExtractionMethod::Mixed
            };
            BirthExtraction {
                found,
                confidence: confidence.max(0.6),
                method,
            }
        }
        None => pattern_only_result(pattern_found, confidence),
    }
}

fn pattern_only_result(found: PartialBirthDetails, confidence: f32) -> BirthExtraction {
    let method = if found.is_empty() {
        ExtractionMethod::NoMatch
    } else {
        ExtractionMethod::Pattern
    };
    BirthExtraction {
        found,
        confidence,
        method,
    }
}

/// Deterministic pass. Confidence weights: date 0.4, time 0.3, location 0.3,
/// so a full pattern hit sums to 1.0.
fn extract_patterns(message: &str) -> (PartialBirthDetails, f32) {
    let mut found = PartialBirthDetails::default();
    let mut confidence = 0.0;

    // Blank out the date span before time matching so "24.01.1986" cannot
    // double as a dot-separated time.
    let mut remainder = message.to_string();

    if let Some(caps) = DATE_NUMERIC_RE.captures(message) {
        let day: u32 = caps[1].parse().unwrap_or(0);
        let month: u32 = caps[2].parse().unwrap_or(0);
        let year: i32 = caps[3].parse().unwrap_or(0);
        if let Some(date) = plausible_date(year, month, day) {
            found.dob = Some(date);
            confidence += 0.4;
            let span = caps.get(0).unwrap();
            remainder.replace_range(span.range(), &" ".repeat(span.len()));
        }
    } else if let Some(caps) = DATE_MONTH_NAME_RE.captures(message) {
        let day: u32 = caps[1].parse().unwrap_or(0);
        let month = MONTHS
            .iter()
            .position(|m| m.eq_ignore_ascii_case(&caps[2]))
            .map(|i| i as u32 + 1)
            .unwrap_or(0);
        let year: i32 = caps[3].parse().unwrap_or(0);
        if let Some(date) = plausible_date(year, month, day) {
            found.dob = Some(date);
            confidence += 0.4;
            let span = caps.get(0).unwrap();
            remainder.replace_range(span.range(), &" ".repeat(span.len()));
        }
    }

    if let Some(tob) = extract_time(&remainder) {
        found.tob = Some(tob);
        confidence += 0.3;
    }

    if let Some(caps) = LOCATION_RE.captures(&remainder) {
        let location = caps[1].trim().trim_end_matches([',', '.']).to_string();
        if location.len() > 2 {
            found.location = Some(location);
            confidence += 0.3;
        }
    }

    (found, confidence)
}

fn extract_time(text: &str) -> Option<String> {
    if let Some(caps) = TIME_COLON_RE.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        let meridiem = caps.get(3).map(|m| m.as_str().to_lowercase());
        return normalize_time(hour, minute, meridiem.as_deref());
    }
    if let Some(caps) = TIME_MERIDIEM_RE.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let meridiem = caps[2].to_lowercase();
        return normalize_time(hour, 0, Some(&meridiem));
    }
    if let Some(caps) = TIME_COMPACT_RE.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        return normalize_time(hour, minute, None);
    }
    None
}

fn normalize_time(mut hour: u32, minute: u32, meridiem: Option<&str>) -> Option<String> {
    match meridiem {
        Some("pm") if hour != 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {}
    }
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(format!("{hour:02}:{minute:02}"))
}

/// A pattern hit is only trusted when it is a real calendar date in a
/// plausible birth-year range; otherwise it is dropped so the LLM fallback
/// can have a look at the raw text.
fn plausible_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    if year < 1900 || year > Utc::now().year() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

async fn extract_llm<G: TextGenerator>(
    message: &str,
    known: &PartialBirthDetails,
    llm: &G,
) -> Option<PartialBirthDetails> {
    let mut context = String::new();
    if let Some(dob) = known.dob {
        context.push_str(&format!("Known date of birth: {dob}\n"));
    }
    if let Some(tob) = &known.tob {
        context.push_str(&format!("Known time of birth: {tob}\n"));
    }
    if let Some(location) = &known.location {
        context.push_str(&format!("Known place of birth: {location}\n"));
    }
    let prompt = format!("{context}Message: {message}");

    let raw = match llm.generate(&prompt, Some(EXTRACT_SYSTEM_PROMPT)).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(provider = llm.id(), error = %e, "LLM birth extraction failed");
            return None;
        }
    };

    let parsed: LlmExtraction = serde_json::from_str(strip_code_fences(&raw)).ok()?;

    let mut found = PartialBirthDetails {
        dob: parsed
            .dob
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        tob: parsed.tob.filter(|t| TIME_COLON_RE.is_match(t)),
        location: parsed.location.filter(|l| l.trim().len() > 2),
    };
    if let Some(dob) = found.dob {
        // Same plausibility bar as the pattern path
        if plausible_date(dob.year(), dob.month(), dob.day()).is_none() {
            found.dob = None;
        }
    }
    if found.is_empty() {
        None
    } else {
        Some(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NiroError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeLlm {
        response: String,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeLlm {
        fn ok(response: &str) -> Self {
            Self {
                response: response.to_string(),
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: String::new(),
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TextGenerator for FakeLlm {
        async fn generate(&self, _prompt: &str, _system: Option<&str>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NiroError::Llm("HTTP 503 unavailable".into()))
            } else {
                Ok(self.response.clone())
            }
        }

        fn id(&self) -> &str {
            "fake"
        }
    }

    const NO_LLM: Option<&FakeLlm> = None;

    fn empty() -> PartialBirthDetails {
        PartialBirthDetails::default()
    }

    // -- Pattern extraction --

    #[tokio::test]
    async fn test_full_message_skips_llm() {
        let llm = FakeLlm::ok("{}");
        let msg = "My name is X. I was born on 24/01/1986 at 06:32 am in Rohtak, Haryana.";
        let result = extract(msg, &empty(), Some(&llm)).await;

        assert_eq!(result.found.dob, NaiveDate::from_ymd_opt(1986, 1, 24));
        assert_eq!(result.found.tob.as_deref(), Some("06:32"));
        assert_eq!(result.found.location.as_deref(), Some("Rohtak, Haryana"));
        assert!((result.confidence - 1.0).abs() < f32::EPSILON);
        assert_eq!(result.method, ExtractionMethod::Pattern);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_dash_date_format() {
        let result = extract("born 24-01-1986 at 06:32 in Delhi", &empty(), NO_LLM).await;
        assert_eq!(result.found.dob, NaiveDate::from_ymd_opt(1986, 1, 24));
    }

    #[tokio::test]
    async fn test_dot_date_does_not_leak_into_time() {
        // "24.01.1986" must parse as a date, not as 24:01 o'clock
        let result = extract("born 24.01.1986 in Mumbai", &empty(), NO_LLM).await;
        assert_eq!(result.found.dob, NaiveDate::from_ymd_opt(1986, 1, 24));
        assert_eq!(result.found.tob, None);
    }

    #[tokio::test]
    async fn test_month_name_date() {
        let result = extract("I was born on 24th January 1986 in Pune", &empty(), NO_LLM).await;
        assert_eq!(result.found.dob, NaiveDate::from_ymd_opt(1986, 1, 24));
        assert_eq!(result.found.location.as_deref(), Some("Pune"));
    }

    #[tokio::test]
    async fn test_pm_time_normalized() {
        let result = extract("born on 15/06/1990 at 6 pm in Chennai", &empty(), NO_LLM).await;
        assert_eq!(result.found.tob.as_deref(), Some("18:00"));
    }

    #[tokio::test]
    async fn test_midnight_normalization() {
        let result = extract("at 12:15 am in Jaipur", &empty(), NO_LLM).await;
        assert_eq!(result.found.tob.as_deref(), Some("00:15"));
    }

    #[tokio::test]
    async fn test_24h_time() {
        let result = extract("time of birth 18:45", &empty(), NO_LLM).await;
        assert_eq!(result.found.tob.as_deref(), Some("18:45"));
    }

    #[tokio::test]
    async fn test_compact_hrs_time() {
        let result = extract("born around 0632 hrs", &empty(), NO_LLM).await;
        assert_eq!(result.found.tob.as_deref(), Some("06:32"));
    }

    #[tokio::test]
    async fn test_invalid_time_rejected() {
        let result = extract("at 26:75 somewhere", &empty(), NO_LLM).await;
        assert_eq!(result.found.tob, None);
    }

    #[tokio::test]
    async fn test_implausible_date_dropped() {
        // Not a real calendar date
        let result = extract("born 32/13/1986 in Delhi", &empty(), NO_LLM).await;
        assert_eq!(result.found.dob, None);
        // Out of birth-year range
        let result = extract("born 24/01/1850 in Delhi", &empty(), NO_LLM).await;
        assert_eq!(result.found.dob, None);
    }

    #[tokio::test]
    async fn test_no_details_at_all() {
        let result = extract("hello, how are you?", &empty(), NO_LLM).await;
        assert!(result.found.is_empty());
        assert_eq!(result.method, ExtractionMethod::NoMatch);
        assert!(result.confidence.abs() < f32::EPSILON);
    }

    // -- Prior details interaction --

    #[tokio::test]
    async fn test_prior_plus_pattern_completes_without_llm() {
        let llm = FakeLlm::ok("{}");
        let prior = PartialBirthDetails {
            dob: NaiveDate::from_ymd_opt(1986, 1, 24),
            tob: Some("06:32".to_string()),
            location: None,
        };
        let result = extract("I was born in Rohtak, Haryana", &prior, Some(&llm)).await;
        assert_eq!(result.found.location.as_deref(), Some("Rohtak, Haryana"));
        assert_eq!(result.method, ExtractionMethod::Pattern);
        assert_eq!(llm.call_count(), 0);
    }

    // -- LLM fallback --

    #[tokio::test]
    async fn test_llm_fills_missing_fields() {
        let llm =
            FakeLlm::ok("{\"dob\": \"1990-06-15\", \"tob\": \"14:30\", \"location\": \"Mumbai\"}");
        let result = extract("typed my details in some odd format", &empty(), Some(&llm)).await;
        assert_eq!(result.found.dob, NaiveDate::from_ymd_opt(1990, 6, 15));
        assert_eq!(result.found.tob.as_deref(), Some("14:30"));
        assert_eq!(result.found.location.as_deref(), Some("Mumbai"));
        assert_eq!(result.method, ExtractionMethod::Llm);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_pattern_fields_beat_llm_fields() {
        // LLM claims a different date; the pattern found one deterministically
        let llm =
            FakeLlm::ok("{\"dob\": \"1991-01-01\", \"tob\": null, \"location\": \"Mumbai\"}");
        let result = extract("born 15/06/1990, somewhere in india", &empty(), Some(&llm)).await;
        assert_eq!(result.found.dob, NaiveDate::from_ymd_opt(1990, 6, 15));
        assert_eq!(result.found.location.as_deref(), Some("Mumbai"));
        assert_eq!(result.method, ExtractionMethod::Mixed);
    }

    #[tokio::test]
    async fn test_llm_failure_keeps_pattern_partial() {
        let llm = FakeLlm::failing();
        let result = extract("born 15/06/1990", &empty(), Some(&llm)).await;
        assert_eq!(result.found.dob, NaiveDate::from_ymd_opt(1990, 6, 15));
        assert_eq!(result.method, ExtractionMethod::Pattern);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_llm_garbage_json_ignored() {
        let llm = FakeLlm::ok("sorry, I cannot do that");
        let result = extract("born 15/06/1990", &empty(), Some(&llm)).await;
        assert_eq!(result.found.dob, NaiveDate::from_ymd_opt(1990, 6, 15));
        assert_eq!(result.found.location, None);
    }

    #[tokio::test]
    async fn test_llm_implausible_date_dropped() {
        let llm = FakeLlm::ok("{\"dob\": \"1850-01-01\", \"tob\": \"10:00\", \"location\": null}");
        let result = extract("old records", &empty(), Some(&llm)).await;
        assert_eq!(result.found.dob, None);
        assert_eq!(result.found.tob.as_deref(), Some("10:00"));
    }

    #[tokio::test]
    async fn test_empty_message_no_llm_call() {
        let llm = FakeLlm::ok("{}");
        let result = extract("   ", &empty(), Some(&llm)).await;
        assert!(result.found.is_empty());
        assert_eq!(llm.call_count(), 0);
    }
}
