use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::model::{AstroProfile, AstroTransits, ConversationMode, TransitEvent, YogaInfo};
use crate::topics::Topic;

/// Houses and planet references that matter for each topic. Planet entries
/// may be direct names or lord references like "10th Lord".
const CHART_LEVERS: &[(Topic, &[u8], &[&str])] = &[
    (
        Topic::SelfPsychology,
        &[1, 4, 5, 12],
        &["Lagna Lord", "Moon", "Rahu", "Ketu"],
    ),
    (
        Topic::Career,
        &[2, 6, 10, 11],
        &["10th Lord", "Sun", "Saturn", "Rahu", "Mercury"],
    ),
    (
        Topic::Money,
        &[2, 11, 8, 5],
        &["Jupiter", "Venus", "2nd Lord", "11th Lord"],
    ),
    (
        Topic::RomanticRelationships,
        &[5, 7, 8],
        &["Venus", "Moon", "Mars", "5th Lord"],
    ),
    (
        Topic::MarriagePartnership,
        &[7, 8, 2, 4],
        &["7th Lord", "Venus", "Jupiter", "Mars"],
    ),
    (
        Topic::FamilyHome,
        &[2, 4, 8],
        &["Moon", "4th Lord", "Venus"],
    ),
    (
        Topic::FriendsSocial,
        &[3, 11],
        &["Mercury", "11th Lord", "3rd Lord"],
    ),
    (
        Topic::LearningEducation,
        &[3, 4, 5, 9],
        &["Mercury", "Jupiter", "5th Lord", "9th Lord"],
    ),
    (
        Topic::HealthEnergy,
        &[1, 6, 8, 12],
        &["Lagna Lord", "Sun", "Mars", "Saturn"],
    ),
    (
        Topic::Spirituality,
        &[5, 9, 12],
        &["Jupiter", "Ketu", "9th Lord", "12th Lord"],
    ),
    (
        Topic::TravelRelocation,
        &[3, 4, 9, 12],
        &["Rahu", "9th Lord", "12th Lord", "4th Lord"],
    ),
    (
        Topic::LegalContracts,
        &[6, 7, 9],
        &["Mars", "Saturn", "6th Lord", "7th Lord"],
    ),
    (
        Topic::DailyGuidance,
        &[1, 5, 9],
        &["Moon", "Lagna Lord"],
    ),
    (
        Topic::General,
        &[1, 5, 9, 10],
        &["Lagna Lord", "Moon", "Sun", "Jupiter"],
    ),
];

pub fn chart_levers(topic: Topic) -> (&'static [u8], &'static [&'static str]) {
    CHART_LEVERS
        .iter()
        .find(|(t, _, _)| *t == topic)
        .or_else(|| CHART_LEVERS.iter().find(|(t, _, _)| *t == Topic::General))
        .map(|(_, houses, planets)| (*houses, *planets))
        .expect("general levers present")
}

/// Transit events with strength at or above this count as "strong" for
/// rule firing and timing windows.
const STRONG_TRANSIT: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashaSummary {
    pub planet: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub years_remaining: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FocusFactor {
    House {
        house: u8,
        sign: String,
        lord: String,
        lord_house: Option<u8>,
        lord_sign: Option<String>,
        lord_dignity: Option<String>,
        occupants: Vec<String>,
        significance: &'static str,
    },
    Planet {
        planet: String,
        /// Original lever reference, e.g. "10th Lord".
        reference: String,
        sign: String,
        house: u8,
        dignity: Option<String>,
        retrograde: bool,
        significance: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyRule {
    /// Stable identifier, e.g. "MAHADASHA_VENUS", "SATURN_ASPECT_MOON".
    pub id: String,
    pub meaning: String,
    pub strength: String,
    pub planets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingWindow {
    /// e.g. "June 2025 - August 2025".
    pub period: String,
    /// "favorable", "challenging", or "mixed".
    pub nature: String,
    pub trigger: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house: Option<u8>,
    pub activity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PastEvent {
    /// e.g. "March 2024".
    pub period: String,
    pub planet: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house: Option<u8>,
    pub nature: String,
}

/// Topic-scoped extraction from profile and transits. Built fresh per turn,
/// serialized into the LLM prompt, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AstroFeatures {
    pub topic: Topic,
    pub ascendant: String,
    pub moon_sign: String,
    pub sun_sign: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moon_nakshatra: Option<String>,
    pub mahadasha: Option<DashaSummary>,
    pub antardasha: Option<DashaSummary>,
    pub focus_factors: Vec<FocusFactor>,
    pub key_rules: Vec<KeyRule>,
    pub transits: Vec<TransitEvent>,
    pub timing_windows: Vec<TimingWindow>,
    pub past_events: Vec<PastEvent>,
    pub yogas: Vec<YogaInfo>,
    /// True when any topic-specific factor, rule, transit, or window was
    /// actually extracted. An empty-but-valid feature set is a real state
    /// and callers must be able to tell it apart from "no astro data".
    pub has_features: bool,
}

/// Build the feature payload for one turn. Only levers present in the
/// profile appear in `focus_factors`; nothing is fabricated for gaps.
pub fn build(
    topic: Topic,
    mode: ConversationMode,
    profile: &AstroProfile,
    transits: &AstroTransits,
    today: NaiveDate,
) -> AstroFeatures {
    let (houses, planets) = chart_levers(topic);

    let focus_factors = extract_focus_factors(profile, houses, planets);
    let key_rules = extract_key_rules(profile, transits, houses, today);
    let filtered_transits = filter_transits(transits, houses, today);
    let timing_windows = analyze_timing_windows(profile, transits, houses, today);
    let past_events = if matches!(
        mode,
        ConversationMode::PastThemes | ConversationMode::FocusReading
    ) {
        analyze_past_events(profile, transits, houses, today)
    } else {
        Vec::new()
    };

    let has_features = !focus_factors.is_empty()
        || !key_rules.is_empty()
        || !filtered_transits.is_empty()
        || !timing_windows.is_empty()
        || !past_events.is_empty();

    AstroFeatures {
        topic,
        ascendant: profile.ascendant.clone(),
        moon_sign: profile.moon_sign.clone(),
        sun_sign: profile.sun_sign.clone(),
        moon_nakshatra: profile.moon_nakshatra.clone(),
        mahadasha: profile.mahadasha.as_ref().map(|d| dasha_summary(d, today)),
        antardasha: profile.antardasha.as_ref().map(|d| dasha_summary(d, today)),
        focus_factors,
        key_rules,
        transits: filtered_transits,
        timing_windows,
        past_events,
        yogas: profile.yogas.iter().take(5).cloned().collect(),
        has_features,
    }
}

fn dasha_summary(dasha: &crate::model::DashaPeriod, today: NaiveDate) -> DashaSummary {
    let days_remaining = (dasha.end - today).num_days().max(0);
    DashaSummary {
        planet: dasha.planet.clone(),
        start: dasha.start,
        end: dasha.end,
        years_remaining: (days_remaining as f64 / 365.25 * 10.0).round() / 10.0,
    }
}

fn extract_focus_factors(
    profile: &AstroProfile,
    houses: &[u8],
    planets: &[&str],
) -> Vec<FocusFactor> {
    let mut factors = Vec::new();

    for &house_num in houses {
        let Some(house) = profile.house(house_num) else {
            continue;
        };
        let lord = profile.house_lord(house_num);
        factors.push(FocusFactor::House {
            house: house_num,
            sign: house.sign.clone(),
            lord: house.lord.clone(),
            lord_house: lord.map(|p| p.house),
            lord_sign: lord.map(|p| p.sign.clone()),
            lord_dignity: lord.and_then(|p| p.dignity.clone()),
            occupants: house.occupants.clone(),
            significance: house_significance(house_num),
        });
    }

    for reference in planets {
        let Some(name) = resolve_planet_reference(reference, profile) else {
            continue;
        };
        let Some(planet) = profile.planet(&name) else {
            continue;
        };
        factors.push(FocusFactor::Planet {
            planet: planet.name.clone(),
            reference: reference.to_string(),
            sign: planet.sign.clone(),
            house: planet.house,
            dignity: planet.dignity.clone(),
            retrograde: planet.retrograde,
            significance: planet_significance(&planet.name),
        });
    }

    factors
}

/// Resolve lever references like "10th Lord" or "Lagna Lord" to the actual
/// planet occupying that role in this chart.
fn resolve_planet_reference(reference: &str, profile: &AstroProfile) -> Option<String> {
    const PLANETS: &[&str] = &[
        "Sun", "Moon", "Mars", "Mercury", "Jupiter", "Venus", "Saturn", "Rahu", "Ketu",
    ];
    if PLANETS.contains(&reference) {
        return Some(reference.to_string());
    }

    if reference.contains("Lord") {
        let house_num = if reference.contains("Lagna") {
            1
        } else {
            reference
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse()
                .ok()?
        };
        return profile.house(house_num).map(|h| h.lord.clone());
    }

    None
}

fn extract_key_rules(
    profile: &AstroProfile,
    transits: &AstroTransits,
    houses: &[u8],
    today: NaiveDate,
) -> Vec<KeyRule> {
    let mut rules = Vec::new();

    // Saturn's aspect on the Moon: emotional weight
    if let (Some(saturn), Some(moon)) = (profile.planet("Saturn"), profile.planet("Moon")) {
        if aspects_house(saturn.house, moon.house) {
            let strength = match saturn.dignity.as_deref() {
                Some("exalted") | Some("own sign") => "strong",
                _ => "medium",
            };
            rules.push(KeyRule {
                id: "SATURN_ASPECT_MOON".to_string(),
                meaning: "Saturn's aspect on the Moon brings emotional discipline but can cause heaviness"
                    .to_string(),
                strength: strength.to_string(),
                planets: vec!["Saturn".to_string(), "Moon".to_string()],
                house: None,
            });
        }
    }

    // Jupiter's aspect on the top relevant houses: expansion
    if let Some(jupiter) = profile.planet("Jupiter") {
        for &house_num in houses.iter().take(2) {
            if profile.house(house_num).is_some() && aspects_house(jupiter.house, house_num) {
                let strength = if jupiter.dignity.as_deref() == Some("debilitated") {
                    "weak"
                } else {
                    "strong"
                };
                rules.push(KeyRule {
                    id: format!("JUPITER_ASPECT_{house_num}TH"),
                    meaning: format!(
                        "Jupiter's aspect on the {house_num}th house brings expansion and blessings"
                    ),
                    strength: strength.to_string(),
                    planets: vec!["Jupiter".to_string()],
                    house: Some(house_num),
                });
            }
        }
    }

    // Running mahadasha colors everything
    if let Some(maha) = profile.mahadasha_at(today) {
        let house = profile.planet(&maha.planet).map(|p| p.house);
        rules.push(KeyRule {
            id: format!("MAHADASHA_{}", maha.planet.to_uppercase()),
            meaning: format!(
                "{} Mahadasha emphasizes themes of {}",
                maha.planet,
                planet_significance(&maha.planet)
            ),
            strength: "strong".to_string(),
            planets: vec![maha.planet.clone()],
            house,
        });
    }

    // Strong transits in effect right now
    for event in transits
        .events
        .iter()
        .filter(|e| e.is_active(today))
        .take(5)
    {
        if event.strength >= STRONG_TRANSIT {
            let target = event
                .to_sign
                .clone()
                .or_else(|| event.affected_house.map(|h| format!("house {h}")))
                .unwrap_or_else(|| "the chart".to_string());
            rules.push(KeyRule {
                id: format!(
                    "TRANSIT_{}_{}",
                    event.planet.to_uppercase(),
                    event.kind.to_uppercase()
                ),
                meaning: format!("{} {} affecting {}", event.planet, event.kind, target),
                strength: "strong".to_string(),
                planets: vec![event.planet.clone()],
                house: event.affected_house,
            });
        }
    }

    rules
}

/// Standard 7th aspect.
fn aspects_house(from_house: u8, target: u8) -> bool {
    (from_house + 6) % 12 + 1 == target
}

fn filter_transits(transits: &AstroTransits, houses: &[u8], today: NaiveDate) -> Vec<TransitEvent> {
    let past_cutoff = today - Days::new(180);
    let future_cutoff = today + Days::new(365);

    transits
        .events
        .iter()
        .filter(|e| e.start >= past_cutoff && e.start <= future_cutoff)
        .filter(|e| e.affected_house.is_some_and(|h| houses.contains(&h)))
        .take(10)
        .cloned()
        .collect()
}

fn analyze_timing_windows(
    profile: &AstroProfile,
    transits: &AstroTransits,
    houses: &[u8],
    today: NaiveDate,
) -> Vec<TimingWindow> {
    let future_end = today + Days::new(545);
    let mut windows: Vec<TimingWindow> = transits
        .events
        .iter()
        .filter(|e| e.start >= today && e.start <= future_end)
        .filter(|e| e.strength >= STRONG_TRANSIT)
        .filter(|e| e.affected_house.is_some_and(|h| houses.contains(&h)))
        .map(|e| {
            let nature = match e.nature.as_str() {
                "supportive" => "favorable",
                "challenging" => "challenging",
                _ => "mixed",
            };
            let period = match e.end {
                Some(end) => format!("{} - {}", month_year(e.start), month_year(end)),
                None => format!("{} - ongoing", month_year(e.start)),
            };
            TimingWindow {
                period,
                nature: nature.to_string(),
                trigger: format!("{} {}", e.planet, e.kind),
                house: e.affected_house,
                activity: suggest_activity(nature).to_string(),
            }
        })
        .collect();

    if let (Some(maha), Some(antar)) = (&profile.mahadasha, &profile.antardasha) {
        windows.push(TimingWindow {
            period: format!("Current Antardasha ({})", antar.planet),
            nature: "ongoing".to_string(),
            trigger: format!("{}-{} period", maha.planet, antar.planet),
            house: None,
            activity: "Themes of both planets are active".to_string(),
        });
    }

    windows.truncate(6);
    windows
}

fn analyze_past_events(
    profile: &AstroProfile,
    transits: &AstroTransits,
    houses: &[u8],
    today: NaiveDate,
) -> Vec<PastEvent> {
    let past_start = today - Days::new(730);
    let mut events: Vec<PastEvent> = transits
        .events
        .iter()
        // finished transits only; one still in effect is not a "past" theme
        .filter(|e| e.start >= past_start && e.is_past(today))
        .filter(|e| e.affected_house.is_some_and(|h| houses.contains(&h)))
        .map(|e| PastEvent {
            period: month_year(e.start),
            planet: e.planet.clone(),
            kind: e.kind.clone(),
            house: e.affected_house,
            nature: e.nature.clone(),
        })
        .collect();

    if let Some(maha) = profile.mahadasha_at(today) {
        events.push(PastEvent {
            period: "Current Period".to_string(),
            planet: maha.planet.clone(),
            kind: "mahadasha".to_string(),
            house: None,
            nature: "ongoing".to_string(),
        });
    }

    events.truncate(5);
    events
}

fn month_year(date: NaiveDate) -> String {
    date.format("%B %Y").to_string()
}

fn suggest_activity(nature: &str) -> &'static str {
    match nature {
        "favorable" => "Good time for new initiatives and decisions",
        "challenging" => "Focus on consolidation and careful planning",
        _ => "Mixed results - proceed with awareness",
    }
}

fn house_significance(house: u8) -> &'static str {
    match house {
        1 => "Self, personality, physical body, vitality",
        2 => "Wealth, family, speech, values",
        3 => "Siblings, courage, short travels, communication",
        4 => "Home, mother, emotions, inner peace, property",
        5 => "Intelligence, children, creativity, romance, education",
        6 => "Enemies, diseases, debts, service, daily work",
        7 => "Marriage, partnerships, business, public dealings",
        8 => "Longevity, transformation, hidden matters, inheritance",
        9 => "Fortune, dharma, higher learning, father, spirituality",
        10 => "Career, reputation, status, public image, authority",
        11 => "Gains, income, friends, aspirations, elder siblings",
        12 => "Losses, expenses, foreign lands, moksha, isolation",
        _ => "",
    }
}

fn planet_significance(planet: &str) -> &'static str {
    match planet {
        "Sun" => "Soul, authority, father, vitality, ego, government",
        "Moon" => "Mind, emotions, mother, nurturing, public, liquids",
        "Mars" => "Energy, courage, siblings, property, aggression, blood",
        "Mercury" => "Intelligence, communication, business, skin, nervous system",
        "Jupiter" => "Wisdom, expansion, teachers, children, dharma, wealth",
        "Venus" => "Love, beauty, luxury, spouse, arts, vehicles, pleasures",
        "Saturn" => "Discipline, delays, karma, longevity, service, restrictions",
        "Rahu" => "Obsession, foreign, unconventional, sudden gains, illusion",
        "Ketu" => "Spirituality, detachment, past karma, moksha, intuition",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DashaPeriod, HouseData, PlanetPosition};
    use chrono::Utc;

    fn planet(name: &str, sign: &str, house: u8) -> PlanetPosition {
        PlanetPosition {
            name: name.to_string(),
            sign: sign.to_string(),
            house,
            degree: 10.0,
            nakshatra: None,
            retrograde: false,
            dignity: None,
        }
    }

    fn house(num: u8, sign: &str, lord: &str) -> HouseData {
        HouseData {
            house: num,
            sign: sign.to_string(),
            lord: lord.to_string(),
            occupants: vec![],
        }
    }

    fn profile() -> AstroProfile {
        AstroProfile {
            ascendant: "Sagittarius".to_string(),
            moon_sign: "Taurus".to_string(),
            sun_sign: "Capricorn".to_string(),
            moon_nakshatra: Some("Rohini".to_string()),
            planets: vec![
                planet("Sun", "Capricorn", 2),
                planet("Moon", "Taurus", 6),
                planet("Mercury", "Capricorn", 2),
                planet("Jupiter", "Aquarius", 3),
                planet("Saturn", "Scorpio", 12),
                planet("Rahu", "Aries", 5),
            ],
            houses: vec![
                house(2, "Capricorn", "Saturn"),
                house(6, "Taurus", "Venus"),
                house(10, "Virgo", "Mercury"),
                house(11, "Libra", "Venus"),
            ],
            mahadasha: Some(DashaPeriod {
                planet: "Saturn".to_string(),
                start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2039, 1, 1).unwrap(),
            }),
            antardasha: Some(DashaPeriod {
                planet: "Mercury".to_string(),
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
            }),
            dasha_timeline: vec![],
            yogas: vec![],
        }
    }

    fn transit(house: u8, start: NaiveDate, strength: f64) -> TransitEvent {
        TransitEvent {
            planet: "Saturn".to_string(),
            kind: "sign_change".to_string(),
            to_sign: None,
            affected_house: Some(house),
            start,
            end: Some(start + Days::new(60)),
            nature: "challenging".to_string(),
            strength,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn empty_transits() -> AstroTransits {
        AstroTransits {
            from_date: today() - Days::new(730),
            to_date: today() + Days::new(365),
            computed_at: Utc::now(),
            events: vec![],
        }
    }

    #[test]
    fn test_career_levers() {
        let (houses, planets) = chart_levers(Topic::Career);
        assert_eq!(houses, &[2, 6, 10, 11]);
        assert!(planets.contains(&"10th Lord"));
    }

    #[test]
    fn test_resolve_lord_reference() {
        let p = profile();
        assert_eq!(
            resolve_planet_reference("10th Lord", &p),
            Some("Mercury".to_string())
        );
        assert_eq!(resolve_planet_reference("Sun", &p), Some("Sun".to_string()));
        // 1st house missing from this chart
        assert_eq!(resolve_planet_reference("Lagna Lord", &p), None);
        assert_eq!(resolve_planet_reference("Transit planets", &p), None);
    }

    #[test]
    fn test_focus_factors_skip_missing_levers() {
        let p = profile();
        let features = build(
            Topic::Career,
            ConversationMode::FocusReading,
            &p,
            &empty_transits(),
            today(),
        );
        // Houses 2, 6, 10, 11 exist in the chart
        let house_factors = features
            .focus_factors
            .iter()
            .filter(|f| matches!(f, FocusFactor::House { .. }))
            .count();
        assert_eq!(house_factors, 4);
        // 10th lord Mercury sits in house 2 and resolves through the chart
        let tenth_lord_house = features
            .focus_factors
            .iter()
            .find_map(|f| match f {
                FocusFactor::House {
                    house: 10,
                    lord_house,
                    ..
                } => Some(*lord_house),
                _ => None,
            })
            .unwrap();
        assert_eq!(tenth_lord_house, Some(2));
        // No fabricated entries for planets absent from the chart (Venus, Ketu)
        for factor in &features.focus_factors {
            if let FocusFactor::Planet { planet, .. } = factor {
                assert!(p.planet(planet).is_some());
            }
        }
        assert!(features.has_features);
    }

    #[test]
    fn test_mahadasha_rule_fires() {
        let features = build(
            Topic::Career,
            ConversationMode::FocusReading,
            &profile(),
            &empty_transits(),
            today(),
        );
        assert!(features
            .key_rules
            .iter()
            .any(|r| r.id == "MAHADASHA_SATURN"));
        let maha = features.mahadasha.unwrap();
        assert_eq!(maha.planet, "Saturn");
        assert!(maha.years_remaining > 13.0 && maha.years_remaining < 14.0);
    }

    #[test]
    fn test_saturn_aspect_moon_rule() {
        // Saturn in house 12 aspects house (12+6)%12+1 = 7; Moon is in 6, no rule.
        let features = build(
            Topic::General,
            ConversationMode::FocusReading,
            &profile(),
            &empty_transits(),
            today(),
        );
        assert!(!features
            .key_rules
            .iter()
            .any(|r| r.id == "SATURN_ASPECT_MOON"));

        // Move Moon to house 7: rule fires.
        let mut p = profile();
        p.planets.iter_mut().find(|pl| pl.name == "Moon").unwrap().house = 7;
        let features = build(
            Topic::General,
            ConversationMode::FocusReading,
            &p,
            &empty_transits(),
            today(),
        );
        assert!(features
            .key_rules
            .iter()
            .any(|r| r.id == "SATURN_ASPECT_MOON"));
    }

    #[test]
    fn test_transit_filter_window_and_houses() {
        let mut transits = empty_transits();
        transits.events = vec![
            // relevant house, in window
            transit(10, today() + Days::new(30), 0.5),
            // relevant house, too far out
            transit(10, today() + Days::new(400), 0.5),
            // irrelevant house
            transit(3, today() + Days::new(30), 0.5),
            // relevant house, too far back
            transit(10, today() - Days::new(200), 0.5),
        ];
        let features = build(
            Topic::Career,
            ConversationMode::FocusReading,
            &profile(),
            &transits,
            today(),
        );
        assert_eq!(features.transits.len(), 1);
        assert_eq!(features.transits[0].affected_house, Some(10));
    }

    #[test]
    fn test_timing_windows_only_strong_future() {
        let mut transits = empty_transits();
        transits.events = vec![
            transit(10, today() + Days::new(30), 0.9),
            transit(10, today() + Days::new(60), 0.4),
            transit(10, today() - Days::new(30), 0.9),
        ];
        let features = build(
            Topic::Career,
            ConversationMode::DailyGuidance,
            &profile(),
            &transits,
            today(),
        );
        // one strong future transit + the antardasha window
        assert_eq!(features.timing_windows.len(), 2);
        assert_eq!(features.timing_windows[0].nature, "challenging");
        assert!(features.timing_windows[1].period.contains("Antardasha"));
    }

    #[test]
    fn test_transit_rules_fire_only_while_in_effect() {
        let mut transits = empty_transits();
        transits.events = vec![
            // strong but finished
            transit(10, today() - Days::new(100), 0.9),
            // strong but not started
            transit(10, today() + Days::new(30), 0.9),
            // strong and running: start -10, end +50
            transit(10, today() - Days::new(10), 0.9),
        ];
        let features = build(
            Topic::Career,
            ConversationMode::FocusReading,
            &profile(),
            &transits,
            today(),
        );
        let transit_rules = features
            .key_rules
            .iter()
            .filter(|r| r.id.starts_with("TRANSIT_"))
            .count();
        assert_eq!(transit_rules, 1);
    }

    #[test]
    fn test_past_events_exclude_running_transits() {
        let mut transits = empty_transits();
        transits.events = vec![
            // finished: start -100, end -40
            transit(10, today() - Days::new(100), 0.9),
            // started in the past but still running: start -10, end +50
            transit(10, today() - Days::new(10), 0.9),
        ];
        let features = build(
            Topic::Career,
            ConversationMode::PastThemes,
            &profile(),
            &transits,
            today(),
        );
        let from_transits: Vec<_> = features
            .past_events
            .iter()
            .filter(|e| e.kind == "sign_change")
            .collect();
        assert_eq!(from_transits.len(), 1);
        assert_eq!(from_transits[0].period, month_year(today() - Days::new(100)));
    }

    #[test]
    fn test_past_events_gated_by_mode() {
        let mut transits = empty_transits();
        transits.events = vec![transit(10, today() - Days::new(100), 0.9)];

        let retro = build(
            Topic::Career,
            ConversationMode::PastThemes,
            &profile(),
            &transits,
            today(),
        );
        assert!(retro.past_events.iter().any(|e| e.kind == "sign_change"));

        let daily = build(
            Topic::Career,
            ConversationMode::DailyGuidance,
            &profile(),
            &transits,
            today(),
        );
        assert!(daily.past_events.is_empty());
    }

    #[test]
    fn test_empty_chart_has_no_features_but_is_valid() {
        let bare = AstroProfile {
            ascendant: "Leo".to_string(),
            moon_sign: "Virgo".to_string(),
            sun_sign: "Leo".to_string(),
            moon_nakshatra: None,
            planets: vec![],
            houses: vec![],
            mahadasha: None,
            antardasha: None,
            dasha_timeline: vec![],
            yogas: vec![],
        };
        let features = build(
            Topic::Career,
            ConversationMode::DailyGuidance,
            &bare,
            &empty_transits(),
            today(),
        );
        assert!(!features.has_features);
        assert!(features.focus_factors.is_empty());
        assert_eq!(features.ascendant, "Leo");
    }
}
