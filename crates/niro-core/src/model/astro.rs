use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanetPosition {
    pub name: String,
    pub sign: String,
    /// House the planet occupies, 1-12.
    pub house: u8,
    pub degree: f64,
    #[serde(default)]
    pub nakshatra: Option<String>,
    #[serde(default)]
    pub retrograde: bool,
    /// e.g. "exalted", "debilitated", "own sign".
    #[serde(default)]
    pub dignity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseData {
    /// 1-12.
    pub house: u8,
    pub sign: String,
    /// Ruling planet of the sign on this house cusp.
    pub lord: String,
    /// Planets placed in this house.
    #[serde(default)]
    pub occupants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashaPeriod {
    pub planet: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DashaPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YogaInfo {
    pub name: String,
    #[serde(default)]
    pub planets: Vec<String>,
    #[serde(default)]
    pub effect: Option<String>,
}

/// Natal chart for one set of birth details. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstroProfile {
    pub ascendant: String,
    pub moon_sign: String,
    pub sun_sign: String,
    #[serde(default)]
    pub moon_nakshatra: Option<String>,
    pub planets: Vec<PlanetPosition>,
    pub houses: Vec<HouseData>,
    pub mahadasha: Option<DashaPeriod>,
    pub antardasha: Option<DashaPeriod>,
    #[serde(default)]
    pub dasha_timeline: Vec<DashaPeriod>,
    #[serde(default)]
    pub yogas: Vec<YogaInfo>,
}

impl AstroProfile {
    pub fn planet(&self, name: &str) -> Option<&PlanetPosition> {
        self.planets
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn house(&self, number: u8) -> Option<&HouseData> {
        self.houses.iter().find(|h| h.house == number)
    }

    /// Position of the planet ruling the given house, if both are known.
    pub fn house_lord(&self, number: u8) -> Option<&PlanetPosition> {
        let lord = &self.house(number)?.lord;
        self.planet(lord)
    }

    /// Mahadasha period covering `date`, searched in the timeline when the
    /// current period doesn't match.
    pub fn mahadasha_at(&self, date: NaiveDate) -> Option<&DashaPeriod> {
        if let Some(md) = &self.mahadasha {
            if md.contains(date) {
                return Some(md);
            }
        }
        self.dasha_timeline.iter().find(|d| d.contains(date))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitEvent {
    pub planet: String,
    /// e.g. "sign_change", "retrograde", "aspect", "return".
    pub kind: String,
    #[serde(default)]
    pub to_sign: Option<String>,
    /// Natal house the transit activates, 1-12.
    #[serde(default)]
    pub affected_house: Option<u8>,
    pub start: NaiveDate,
    #[serde(default)]
    pub end: Option<NaiveDate>,
    /// "supportive", "challenging", or "mixed".
    pub nature: String,
    /// 0.0..=1.0.
    pub strength: f64,
}

impl TransitEvent {
    pub fn is_past(&self, today: NaiveDate) -> bool {
        self.end.unwrap_or(self.start) < today
    }

    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.start <= today && self.end.map_or(self.start == today, |e| e >= today)
    }
}

/// Transit events over a fixed window, cached with a TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstroTransits {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub computed_at: DateTime<Utc>,
    pub events: Vec<TransitEvent>,
}

impl AstroTransits {
    /// Whether the cached window fully contains the requested one.
    pub fn covers(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.from_date <= from && self.to_date >= to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> AstroProfile {
        AstroProfile {
            ascendant: "Sagittarius".to_string(),
            moon_sign: "Taurus".to_string(),
            sun_sign: "Capricorn".to_string(),
            moon_nakshatra: Some("Rohini".to_string()),
            planets: vec![
                PlanetPosition {
                    name: "Saturn".to_string(),
                    sign: "Scorpio".to_string(),
                    house: 12,
                    degree: 9.4,
                    nakshatra: None,
                    retrograde: false,
                    dignity: None,
                },
                PlanetPosition {
                    name: "Mercury".to_string(),
                    sign: "Capricorn".to_string(),
                    house: 2,
                    degree: 21.0,
                    nakshatra: None,
                    retrograde: true,
                    dignity: Some("friend sign".to_string()),
                },
            ],
            houses: vec![HouseData {
                house: 10,
                sign: "Virgo".to_string(),
                lord: "Mercury".to_string(),
                occupants: vec![],
            }],
            mahadasha: Some(DashaPeriod {
                planet: "Venus".to_string(),
                start: NaiveDate::from_ymd_opt(2019, 3, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2039, 3, 1).unwrap(),
            }),
            antardasha: None,
            dasha_timeline: vec![],
            yogas: vec![],
        }
    }

    #[test]
    fn test_planet_lookup_case_insensitive() {
        let p = profile();
        assert!(p.planet("saturn").is_some());
        assert!(p.planet("SATURN").is_some());
        assert!(p.planet("Ketu").is_none());
    }

    #[test]
    fn test_house_lord_resolution() {
        let p = profile();
        let lord = p.house_lord(10).unwrap();
        assert_eq!(lord.name, "Mercury");
        assert_eq!(lord.house, 2);
    }

    #[test]
    fn test_mahadasha_at() {
        let p = profile();
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(p.mahadasha_at(date).unwrap().planet, "Venus");
        let before = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
        assert!(p.mahadasha_at(before).is_none());
    }

    #[test]
    fn test_transits_covers() {
        let transits = AstroTransits {
            from_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            to_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            computed_at: Utc::now(),
            events: vec![],
        };
        let from = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert!(transits.covers(from, to));
        let too_late = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        assert!(!transits.covers(from, too_late));
    }

    #[test]
    fn test_transit_event_past_and_active() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let past = TransitEvent {
            planet: "Mars".to_string(),
            kind: "sign_change".to_string(),
            to_sign: Some("Leo".to_string()),
            affected_house: Some(9),
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: Some(NaiveDate::from_ymd_opt(2024, 2, 15).unwrap()),
            nature: "mixed".to_string(),
            strength: 0.5,
        };
        assert!(past.is_past(today));
        assert!(!past.is_active(today));

        let active = TransitEvent {
            start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end: Some(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()),
            ..past.clone()
        };
        assert!(!active.is_past(today));
        assert!(active.is_active(today));
    }
}
