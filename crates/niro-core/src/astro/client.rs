use std::time::Duration;

use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::{resolve_api_key, AstroConfig};
use crate::error::{NiroError, Result};
use crate::model::{
    AstroProfile, AstroTransits, BirthDetails, DashaPeriod, HouseData, PlanetPosition,
    TransitEvent, YogaInfo,
};

/// External astrology API. The gateway caches on top of this; implementations
/// must either return a fully populated structure or an error, never a
/// partial one.
pub trait AstroApi: Send + Sync {
    fn fetch_profile(
        &self,
        birth: &BirthDetails,
    ) -> impl std::future::Future<Output = Result<AstroProfile>> + Send;

    fn fetch_transits(
        &self,
        birth: &BirthDetails,
        from: NaiveDate,
        to: NaiveDate,
    ) -> impl std::future::Future<Output = Result<AstroTransits>> + Send;
}

/// Client for the VedicAstroAPI v3-json service. All endpoints are GET with
/// query parameters; responses arrive in a `{status, response}` envelope.
pub struct VedicApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl VedicApiClient {
    pub fn from_config(config: &AstroConfig) -> Result<Self> {
        let api_key = resolve_api_key(
            config.api_key.as_deref(),
            config.env_var.as_deref(),
            "VEDIC_API_KEY",
            "vedicastroapi",
            "astro",
        )?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let mut query: Vec<(&str, String)> = params.to_vec();
        query.push(("api_key", self.api_key.clone()));
        query.push(("lang", "en".to_string()));

        tracing::debug!(path, "calling astro API");

        let response = self.client.get(&url).query(&query).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".into());
            return Err(NiroError::Astro(format!(
                "astro API error {status} for {path}: {body}"
            )));
        }

        let envelope: ApiEnvelope = response.json().await?;
        if envelope.status != 200 {
            return Err(NiroError::Astro(format!(
                "astro API returned status {} for {path}",
                envelope.status
            )));
        }

        envelope
            .response
            .ok_or_else(|| NiroError::Astro(format!("astro API returned empty response for {path}")))
    }

    fn birth_params(&self, birth: &BirthDetails) -> Vec<(&'static str, String)> {
        vec![
            ("dob", birth.dob.format("%d/%m/%Y").to_string()),
            ("tob", birth.tob.clone()),
            ("lat", birth.latitude.to_string()),
            ("lon", birth.longitude.to_string()),
            ("tz", birth.tz_offset.to_string()),
        ]
    }
}

#[derive(Deserialize)]
struct ApiEnvelope {
    status: u16,
    response: Option<Value>,
}

#[derive(Deserialize)]
struct ApiPlanet {
    name: String,
    zodiac: String,
    house: u8,
    #[serde(default)]
    degree: f64,
    #[serde(default)]
    nakshatra: Option<String>,
    #[serde(default)]
    retro: bool,
    #[serde(default)]
    dignity: Option<String>,
}

#[derive(Deserialize)]
struct ApiHouse {
    house: u8,
    zodiac: String,
    lord: String,
    #[serde(default)]
    planets: Vec<String>,
}

#[derive(Deserialize)]
struct ApiDasha {
    planet: String,
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct ApiYoga {
    name: String,
    #[serde(default)]
    planets: Vec<String>,
    #[serde(default)]
    effect: String,
}

#[derive(Deserialize)]
struct ApiTransit {
    planet: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    to_sign: Option<String>,
    #[serde(default)]
    affected_house: Option<u8>,
    start: NaiveDate,
    #[serde(default)]
    end: Option<NaiveDate>,
    #[serde(default = "default_nature")]
    nature: String,
    #[serde(default)]
    strength: f64,
}

fn default_nature() -> String {
    "mixed".to_string()
}

fn field_str(value: &Value, key: &str, context: &str) -> Result<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| NiroError::Astro(format!("missing `{key}` in {context} response")))
}

impl AstroApi for VedicApiClient {
    async fn fetch_profile(&self, birth: &BirthDetails) -> Result<AstroProfile> {
        let params = self.birth_params(birth);

        let kundli = self
            .get("/extended-horoscope/extended-kundli-details", &params)
            .await?;
        let ascendant = self
            .get("/extended-horoscope/find-ascendant", &params)
            .await?;
        let sun_sign = self
            .get("/extended-horoscope/find-sun-sign", &params)
            .await?;
        let planets_raw = self.get("/horoscope/planet-details", &params).await?;
        let houses_raw = self.get("/horoscope/house-details", &params).await?;
        let dashas_raw = self.get("/dashas/maha-dasha", &params).await?;

        let planets: Vec<ApiPlanet> = serde_json::from_value(
            planets_raw
                .get("planets")
                .cloned()
                .unwrap_or(planets_raw.clone()),
        )?;
        let houses: Vec<ApiHouse> = serde_json::from_value(
            houses_raw
                .get("houses")
                .cloned()
                .unwrap_or(houses_raw.clone()),
        )?;
        let timeline: Vec<ApiDasha> = serde_json::from_value(
            dashas_raw
                .get("mahadasha")
                .cloned()
                .unwrap_or(Value::Array(vec![])),
        )?;
        let yogas: Vec<ApiYoga> = kundli
            .get("yogas")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        let today = Utc::now().date_naive();
        let dasha_timeline: Vec<DashaPeriod> = timeline
            .into_iter()
            .map(|d| DashaPeriod {
                planet: d.planet,
                start: d.start,
                end: d.end,
            })
            .collect();
        let mahadasha = dasha_timeline
            .iter()
            .find(|d| d.contains(today))
            .cloned();
        let antardasha = dashas_raw
            .get("antardasha")
            .cloned()
            .map(serde_json::from_value::<ApiDasha>)
            .transpose()?
            .map(|d| DashaPeriod {
                planet: d.planet,
                start: d.start,
                end: d.end,
            });

        Ok(AstroProfile {
            ascendant: field_str(&ascendant, "ascendant", "find-ascendant")?,
            moon_sign: field_str(&kundli, "rasi", "extended-kundli-details")?,
            sun_sign: field_str(&sun_sign, "sun_sign", "find-sun-sign")?,
            moon_nakshatra: kundli
                .get("nakshatra")
                .and_then(Value::as_str)
                .map(str::to_string),
            planets: planets
                .into_iter()
                .map(|p| PlanetPosition {
                    name: p.name,
                    sign: p.zodiac,
                    house: p.house,
                    degree: p.degree,
                    nakshatra: p.nakshatra,
                    retrograde: p.retro,
                    dignity: p.dignity,
                })
                .collect(),
            houses: houses
                .into_iter()
                .map(|h| HouseData {
                    house: h.house,
                    sign: h.zodiac,
                    lord: h.lord,
                    occupants: h.planets,
                })
                .collect(),
            mahadasha,
            antardasha,
            dasha_timeline,
            yogas: yogas
                .into_iter()
                .map(|y| YogaInfo {
                    name: y.name,
                    planets: y.planets,
                    effect: (!y.effect.is_empty()).then_some(y.effect),
                })
                .collect(),
        })
    }

    async fn fetch_transits(
        &self,
        birth: &BirthDetails,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<AstroTransits> {
        let mut params = self.birth_params(birth);
        params.push(("from_date", from.to_string()));
        params.push(("to_date", to.to_string()));

        let raw = self.get("/transits/events", &params).await?;
        let events: Vec<ApiTransit> = serde_json::from_value(
            raw.get("events").cloned().unwrap_or(raw.clone()),
        )?;

        Ok(AstroTransits {
            from_date: from,
            to_date: to,
            computed_at: Utc::now(),
            events: events
                .into_iter()
                .map(|e| TransitEvent {
                    planet: e.planet,
                    kind: e.kind,
                    to_sign: e.to_sign,
                    affected_house: e.affected_house,
                    start: e.start,
                    end: e.end,
                    nature: e.nature,
                    strength: e.strength,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_parsing() {
        let ok: ApiEnvelope =
            serde_json::from_value(json!({"status": 200, "response": {"sun_sign": "Leo"}}))
                .unwrap();
        assert_eq!(ok.status, 200);
        assert!(ok.response.is_some());

        let err: ApiEnvelope =
            serde_json::from_value(json!({"status": 404, "response": null})).unwrap();
        assert_eq!(err.status, 404);
        assert!(err.response.is_none());
    }

    #[test]
    fn test_planet_parsing_defaults() {
        let planet: ApiPlanet = serde_json::from_value(json!({
            "name": "Saturn",
            "zodiac": "Scorpio",
            "house": 12
        }))
        .unwrap();
        assert_eq!(planet.name, "Saturn");
        assert!(!planet.retro);
        assert!(planet.dignity.is_none());
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let value = json!({"other": "x"});
        let err = field_str(&value, "ascendant", "find-ascendant").unwrap_err();
        assert!(err.to_string().contains("ascendant"));
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let config = AstroConfig {
            api_key: None,
            env_var: Some("NIRO_TEST_UNSET_ASTRO_KEY".to_string()),
            ..Default::default()
        };
        assert!(VedicApiClient::from_config(&config).is_err());
    }
}
