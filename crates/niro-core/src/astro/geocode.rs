use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::config::GeoConfig;
use crate::error::{NiroError, Result};

/// A free-text place name resolved to coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoPlace {
    pub display_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub tz_offset: f64,
}

/// Built-in table of Indian cities, matched before any network lookup.
/// Entries are `(name, state, lat, lon)`; all carry IST (+5.5).
const CITY_TABLE: &[(&str, &str, f64, f64)] = &[
    ("mumbai", "Maharashtra", 19.0760, 72.8777),
    ("delhi", "Delhi", 28.6139, 77.2090),
    ("new delhi", "Delhi", 28.6139, 77.2090),
    ("bangalore", "Karnataka", 12.9716, 77.5946),
    ("bengaluru", "Karnataka", 12.9716, 77.5946),
    ("hyderabad", "Telangana", 17.3850, 78.4867),
    ("ahmedabad", "Gujarat", 23.0225, 72.5714),
    ("chennai", "Tamil Nadu", 13.0827, 80.2707),
    ("kolkata", "West Bengal", 22.5726, 88.3639),
    ("pune", "Maharashtra", 18.5204, 73.8567),
    ("jaipur", "Rajasthan", 26.9124, 75.7873),
    ("lucknow", "Uttar Pradesh", 26.8467, 80.9462),
    ("kanpur", "Uttar Pradesh", 26.4499, 80.3319),
    ("nagpur", "Maharashtra", 21.1458, 79.0882),
    ("indore", "Madhya Pradesh", 22.7196, 75.8577),
    ("bhopal", "Madhya Pradesh", 23.2599, 77.4126),
    ("patna", "Bihar", 25.5941, 85.1376),
    ("varanasi", "Uttar Pradesh", 25.3176, 82.9739),
    ("agra", "Uttar Pradesh", 27.1767, 78.0081),
    ("amritsar", "Punjab", 31.6340, 74.8723),
    ("ludhiana", "Punjab", 30.9010, 75.8573),
    ("chandigarh", "Chandigarh", 30.7333, 76.7794),
    ("gurgaon", "Haryana", 28.4595, 77.0266),
    ("gurugram", "Haryana", 28.4595, 77.0266),
    ("noida", "Uttar Pradesh", 28.5355, 77.3910),
    ("faridabad", "Haryana", 28.4089, 77.3178),
    ("rohtak", "Haryana", 28.8955, 76.6066),
    ("panipat", "Haryana", 29.3909, 76.9635),
    ("sonipat", "Haryana", 28.9931, 77.0151),
    ("meerut", "Uttar Pradesh", 28.9845, 77.7064),
    ("jodhpur", "Rajasthan", 26.2389, 73.0243),
    ("udaipur", "Rajasthan", 24.5854, 73.7125),
    ("kota", "Rajasthan", 25.2138, 75.8648),
    ("surat", "Gujarat", 21.1702, 72.8311),
    ("vadodara", "Gujarat", 22.3072, 73.1812),
    ("rajkot", "Gujarat", 22.3039, 70.8022),
    ("nashik", "Maharashtra", 19.9975, 73.7898),
    ("aurangabad", "Maharashtra", 19.8762, 75.3433),
    ("kochi", "Kerala", 9.9312, 76.2673),
    ("cochin", "Kerala", 9.9312, 76.2673),
    ("thiruvananthapuram", "Kerala", 8.5241, 76.9366),
    ("trivandrum", "Kerala", 8.5241, 76.9366),
    ("coimbatore", "Tamil Nadu", 11.0168, 76.9558),
    ("madurai", "Tamil Nadu", 9.9252, 78.1198),
    ("mysore", "Karnataka", 12.2958, 76.6394),
    ("mysuru", "Karnataka", 12.2958, 76.6394),
    ("mangalore", "Karnataka", 12.9141, 74.8560),
    ("visakhapatnam", "Andhra Pradesh", 17.6869, 83.2185),
    ("vijayawada", "Andhra Pradesh", 16.5062, 80.6480),
    ("ranchi", "Jharkhand", 23.3441, 85.3096),
    ("jamshedpur", "Jharkhand", 22.8046, 86.2029),
    ("raipur", "Chhattisgarh", 21.2514, 81.6296),
    ("srinagar", "Jammu and Kashmir", 34.0837, 74.7973),
    ("jammu", "Jammu and Kashmir", 32.7266, 74.8570),
    ("dehradun", "Uttarakhand", 30.3165, 78.0322),
    ("haridwar", "Uttarakhand", 29.9457, 78.1642),
    ("gwalior", "Madhya Pradesh", 26.2183, 78.1828),
    ("jabalpur", "Madhya Pradesh", 23.1815, 79.9864),
    ("allahabad", "Uttar Pradesh", 25.4358, 81.8463),
    ("prayagraj", "Uttar Pradesh", 25.4358, 81.8463),
    ("gorakhpur", "Uttar Pradesh", 26.7606, 83.3732),
    ("guwahati", "Assam", 26.1445, 91.7362),
];

const IST_OFFSET: f64 = 5.5;

/// Resolves birth-place strings to coordinates. The built-in city table is
/// consulted first; the GeoNames HTTP service is tried only when enabled in
/// config and the table misses.
pub struct Geocoder {
    http: Option<GeoNamesClient>,
    default_tz_offset: f64,
}

impl Geocoder {
    pub fn from_config(config: &GeoConfig) -> Result<Self> {
        let http = if config.enabled {
            let username = config.username.clone().ok_or_else(|| {
                NiroError::Config("geo.enabled requires geo.username".to_string())
            })?;
            Some(GeoNamesClient::new(
                &config.base_url,
                username,
                config.timeout_secs,
            )?)
        } else {
            None
        };

        Ok(Self {
            http,
            default_tz_offset: config.default_tz_offset,
        })
    }

    /// Offline-only geocoder backed by the built-in table.
    pub fn builtin() -> Self {
        Self {
            http: None,
            default_tz_offset: IST_OFFSET,
        }
    }

    pub async fn resolve(&self, location: &str) -> Result<GeoPlace> {
        if let Some(place) = lookup_builtin(location) {
            return Ok(place);
        }

        if let Some(client) = &self.http {
            return client.resolve(location, self.default_tz_offset).await;
        }

        Err(NiroError::Geo(format!(
            "could not resolve location {location:?}"
        )))
    }
}

/// Match against the built-in table using the city part of the string,
/// i.e. the segment before the first comma.
fn lookup_builtin(location: &str) -> Option<GeoPlace> {
    let city = location.split(',').next()?.trim().to_lowercase();
    if city.is_empty() {
        return None;
    }

    CITY_TABLE
        .iter()
        .find(|(name, _, _, _)| *name == city)
        .map(|(name, state, lat, lon)| GeoPlace {
            display_name: format!("{}, {}, India", title_case(name), state),
            latitude: *lat,
            longitude: *lon,
            tz_offset: IST_OFFSET,
        })
}

fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pause before the single retry of a failed GeoNames call. Free accounts
/// are rate limited, so back-to-back requests tend to hit the same 503.
const LOOKUP_RETRY_PAUSE_MS: u64 = 250;

/// Run a lookup, retrying once after a short pause when the failure is
/// transient (rate limit, 5xx, network). Permanent failures such as a
/// no-match response return immediately.
async fn retry_lookup<T, F, Fut>(op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    match op().await {
        Err(e) if e.is_transient() => {
            tracing::warn!(error = %e, "geonames lookup failed, retrying once");
            tokio::time::sleep(Duration::from_millis(LOOKUP_RETRY_PAUSE_MS)).await;
            op().await
        }
        other => other,
    }
}

/// GeoNames search + timezone lookup.
pub struct GeoNamesClient {
    client: Client,
    base_url: String,
    username: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    geonames: Vec<GeoNameEntry>,
}

#[derive(Deserialize)]
struct GeoNameEntry {
    name: String,
    lat: String,
    lng: String,
    #[serde(rename = "countryName", default)]
    country_name: String,
    #[serde(rename = "adminName1", default)]
    admin_name: String,
}

#[derive(Deserialize)]
struct TimezoneResponse {
    #[serde(rename = "gmtOffset")]
    gmt_offset: Option<f64>,
}

impl GeoNamesClient {
    pub fn new(base_url: &str, username: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
        })
    }

    async fn resolve(&self, location: &str, default_tz_offset: f64) -> Result<GeoPlace> {
        let entry = retry_lookup(|| self.search(location)).await?;

        let latitude: f64 = entry
            .lat
            .parse()
            .map_err(|_| NiroError::Geo(format!("bad latitude {:?}", entry.lat)))?;
        let longitude: f64 = entry
            .lng
            .parse()
            .map_err(|_| NiroError::Geo(format!("bad longitude {:?}", entry.lng)))?;

        let tz_offset = self
            .timezone_offset(latitude, longitude)
            .await
            .unwrap_or(default_tz_offset);

        let mut display = entry.name.clone();
        if !entry.admin_name.is_empty() && entry.admin_name != entry.name {
            display.push_str(&format!(", {}", entry.admin_name));
        }
        if !entry.country_name.is_empty() {
            display.push_str(&format!(", {}", entry.country_name));
        }

        Ok(GeoPlace {
            display_name: display,
            latitude,
            longitude,
            tz_offset,
        })
    }

    async fn search(&self, location: &str) -> Result<GeoNameEntry> {
        let url = format!("{}/searchJSON", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", location),
                ("maxRows", "1"),
                ("featureClass", "P"),
                ("orderby", "population"),
                ("username", &self.username),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NiroError::Geo(format!(
                "geonames search error {} for {location:?}",
                response.status()
            )));
        }

        let search: SearchResponse = response.json().await?;
        search
            .geonames
            .into_iter()
            .next()
            .ok_or_else(|| NiroError::Geo(format!("no geonames match for {location:?}")))
    }

    async fn timezone_offset(&self, lat: f64, lng: f64) -> Option<f64> {
        let url = format!("{}/timezoneJSON", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", lat.to_string()),
                ("lng", lng.to_string()),
                ("username", self.username.clone()),
            ])
            .send()
            .await
            .ok()?;

        let tz: TimezoneResponse = response.json().await.ok()?;
        tz.gmt_offset
    }
}
