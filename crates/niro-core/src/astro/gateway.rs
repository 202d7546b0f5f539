use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Months, NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::astro::client::AstroApi;
use crate::config::AstroConfig;
use crate::error::Result;
use crate::model::{AstroProfile, AstroTransits, BirthDetails};

/// Caching layer over the astrology API, keyed by a stable hash of the
/// birth details. Natal profiles never change for a given birth, so they
/// are cached forever; transits have a TTL and a date window that must
/// still cover "now".
pub struct AstroGateway<A: AstroApi> {
    api: A,
    profiles: RwLock<HashMap<u64, Arc<AstroProfile>>>,
    transits: RwLock<HashMap<u64, Arc<AstroTransits>>>,
    ttl: Duration,
    past_months: u32,
    future_months: u32,
}

impl<A: AstroApi> AstroGateway<A> {
    pub fn new(api: A, config: &AstroConfig) -> Self {
        Self {
            api,
            profiles: RwLock::new(HashMap::new()),
            transits: RwLock::new(HashMap::new()),
            ttl: Duration::hours(config.transits_ttl_hours as i64),
            past_months: config.transit_past_months,
            future_months: config.transit_future_months,
        }
    }

    pub async fn profile(&self, birth: &BirthDetails) -> Result<Arc<AstroProfile>> {
        let key = birth.cache_key();

        if let Some(profile) = self.profiles.read().await.get(&key) {
            tracing::debug!(key, "profile cache hit");
            return Ok(Arc::clone(profile));
        }

        let profile = Arc::new(self.api.fetch_profile(birth).await?);
        self.profiles
            .write()
            .await
            .insert(key, Arc::clone(&profile));
        tracing::info!(key, ascendant = %profile.ascendant, "profile fetched");
        Ok(profile)
    }

    /// Transits for the configured window around `today`. A cached entry is
    /// reused only while it is younger than the TTL and its window still
    /// covers the requested range.
    pub async fn transits(
        &self,
        birth: &BirthDetails,
        today: NaiveDate,
    ) -> Result<Arc<AstroTransits>> {
        let key = birth.cache_key();
        let from = today
            .checked_sub_months(Months::new(self.past_months))
            .unwrap_or(today);
        let to = today
            .checked_add_months(Months::new(self.future_months))
            .unwrap_or(today);

        if let Some(cached) = self.transits.read().await.get(&key) {
            let age = Utc::now() - cached.computed_at;
            if age < self.ttl && cached.covers(from, to) {
                tracing::debug!(key, "transit cache hit");
                return Ok(Arc::clone(cached));
            }
        }

        let fresh = Arc::new(self.api.fetch_transits(birth, from, to).await?);
        self.transits.write().await.insert(key, Arc::clone(&fresh));
        tracing::info!(key, events = fresh.events.len(), "transits fetched");
        Ok(fresh)
    }
}
