pub mod client;
pub mod gateway;
pub mod geocode;

pub use client::{AstroApi, VedicApiClient};
pub use gateway::AstroGateway;
pub use geocode::{GeoPlace, Geocoder};
