//! Core conversation engine for Niro, a Vedic astrology chat assistant.
//!
//! A turn flows through the [`orchestrator`]: birth details are collected by
//! [`extract`], resolved to coordinates by [`astro::geocode`], charts and
//! transits come from the [`astro::gateway`] cache over the external API,
//! [`router`] picks the conversation mode, [`topics`] classifies what the
//! user is asking about, [`features`] pulls the topic-relevant slice of the
//! chart, and [`compose`] turns it into a reply.

pub mod astro;
pub mod compose;
pub mod config;
pub mod error;
pub mod extract;
pub mod features;
pub mod llm;
pub mod model;
pub mod orchestrator;
pub mod router;
pub mod session;
pub mod topics;

pub use error::{NiroError, Result};
