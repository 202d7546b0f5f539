mod astro;
mod reply;
mod session;

pub use astro::*;
pub use reply::*;
pub use session::*;
