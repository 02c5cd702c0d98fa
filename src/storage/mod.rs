pub mod images;
pub mod plants;
pub mod sessions;

pub use images::{ImageCategory, ImageStore};
pub use plants::PlantRegistry;
pub use sessions::{JsonSessionStore, SessionStore};
