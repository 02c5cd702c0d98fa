pub mod analyzer;
pub mod history;
pub mod hsv;
pub mod palette;

pub use analyzer::ColorHealthAnalyzer;
pub use history::{ColorComposition, HealthHistory};
pub use palette::{ColorRange, ColorTable, LeafColor};
