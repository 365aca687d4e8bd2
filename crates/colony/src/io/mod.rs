pub mod export;
pub mod geojson;

pub use export::*;
