pub mod ingest;
pub mod watering;
pub mod weather;

pub use ingest::*;
pub use watering::*;
pub use weather::*;
