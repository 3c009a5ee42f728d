//! Turns raw selection-analysis result documents (FEL, MEME, aBSREL, FUBAR,
//! multi-hit) into typed attributes, site and branch classifications, summary
//! tiles and render-ready tables. Nothing here performs I/O.

pub mod classify;
pub mod error;
pub mod evidence;
pub mod format;
pub mod methods;
pub mod model;
pub mod schema;

pub use error::{SchemaError, SchemaResult};
pub use methods::{Method, MethodAttributes};
pub use model::{TableSpec, Thresholds, TileSpec};
