//! Serving boundary: an immutable model context loaded once, then shared
//! across requests.

mod context;

pub use context::{ModelContext, PredictRequest, PredictResponse};
