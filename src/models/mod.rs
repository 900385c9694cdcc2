pub mod catalogue;
pub mod rating;
pub mod recommendation;

pub use catalogue::{CatalogueEntry, Embedding, StoredRecord, VectorRecord};
pub use rating::{rating_ceiling, rating_level, within_ceiling, NOT_RATED};
pub use recommendation::{Recommendation, RecommendationResult, MAX_RECOMMENDATIONS};
