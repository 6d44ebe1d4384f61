//! Concrete pipelines.

mod catalog_sync;
mod content_generation;
mod review_generation;
mod seo_optimization;

pub use catalog_sync::{slugify, CatalogSyncPipeline};
pub use content_generation::ContentGenerationPipeline;
pub use review_generation::ReviewGenerationPipeline;
pub use seo_optimization::SeoOptimizationPipeline;

use super::pipeline::Pipeline;
use std::sync::Arc;

/// All pipelines, in execution order.
pub fn all_pipelines() -> Vec<Arc<dyn Pipeline>> {
    vec![
        Arc::new(CatalogSyncPipeline),
        Arc::new(ReviewGenerationPipeline),
        Arc::new(ContentGenerationPipeline),
        Arc::new(SeoOptimizationPipeline),
    ]
}
