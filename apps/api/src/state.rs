use std::sync::Arc;

use crate::generation::pipeline::GenerationPipeline;
use crate::jobs::tracker::JobTracker;
use crate::patterns::extraction::PatternExtractor;
use crate::patterns::store::PatternStore;
use crate::performance::webhook::PerformanceIngestor;
use crate::publish::service::PublishService;

/// Shared application state injected into all route handlers via Axum extractors.
///
/// Services are built once in `main` over a single `PgStore`; handlers only
/// see the seams they need.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<GenerationPipeline>,
    pub tracker: Arc<JobTracker>,
    pub publisher: Arc<PublishService>,
    pub performance: Arc<PerformanceIngestor>,
    pub extractor: Arc<PatternExtractor>,
    pub patterns: Arc<dyn PatternStore>,
}
