use crate::domain::IngestionService;
use crate::http::{create_router, run_http_server, AppState, HttpServerConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct IngestApi {
    ingestion: Arc<IngestionService>,
    config: HttpServerConfig,
}

impl IngestApi {
    pub fn new(ingestion: Arc<IngestionService>, config: HttpServerConfig) -> Self {
        debug!("Initializing Ingest API module");
        Self { ingestion, config }
    }

    pub fn into_runner_process(
        self,
    ) -> impl FnOnce(
        CancellationToken,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
    > {
        move |ctx| {
            Box::pin(async move {
                let router = create_router(AppState::new(self.ingestion));
                run_http_server(self.config, router, ctx).await
            })
        }
    }
}
