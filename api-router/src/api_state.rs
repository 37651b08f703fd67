use std::sync::Arc;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, settings::SettingsStore},
    utils::config::AppConfig,
};
use ingestion_pipeline::UploadPipeline;
use workspace_client::{
    ClientFactory, CredentialResolver, DocumentService, EmbeddingBinder, GenerationProxy,
    GenerationSettings, Upstream, WorkspaceManager,
};

/// Everything a handler needs, built once at startup and cloned per request.
#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub settings: Arc<dyn SettingsStore>,
    pub upstream: Upstream,
    pub workspaces: WorkspaceManager,
    pub binder: EmbeddingBinder,
    pub generation: GenerationProxy,
    pub documents: DocumentService,
    pub uploads: Arc<UploadPipeline>,
}

impl ApiState {
    pub async fn new(config: &AppConfig) -> Result<Self, AppError> {
        let surreal_db_client = Arc::new(SurrealDbClient::from_config(config).await?);

        Self::with_db(config, surreal_db_client)
    }

    pub fn with_db(config: &AppConfig, db: Arc<SurrealDbClient>) -> Result<Self, AppError> {
        let settings: Arc<dyn SettingsStore> = db.clone();
        let upstream = Upstream::new(
            CredentialResolver::new(settings.clone(), config.credential_key.clone()),
            ClientFactory::new(&config.upstream_base_url)?,
        );
        let documents = DocumentService::new(upstream.clone());

        Ok(Self {
            db,
            config: config.clone(),
            settings,
            workspaces: WorkspaceManager::new(upstream.clone()),
            binder: EmbeddingBinder::new(upstream.clone()),
            generation: GenerationProxy::new(
                upstream.clone(),
                GenerationSettings::from_config(config),
            ),
            uploads: Arc::new(UploadPipeline::new(documents.clone(), config.upload_dir())),
            documents,
            upstream,
        })
    }
}
