mod agents;
mod config;
mod console;
mod db;
mod error;
mod routes;
mod session;
mod state;
mod storage;
mod templates;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::agents::{ImageSettings, ModerationProfile, OpenAiAgent, Pipeline};
use crate::config::{Config, StorageBackend, StoreBackend};
use crate::db::{RecordStore, SubmissionRepository};
use crate::session::{PollSchedule, SessionRegistry};
use crate::storage::ImageUploader;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn build_store(config: &Config) -> Result<Arc<dyn RecordStore>, BoxError> {
    let store: Arc<dyn RecordStore> = match &config.store {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory record store; submissions are lost on restart");
            Arc::new(db::MemoryStore::new())
        }
        StoreBackend::Postgres { database_url } => {
            let pool = db::create_pool(database_url).await?;
            db::run_migrations(pool.as_ref()).await?;
            Arc::new(db::PgRecordStore::new(pool))
        }
        StoreBackend::Sheets {
            spreadsheet_id,
            sheet_name,
            access_token,
        } => Arc::new(db::SheetsStore::new(
            spreadsheet_id.clone(),
            sheet_name.clone(),
            access_token.clone(),
        )?),
    };
    Ok(store)
}

fn build_uploader(config: &Config) -> Result<Arc<dyn ImageUploader>, BoxError> {
    let uploader: Arc<dyn ImageUploader> = match &config.storage {
        StorageBackend::Local {
            upload_folder,
            public_base_url,
        } => {
            storage::ensure_dirs(upload_folder)?;
            Arc::new(storage::LocalUploader::new(
                upload_folder.clone(),
                public_base_url.clone(),
            ))
        }
        StorageBackend::Gcs {
            bucket,
            access_token,
        } => Arc::new(storage::GcsUploader::new(
            bucket.clone(),
            access_token.clone(),
        )?),
    };
    Ok(uploader)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "safeimage=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    let repo = SubmissionRepository::new(build_store(&config).await?);
    let uploader = build_uploader(&config)?;

    let openai = Arc::new(OpenAiAgent::new(
        config.openai_keys.clone(),
        &config.openai_base_url,
        config.rewrite_model.clone(),
    )?);
    tracing::info!(
        "Using {} OpenAI key(s), rewrite model {}, image model {}",
        config.openai_keys.len(),
        config.rewrite_model,
        config.image_model
    );

    let pipeline = Pipeline::new(
        openai.clone(),
        openai,
        uploader,
        ImageSettings {
            model: config.image_model.clone(),
            size: config.image_size.clone(),
            quality: None,
        },
        ImageSettings {
            model: config.regenerate_image_model.clone(),
            size: config.image_size.clone(),
            quality: config.regenerate_image_quality.clone(),
        },
    );

    let state = Arc::new(state::AppState {
        repo,
        pipeline: Arc::new(pipeline),
        profile: Arc::new(ModerationProfile::elementary()),
        sessions: Arc::new(SessionRegistry::new(config.session_idle_ttl)),
        schedule: PollSchedule::new(config.poll_interval),
    });

    let mut app = routes::router(state);
    if let StorageBackend::Local { upload_folder, .. } = &config.storage {
        app = app.nest_service(
            &format!("/{}", storage::IMAGE_PREFIX),
            ServeDir::new(upload_folder.join(storage::IMAGE_PREFIX)),
        );
    }
    let app = app
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!(
        "Polling every {}s, idle sessions expire after {}s",
        config.poll_interval.as_secs(),
        config.session_idle_ttl.as_secs()
    );

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("safeimage listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
