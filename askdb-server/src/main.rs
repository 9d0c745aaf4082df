//! askdb server binary.
//!
//! Reads settings from flags, the environment or `.env`, wires the query
//! gateway and the stage coordinator, and serves the HTTP API.

use std::sync::Arc;

use anyhow::Context as _;
use askdb_gateway::{
    InMemoryKnowledgeBase, LexicalValidator, PgExecutor, PgIntrospector, QueryGateway,
};
use askdb_graph::TracingObserver;
use askdb_pipeline::Coordinator;
use askdb_server::{router, AppState, Config};
use askdb_stage::StageClient;
use clap::Parser;
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::parse();

    let validator = LexicalValidator::new(config.strict_pg_funcs)
        .context("failed to build the query validator")?;
    let mut gateway = QueryGateway::new(Arc::new(validator)).with_max_rows(config.max_rows);

    match &config.db_dsn {
        Some(dsn) => {
            let pool = PgPoolOptions::new()
                .max_connections(8)
                .connect_lazy(dsn)
                .context("invalid DB_DSN")?;
            gateway = gateway
                .with_executor(Arc::new(
                    PgExecutor::new(pool.clone()).with_statement_timeout(config.statement_timeout()),
                ))
                .with_introspector(Arc::new(PgIntrospector::new(pool)));
        }
        None => tracing::warn!("DB_DSN is not set; query tools are disabled"),
    }

    if let Some(path) = &config.schema_kb_path {
        let knowledge = InMemoryKnowledgeBase::load(path)
            .await
            .with_context(|| format!("failed to load schema knowledge from {path:?}"))?;
        tracing::info!(documents = knowledge.len(), "schema knowledge loaded");
        gateway = gateway.with_knowledge_base(knowledge);
    }

    let mut client = StageClient::new().context("failed to build the stage client")?;
    if let Some(token) = config.agent_api_token.clone() {
        client = client.with_token(SecretString::new(token));
    }
    let endpoints = config
        .stage_endpoints()
        .context("invalid stage endpoint URL")?;
    let builder = Coordinator::builder(Arc::new(client), endpoints)
        .reviewer(gateway.reviewer().context("failed to build the query reviewer")?)
        .observer(Arc::new(TracingObserver));
    let coordinator = config
        .checkpoint
        .attach(builder)
        .await
        .context("failed to open the checkpoint store")?
        .build()
        .context("failed to build the stage graph")?;

    let app = router(AppState::new(coordinator, gateway), config.max_body_bytes);

    tracing::info!("Listening on http://{}", config.bind);
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
