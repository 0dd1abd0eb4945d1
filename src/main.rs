mod api;
mod catalog;
mod classifier;
mod config;
mod evaluate;
mod pipeline;
mod preprocess;
mod resnet;
mod resolver;
mod types;

use anyhow::Context;
use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;

use api::AppState;
use catalog::LabelCatalog;
use config::Config;
use pipeline::Pipeline;
use resnet::{ResnetClassifier, ResnetConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,flora=debug".into());
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    tracing::info!("Starting flower classifier with config: {:?}", config);

    // Validate that either model_id or model_path is provided
    if config.model_id.is_none() && config.model_path.is_none() {
        anyhow::bail!("Either --model-id or --model-path must be provided");
    }

    let catalog = Arc::new(load_catalog(&config)?);
    tracing::info!(
        labels = catalog.len(),
        base = ?catalog.base(),
        "Label catalog loaded"
    );

    let resnet_config = ResnetConfig {
        model_id: config.model_id.clone(),
        model_path: config.model_path.clone(),
        revision: config.model_revision.clone(),
        model_name: config.model_name(),
        architecture: config.architecture,
        num_classes: config.num_classes,
        use_pth: config.use_pth,
        cpu: config.cpu_only,
    };

    tracing::info!("Loading ResNet model...");
    let classifier = ResnetClassifier::new(resnet_config).await?;
    tracing::info!("Model loaded successfully");

    let pipeline = Arc::new(Pipeline::new(
        Arc::new(classifier),
        catalog,
        config.image_size,
    )?);

    if let Some(path) = &config.predict {
        return predict_file(&pipeline, path).await;
    }
    if let Some(dir) = &config.evaluate {
        return run_evaluation(&pipeline, dir).await;
    }

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let app = api::router(AppState::new(pipeline), config.max_upload_bytes)
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(prometheus_layer);

    let listener = TcpListener::bind(&config.server_address()).await?;
    tracing::info!("Server running on http://{}", config.server_address());
    tracing::info!(
        "Upload field: {:?}, max upload: {} bytes",
        api::IMAGE_FIELD,
        config.max_upload_bytes
    );

    axum::serve(listener, app).await?;
    Ok(())
}

fn load_catalog(config: &Config) -> anyhow::Result<LabelCatalog> {
    // Command-line id2label takes precedence over a label file, then the built-in table.
    let catalog = if let Some(id2label) = config.parse_id2label() {
        LabelCatalog::new(id2label, config.id_base)
    } else if let Some(path) = &config.labels {
        LabelCatalog::from_file(path, config.id_base)?
    } else {
        LabelCatalog::oxford_flowers(config.id_base)
    };

    if config.no_translate {
        return Ok(catalog);
    }

    match &config.translations {
        Some(path) => Ok(catalog.with_translations(LabelCatalog::load_translations(path)?)),
        None => Ok(catalog.with_vietnamese_names()),
    }
}

#[tracing::instrument(skip(pipeline))]
async fn predict_file(pipeline: &Arc<Pipeline>, path: &std::path::Path) -> anyhow::Result<()> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let pipeline = Arc::clone(pipeline);
    let result = tokio::task::spawn_blocking(move || pipeline.run(&raw)).await??;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_evaluation(pipeline: &Arc<Pipeline>, dir: &std::path::Path) -> anyhow::Result<()> {
    let pipeline = Arc::clone(pipeline);
    let dir = dir.to_path_buf();
    let report =
        tokio::task::spawn_blocking(move || evaluate::evaluate_dir(&pipeline, &dir)).await??;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
