use std::sync::Arc;

use arxiv_herald::auth::TokenCache;
use arxiv_herald::config::Settings;
use arxiv_herald::dispatch::chat::FeishuChat;
use arxiv_herald::dispatch::document::{FeishuDocSink, LocalFileSink};
use arxiv_herald::dispatch::http::create_http_client;
use arxiv_herald::dispatch::{Dispatcher, DocumentSink};
use arxiv_herald::ledger::Ledger;
use arxiv_herald::paper;
use arxiv_herald::pipeline::Pipeline;
use chrono::Utc;
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    init_logging();

    info!("Starting arxiv-herald...");

    let settings = init_settings();

    let papers_path = std::env::args()
        .nth(1)
        .or_else(|| settings.papers_file.clone())
        .unwrap_or_else(|| "papers.json".to_string());
    let papers = paper::load_batch(&papers_path)?;
    info!(count = papers.len(), path = %papers_path, "paper batch loaded");

    let mut pipeline = build_pipeline(&settings);

    let date_label = Utc::now().format("%Y-%m-%d").to_string();
    let report = pipeline.run(&papers, &date_label).await;

    info!(
        status = %report.status,
        delivered = report.delivered.len(),
        "run finished"
    );
    if let Some(e) = &report.error {
        error!(error = %e, "run failed");
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn init_settings() -> Settings {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn build_pipeline(settings: &Settings) -> Pipeline {
    let http = create_http_client();
    let tokens = Arc::new(TokenCache::new(
        http.clone(),
        settings.feishu_app_id.clone(),
        settings.feishu_app_secret.clone(),
    ));

    let chat = Arc::new(FeishuChat::new(
        http.clone(),
        Arc::clone(&tokens),
        settings.feishu_chat_id.clone(),
    ));

    let document: Option<Arc<dyn DocumentSink>> = settings.doc_token().map(|token| {
        info!("remote document target configured");
        Arc::new(FeishuDocSink::new(http, tokens, token)) as Arc<dyn DocumentSink>
    });
    if document.is_none() {
        info!(
            path = %settings.doc_fallback_file,
            "no remote document configured, using local history file"
        );
    }
    let fallback = Arc::new(LocalFileSink::new(settings.doc_fallback_file.clone()));

    let dispatcher = Dispatcher::new(chat, document, fallback);
    let ledger = Ledger::load(settings.history_file.clone());

    Pipeline::new(dispatcher, ledger, settings.feishu_doc_url.clone())
}
