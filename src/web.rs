use axum::extract::{Path, Query, State};
use axum::response::{Html, Redirect};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tera::Tera;
use log::info;

use crate::audit::{AuditLog, AuditOutcome, AuditRecord};
use crate::categories::CategoryDirectory;
use crate::monitor::{Monitor, MonitorStatus};
use crate::settings::ServerConfig;

const PANEL_TEMPLATE: &str = include_str!("../templates/panel.html");

pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub audit: Arc<AuditLog>,
    pub directory: Arc<dyn CategoryDirectory>,
    pub tera: Tera,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>, audit: Arc<AuditLog>, directory: Arc<dyn CategoryDirectory>) -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_template("panel.html", PANEL_TEMPLATE)?;
        Ok(Self {
            monitor,
            audit,
            directory,
            tera,
        })
    }
}

#[derive(Serialize)]
struct PanelCategory {
    name: String,
    hex: &'static str,
}

#[derive(Serialize)]
struct PanelLogLine {
    time: String,
    text: String,
    failed: bool,
}

impl From<&AuditRecord> for PanelLogLine {
    fn from(record: &AuditRecord) -> Self {
        Self {
            time: record.timestamp.format("%H:%M:%S").to_string(),
            text: record.summary(),
            failed: matches!(record.outcome, AuditOutcome::Failed { .. }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PanelQuery {
    notice: Option<String>,
}

async fn render_panel(app: &AppState, notice: Option<String>) -> Result<Html<String>, tera::Error> {
    let status = app.monitor.status().await;
    let categories: Vec<PanelCategory> = app
        .directory
        .list_categories()
        .into_iter()
        .map(|category| PanelCategory {
            name: category.name,
            hex: category.color.hex(),
        })
        .collect();
    // Newest first, like a scrolled-down log box
    let log: Vec<PanelLogLine> = app.audit.records().iter().rev().map(PanelLogLine::from).collect();

    let mut ctx = tera::Context::new();
    ctx.insert("notice", &notice);
    ctx.insert("categories", &categories);
    ctx.insert("running", &status.is_running());
    ctx.insert("status", &status.describe());
    ctx.insert("log", &log);
    let html = app.tera.render("panel.html", &ctx)?;
    Ok(Html(html))
}

fn redirect_with_notice(notice: &str) -> Redirect {
    Redirect::to(&format!("/?notice={}", urlencoding::encode(notice)))
}

async fn panel(State(app): State<Arc<AppState>>, Query(query): Query<PanelQuery>) -> Html<String> {
    match render_panel(&app, query.notice).await {
        Ok(html) => html,
        Err(e) => Html(format!("Error rendering control panel: {}", e)),
    }
}

async fn start_monitoring(State(app): State<Arc<AppState>>, Path(category): Path<String>) -> Redirect {
    if !app.directory.contains(&category) {
        return redirect_with_notice(&format!("Unknown category '{}'", category));
    }
    match app.monitor.start(&category).await {
        Ok(()) => Redirect::to("/"),
        Err(e) => redirect_with_notice(&e.to_string()),
    }
}

async fn stop_monitoring(State(app): State<Arc<AppState>>) -> Redirect {
    app.monitor.stop().await;
    Redirect::to("/")
}

async fn status(State(app): State<Arc<AppState>>) -> Json<MonitorStatus> {
    Json(app.monitor.status().await)
}

async fn audit_records(State(app): State<Arc<AppState>>) -> Json<Vec<AuditRecord>> {
    Json(app.audit.records())
}

pub fn create_router(app: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(panel))
        .route("/monitor/start/:category", post(start_monitoring))
        .route("/monitor/stop", post(stop_monitoring))
        .route("/api/status", get(status))
        .route("/api/audit", get(audit_records))
        .with_state(app)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Cannot listen for shutdown signal: {}", e);
    }
}

pub async fn start_web_server(config: &ServerConfig, app: Arc<AppState>) -> anyhow::Result<()> {
    let monitor = Arc::clone(&app.monitor);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Control panel running on http://{}:{}", config.host, config.port);
    axum::serve(listener, create_router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditSink;
    use crate::categories::ConfiguredCategories;
    use crate::categorizer::{PatternLibrary, Verdict};
    use crate::error::SetupError;
    use crate::mail_reader::{MailboxConnector, MailboxSource};
    use crate::settings::CategorizerSettings;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Unreachable;

    #[async_trait]
    impl MailboxConnector for Unreachable {
        async fn connect(&self) -> Result<Box<dyn MailboxSource>, SetupError> {
            Err(SetupError::NotConfigured)
        }
    }

    fn app() -> AppState {
        let audit = Arc::new(AuditLog::new(10));
        let library = Arc::new(PatternLibrary::new(&CategorizerSettings::default()).unwrap());
        let monitor = Arc::new(Monitor::new(
            Arc::new(Unreachable),
            library,
            audit.clone(),
            Duration::from_millis(10),
        ));
        AppState::new(monitor, audit, Arc::new(ConfiguredCategories::new(&[]))).unwrap()
    }

    #[tokio::test]
    async fn test_panel_lists_categories_and_log() {
        let app = app();
        app.audit.record(AuditRecord::verdict(
            "1",
            "Unlock <user>",
            Verdict::Apply(vec!["KARL".to_string()]),
            vec!["regex".to_string()],
        ));

        let Html(html) = render_panel(&app, Some("hello".to_string())).await.unwrap();
        assert!(html.contains("/monitor/start/KARL"));
        assert!(html.contains("background: #008000"));
        assert!(html.contains("Status: Stopped"));
        assert!(html.contains("hello"));
        // Subjects are escaped
        assert!(html.contains("Unlock &lt;user&gt;"));
    }
}
