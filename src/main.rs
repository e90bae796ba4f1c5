use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use sitewatch::alerting::AlertEvaluator;
use sitewatch::clock::SystemClock;
use sitewatch::config::Settings;
use sitewatch::database::Database;
use sitewatch::notify::{Dispatcher, HttpWebhookSender, LettreSmtpSender};
use sitewatch::probe::ProbeEngine;
use sitewatch::protector::Protector;
use sitewatch::runtime::RuntimeManager;
use sitewatch::web::{start_web_server, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("sitewatch=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting sitewatch");

    let settings = Settings::load(Path::new("sitewatch.toml"))?;
    let data_root = Path::new(&settings.data_root);

    let database = Arc::new(Database::new(&format!("{}/sitewatch.db", settings.data_root)).await?);
    info!("Database initialized");

    let protector = Arc::new(Protector::load_or_create(data_root)?);
    let engine = Arc::new(ProbeEngine::new()?);
    let runtime = Arc::new(RuntimeManager::new(database.clone(), engine.clone()));

    // Bring every enabled instance up before the first evaluator tick so
    // alerting sees them as running.
    runtime.autostart().await?;

    let dispatcher = Dispatcher::new(
        Arc::new(LettreSmtpSender::new()),
        Arc::new(HttpWebhookSender::new()?),
    );
    let evaluator = Arc::new(AlertEvaluator::new(
        database.clone(),
        runtime.clone(),
        dispatcher,
        protector,
        Arc::new(SystemClock),
        settings.alerting.clone(),
    ));

    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(evaluator.run(shutdown_tx.subscribe()));
    info!(
        "Alert evaluator scheduled every {}s",
        settings.alerting.scheduler_tick_seconds
    );

    let state = AppState::new(database, runtime.clone());
    start_web_server(state, &settings.host, settings.port).await?;

    // The server returned, so the process is going down: cancel the
    // evaluator and every worker.
    let _ = shutdown_tx.send(());
    for status in runtime.get_all().await {
        let _ = runtime.stop(&status.instance_id).await;
    }
    info!("Shutdown complete");

    Ok(())
}
