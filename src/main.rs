use anyhow::Context;
use rvuscraper::{
    config::Config,
    error::{Error, ErrorKind},
    fetch,
    notify::Notifier,
    pipeline::{self, Pipeline},
    store::SqliteSession,
};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rvuscraper=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configuration ───────────────────────────────────────────
    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            // nowhere to log or alert to without a config
            error!("Error occurred when loading configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let client = match fetch::build_client(&cfg) {
        Ok(client) => client,
        Err(e) => {
            error!("Error occurred when building the HTTP client: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let notifier = match Notifier::from_config(&cfg, client.clone()) {
        Ok(notifier) => notifier,
        Err(e) => {
            error!("Error occurred when setting up notifications: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    // ─── 3) one store session for the whole run ─────────────────────
    let mut session = match SqliteSession::open(&cfg.db_path, &cfg.sql.init)
        .with_context(|| format!("opening {}", cfg.db_path.display()))
    {
        Ok(session) => session,
        Err(e) => {
            let err = Error::new(ErrorKind::Persistence, "connecting to the database", e);
            pipeline::report_failure(None, &notifier, &cfg, &err).await;
            return ExitCode::FAILURE;
        }
    };

    // ─── 4) run ─────────────────────────────────────────────────────
    let code = {
        let mut pipeline = Pipeline::new(&cfg, &client, &mut session);
        match pipeline.run().await {
            Ok(summary) => {
                info!(
                    archives = ?summary.archives,
                    rows = summary.rows_staged,
                    "all done"
                );
                ExitCode::SUCCESS
            }
            Err(err) => {
                pipeline.on_error(&notifier, &err).await;
                ExitCode::FAILURE
            }
        }
    };

    if let Err(e) = session.close() {
        warn!("{:#}", e);
    }
    code
}
