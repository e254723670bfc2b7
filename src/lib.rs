//! Esanga Books - bookkeeping backend for a small stationery business.
//!
//! Sales and cost entry, daily and period reports, CSV/PDF export and
//! role-based user management on top of a hosted Supabase project. The
//! [`commands`] module is the surface a UI (or the bundled binary) calls;
//! the modules below it hold the scoped operations they delegate to.

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod auth;
pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod format;
pub mod ledger;
pub mod models;
pub mod reports;
pub mod store;
pub mod table;
pub mod users;

pub use config::AppConfig;
pub use error::{BooksError, Result};

/// Everything a command needs: configuration, both backend clients and the
/// signed-in session.
pub struct Books {
    pub config: Arc<AppConfig>,
    pub store: store::StoreClient,
    pub identity: auth::IdentityClient,
    pub session: auth::SessionContext,
}

impl Books {
    pub fn new(config: AppConfig) -> Result<Self> {
        let config = Arc::new(config);
        Ok(Self {
            store: store::StoreClient::new(Arc::clone(&config))?,
            identity: auth::IdentityClient::new(Arc::clone(&config))?,
            session: auth::SessionContext::new(),
            config,
        })
    }

    pub fn currency(&self) -> &str {
        &self.config.currency
    }
}

/// Install the console and daily-file tracing layers.
///
/// The file writer's guard is leaked so buffered lines are flushed for as
/// long as the process runs.
pub fn init_logging(config: Option<&AppConfig>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,esanga_books_lib=debug"));

    let log_dir = diagnostics::get_log_dir(config);
    std::fs::create_dir_all(&log_dir).ok();
    diagnostics::prune_old_logs(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    std::mem::forget(guard);

    info!(
        about = %diagnostics::get_about_info(),
        log_dir = %log_dir.display(),
        "Starting Esanga Books v{}",
        env!("CARGO_PKG_VERSION")
    );
}
