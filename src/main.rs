use tracing::error;

use sheetserve::infrastructure::bootstrap;
use sheetserve::infrastructure::config::AppConfig;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Err(err) = bootstrap::run(config).await {
        error!(error = %err, "server exited with error");
        std::process::exit(1);
    }
}
