use tsfeed_lib::config::AppConfig;
use tsfeed_lib::logger::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.log_level, config.log_json);
    tsfeed_lib::run(config).await
}
