use server::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = ServerConfig::from_env()?;
    server::telemetry::init(config.log_format);
    server::run(config).await
}
