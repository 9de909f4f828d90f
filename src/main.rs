use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use whazzup_gateway::config::Config;
use whazzup_gateway::random::ThreadRngSource;
use whazzup_gateway::retrieval::ReqwestHttpClient;
use whazzup_gateway::server::Gateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let http = Arc::new(ReqwestHttpClient::new().context("building HTTP client")?);

    let gateway = Gateway::new(config, http, Arc::new(ThreadRngSource));
    gateway.run().await
}
