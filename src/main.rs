use identity::{Server, config::ServerConfig, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS operations
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    init_tracing();

    let config = ServerConfig::from_env()?;
    Server::run(config).await
}
