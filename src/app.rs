use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tracing::instrument;

use crate::{
    AppState,
    auth::{AuthService, JwtService},
    config::ServerConfig,
    db::{
        self,
        accounts::{AccountStore, PgAccountStore},
    },
    media::{MediaService, S3MediaStore},
    registration::RegistrationService,
    routes,
};

pub struct Server;

impl Server {
    #[instrument(
        name = "identity_server",
        skip(config),
        fields(listen_addr = %config.listen_addr)
    )]
    pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
        let pool = db::create_pool(&config.database_url)
            .await
            .context("failed to create postgres pool")?;

        db::migrate(&pool)
            .await
            .context("failed to run database migrations")?;

        let jwt = Arc::new(JwtService::new(
            config.auth.access_token_secret().clone(),
            config.auth.refresh_token_secret().clone(),
            config.auth.access_token_ttl_seconds(),
            config.auth.refresh_token_ttl_days(),
        ));

        let accounts: Arc<dyn AccountStore> = Arc::new(PgAccountStore::new(pool.clone()));

        let media_store = Arc::new(S3MediaStore::new(&config.media));
        let media = MediaService::new(
            media_store,
            Duration::from_secs(config.media.op_timeout_secs),
        );

        let auth = AuthService::new(accounts.clone(), jwt.clone());
        let registration = RegistrationService::new(accounts.clone(), media);

        let state = AppState::new(config.clone(), jwt, accounts, auth, registration);

        let router = routes::router(state);
        let addr: SocketAddr = config
            .listen_addr
            .parse()
            .context("listen address is invalid")?;
        let tcp_listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("failed to bind tcp listener")?;

        tracing::info!(%addr, "identity server listening");

        axum::serve(tcp_listener, router.into_make_service())
            .await
            .context("identity server failure")?;

        Ok(())
    }
}
