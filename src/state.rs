use std::sync::Arc;

use crate::{
    auth::{AuthService, JwtService},
    config::ServerConfig,
    db::accounts::AccountStore,
    registration::RegistrationService,
};

#[derive(Clone)]
pub struct AppState {
    config: ServerConfig,
    jwt: Arc<JwtService>,
    accounts: Arc<dyn AccountStore>,
    auth: AuthService,
    registration: RegistrationService,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        jwt: Arc<JwtService>,
        accounts: Arc<dyn AccountStore>,
        auth: AuthService,
        registration: RegistrationService,
    ) -> Self {
        Self {
            config,
            jwt,
            accounts,
            auth,
            registration,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn jwt(&self) -> Arc<JwtService> {
        Arc::clone(&self.jwt)
    }

    pub fn accounts(&self) -> Arc<dyn AccountStore> {
        Arc::clone(&self.accounts)
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn registration(&self) -> &RegistrationService {
        &self.registration
    }

    /// Session cookies carry `Secure` outside debug builds.
    pub fn secure_cookies(&self) -> bool {
        crate::environment() == "production"
    }
}
