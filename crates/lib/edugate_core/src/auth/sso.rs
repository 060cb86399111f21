//! Single sign-on provider plumbing.
//!
//! Providers are registered by name. Only accounts already linked to
//! `(provider, provider_user_id)` can sign in; see `AuthService::sso_login`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::AuthError;

/// Identity asserted by an external provider after a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoProfile {
    pub provider: String,
    pub provider_user_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[async_trait]
pub trait SsoProvider: Send + Sync {
    /// Where to send the browser to start the flow.
    fn authorize_url(&self, state: &str) -> Result<Url, AuthError>;

    /// Exchange the callback `code` for a verified profile.
    async fn exchange(&self, code: &str) -> Result<SsoProfile, AuthError>;
}

/// Named SSO providers available to the HTTP layer.
#[derive(Clone, Default)]
pub struct SsoRegistry {
    providers: HashMap<String, Arc<dyn SsoProvider>>,
}

impl SsoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn SsoProvider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SsoProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
