//! Wiring of the session core for the terminal front end.

use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use academy_core::api::{ApiClient, ApiError};
use academy_core::auth::validation::{
    require, validate_confirmation, validate_email, validate_login_secret, validate_new_secret,
};
use academy_core::auth::{
    AuthError, FileTokenStore, HttpIdentityProvider, IdentityProvider, KeyringTokenStore,
    LocalIdentityProvider, Navigator, Render, RouteGuard, SessionStatus, SessionStore, TokenStore,
};
use academy_core::config::{Backend, Config, TokenStorage};
use academy_core::models::User;
use anyhow::{bail, Result};
use tracing::{debug, error, warn};

/// Environment variable supplying the password non-interactively
const PASSWORD_ENV: &str = "ACADEMY_PASSWORD";

/// Extra time on top of the HTTP timeout before giving up on a session call
const OPERATION_GRACE: Duration = Duration::from_secs(5);

/// Prints redirects instead of navigating a browser
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn redirect_to(&self, path: &str) {
        println!("Not signed in - redirecting to {}. Run `academy login` first.", path);
    }
}

pub struct App {
    config: Config,
    session: Arc<SessionStore>,
    api: ApiClient,
    guard: RouteGuard,
    navigator: Arc<dyn Navigator>,
}

impl App {
    pub fn new(backend: Option<Backend>) -> Result<Self> {
        let mut config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        if let Some(backend) = backend {
            config.backend = backend;
        }
        debug!(backend = ?config.backend, storage = ?config.token_storage, "Config loaded");

        let file_store = || {
            let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
            FileTokenStore::new(cache_dir)
        };
        let tokens: Arc<dyn TokenStore> = match config.token_storage {
            TokenStorage::File => Arc::new(file_store()),
            TokenStorage::Keyring => {
                let keyring = KeyringTokenStore::new();
                if keyring.is_durable() {
                    Arc::new(keyring)
                } else {
                    warn!("OS keychain is unavailable, keeping the session token in the cache directory");
                    Arc::new(file_store())
                }
            }
        };

        let api = ApiClient::new(config.api_base_url(), config.request_timeout())?;
        let provider: Arc<dyn IdentityProvider> = match config.backend {
            Backend::Http => Arc::new(HttpIdentityProvider::new(api.clone())),
            Backend::Local => Arc::new(LocalIdentityProvider::open(&config.data_dir()?)?),
        };

        Ok(Self::assemble(config, provider, tokens, api, Arc::new(TerminalNavigator)))
    }

    /// Connect the session store, the REST client and the guard
    fn assemble(
        config: Config,
        provider: Arc<dyn IdentityProvider>,
        tokens: Arc<dyn TokenStore>,
        api: ApiClient,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let session = Arc::new(SessionStore::new(provider, tokens.clone()));
        let api = api.with_token_store(tokens).on_unauthorized({
            let session = session.clone();
            move || session.expire()
        });
        let guard = RouteGuard::new(config.login_path());

        Self {
            config,
            session,
            api,
            guard,
            navigator,
        }
    }

    /// Bound a session call so a hung backend cannot stall the command
    async fn bounded<T>(&self, operation: impl Future<Output = T>) -> Option<T> {
        let limit = self.config.request_timeout() + OPERATION_GRACE;
        tokio::time::timeout(limit, operation).await.ok()
    }

    pub async fn restore(&mut self) -> SessionStatus {
        match self.bounded(self.session.restore()).await {
            Some(status) => status,
            None => {
                warn!("Timed out restoring the session");
                self.session.status()
            }
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    pub async fn login(&mut self, email: Option<String>) -> Result<()> {
        let email = match email.or_else(|| self.config.last_email.clone()) {
            Some(email) => email,
            None => Self::prompt("Email: ")?,
        };
        validate_email(&email)?;
        let password = Self::password("Password: ")?;
        validate_login_secret(&password)?;

        println!("Signing in...");
        let result = self.bounded(self.session.login(&email, &password)).await;
        let user = Self::finish_sign_in(result)?;
        self.remember_email(&user);
        println!("Signed in as {} <{}>", user.display_name, user.email);
        Ok(())
    }

    pub async fn register(&mut self, name: &str, email: Option<String>) -> Result<()> {
        require("Name", name)?;
        let email = match email {
            Some(email) => email,
            None => Self::prompt("Email: ")?,
        };
        validate_email(&email)?;
        let password = Self::password("Password: ")?;
        validate_new_secret(&password)?;
        let confirmation = match std::env::var(PASSWORD_ENV) {
            Ok(_) => password.clone(),
            Err(_) => rpassword::prompt_password("Confirm password: ")?,
        };
        validate_confirmation(&password, &confirmation)?;

        println!("Creating account...");
        let result = self.bounded(self.session.register(name, &email, &password)).await;
        let user = Self::finish_sign_in(result)?;
        self.remember_email(&user);
        println!("Welcome, {}! You are signed in as a {}.", user.display_name, user.role.label().to_lowercase());
        Ok(())
    }

    pub fn logout(&mut self) {
        let was_signed_in = self.session.is_authenticated();
        self.session.logout();
        if was_signed_in {
            println!("Signed out.");
        } else {
            println!("Not signed in.");
        }
    }

    pub fn print_status(&self) {
        let session = self.session.current();
        println!("Session: {}", session.status());
        if let Some(user) = session.user() {
            println!("  Name:  {} ({})", user.display_name, user.initials());
            println!("  Email: {}", user.email);
            println!("  Role:  {}", user.role.label());
            if let Some(ref avatar) = user.avatar_ref {
                println!("  Avatar: {}", avatar);
            }
        }
    }

    pub fn open(&self, path: &str) -> Render {
        if self.guard.is_public(path) {
            println!("{} is public.", path);
            return Render::Content;
        }

        let status = self.session.status();
        let render = self.guard.apply(status, self.navigator.as_ref());
        match render {
            Render::Content => {
                let name = self.session.user().map(|u| u.display_name).unwrap_or_default();
                println!("Opening {} for {}.", path, name);
            }
            Render::Placeholder if !status.is_settled() => {
                println!("Still verifying your session, try again shortly.");
            }
            Render::Placeholder => {}
        }
        render
    }

    pub async fn fetch(&self, path: &str) -> Result<()> {
        if self.guard.apply(self.session.status(), self.navigator.as_ref()) != Render::Content {
            bail!("{} requires a signed-in session", path);
        }

        match self.api.get::<serde_json::Value>(path).await {
            Ok(value) => {
                println!("{}", serde_json::to_string_pretty(&value)?);
                Ok(())
            }
            Err(ApiError::Unauthorized) => {
                // The unauthorized hook has already signed the session out
                self.guard.apply(self.session.status(), self.navigator.as_ref());
                bail!("Session expired. Please log in again.")
            }
            Err(e) => {
                error!(error = %e, path, "Request failed");
                Err(e.into())
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn finish_sign_in(result: Option<Result<User, AuthError>>) -> Result<User> {
        match result {
            Some(Ok(user)) => Ok(user),
            Some(Err(e)) => {
                error!(error = %e, "Sign-in failed");
                bail!(e.user_message())
            }
            None => bail!("The server did not answer in time. Please try again later."),
        }
    }

    fn remember_email(&mut self, user: &User) {
        self.config.last_email = Some(user.email.clone());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    fn prompt(label: &str) -> Result<String> {
        print!("{}", label);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().to_string())
    }

    fn password(label: &str) -> Result<String> {
        match std::env::var(PASSWORD_ENV) {
            Ok(password) => Ok(password),
            Err(_) => Ok(rpassword::prompt_password(label)?),
        }
    }
}
