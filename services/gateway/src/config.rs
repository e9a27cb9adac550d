//! Configuration types and loading
//!
//! Precedence: env vars > config file > defaults. The config file is
//! optional. The OIDC client secret is read from `OIDC_CLIENT_SECRET` or
//! `oidc.client_secret_file`, never from the TOML itself.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use common::Secret;
use oidc_auth::{DEFAULT_SCOPES, OidcSettings};
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub oidc: OidcConfig,
}

/// HTTP listener and runtime mode
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
    pub port: u16,
    /// Relaxes cookie and CORS policy for a local frontend.
    pub development: bool,
    /// Timeout for every identity-provider request.
    pub provider_timeout_secs: u64,
    /// Origin allowed with credentials in development mode.
    pub dev_cors_origin: String,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".into(),
            port: 8080,
            development: false,
            provider_timeout_secs: 10,
            dev_cors_origin: "http://localhost:5173".into(),
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> common::Result<SocketAddr> {
        let ip: IpAddr = self.listen_address.parse().map_err(|_| {
            common::Error::Config(format!(
                "listen address must be an IP address, got: {}",
                self.listen_address
            ))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Identity provider registration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OidcConfig {
    pub issuer_url: String,
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Secret<String>,
    pub client_secret_file: Option<PathBuf>,
    pub redirect_url: String,
    /// Space-separated scopes. Blank means the default set.
    pub scopes: String,
    /// Seconds to cache discovery documents. 0 disables the cache.
    pub discovery_cache_ttl_secs: u64,
}

impl OidcConfig {
    pub fn settings(&self) -> OidcSettings {
        OidcSettings {
            issuer_url: self.issuer_url.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_url: self.redirect_url.clone(),
            scopes: OidcSettings::parse_scopes(&self.scopes),
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then overlay process environment variables.
    pub fn load(path: Option<&Path>) -> common::Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load) with an injectable environment lookup.
    pub fn load_with(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> common::Result<Self> {
        let mut config: Config = match path {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => Config::default(),
        };

        config.apply_env(&env)?;
        config.resolve_client_secret(&env)?;
        config.validate()?;

        if config.oidc.scopes.trim().is_empty() {
            config.oidc.scopes = DEFAULT_SCOPES.into();
        }

        Ok(config)
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> common::Result<()> {
        if let Some(addr) = env("LISTEN_ADDRESS") {
            self.server.listen_address = addr;
        }
        if let Some(port) = env("PORT") {
            self.server.port = port.trim().parse().map_err(|_| {
                common::Error::Config(format!("PORT must be a port number, got: {port}"))
            })?;
        }
        if let Some(dev) = env("DEVELOPMENT") {
            self.server.development = dev.eq_ignore_ascii_case("true") || dev == "1";
        }

        let oidc = &mut self.oidc;
        for (key, field) in [
            ("OIDC_ISSUER_URL", &mut oidc.issuer_url),
            ("OIDC_CLIENT_ID", &mut oidc.client_id),
            ("OIDC_REDIRECT_URL", &mut oidc.redirect_url),
            ("OIDC_SCOPES", &mut oidc.scopes),
        ] {
            if let Some(value) = env(key) {
                *field = value;
            }
        }

        Ok(())
    }

    /// `OIDC_CLIENT_SECRET` wins over `client_secret_file`.
    fn resolve_client_secret(&mut self, env: &impl Fn(&str) -> Option<String>) -> common::Result<()> {
        if let Some(secret) = env("OIDC_CLIENT_SECRET") {
            self.oidc.client_secret = Secret::new(secret);
        } else if let Some(ref file) = self.oidc.client_secret_file {
            let secret = std::fs::read_to_string(file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    file.display()
                ))
            })?;
            self.oidc.client_secret = Secret::new(secret.trim().to_owned());
        }
        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        self.server.socket_addr()?;

        if self.server.provider_timeout_secs == 0 {
            return Err(common::Error::Config(
                "provider_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        let issuer = &self.oidc.issuer_url;
        if !issuer.is_empty() && !issuer.starts_with("http://") && !issuer.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "issuer_url must start with http:// or https://, got: {issuer}"
            )));
        }

        Ok(())
    }

    /// Config file path from the CLI arg or `CONFIG_PATH`. `None` runs on
    /// defaults and environment alone.
    pub fn resolve_path(cli_path: Option<&str>) -> Option<PathBuf> {
        cli_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("CONFIG_PATH").ok().filter(|p| !p.is_empty()).map(PathBuf::from))
    }
}
