use serde::Deserialize;

use std::{env, fmt, fs, path::Path, time::Duration};

use crate::smtp::SmtpError;

pub const DEFAULT_PARTNER_EMAIL: &str = "partners@example.com";
pub const DEFAULT_SUPPORT_EMAIL: &str = "support@example.com";
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_HTTP_PORT: u16 = 8000;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("invalid environment variable: {0}")]
    Env(#[from] envy::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub smtp: SmtpConfig,
    pub recipients: Recipients,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_HTTP_PORT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Outbound mail server settings.
///
/// Every connection field is optional here: a missing value only becomes an
/// error when a message is about to be sent, see [`SmtpConfig::validate`].
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: Option<String>,
    #[serde(deserialize_with = "port_value")]
    pub port: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Name announced in `EHLO`, defaults to the server host.
    pub ehlo_domain: Option<String>,
    /// Upper bound for every single network operation of a session.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            username: None,
            password: None,
            ehlo_domain: None,
            timeout: DEFAULT_SMTP_TIMEOUT,
        }
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ehlo_domain", &self.ehlo_domain)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone, Copy)]
pub struct SmtpSettings<'a> {
    pub host: &'a str,
    pub port: u16,
    pub username: &'a str,
    pub password: &'a str,
    pub ehlo_domain: &'a str,
    pub timeout: Duration,
}

impl fmt::Debug for SmtpSettings<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ehlo_domain", &self.ehlo_domain)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Accepts `port: 587` as well as `port: '587'` in the config file.
fn port_value<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u64),
        Text(String),
    }

    Ok(Option::<PortValue>::deserialize(deserializer)?.map(|value| match value {
        PortValue::Number(n) => n.to_string(),
        PortValue::Text(s) => s,
    }))
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl SmtpConfig {
    /// Checks that host, port, username and password are all set.
    pub fn validate(&self) -> Result<SmtpSettings<'_>, SmtpError> {
        let missing: Vec<&str> = [
            ("SMTP_HOST", present(self.host.as_ref())),
            ("SMTP_PORT", present(self.port.as_ref())),
            ("SMTP_USERNAME", present(self.username.as_ref())),
            ("SMTP_PASSWORD", self.password.as_deref().filter(|p| !p.is_empty())),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.is_none().then_some(name))
        .collect();

        if !missing.is_empty() {
            return Err(SmtpError::Configuration(format!(
                "missing {}",
                missing.join(", ")
            )));
        }

        let host = present(self.host.as_ref()).unwrap_or_default();
        let raw_port = present(self.port.as_ref()).unwrap_or_default();
        let port = raw_port
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| {
                SmtpError::Configuration(format!("SMTP_PORT '{raw_port}' is not a valid port"))
            })?;

        Ok(SmtpSettings {
            host,
            port,
            username: present(self.username.as_ref()).unwrap_or_default(),
            password: self.password.as_deref().unwrap_or_default(),
            ehlo_domain: present(self.ehlo_domain.as_ref()).unwrap_or(host),
            timeout: self.timeout,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Recipients {
    pub partner: String,
    pub support: String,
    pub admin: String,
}

impl Default for Recipients {
    fn default() -> Self {
        Self {
            partner: DEFAULT_PARTNER_EMAIL.to_string(),
            support: DEFAULT_SUPPORT_EMAIL.to_string(),
            admin: DEFAULT_ADMIN_EMAIL.to_string(),
        }
    }
}

/// Environment variables understood by the service, lowercased by `envy`.
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    port: Option<u16>,
    smtp_host: Option<String>,
    smtp_port: Option<String>,
    smtp_username: Option<String>,
    smtp_password: Option<String>,
    smtp_ehlo_domain: Option<String>,
    smtp_timeout_secs: Option<u64>,
    partner_email: Option<String>,
    support_email: Option<String>,
    admin_email: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn apply_env<I>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: EnvOverrides = envy::from_iter(vars)?;

        if let Some(port) = env.port {
            self.server.port = port;
        }

        let smtp = &mut self.smtp;
        for (slot, value) in [
            (&mut smtp.host, env.smtp_host),
            (&mut smtp.port, env.smtp_port),
            (&mut smtp.username, env.smtp_username),
            (&mut smtp.password, env.smtp_password),
            (&mut smtp.ehlo_domain, env.smtp_ehlo_domain),
        ] {
            if let Some(value) = value {
                *slot = Some(value);
            }
        }
        if let Some(secs) = env.smtp_timeout_secs {
            smtp.timeout = Duration::from_secs(secs);
        }

        let recipients = &mut self.recipients;
        for (slot, value) in [
            (&mut recipients.partner, env.partner_email),
            (&mut recipients.support, env.support_email),
            (&mut recipients.admin, env.admin_email),
        ] {
            if let Some(value) = non_empty(value) {
                *slot = value;
            }
        }

        Ok(self)
    }
}

fn load_file(path: &str) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

pub fn load_config() -> Result<Config, ConfigError> {
    // Retrieve env variable
    let config_path =
        env::var("NOTIFIER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let base = if Path::new(&config_path).exists() {
        load_file(&config_path)?
    } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
        tracing::warn!(
            "Config file '{}' not found, falling back to '{}'",
            config_path,
            DEFAULT_CONFIG_PATH
        );
        load_file(DEFAULT_CONFIG_PATH)?
    } else {
        tracing::info!("No config file found, using defaults and environment variables");
        Config::default()
    };

    base.apply_env(env::vars())
}
