use anyhow::Context;
use api::{Settings, VerifyingKey};
use core::num::NonZeroU64;
use std::{env, path::PathBuf, time::Duration};

pub struct Config {
    pub port: u16,
    pub app: NonZeroU64,
    pub key: VerifyingKey,
    pub token: String,
    pub postgres: db::Config,
    pub settings: Settings,
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name).with_context(|| format!("missing environment variable {name}"))
}

/// Parses an optional variable, leaving `None` when it is unset.
fn optional<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: core::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value.parse().map(Some).with_context(|| format!("invalid value for {name}")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("unreadable environment variable {name}")),
    }
}

fn public_key(hex: &str) -> anyhow::Result<VerifyingKey> {
    let bytes = hex::decode(hex).context("public key is not hex")?;
    let bytes: [u8; 32] = bytes.try_into().map_err(|_| anyhow::anyhow!("public key must be 32 bytes"))?;
    VerifyingKey::from_bytes(&bytes).context("public key is not a valid Ed25519 point")
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = required("PORT")?.parse().context("invalid PORT")?;
        let app = required("APP_ID")?.parse().context("invalid APP_ID")?;
        let key = public_key(&required("PUB_KEY")?)?;
        let token = required("BOT_TOKEN")?;

        let mut postgres = db::Config::new();
        postgres
            .host(&required("PG_HOSTNAME")?)
            .user(&required("PG_USERNAME")?)
            .password(required("PG_PASSWORD")?)
            .dbname(&required("PG_DATABASE")?)
            .port(optional("PG_PORT")?.unwrap_or(5432));

        let mut settings = Settings::default();
        if let Some(timeout) = optional("QUESTION_TIMEOUT")? {
            settings.question_timeout = timeout;
        }
        if let Some(wait) = optional("JOIN_WAIT")? {
            settings.join_wait = wait;
        }
        if let Some(multiplier) = optional::<f64>("SPEED_BONUS")? {
            anyhow::ensure!(multiplier.is_finite() && multiplier >= 0.0, "SPEED_BONUS must be a non-negative number");
            settings.speed_bonus_multiplier = multiplier;
        }
        if let Some(delay) = optional("RESULTS_DELAY")? {
            settings.results_delay = Duration::from_secs(delay);
        }
        if let Some(dir) = optional::<PathBuf>("IMAGE_DIR")? {
            settings.image_dir = dir;
        }

        Ok(Self { port, app, key, token, postgres, settings })
    }
}
