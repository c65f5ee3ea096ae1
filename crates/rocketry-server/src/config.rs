use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use jsonwebtoken::Algorithm;
use rand::RngCore;
use tracing::warn;

/// Placeholder webhook secrets that MUST NOT be used.
const PLACEHOLDER_WEBHOOK_SECRETS: &[&str] = &["whsec_xxx", "change-me", ""];

/// One year.
const MAX_TOKEN_TTL_MINUTES: i64 = 60 * 24 * 365;

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://127.0.0.1:5173";

/// Startup configuration, read from the environment exactly once.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub secret_key: Vec<u8>,
    pub jwt_algorithm: Algorithm,
    pub token_ttl_minutes: i64,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub cors_origins: Vec<String>,
    pub assets_dir: PathBuf,
    pub seed_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = parse_var(&var("ROCKETRY_PORT", "8000"), "ROCKETRY_PORT")?;
        let token_ttl_minutes: i64 =
            parse_var(&var("ROCKETRY_TOKEN_TTL_MINUTES", "10080"), "ROCKETRY_TOKEN_TTL_MINUTES")?;
        if !(1..=MAX_TOKEN_TTL_MINUTES).contains(&token_ttl_minutes) {
            bail!("ROCKETRY_TOKEN_TTL_MINUTES must be between 1 and {MAX_TOKEN_TTL_MINUTES}");
        }
        let webhook_tolerance_secs: i64 = parse_var(
            &var("ROCKETRY_WEBHOOK_TOLERANCE_SECS", "300"),
            "ROCKETRY_WEBHOOK_TOLERANCE_SECS",
        )?;
        if webhook_tolerance_secs <= 0 {
            bail!("ROCKETRY_WEBHOOK_TOLERANCE_SECS must be positive");
        }

        let jwt_algorithm = Algorithm::from_str(&var("ROCKETRY_JWT_ALGORITHM", "HS256"))
            .context("ROCKETRY_JWT_ALGORITHM is not a known JWT algorithm")?;
        if !matches!(jwt_algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            bail!("ROCKETRY_JWT_ALGORITHM must be HS256, HS384 or HS512");
        }

        let secret_key = match lookup("ROCKETRY_SECRET_KEY").filter(|s| !s.is_empty()) {
            Some(secret) => secret.into_bytes(),
            None => {
                warn!("ROCKETRY_SECRET_KEY unset; using a random key, tokens will not survive a restart");
                random_secret().into_bytes()
            }
        };

        let webhook_secret = lookup("ROCKETRY_STRIPE_WEBHOOK_SECRET").unwrap_or_default();
        if PLACEHOLDER_WEBHOOK_SECRETS.contains(&webhook_secret.as_str()) {
            bail!("ROCKETRY_STRIPE_WEBHOOK_SECRET is unset or still a placeholder");
        }

        let cors_origins = var("ROCKETRY_CORS_ORIGINS", DEFAULT_CORS_ORIGINS)
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            host: var("ROCKETRY_HOST", "0.0.0.0"),
            port,
            db_path: var("ROCKETRY_DB_PATH", "rocketry.db").into(),
            secret_key,
            jwt_algorithm,
            token_ttl_minutes,
            webhook_secret,
            webhook_tolerance_secs,
            cors_origins,
            assets_dir: var("ROCKETRY_ASSETS_DIR", "assets").into(),
            seed_path: lookup("ROCKETRY_SEED_PATH").filter(|s| !s.is_empty()).map(PathBuf::from),
        })
    }
}

fn parse_var<T: FromStr>(raw: &str, name: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{name} has invalid value {raw:?}"))
}

/// 32 random bytes, base64url encoded.
fn random_secret() -> String {
    let mut key = [0u8; 32];
    rand::rng().fill_bytes(&mut key);
    B64.encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_with_only_webhook_secret() {
        let config = load(&[("ROCKETRY_STRIPE_WEBHOOK_SECRET", "whsec_live_abc")]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.jwt_algorithm, Algorithm::HS256);
        assert_eq!(config.token_ttl_minutes, 60 * 24 * 7);
        assert_eq!(config.cors_origins.len(), 2);
        assert!(config.seed_path.is_none());
        assert_eq!(config.secret_key.len(), 43);
    }

    #[test]
    fn random_secrets_differ() {
        assert_ne!(random_secret(), random_secret());
    }

    #[test]
    fn placeholder_webhook_secret_is_refused() {
        assert!(load(&[]).is_err());
        assert!(load(&[("ROCKETRY_STRIPE_WEBHOOK_SECRET", "whsec_xxx")]).is_err());
    }

    #[test]
    fn invalid_values_are_refused() {
        let secret = ("ROCKETRY_STRIPE_WEBHOOK_SECRET", "whsec_live_abc");
        assert!(load(&[secret, ("ROCKETRY_PORT", "eighty")]).is_err());
        assert!(load(&[secret, ("ROCKETRY_JWT_ALGORITHM", "RS256")]).is_err());
        assert!(load(&[secret, ("ROCKETRY_JWT_ALGORITHM", "none")]).is_err());
        assert!(load(&[secret, ("ROCKETRY_TOKEN_TTL_MINUTES", "0")]).is_err());
    }

    #[test]
    fn token_lifetime_is_bounded() {
        let secret = ("ROCKETRY_STRIPE_WEBHOOK_SECRET", "whsec_live_abc");
        for ttl in ["1000000000000", "9223372036854775807", "525601"] {
            let err = load(&[secret, ("ROCKETRY_TOKEN_TTL_MINUTES", ttl)]).unwrap_err();
            assert!(err.to_string().contains("ROCKETRY_TOKEN_TTL_MINUTES"), "{err}");
        }
        let config = load(&[secret, ("ROCKETRY_TOKEN_TTL_MINUTES", "525600")]).unwrap();
        assert_eq!(config.token_ttl_minutes, MAX_TOKEN_TTL_MINUTES);
    }

    #[test]
    fn webhook_tolerance_must_be_positive() {
        let secret = ("ROCKETRY_STRIPE_WEBHOOK_SECRET", "whsec_live_abc");
        for tolerance in ["0", "-5"] {
            let err = load(&[secret, ("ROCKETRY_WEBHOOK_TOLERANCE_SECS", tolerance)]).unwrap_err();
            assert!(err.to_string().contains("ROCKETRY_WEBHOOK_TOLERANCE_SECS"), "{err}");
        }
        let config = load(&[secret, ("ROCKETRY_WEBHOOK_TOLERANCE_SECS", "60")]).unwrap();
        assert_eq!(config.webhook_tolerance_secs, 60);
    }

    #[test]
    fn explicit_values_win() {
        let config = load(&[
            ("ROCKETRY_STRIPE_WEBHOOK_SECRET", "whsec_live_abc"),
            ("ROCKETRY_SECRET_KEY", "s3cret"),
            ("ROCKETRY_JWT_ALGORITHM", "HS512"),
            ("ROCKETRY_CORS_ORIGINS", "https://gurocketry.co.uk, ,https://admin.gurocketry.co.uk"),
            ("ROCKETRY_SEED_PATH", "seed.json"),
        ])
        .unwrap();
        assert_eq!(config.secret_key, b"s3cret");
        assert_eq!(config.jwt_algorithm, Algorithm::HS512);
        assert_eq!(
            config.cors_origins,
            vec!["https://gurocketry.co.uk", "https://admin.gurocketry.co.uk"]
        );
        assert_eq!(config.seed_path, Some(PathBuf::from("seed.json")));
    }
}
