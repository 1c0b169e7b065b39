//! Environment-driven configuration (spec §6), loaded the way the teacher's
//! gateway binary loads its own: read `std::env::var`, fall back to a
//! documented default, parse once at startup.

use std::env;
use std::time::Duration;

use crate::error::CoreError;

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, CoreError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| CoreError::Validation(format!("invalid value for {key}: {raw:?}"))),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(env::VarError::NotUnicode(_)) => {
            Err(CoreError::Validation(format!("{key} is not valid unicode")))
        }
    }
}

/// Shared runtime configuration, assembled from environment variables
/// documented in spec §6: `PORT`, `MAX_FRANKS`, `ALLOW_LOCALHOST`,
/// `FAILURE_THRESHOLD`, `SNAPSHOT_RETENTION`, `BRIDGE_SECRET`,
/// `HEALTH_CHECK_INTERVAL_MS`.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub port: u16,
    pub max_franks: usize,
    pub allow_localhost: bool,
    pub failure_threshold: u32,
    pub snapshot_retention: usize,
    pub bridge_secret: Vec<u8>,
    pub health_check_interval: Duration,
}

impl CoreConfig {
    /// `BRIDGE_SECRET` has no safe default: an empty/missing secret would
    /// sign every message with a key an attacker can guess, so its absence
    /// is a hard startup failure rather than a silently insecure default.
    pub fn from_env() -> Result<Self, CoreError> {
        let bridge_secret = env::var("BRIDGE_SECRET").map_err(|_| {
            CoreError::Fatal("BRIDGE_SECRET must be set — refusing to start unsigned".into())
        })?;
        if bridge_secret.len() < 16 {
            return Err(CoreError::Fatal(
                "BRIDGE_SECRET must be at least 16 bytes".into(),
            ));
        }

        Ok(Self {
            port: parse_env("PORT", 8080u16)?,
            max_franks: parse_env("MAX_FRANKS", 8usize)?,
            allow_localhost: parse_env("ALLOW_LOCALHOST", false)?,
            failure_threshold: parse_env("FAILURE_THRESHOLD", 2u32)?,
            snapshot_retention: parse_env("SNAPSHOT_RETENTION", 5usize)?,
            bridge_secret: bridge_secret.into_bytes(),
            health_check_interval: Duration::from_millis(parse_env(
                "HEALTH_CHECK_INTERVAL_MS",
                1000u64,
            )?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_secret_is_fatal() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe { env::remove_var("BRIDGE_SECRET") };
        let err = CoreConfig::from_env().unwrap_err();
        assert_eq!(err.tag(), "Fatal");
    }

    #[test]
    fn defaults_apply_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::set_var("BRIDGE_SECRET", "0123456789abcdef");
            env::remove_var("PORT");
        }
        let cfg = CoreConfig::from_env().unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.max_franks, 8);
        unsafe { env::remove_var("BRIDGE_SECRET") };
    }
}
