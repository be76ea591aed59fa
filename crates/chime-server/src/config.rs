use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use chime_gateway::window::AdmissionWindow;
use chime_gateway::{AdmissionDelay, GatewayConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub media_dir: PathBuf,
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Unset keys take their defaults,
    /// set but invalid keys are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let defaults = GatewayConfig::default();

        let port = var("CHIME_PORT", "8000");
        let port: u16 = port
            .parse()
            .with_context(|| format!("invalid CHIME_PORT '{}'", port))?;

        let max_connections = var("CHIME_MAX_CONNECTIONS", &defaults.max_connections.to_string());
        let max_connections: usize = max_connections
            .parse()
            .with_context(|| format!("invalid CHIME_MAX_CONNECTIONS '{}'", max_connections))?;
        if max_connections == 0 {
            bail!("CHIME_MAX_CONNECTIONS must be at least 1");
        }

        let window = |key: &str, default: AdmissionWindow| -> Result<AdmissionWindow> {
            match lookup(key) {
                Some(raw) => raw
                    .parse()
                    .with_context(|| format!("invalid {} '{}'", key, raw)),
                None => Ok(default),
            }
        };

        let admission_delay = match lookup("CHIME_ADMISSION_DELAY_MS") {
            Some(raw) => parse_delay(&raw)
                .with_context(|| format!("invalid CHIME_ADMISSION_DELAY_MS '{}'", raw))?,
            None => defaults.admission_delay,
        };

        Ok(Self {
            host: var("CHIME_HOST", "0.0.0.0"),
            port,
            db_path: PathBuf::from(var("CHIME_DB_PATH", "chime.db")),
            media_dir: PathBuf::from(var("CHIME_MEDIA_DIR", "./media")),
            gateway: GatewayConfig {
                max_connections,
                text_window: window("CHIME_TEXT_WINDOW", defaults.text_window)?,
                voice_window: window("CHIME_VOICE_WINDOW", defaults.voice_window)?,
                video_window: window("CHIME_VIDEO_WINDOW", defaults.video_window)?,
                admission_delay,
                heartbeat_interval: defaults.heartbeat_interval,
            },
        })
    }
}

/// `MIN-MAX` in milliseconds, or a single value for a fixed delay.
fn parse_delay(raw: &str) -> Result<AdmissionDelay> {
    let (min, max) = match raw.split_once('-') {
        Some((min, max)) => (min.trim().parse::<u64>()?, max.trim().parse::<u64>()?),
        None => {
            let fixed = raw.trim().parse::<u64>()?;
            (fixed, fixed)
        }
    };
    if min > max {
        bail!("minimum {} is above maximum {}", min, max);
    }
    Ok(AdmissionDelay {
        min: Duration::from_millis(min),
        max: Duration::from_millis(max),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.db_path, PathBuf::from("chime.db"));
        assert_eq!(config.media_dir, PathBuf::from("./media"));
        assert_eq!(config.gateway.max_connections, 50);
        assert_eq!(config.gateway.voice_window, AdmissionWindow::VOICE);
        assert_eq!(config.gateway.admission_delay, AdmissionDelay::default());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("CHIME_PORT", "9001"),
            ("CHIME_MAX_CONNECTIONS", "5"),
            ("CHIME_VOICE_WINDOW", "09:30-10:15"),
            ("CHIME_ADMISSION_DELAY_MS", "0"),
        ])
        .unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.gateway.max_connections, 5);
        assert_eq!(config.gateway.voice_window.to_string(), "09:30-10:15");
        assert_eq!(config.gateway.admission_delay, AdmissionDelay::NONE);
    }

    #[test]
    fn test_delay_range() {
        let delay = parse_delay("200-400").unwrap();
        assert_eq!(delay.min, Duration::from_millis(200));
        assert_eq!(delay.max, Duration::from_millis(400));
        assert!(parse_delay("400-200").is_err());
        assert!(parse_delay("soon").is_err());
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(config(&[("CHIME_PORT", "eighty")]).is_err());
        assert!(config(&[("CHIME_MAX_CONNECTIONS", "0")]).is_err());
        assert!(config(&[("CHIME_TEXT_WINDOW", "23:00-05:00")]).is_err());
    }
}
