use crate::moderation::Limits;
use crate::profanity::ProfanityFilter;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const MAX_MUTE_DAYS_CAP: i64 = 366;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub bot: BotConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub token: String,
    pub log_level: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RuntimeConfig {
    pub data_dir: Option<String>,
    pub sweep_interval_secs: Option<u64>,
    pub admin_refresh_secs: Option<u64>,
}

impl RuntimeConfig {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(self.data_dir.clone().unwrap_or_else(|| "./data".to_string()))
    }

    pub fn sweep_interval_secs(&self) -> u64 {
        self.sweep_interval_secs.unwrap_or(30)
    }

    pub fn admin_refresh_secs(&self) -> u64 {
        self.admin_refresh_secs.unwrap_or(180)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ModerationConfig {
    pub approve_join_requests: Option<bool>,
    pub max_mute_days: Option<i64>,
    #[serde(default)]
    pub swear_filter: Option<SwearFilterConfig>,
}

impl ModerationConfig {
    pub fn approve_join_requests(&self) -> bool {
        self.approve_join_requests.unwrap_or(true)
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_mute: chrono::Duration::days(self.max_mute_days.unwrap_or(MAX_MUTE_DAYS_CAP)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SwearFilterConfig {
    #[serde(default)]
    pub words: Vec<String>,
    pub reply: Option<String>,
    pub ignore_admins: Option<bool>,
}

impl SwearFilterConfig {
    pub fn reply(&self) -> String {
        self.reply.clone().unwrap_or_else(|| "Не ругайся".to_string())
    }

    pub fn ignore_admins(&self) -> bool {
        self.ignore_admins.unwrap_or(true)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: Config = serde_yaml::from_str(&text).context("parse yaml")?;
    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> Result<()> {
    if cfg.bot.token.trim().is_empty() {
        return Err(anyhow!("bot.token is empty"));
    }
    if cfg.runtime.sweep_interval_secs() == 0 {
        return Err(anyhow!("runtime.sweep_interval_secs must be > 0"));
    }
    if cfg.runtime.admin_refresh_secs() == 0 {
        return Err(anyhow!("runtime.admin_refresh_secs must be > 0"));
    }
    if let Some(days) = cfg.moderation.max_mute_days {
        if !(1..=MAX_MUTE_DAYS_CAP).contains(&days) {
            return Err(anyhow!(
                "moderation.max_mute_days={} out of range (1..={})",
                days,
                MAX_MUTE_DAYS_CAP
            ));
        }
    }
    if let Some(sf) = &cfg.moderation.swear_filter {
        ProfanityFilter::new(&sf.words).context("moderation.swear_filter.words")?;
    }
    Ok(())
}

/// Accepts `--config <path>`, `-c <path>` and `--config=<path>`.
pub fn parse_config_arg<I, S>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let arg = arg.as_ref();
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
        if arg == "--config" || arg == "-c" {
            return args.next().map(|p| PathBuf::from(p.as_ref()));
        }
    }
    None
}
