use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::Context;
use client_core::{FirebaseConfig, DEFAULT_AUTH_URL};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub auth_url: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "http://127.0.0.1:9000".into(),
            auth_url: DEFAULT_AUTH_URL.into(),
            api_key: String::new(),
            request_timeout_secs: 15,
        }
    }
}

/// Defaults, then the optional settings file, then environment variables.
pub fn load_settings(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        apply_file_overrides(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file_overrides(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) else {
        tracing::warn!("config: ignoring settings file that is not a flat string table");
        return;
    };
    if let Some(v) = file_cfg.get("database_url") {
        settings.database_url = v.clone();
    }
    if let Some(v) = file_cfg.get("auth_url") {
        settings.auth_url = v.clone();
    }
    if let Some(v) = file_cfg.get("api_key") {
        settings.api_key = v.clone();
    }
    if let Some(v) = file_cfg.get("request_timeout_secs") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }
}

fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("MEETUPS_DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = lookup("MEETUPS_AUTH_URL") {
        settings.auth_url = v;
    }
    if let Some(v) = lookup("APP__AUTH_URL") {
        settings.auth_url = v;
    }

    if let Some(v) = lookup("MEETUPS_API_KEY") {
        settings.api_key = v;
    }
    if let Some(v) = lookup("APP__API_KEY") {
        settings.api_key = v;
    }

    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }
}

impl Settings {
    pub fn firebase_config(&self) -> anyhow::Result<FirebaseConfig> {
        let database_url = Url::parse(self.database_url.trim())
            .with_context(|| format!("invalid database url '{}'", self.database_url))?;
        let auth_url = Url::parse(self.auth_url.trim())
            .with_context(|| format!("invalid auth url '{}'", self.auth_url))?;
        Ok(FirebaseConfig {
            database_url,
            auth_url,
            api_key: self.api_key.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
