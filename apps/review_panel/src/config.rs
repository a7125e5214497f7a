use std::{fs, io::ErrorKind, path::Path};

use anyhow::Context;
use client_core::{DEFAULT_API_PREFIX, DEFAULT_PAGE_SIZE};

pub const DEFAULT_CONFIG_PATH: &str = "review_panel.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct PanelConfig {
    pub server_url: String,
    pub api_prefix: String,
    pub admin_key: String,
    pub page_size: u32,
    pub log_filter: String,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".into(),
            api_prefix: DEFAULT_API_PREFIX.into(),
            admin_key: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            log_filter: "info".into(),
        }
    }
}

/// Defaults, then the TOML file (if present), then environment variables.
pub fn load_config(path: &Path) -> anyhow::Result<PanelConfig> {
    let mut config = PanelConfig::default();

    match fs::read_to_string(path) {
        Ok(raw) => apply_file(&mut config, &raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    }

    apply_env(&mut config, |key| std::env::var(key).ok());
    config.server_url = normalize_server_url(&config.server_url);
    Ok(config)
}

fn apply_file(config: &mut PanelConfig, raw: &str) -> anyhow::Result<()> {
    let table: toml::Table = toml::from_str(raw)?;

    let text = |key: &str| -> Option<String> {
        match table.get(key)? {
            toml::Value::String(value) => Some(value.clone()),
            toml::Value::Integer(value) => Some(value.to_string()),
            _ => None,
        }
    };

    if let Some(v) = text("server_url") {
        config.server_url = v;
    }
    if let Some(v) = text("api_prefix") {
        config.api_prefix = v;
    }
    if let Some(v) = text("admin_key") {
        config.admin_key = v;
    }
    if let Some(v) = text("page_size") {
        config.page_size = v
            .trim()
            .parse()
            .with_context(|| format!("invalid page_size '{v}'"))?;
    }
    if let Some(v) = text("log") {
        config.log_filter = v;
    }
    Ok(())
}

fn apply_env(config: &mut PanelConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("REVIEW_PANEL_SERVER_URL") {
        config.server_url = v;
    }
    if let Some(v) = lookup("APP__SERVER_URL") {
        config.server_url = v;
    }

    if let Some(v) = lookup("REVIEW_PANEL_API_PREFIX") {
        config.api_prefix = v;
    }
    if let Some(v) = lookup("APP__API_PREFIX") {
        config.api_prefix = v;
    }

    if let Some(v) = lookup("REVIEW_PANEL_ADMIN_KEY") {
        config.admin_key = v;
    }
    if let Some(v) = lookup("APP__ADMIN_KEY") {
        config.admin_key = v;
    }

    for key in ["REVIEW_PANEL_PAGE_SIZE", "APP__PAGE_SIZE"] {
        if let Some(parsed) = lookup(key).and_then(|v| v.trim().parse::<u32>().ok()) {
            config.page_size = parsed;
        }
    }

    if let Some(v) = lookup("REVIEW_PANEL_LOG") {
        config.log_filter = v;
    }
    if let Some(v) = lookup("APP__LOG") {
        config.log_filter = v;
    }
}

pub fn normalize_server_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return PanelConfig::default().server_url;
    }
    if trimmed.contains("://") {
        return trimmed.to_string();
    }
    format!("http://{trimmed}")
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
