use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use signoff_core::config::{EngineConfig, ENV_KEYS};
use toml::Value;

pub fn run() -> String {
    let config_file_path = detect_config_path();
    let config = match EngineConfig::load(config_file_path.as_deref()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields = [
        ("default_step_deadline_secs", config.default_step_deadline_secs.to_string(), ENV_KEYS[0]),
        ("escalation_window_secs", config.escalation_window_secs.to_string(), ENV_KEYS[1]),
        ("sweep_interval_secs", config.sweep_interval_secs.to_string(), ENV_KEYS[2]),
        ("delegation_hop_limit", config.delegation_hop_limit.to_string(), ENV_KEYS[3]),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in fields {
        let source =
            field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(format!("- {key} = {value} (source: {source})"));
    }
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    for candidate in ["signoff.toml", "config/signoff.toml"] {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if doc.get(key).is_some() {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}
