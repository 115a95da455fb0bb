use anyhow::{Context, Result, anyhow, bail};
use dotenvy::dotenv;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;
use url::Url;

use crate::upload::UploadPolicy;

pub const KEYRING_SERVICE: &str = "docchat-api-token";
pub const KEYRING_USER: &str = "docchat";
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct ConfigFile {
    pub base_url: Option<Url>,
    pub export_dir: Option<PathBuf>,
    pub chunk_size: Option<u64>,
    pub max_file_size: Option<u64>,
    pub allowed_extensions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigEnv {
    docchat_base_url: Option<Url>,
    docchat_api_token: Option<String>,
    docchat_export_dir: Option<PathBuf>,
    docchat_chunk_size: Option<u64>,
    docchat_max_file_size: Option<u64>,
    docchat_allowed_extensions: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct Config {
    pub base_url: Url,
    pub api_token: Option<String>,
    pub export_dir: PathBuf,
    pub policy: UploadPolicy,
}

/// Lowercases `ext` and makes sure it starts with a dot.
fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

fn merge_config(
    base: ConfigFile,
    override_config: ConfigEnv,
    keyring_token: impl FnOnce() -> Option<String>,
) -> Result<Config> {
    let base_url = match override_config.docchat_base_url.or(base.base_url) {
        Some(url) => url,
        None => Url::parse(DEFAULT_BASE_URL)?,
    };

    let api_token = override_config.docchat_api_token.or_else(keyring_token);

    let export_dir = override_config
        .docchat_export_dir
        .or(base.export_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let defaults = UploadPolicy::default();
    let chunk_size = override_config
        .docchat_chunk_size
        .or(base.chunk_size)
        .unwrap_or(defaults.chunk_size);
    if chunk_size == 0 {
        bail!("chunk_size must be greater than zero");
    }

    let allowed_extensions = override_config
        .docchat_allowed_extensions
        .or(base.allowed_extensions)
        .map(|exts| {
            exts.iter()
                .filter(|ext| !ext.trim().is_empty())
                .map(|ext| normalize_extension(ext))
                .collect::<Vec<_>>()
        })
        .unwrap_or(defaults.allowed_extensions);
    if allowed_extensions.is_empty() {
        bail!("allowed_extensions must list at least one extension");
    }

    Ok(Config {
        base_url,
        api_token,
        export_dir,
        policy: UploadPolicy {
            allowed_extensions,
            max_file_size: override_config
                .docchat_max_file_size
                .or(base.max_file_size)
                .unwrap_or(defaults.max_file_size),
            chunk_size,
        },
    })
}

fn config_file_path() -> Result<PathBuf> {
    let project_dirs = directories::ProjectDirs::from("org", "docchat", "docchat")
        .ok_or(anyhow!("Unable to determine home directory"))?;
    Ok(project_dirs.config_dir().join("config.toml"))
}

fn read_keyring_token() -> Option<String> {
    match Entry::new(KEYRING_SERVICE, KEYRING_USER).and_then(|entry| entry.get_password()) {
        Ok(token) => Some(token),
        Err(e) => {
            debug!(error = %e, "no API token in OS keyring");
            None
        }
    }
}

pub fn read_config_file() -> Result<ConfigFile> {
    let config_file = config_file_path()?;
    match fs::read_to_string(&config_file) {
        Ok(config) => toml::from_str(&config)
            .with_context(|| format!("Failed to parse {}", config_file.display())),
        Err(_) => Ok(ConfigFile::default()),
    }
}

pub fn read_config() -> Result<Config> {
    let _ = dotenv();
    let env_config = envy::from_env::<ConfigEnv>().context("Invalid DOCCHAT_* environment variable")?;
    let file_config = read_config_file()?;

    merge_config(file_config, env_config, read_keyring_token)
}

pub fn write_config(config: &ConfigFile) -> Result<PathBuf> {
    let config_file = config_file_path()?;
    if let Some(parent) = config_file.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    fs::write(&config_file, toml::to_string_pretty(config)?)
        .with_context(|| format!("Failed to write {}", config_file.display()))?;
    Ok(config_file)
}

pub fn set_api_token_keyring(api_token: String) -> Result<()> {
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    entry.set_password(&api_token)?;
    println!("API token stored for use with docchat");
    Ok(())
}
