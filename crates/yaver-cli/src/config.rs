//! Configuration file management for yaver.
//!
//! Provides a TOML-based config file at `~/.config/yaver/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub forge: ForgeSection,
    pub generator: GeneratorSection,
    #[serde(default)]
    pub engine: EngineSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForgeSection {
    pub base_url: String,
    pub token: String,
    pub owner: String,
    pub repo: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeneratorSection {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EngineSection {
    pub max_iterations: u64,
    pub max_task_depth: u64,
    pub default_base_branch: String,
}

impl Default for EngineSection {
    fn default() -> Self {
        EngineSection { max_iterations: 50, max_task_depth: 3, default_base_branch: "main".to_string() }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the yaver config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/yaver` or `~/.config/yaver`. We
/// intentionally ignore the platform-specific `dirs::config_dir()` (which
/// returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("yaver");
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".config").join("yaver")
}

/// Return the path to the yaver config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path).with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents).with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms).with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// CLI-supplied overrides, one field per resolvable setting.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub forge_base_url: Option<String>,
    pub forge_token: Option<String>,
    pub max_iterations: Option<u64>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct YaverConfig {
    pub forge: ForgeSection,
    pub generator: GeneratorSection,
    pub engine: EngineSection,
}

impl YaverConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Forge base URL: `overrides.forge_base_url` > `YAVER_FORGE_URL` env > `config_file.forge.base_url` > error
    /// - Forge token: `overrides.forge_token` > `YAVER_FORGE_TOKEN` env > `config_file.forge.token` > error
    /// - Max iterations: `overrides.max_iterations` > `YAVER_MAX_ITERATIONS` env > `config_file.engine.max_iterations` > default (50)
    pub fn resolve(overrides: &CliOverrides) -> Result<Self> {
        let file_config = load_config().ok();

        let forge_base_url = if let Some(url) = &overrides.forge_base_url {
            url.clone()
        } else if let Ok(url) = std::env::var("YAVER_FORGE_URL") {
            url
        } else if let Some(cfg) = &file_config {
            cfg.forge.base_url.clone()
        } else {
            bail!("forge base URL not found; set YAVER_FORGE_URL or run `yaver init`");
        };

        let forge_token = if let Some(token) = &overrides.forge_token {
            token.clone()
        } else if let Ok(token) = std::env::var("YAVER_FORGE_TOKEN") {
            token
        } else if let Some(cfg) = &file_config {
            cfg.forge.token.clone()
        } else {
            bail!("forge token not found; set YAVER_FORGE_TOKEN or run `yaver init`");
        };

        let (owner, repo) = if let Some(cfg) = &file_config {
            (cfg.forge.owner.clone(), cfg.forge.repo.clone())
        } else {
            bail!("forge owner/repo not found; run `yaver init` to create a config file");
        };

        let generator = if let Some(cfg) = &file_config {
            GeneratorSection {
                base_url: std::env::var("YAVER_GENERATOR_URL").unwrap_or_else(|_| cfg.generator.base_url.clone()),
                api_key: std::env::var("YAVER_GENERATOR_API_KEY").unwrap_or_else(|_| cfg.generator.api_key.clone()),
                model: cfg.generator.model.clone(),
            }
        } else {
            bail!("generator configuration not found; run `yaver init` to create a config file");
        };

        let max_iterations = overrides
            .max_iterations
            .or_else(|| std::env::var("YAVER_MAX_ITERATIONS").ok().and_then(|v| v.parse().ok()))
            .or_else(|| file_config.as_ref().map(|c| c.engine.max_iterations))
            .unwrap_or(50);

        let engine = EngineSection {
            max_iterations,
            max_task_depth: file_config.as_ref().map(|c| c.engine.max_task_depth).unwrap_or(3),
            default_base_branch: file_config
                .as_ref()
                .map(|c| c.engine.default_base_branch.clone())
                .unwrap_or_else(|| "main".to_string()),
        };

        Ok(YaverConfig {
            forge: ForgeSection { base_url: forge_base_url, token: forge_token, owner, repo },
            generator,
            engine,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
