use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::domain::definition::{QueryRewrite, ReportDefinition};
use crate::domain::diff_result::PROVENANCE_COLUMN;

/// Environment variables overriding file settings: `VFB_REPORTS__OUTPUT__DIR=…`.
pub const ENV_PREFIX: &str = "VFB_REPORTS";
pub const DEFAULT_CONFIG_FILE: &str = "vfb-reports.toml";

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub servers: Vec<ServerConfig>,
    /// Extra report definitions on top of the built-in catalog.
    #[serde(default)]
    pub reports: Vec<ReportDefinition>,
    #[serde(default)]
    pub diff: DiffConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub id_tables: IdTablesConfig,
    #[serde(default)]
    pub content: ContentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Short name used in file names and as the diff provenance tag.
    pub label: String,
    /// Base URL, e.g. `http://pdb.virtualflybrain.org`.
    pub endpoint: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Transaction endpoint path appended to `endpoint`.
    #[serde(default = "default_tx_path")]
    pub path: String,
    /// Report definitions to run here; every definition when absent.
    #[serde(default)]
    pub reports: Option<Vec<String>>,
    /// Rewrites applied to every query sent to this server.
    #[serde(default)]
    pub rewrites: Vec<QueryRewrite>,
}

fn default_tx_path() -> String {
    "/db/data/transaction/commit".to_string()
}

#[derive(Debug, Deserialize, Default)]
pub struct DiffConfig {
    /// Server every other server is compared against. First server when unset.
    #[serde(default)]
    pub baseline: Option<String>,
}

/// Per-site neuron ID mapping tables (`<site>_ID_table`).
#[derive(Debug, Deserialize, Default)]
pub struct IdTablesConfig {
    /// `short_form`s of the cross-reference sites, e.g. `catmaid_fafb`.
    #[serde(default)]
    pub sites: Vec<String>,
    /// Server the tables are read from. Diff baseline when unset.
    #[serde(default)]
    pub server: Option<String>,
}

/// Markdown content summary, one per listed server.
#[derive(Debug, Deserialize, Default)]
pub struct ContentConfig {
    #[serde(default)]
    pub servers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    pub dir: String,
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
}

fn default_formats() -> Vec<String> {
    vec!["tsv".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_timeout() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn new(label: &str, endpoint: &str) -> Self {
        Self {
            label: label.to_string(),
            endpoint: endpoint.to_string(),
            user: String::new(),
            password: String::new(),
            path: default_tx_path(),
            reports: None,
            rewrites: Vec::new(),
        }
    }

    pub fn with_rewrite(mut self, find: &str, replace: &str) -> Self {
        self.rewrites.push(QueryRewrite::new(find, replace));
        self
    }

    pub fn with_reports(mut self, reports: &[&str]) -> Self {
        self.reports = Some(reports.iter().map(|r| r.to_string()).collect());
        self
    }

    /// Full URL of the transactional commit endpoint.
    pub fn url(&self) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), self.path)
    }

    /// Whether `definition` should be generated for this server.
    pub fn runs(&self, definition: &ReportDefinition) -> bool {
        if let Some(pinned) = &definition.servers {
            return pinned.iter().any(|s| s == &self.label);
        }
        match &self.reports {
            Some(names) => names.iter().any(|n| n == &definition.name),
            None => true,
        }
    }
}

impl AppConfig {
    /// Load from a TOML file, then overlay `VFB_REPORTS__*` environment variables.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            bail!("Config file not found: {}", path);
        }
        let cfg: AppConfig = Config::builder()
            .add_source(File::new(path, FileFormat::Toml))
            .add_source(env_source())
            .build()
            .with_context(|| format!("Failed to read config file: {}", path))?
            .try_deserialize()
            .with_context(|| "Failed to parse config TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without touching the filesystem or environment.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: AppConfig = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .with_context(|| "Failed to read config TOML")?
            .try_deserialize()
            .with_context(|| "Failed to parse config TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// `./vfb-reports.toml` if present, else `<config dir>/vfb-reports/config.toml`.
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return local;
        }
        dirs::config_dir()
            .map(|d| d.join("vfb-reports").join("config.toml"))
            .unwrap_or(local)
    }

    /// Label of the server other servers are diffed against.
    pub fn baseline(&self) -> Option<&str> {
        self.diff
            .baseline
            .as_deref()
            .or_else(|| self.servers.first().map(|s| s.label.as_str()))
    }

    /// Label of the server the ID tables are read from.
    pub fn id_table_server(&self) -> Option<&str> {
        self.id_tables.server.as_deref().or_else(|| self.baseline())
    }

    fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            bail!("Config declares no servers");
        }
        let mut labels = BTreeSet::new();
        for server in &self.servers {
            if !labels.insert(server.label.as_str()) {
                bail!("Duplicate server label: {}", server.label);
            }
        }
        if let Some(baseline) = &self.diff.baseline {
            if !labels.contains(baseline.as_str()) {
                bail!("Diff baseline '{}' is not a configured server", baseline);
            }
        }
        if let Some(server) = &self.id_tables.server {
            if !labels.contains(server.as_str()) {
                bail!("ID table server '{}' is not a configured server", server);
            }
        }
        for site in &self.id_tables.sites {
            let valid = !site.is_empty()
                && site
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
            if !valid {
                bail!("Invalid ID table site '{}': use letters, digits, '_', '-' or '.'", site);
            }
        }
        for server in &self.content.servers {
            if !labels.contains(server.as_str()) {
                bail!("Content report server '{}' is not a configured server", server);
            }
        }
        let mut names = BTreeSet::new();
        for report in &self.reports {
            if !names.insert(report.name.as_str()) {
                bail!("Duplicate report definition: {}", report.name);
            }
            let claims_provenance = report.key_column.as_deref() == Some(PROVENANCE_COLUMN)
                || report.columns.iter().flatten().any(|c| c == PROVENANCE_COLUMN);
            if report.diff && claims_provenance {
                bail!(
                    "Report '{}' is diffed but returns a '{}' column, which diffs use for provenance; \
                     alias the column or set diff = false",
                    report.name,
                    PROVENANCE_COLUMN
                );
            }
        }
        Ok(())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
