//! `dtpfix.json` configuration.
//!
//! ```json
//! {
//!   "endpoint": "https://dtp.example.org/api/v0/",
//!   "token_env": "DTP_TOKEN",
//!   "log_dir": "./logs",
//!   "element_type_map": "element_type_map.yaml",
//!   "vocabulary": { "hasElementType": "https://example.org/onto#hasElementType" }
//! }
//! ```
//!
//! Every key is optional in the file; the endpoint may also come from the
//! command line or `DTP_ENDPOINT`. Relative paths resolve against the
//! directory holding the config file.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use dtpfix_engine::{FixContext, DEFAULT_PAGE_SIZE};
use dtpfix_rules::{ElementTypeMap, Ontology, Vocabulary};

pub const DEFAULT_CONFIG_FILE: &str = "dtpfix.json";
pub const ENDPOINT_ENV: &str = "DTP_ENDPOINT";
pub const DEFAULT_TOKEN_ENV: &str = "DTP_TOKEN";

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DtpConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub element_type_map: Option<PathBuf>,
    /// Term name to full IRI, replacing the ontology's default for that term.
    #[serde(default)]
    pub vocabulary: BTreeMap<String, String>,
}

impl Default for DtpConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token_env: default_token_env(),
            log_dir: default_log_dir(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
            element_type_map: None,
            vocabulary: BTreeMap::new(),
        }
    }
}

impl DtpConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`. A missing file yields the defaults unless `required`.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if !path.exists() {
            if required {
                return Err(anyhow!("config file not found: {}", path.display()));
            }
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config = Self::from_json_str(&text)
            .with_context(|| format!("invalid config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(anyhow!("page_size must be at least 1"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be at least 1"));
        }
        if self.token_env.trim().is_empty() {
            return Err(anyhow!("token_env must name an environment variable"));
        }
        if let Some(endpoint) = &self.endpoint {
            parse_endpoint(endpoint)?;
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.log_dir.is_relative() {
            self.log_dir = base.join(&self.log_dir);
        }
        if let Some(map) = &self.element_type_map {
            if map.is_relative() {
                self.element_type_map = Some(base.join(map));
            }
        }
    }

    /// The endpoint from the command line, the config, then `DTP_ENDPOINT`.
    pub fn endpoint_url(&self, override_: Option<&str>) -> Result<Url> {
        let from_env = std::env::var(ENDPOINT_ENV).ok();
        let raw = override_
            .map(str::to_string)
            .or_else(|| self.endpoint.clone())
            .or(from_env)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                anyhow!("no DTP endpoint: pass --endpoint, set `endpoint` in the config or {ENDPOINT_ENV}")
            })?;
        parse_endpoint(&raw)
    }

    pub fn token(&self) -> Result<String> {
        let token = std::env::var(&self.token_env).unwrap_or_default();
        let token = token.trim();
        if token.is_empty() {
            return Err(anyhow!("missing {} (DTP bearer token)", self.token_env));
        }
        Ok(token.to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn vocabulary(&self, ontology: Ontology) -> Vocabulary {
        self.vocabulary
            .iter()
            .fold(Vocabulary::new(ontology), |vocab, (term, iri)| {
                vocab.with_override(term.clone(), iri.clone())
            })
    }

    pub fn fix_context(&self, ontology: Ontology) -> Result<FixContext> {
        let map = match &self.element_type_map {
            Some(path) => ElementTypeMap::load(path)?,
            None => ElementTypeMap::new(),
        };
        Ok(FixContext::new(ontology, &self.log_dir)
            .with_vocabulary(self.vocabulary(ontology))
            .with_element_type_map(map)
            .with_page_size(self.page_size))
    }
}

/// Parses an http(s) endpoint. The path always ends in `/` so that
/// relative joins stay below it.
pub fn parse_endpoint(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim()).map_err(|e| anyhow!("invalid endpoint `{raw}`: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow!("endpoint must be http or https, got `{}`", url.scheme()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
