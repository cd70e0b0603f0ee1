use serde::{Deserialize, Serialize};

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use log::{debug, error};

use crate::categories::Category;
use crate::error::ConfigurationError;

pub const DEFAULT_SETTINGS_PATH: &str = "src/resources/settings.yaml";

// Main configuration struct
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub imap: Option<ImapConfig>,
    pub categorizer: CategorizerSettings,
    pub monitor: MonitorSettings,
    pub server: ServerConfig,
    pub categories: Vec<Category>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ImapConfig {
    pub server: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub username: String,
    /// Folder to watch; shared mailboxes are usually exposed as e.g. `Shared/helpdesk/INBOX`.
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    #[serde(default = "default_password_file")]
    pub password_file: PathBuf,
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
}

fn default_imap_port() -> u16 {
    993
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

fn default_password_file() -> PathBuf {
    PathBuf::from(".encrypted_password")
}

fn default_key_file() -> PathBuf {
    PathBuf::from(".encryption_key")
}

/// Keyword lists, patterns and thresholds the categorizer works from.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CategorizerSettings {
    pub primary_keywords: Vec<String>,
    pub secondary_keywords: Vec<String>,
    pub excluded_keywords: Vec<String>,
    pub excluded_senders: Vec<String>,
    pub regex_patterns: Vec<String>,
    pub advanced_phrases: Vec<String>,
    pub fuzzy_threshold: u8,
    pub advanced_fuzzy_threshold: u8,
    pub important_attachment_keywords: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for CategorizerSettings {
    fn default() -> Self {
        Self {
            primary_keywords: strings(&[
                "change", "update", "migrate", "migration", "modify", "mobile", "number", "phone",
                "unlock", "reset", "enroll", "new", "locked",
            ]),
            secondary_keywords: strings(&["ddt"]),
            excluded_keywords: strings(&["UCUBE"]),
            excluded_senders: strings(&["LE-HELPDESK.PH"]),
            regex_patterns: strings(&[
                r"\bchange.*number\b",
                r"\bupdate.*number\b",
                r"\bmodify.*mobile\b",
                r"\breset.*password\b",
                r"\bunlock.*user\b",
                r"\brequest.*change.*number\b",
            ]),
            advanced_phrases: strings(&[
                "change mobile number",
                "update contact number",
                "reset user password",
                "unlock user",
                "migrate phone",
                "modify phone number",
            ]),
            fuzzy_threshold: 90,
            advanced_fuzzy_threshold: 75,
            important_attachment_keywords: strings(&[
                "change", "update", "ddt", "dtt", "reset", "unlock", "modify", "migrate",
            ]),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    pub poll_interval_seconds: u64,
    /// Number of audit records kept for the control panel.
    pub audit_capacity: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 3,
            audit_capacity: 500,
        }
    }
}

// Control panel server configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(PathBuf::from("mail_categorizer.log")),
        }
    }
}

impl Config {
    /// Checks what serde cannot: intervals, category names and duplicates.
    /// Pattern lists are checked when the `PatternLibrary` is built.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.monitor.poll_interval_seconds == 0 {
            return Err(ConfigurationError::ZeroPollInterval);
        }

        let mut seen = HashSet::new();
        for category in &self.categories {
            if !is_keyword_atom(&category.name) {
                return Err(ConfigurationError::InvalidCategoryName(category.name.clone()));
            }
            if !seen.insert(category.name.as_str()) {
                return Err(ConfigurationError::DuplicateCategory(category.name.clone()));
            }
        }
        Ok(())
    }
}

/// Categories are stored as IMAP keywords, so they must be plain atoms.
pub fn is_keyword_atom(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('\\')
        && name
            .chars()
            .all(|c| c.is_ascii_graphic() && !matches!(c, '(' | ')' | '{' | '%' | '*' | '"' | ']'))
}

pub fn load_settings(path: &Path) -> Result<Config, ConfigurationError> {
    let file = File::open(path).map_err(|source| {
        error!("Cannot find settings at {}", path.display());
        ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let reader = BufReader::new(file);

    // Parse the YAML file into the Config struct
    let config: Config = serde_yaml::from_reader(reader).map_err(|source| ConfigurationError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    config.validate()?;
    debug!("Loaded settings from {}", path.display());
    Ok(config)
}
