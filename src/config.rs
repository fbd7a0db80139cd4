use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::{CompanyIdentity, Language, PaymentInstructions};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub numbering: NumberingConfig,
    /// Static issuer identity painted in the header of every invoice.
    pub issuer: CompanyIdentity,
    /// Bank instructions used when a request carries none.
    pub payment: PaymentInstructions,
    pub fonts: FontConfig,
    pub rates: RatesConfig,
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NumberingConfig {
    pub prefix: String,
    pub pad_width: usize,
}

/// Optional TrueType files; the PDF standard Helvetica family is used when unset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    pub regular: Option<PathBuf>,
    pub bold: Option<PathBuf>,
    pub italic: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RatesConfig {
    pub endpoint: String,
    pub ttl_secs: u64,
    /// Upper bound on one rate request, connect included.
    pub timeout_secs: u64,
    /// Currency quotes are priced in when they do not say otherwise.
    pub base_currency: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub language: Language,
    pub currency: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("zenith.db"),
        }
    }
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            prefix: "INV-".to_string(),
            pad_width: 2,
        }
    }
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.exchangerate.host/latest".to_string(),
            ttl_secs: 3600,
            timeout_secs: 10,
            base_currency: "BRL".to_string(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            language: Language::Pt,
            currency: "USD".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            numbering: NumberingConfig::default(),
            issuer: CompanyIdentity {
                name: "Zenith Pay".to_string(),
                ..CompanyIdentity::default()
            },
            payment: PaymentInstructions::default(),
            fonts: FontConfig::default(),
            rates: RatesConfig::default(),
            defaults: DefaultsConfig::default(),
        }
    }
}

impl Config {
    /// Loads `config/default.toml` (or `explicit`, or `$ZENITH_CONFIG`) and layers
    /// `ZENITH__SECTION__KEY` environment variables on top.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        let from_env = std::env::var("ZENITH_CONFIG").ok().filter(|s| !s.trim().is_empty());
        match (explicit, from_env) {
            (Some(path), _) => {
                builder = builder.add_source(config::File::from(path.to_path_buf()));
            }
            (None, Some(path)) => {
                builder = builder.add_source(config::File::with_name(&path));
            }
            (None, None) => {
                builder = builder.add_source(config::File::with_name("config/default").required(false));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ZENITH")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        tracing::debug!(db = %config.database.path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}
