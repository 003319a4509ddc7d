//! Identity service credentials
//!
//! Read once at startup from `~/.dcmcrawl/credentials.toml`:
//!
//! ```toml
//! [xnat]
//! url = "https://xnat.example.org"
//! username = "auditor"
//! password = "secret"
//!
//! [database]
//! host = "localhost"
//! port = 5432
//! dbname = "xnat"
//! user = "xnat"
//! password = "secret"
//! ```

use crate::error::CredentialsError;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory below the home directory holding dcmcrawl state
pub const CREDENTIALS_DIR: &str = ".dcmcrawl";

/// Credentials file name inside [`CREDENTIALS_DIR`]
pub const CREDENTIALS_FILE: &str = "credentials.toml";

/// XNAT REST endpoint and login
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct XnatCredentials {
    /// Base URL of the XNAT server
    pub url: String,
    /// Login name
    pub username: String,
    /// Login password
    pub password: String,
}

impl fmt::Debug for XnatCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XnatCredentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// XNAT PostgreSQL connection settings
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseCredentials {
    /// Database host
    pub host: String,
    /// Database port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
}

impl Default for DatabaseCredentials {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "xnat".to_string(),
            user: "xnat".to_string(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Contents of the credentials file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// `[xnat]` section
    pub xnat: Option<XnatCredentials>,
    /// `[database]` section
    pub database: Option<DatabaseCredentials>,
    #[serde(skip)]
    source: PathBuf,
}

impl Credentials {
    /// Default credentials file location (`~/.dcmcrawl/credentials.toml`)
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, CredentialsError> {
        let home = dirs::home_dir().ok_or(CredentialsError::NoHomeDir)?;
        Ok(home.join(CREDENTIALS_DIR).join(CREDENTIALS_FILE))
    }

    /// Load and parse a credentials file
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, or not valid TOML.
    pub fn load(path: &Path) -> Result<Self, CredentialsError> {
        if !path.exists() {
            return Err(CredentialsError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| CredentialsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse credentials from TOML text; `source` is used in error messages
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or misses required keys.
    pub fn parse(content: &str, source: &Path) -> Result<Self, CredentialsError> {
        let mut credentials: Self =
            toml::from_str(content).map_err(|source_err| CredentialsError::Parse {
                path: source.to_path_buf(),
                source: source_err,
            })?;
        credentials.source = source.to_path_buf();
        Ok(credentials)
    }

    /// The `[xnat]` section, required by the REST identity backend
    ///
    /// # Errors
    ///
    /// Returns an error if the section is missing.
    pub fn require_xnat(&self) -> Result<&XnatCredentials, CredentialsError> {
        self.xnat
            .as_ref()
            .ok_or_else(|| CredentialsError::MissingSection {
                path: self.source.clone(),
                section: "xnat",
            })
    }

    /// The `[database]` section, required by the PostgreSQL identity backend
    ///
    /// # Errors
    ///
    /// Returns an error if the section is missing.
    pub fn require_database(&self) -> Result<&DatabaseCredentials, CredentialsError> {
        self.database
            .as_ref()
            .ok_or_else(|| CredentialsError::MissingSection {
                path: self.source.clone(),
                section: "database",
            })
    }
}
