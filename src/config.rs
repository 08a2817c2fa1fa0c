//! Run configuration, read from the command line, the environment, or a `.env` file.

use crate::fetch::DownloaderConfig;
use crate::parse::ParserConfig;
use crate::utils::is_fingerprint;
use clap::Parser;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Directory authorities asked for missing descriptors, in order.
pub const DEFAULT_AUTHORITIES: &str = "86.59.21.38,194.109.206.212,80.190.246.100:8180";

/// Countries whose directory request counts are kept.
pub const DEFAULT_COUNTRIES: &str =
    "au,bh,br,ca,cn,cu,de,et,fr,gb,ir,it,jp,kr,mm,pl,ru,sa,se,sy,tn,tm,us,uz,vn,ye";

/// Directories whose request statistics are kept.
pub const DEFAULT_DIRECTORIES: &str =
    "8522EB98C91496E80EC238E732594D1509158E77,9695DFC35FFEB861329B9F1AB04C46397020CE31";

/// Command-line arguments for importing and downloading relay descriptors.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Config {
    /// Comma-separated directory authorities as host[:port] (e.g., "86.59.21.38,80.190.246.100:8180").
    #[clap(long, env = "DIRECTORY_AUTHORITIES", default_value = DEFAULT_AUTHORITIES, value_delimiter = ',')]
    pub authorities: Vec<String>,

    /// Comma-separated two-letter codes of countries whose directory requests are counted.
    #[clap(long, env = "DIRREQ_COUNTRIES", default_value = DEFAULT_COUNTRIES, value_delimiter = ',')]
    pub countries: Vec<String>,

    /// Comma-separated fingerprints of directories whose request statistics are kept.
    #[clap(long, env = "DIRREQ_DIRECTORIES", default_value = DEFAULT_DIRECTORIES, value_delimiter = ',')]
    pub directories: Vec<String>,

    /// Download the current consensus
    #[clap(long, env = "DOWNLOAD_CURRENT_CONSENSUS", action)]
    pub download_current_consensus: bool,

    /// Download the current votes
    #[clap(long, env = "DOWNLOAD_CURRENT_VOTES", action)]
    pub download_current_votes: bool,

    /// Download all server descriptors referenced by consensuses and votes
    #[clap(long, env = "DOWNLOAD_ALL_SERVER_DESCRIPTORS", action)]
    pub download_all_server_descriptors: bool,

    /// Download all extra-info descriptors referenced by server descriptors
    #[clap(long, env = "DOWNLOAD_ALL_EXTRA_INFOS", action)]
    pub download_all_extra_infos: bool,

    /// Comma-separated Tor data directories whose cached descriptors are imported.
    #[clap(long, env = "CACHE_DIRS", value_delimiter = ',')]
    pub cache_dirs: Vec<PathBuf>,

    /// Directory archive to import descriptors from.
    #[clap(long, env = "IMPORT_ARCHIVE")]
    pub import_archive: Option<PathBuf>,

    /// Directory to write the descriptor archive to.
    #[clap(long, env = "ARCHIVE_DIR")]
    pub archive_dir: Option<PathBuf>,

    /// PostgreSQL connection string (e.g., "host=localhost user=postgres password=your_password dbname=tordir").
    #[clap(long, env = "DB_PARAMS")]
    pub db_params: Option<String>,

    /// Clear any existing content in the tables before exporting
    #[clap(long, action)]
    pub clear: bool,

    /// File that remembers wanted and received descriptors between runs.
    #[clap(long, env = "LEDGER_FILE", default_value = "stats/relay-descriptor-ledger.json")]
    pub ledger_file: PathBuf,

    /// Seconds to wait for a directory authority to accept a connection.
    #[clap(long, env = "REQUEST_TIMEOUT", default_value_t = 60)]
    pub timeout_secs: u64,
}

/// A configuration problem found by [`Config::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("'{0}' is not a two-letter country code")]
    InvalidCountry(String),
    #[error("'{0}' is not a 40-character hex fingerprint")]
    InvalidDirectory(String),
    #[error("'{0}' is not a valid directory authority address")]
    InvalidAuthority(String),
    #[error("downloads are enabled but no directory authority is configured")]
    NoAuthorities,
    #[error("request timeout must be positive")]
    ZeroTimeout,
}

/// A configuration whose values have been checked and normalized.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub parser: ParserConfig,
    /// `None` if no download was requested.
    pub downloader: Option<DownloaderConfig>,
    pub cache_dirs: Vec<PathBuf>,
    pub import_archive: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
    pub db_params: Option<String>,
    pub clear: bool,
}

impl Config {
    fn downloads_enabled(&self) -> bool {
        self.download_current_consensus
            || self.download_current_votes
            || self.download_all_server_descriptors
            || self.download_all_extra_infos
    }

    /// Checks and normalizes the configuration.
    ///
    /// Country codes are lower-cased and fingerprints upper-cased. Empty list items are
    /// ignored.
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let countries = normalized(&self.countries, str::to_lowercase);
        if let Some(bad) = countries
            .iter()
            .find(|c| c.len() != 2 || !c.chars().all(|ch| ch.is_ascii_alphabetic()))
        {
            return Err(ConfigError::InvalidCountry(bad.clone()));
        }

        let directories = normalized(&self.directories, str::to_uppercase);
        if let Some(bad) = directories.iter().find(|d| !is_fingerprint(d)) {
            return Err(ConfigError::InvalidDirectory(bad.clone()));
        }

        let downloader = if self.downloads_enabled() {
            let authorities: Vec<String> = self
                .authorities
                .iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect();
            if authorities.is_empty() {
                return Err(ConfigError::NoAuthorities);
            }
            if let Some(bad) = authorities.iter().find(|a| !is_authority(a)) {
                return Err(ConfigError::InvalidAuthority(bad.clone()));
            }
            if self.timeout_secs == 0 {
                return Err(ConfigError::ZeroTimeout);
            }
            Some(DownloaderConfig {
                authorities,
                download_current_consensus: self.download_current_consensus,
                download_current_votes: self.download_current_votes,
                download_all_server_descriptors: self.download_all_server_descriptors,
                download_all_extra_infos: self.download_all_extra_infos,
                relays_of_interest: directories.clone(),
                ledger_path: self.ledger_file.clone(),
                timeout: Duration::from_secs(self.timeout_secs),
            })
        } else {
            None
        };

        Ok(ValidatedConfig {
            parser: ParserConfig {
                countries,
                directories,
            },
            downloader,
            cache_dirs: self.cache_dirs,
            import_archive: self.import_archive,
            archive_dir: self.archive_dir,
            db_params: self.db_params.filter(|p| !p.trim().is_empty()),
            clear: self.clear,
        })
    }
}

fn normalized(items: &[String], normalize: fn(&str) -> String) -> BTreeSet<String> {
    items
        .iter()
        .map(|item| normalize(item.trim()))
        .filter(|item| !item.is_empty())
        .collect()
}

/// Accepts `host` or `host:port`, where the whole forms a valid HTTP URL.
fn is_authority(value: &str) -> bool {
    !value.contains('/')
        && reqwest::Url::parse(&format!("http://{}/", value))
            .map(|url| url.host_str().is_some())
            .unwrap_or(false)
}
