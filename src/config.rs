use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::util::ForumErr;

fn default_addr() -> SocketAddr {
    "127.0.0.1:8711".parse().unwrap()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./torrent-forum.db")
}

fn default_fetch_depth() -> usize {
    50
}

fn default_desktop_depth() -> usize {
    10
}

fn default_mobile_depth() -> usize {
    5
}

fn default_page_limit() -> u64 {
    20
}

fn default_max_page_limit() -> u64 {
    100
}

fn default_thread_limit_days() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeConfig {
    /// Server-side recursion ceiling; a hard safety bound, much larger
    /// than the display caps and never unified with them.
    #[serde(default = "default_fetch_depth")]
    pub max_fetch_depth: usize,
    #[serde(default = "default_desktop_depth")]
    pub desktop_display_depth: usize,
    #[serde(default = "default_mobile_depth")]
    pub mobile_display_depth: usize,
    #[serde(default = "default_page_limit")]
    pub page_limit: u64,
    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            max_fetch_depth:       default_fetch_depth(),
            desktop_display_depth: default_desktop_depth(),
            mobile_display_depth:  default_mobile_depth(),
            page_limit:            default_page_limit(),
            max_page_limit:        default_max_page_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BadgeConfig {
    /// Endpoint of the badge-check collaborator. When absent, awards
    /// simply skip notification.
    pub url:   Option<String>,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_addr")]
    pub addr:    SocketAddr,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Days a user must wait between threads in application categories.
    #[serde(default = "default_thread_limit_days")]
    pub thread_limit_days: u64,

    /// Words censored from bodies before storage.
    #[serde(default)]
    pub banned_words: Vec<String>,

    #[serde(default)]
    pub tree: TreeConfig,

    #[serde(default)]
    pub badges: BadgeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            addr:              default_addr(),
            db_path:           default_db_path(),
            thread_limit_days: default_thread_limit_days(),
            banned_words:      vec![],
            tree:              TreeConfig::default(),
            badges:            BadgeConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Config, ForumErr> {
        let text = fs::read_to_string(path).map_err(|err| {
            ForumErr::Internal(format!(
                "could not read config file {}: {}",
                path.to_string_lossy(),
                err
            ))
        })?;

        toml::from_str(&text)
            .map_err(|err| ForumErr::Internal(format!("could not parse config: {}", err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let config: Config = toml::from_str(
            r#"
            addr = "0.0.0.0:9000"
            banned_words = ["creeper"]

            [tree]
            max_fetch_depth = 40
        "#,
        )
        .unwrap();

        assert_eq!(config.addr.port(), 9000);
        assert_eq!(config.tree.max_fetch_depth, 40);
        assert_eq!(config.tree.desktop_display_depth, 10);
        assert_eq!(config.banned_words, vec!["creeper".to_string()]);
        assert!(config.badges.url.is_none());
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.tree.max_fetch_depth, 50);
        assert_eq!(config.tree.mobile_display_depth, 5);
        assert_eq!(config.thread_limit_days, 30);
    }
}
