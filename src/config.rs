use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Book export server: Markdown, chapter archives and PDF from parsed books.
#[derive(Parser, Debug, Clone)]
#[command(name = "bookpress")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "BOOKPRESS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Books directory (overrides the config file).
        #[arg(short = 'd', long)]
        books_dir: Option<PathBuf>,
    },

    /// List stored books.
    List,

    /// Export one book to a local directory.
    Export {
        /// Book identifier (folder name, e.g. `my_book_data`).
        id: String,

        /// Output format: markdown or pdf.
        #[arg(short, long, default_value = "markdown")]
        format: String,

        /// Markdown mode: single or chapters.
        #[arg(short, long)]
        mode: Option<String>,

        /// Directory to write the artifact into.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Check whether a source file was already imported.
    CheckDuplicate {
        /// Source file to fingerprint.
        file: PathBuf,
    },

    /// Create a default config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Book storage configuration.
    #[serde(default)]
    pub library: LibraryConfig,

    /// Book cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        8123,
    )
}

/// Book storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Directory holding one `<name>_data` folder per book.
    #[serde(default = "default_books_dir")]
    pub books_dir: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            books_dir: default_books_dir(),
        }
    }
}

fn default_books_dir() -> PathBuf {
    PathBuf::from("books")
}

/// Book cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of parsed books kept in memory.
    #[serde(default = "default_max_books")]
    pub max_books: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_books: default_max_books(),
        }
    }
}

fn default_max_books() -> usize {
    crate::library::cache::DEFAULT_CAPACITY
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("bookpress.toml"),
            PathBuf::from("config.toml"),
            dirs::config_dir()
                .map(|p| p.join("bookpress").join("config.toml"))
                .unwrap_or_default(),
        ];

        candidates.into_iter().find(|p| p.is_file())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# bookpress configuration

[server]
bind = "127.0.0.1:8123"

[library]
# One <name>_data folder per imported book
books_dir = "books"

[cache]
# Parsed books kept in memory
max_books = 10
"#
        .to_string()
    }
}
