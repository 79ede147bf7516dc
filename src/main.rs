//! bookpress entry point.

use bookpress::{
    config::{Cli, Command, Config},
    export::ExportKind,
    library::{BookStore, Deduplicator, fingerprint},
    server,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookpress=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Command::Init { force }) => cmd_init(force),
        Some(Command::List) => cmd_list(config),
        Some(Command::Export {
            id,
            format,
            mode,
            output,
        }) => cmd_export(config, &id, &format, mode.as_deref(), &output),
        Some(Command::CheckDuplicate { file }) => cmd_check_duplicate(&config, &file),
        Some(Command::Serve { bind, books_dir }) => cmd_serve(config, bind, books_dir).await,
        None => cmd_serve(config, None, None).await,
    }
}

/// Write a default config file.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("bookpress.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());
    println!("\nEdit bookpress.toml to point books_dir at your imported books.");
    println!("Then run: bookpress serve");

    Ok(())
}

/// Print stored books.
fn cmd_list(config: Config) -> anyhow::Result<()> {
    let state = server::AppState::new(config);
    let books = state.list_books();

    if books.is_empty() {
        println!("No books found in {}.", state.store().root().display());
        return Ok(());
    }

    println!("{:<32} {:<40} {:>8} AUTHOR", "ID", "TITLE", "CHAPTERS");
    println!("{}", "-".repeat(100));
    for book in books {
        println!(
            "{:<32} {:<40} {:>8} {}",
            book.id, book.title, book.chapters, book.author
        );
    }

    Ok(())
}

/// Export one book into a local directory.
fn cmd_export(
    config: Config,
    id: &str,
    format: &str,
    mode: Option<&str>,
    output: &Path,
) -> anyhow::Result<()> {
    let kind = ExportKind::parse(format, mode)?;

    let state = server::AppState::new(config);
    let result = state.exporter.export_kind(id, kind)?;
    let path = result.save_into(output)?;
    println!("Exported {} -> {}", id, path.display());

    Ok(())
}

/// Report whether a source file was already imported.
fn cmd_check_duplicate(config: &Config, file: &Path) -> anyhow::Result<()> {
    let reader = std::fs::File::open(file)?;
    let digest = fingerprint(reader, std::io::sink())?;
    let dedup = Deduplicator::new(BookStore::new(&config.library.books_dir));

    match dedup.find_duplicate(&digest) {
        Some(id) => println!("Duplicate of {} (sha256 {})", id, digest),
        None => println!("Not imported yet (sha256 {})", digest),
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(
    mut config: Config,
    bind: Option<SocketAddr>,
    books_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(addr) = bind {
        config.server.bind = addr;
    }
    if let Some(dir) = books_dir {
        config.library.books_dir = dir;
    }

    std::fs::create_dir_all(&config.library.books_dir)?;

    tracing::info!(
        bind = %config.server.bind,
        books_dir = %config.library.books_dir.display(),
        cache = config.cache.max_books,
        "Starting bookpress server"
    );

    let bind = config.server.bind;
    let state = server::AppState::new(config);
    let app = server::create_router(state);

    let listener = TcpListener::bind(bind).await?;
    tracing::info!(address = %bind, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
