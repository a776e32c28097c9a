use std::env;
use std::path::Path;
use std::process;

use tracing::info;
use tracing_subscriber::EnvFilter;

use torrent_forum::{actions, config, server, sqlite3db};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("torrent_forum=info,tower_http=info")
        }))
        .init();

    let config = match env::args().nth(1) {
        Some(path) => match config::Config::from_file(Path::new(&path)) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{}", err);
                process::exit(1);
            },
        },
        None => config::Config::default(),
    };

    let database = match sqlite3db::Sqlite3Database::from_path(config.db_path.clone()) {
        Ok(db) => db,
        Err(err) => {
            eprintln!("could not open database: {}", err);
            process::exit(1);
        },
    };

    info!(db = %config.db_path.to_string_lossy(), "database ready");

    let actions = actions::Actions::new(&config);

    server::serve(config, actions, database).await;
}
