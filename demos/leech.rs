//! Download a torrent from the command line.
//!
//! ```bash
//! cargo run --example leech -- path/to/file.torrent [save-dir]
//! ```

use std::sync::Arc;

use minnow::{Client, ClientConfig, FileStore, Metainfo};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minnow=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let torrent_path = args.next().ok_or("usage: leech <file.torrent> [save-dir]")?;
    let save_dir = args.next().unwrap_or_else(|| ".".to_string());

    let bytes = std::fs::read(&torrent_path)?;
    let metainfo = Metainfo::parse(&bytes)?;
    println!(
        "{}: {} bytes in {} pieces, announcing to {}",
        metainfo.name,
        metainfo.bytes_to_download(),
        metainfo.num_pieces(),
        metainfo.announce
    );

    let client = Client::new(ClientConfig::default())?;
    let store = Arc::new(FileStore::new(&save_dir, Arc::new(metainfo.clone())));
    let target = store.path().to_path_buf();

    let id = client.work_on(metainfo, store).await?;

    tokio::select! {
        result = client.wait_for(&id) => {
            result?;
            println!("download complete: {}", target.display());
        }
        _ = tokio::signal::ctrl_c() => {
            println!("interrupted, telling the tracker goodbye");
        }
    }

    client.close().await?;
    Ok(())
}
