use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use uplink::config::Config;
use uplink::{StaticTokenSource, UploadEvent, UploadManager, VideoSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::load(Path::new("config.toml")).context("Failed to load config.toml")?;

    let handle = UploadManager::builder()
        .endpoint(config.endpoint.as_str())
        .token_source(Arc::new(StaticTokenSource::new(config.token.as_str())))
        .build()?;

    let settings = config.title.clone().map(|title| VideoSettings {
        title: Some(title),
        ..Default::default()
    });

    let id = handle
        .manager
        .start_upload(PathBuf::from(&config.file_path), settings)
        .await?;
    let mut events = handle.manager.subscribe_descriptor(id);

    loop {
        match events.recv().await {
            Ok(UploadEvent::Progress { progress, .. }) => {
                println!(
                    "Uploaded {}/{} bytes ({:.0}%)",
                    progress.bytes_uploaded, progress.total_bytes, progress.percentage
                );
            }
            Ok(UploadEvent::Completed { video_uri, .. }) => {
                println!("Upload complete: {}", video_uri);
                break;
            }
            Ok(UploadEvent::Failed { failure, .. }) => {
                println!("Upload failed during {:?}: {}", failure.step, failure.message);
                break;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => anyhow::bail!("Event stream closed"),
        }
    }

    handle.shutdown().await?;

    Ok(())
}
