//! gcs-redirector: command-line access to a Cloud Storage emulator.

use futures::TryStreamExt;
use std::io::Write;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use gcs_redirector::{Command, Config, ProvisionPlan, StorageClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::load();

    // Set up logging
    let log_level = if config.debug {
        Level::DEBUG
    } else if config.silent {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let client = StorageClient::new(config.endpoint)?;
    run(&client, config.command).await
}

async fn run(
    client: &StorageClient,
    command: Command,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut out = std::io::stdout().lock();

    match command {
        Command::Walk => {
            for bucket in client.list_buckets().await? {
                writeln!(out, "Bucket: {}\n", bucket.name)?;

                let mut objects = Box::pin(client.objects(&bucket.name, None));
                while let Some(object) = objects.try_next().await? {
                    writeln!(out, "Blob: {}", object.name)?;
                    let data = client.download_object(&bucket.name, &object.name).await?;
                    writeln!(out, "{}\n", String::from_utf8_lossy(&data))?;
                }
            }
        }
        Command::Buckets => {
            for bucket in client.list_buckets().await? {
                writeln!(out, "{}", bucket.name)?;
            }
        }
        Command::Objects { bucket, prefix } => {
            let mut objects = Box::pin(client.objects(&bucket, prefix.as_deref()));
            while let Some(object) = objects.try_next().await? {
                writeln!(out, "{}\t{}", object.size, object.name)?;
            }
        }
        Command::Cat { bucket, object, verify } => {
            let data = if verify {
                client.download_verified(&bucket, &object).await?
            } else {
                client.download_object(&bucket, &object).await?
            };
            out.write_all(&data)?;
        }
        Command::Url { bucket, object } => {
            writeln!(out, "{}", client.public_url(&bucket, &object))?;
        }
        Command::Upload {
            bucket,
            object,
            file,
            content_type,
            resumable,
        } => {
            let uploaded = client
                .upload_file(&bucket, &object, &content_type, &file, resumable)
                .await?;
            writeln!(out, "{}", client.public_url(&bucket, &uploaded.name))?;
        }
        Command::Delete { bucket, object } => {
            client.delete_object(&bucket, &object).await?;
        }
        Command::SetExternalUrl { url } => {
            client.set_external_url(&url).await?;
        }
        Command::Provision => {
            let outputs = ProvisionPlan::for_project(client.project())
                .apply(client)
                .await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&outputs)?)?;
        }
    }

    out.flush()?;
    Ok(())
}
