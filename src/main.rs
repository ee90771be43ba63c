use anyhow::{Context, Result, bail};
use s3_folders::{
    BucketError, BucketService,
    progress::ProgressPercentage,
    store::local::LocalStore,
};
use serde::Serialize;
use serde_json::json;
use std::{path::Path, sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;

mod config;

use config::{AppConfig, Backend, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup (stderr, stdout carries results) ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // --- Parse config + command ---
    let (cfg, command, json) = config::AppConfig::from_env_and_args()?;
    tracing::debug!("Running {:?} with config: {:?}", command, redacted(&cfg));

    // --- Handle migration mode ---
    if let Command::Migrate = command {
        return migrate(&cfg, json).await;
    }

    let store = cfg.connect().await?;
    let service = BucketService::new(store, &cfg.bucket_config());

    match run(&service, command, json).await {
        Ok(()) => Ok(()),
        Err(err) => {
            if json {
                print_error(&err)?;
            }
            Err(err)
        }
    }
}

async fn run(service: &BucketService, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Check => {
            service.check_access().await?;
            emit(json, &json!({ "bucket": service.bucket(), "ok": true }), |_| {
                println!("bucket `{}` is reachable", service.bucket())
            })
        }
        Command::Stat { key } => {
            let meta = service.get_metadata(&key).await?;
            emit(json, &meta, |meta| {
                println!("key:           {key}");
                println!("last modified: {}", meta.last_modified);
                println!("size:          {} bytes", meta.content_length);
                println!("content type:  {}", meta.content_type);
                println!("etag:          {}", meta.etag);
            })
        }
        Command::Ls { prefix, probe } => {
            if probe {
                let name = prefix.unwrap_or_default();
                let probe = service.probe_folder(&name).await?;
                return emit(json, &probe, |probe| {
                    println!(
                        "exists: {}, sentinel: {}, has content: {}",
                        probe.exists(),
                        probe.has_sentinel,
                        probe.has_content()
                    )
                });
            }
            let objects = service.list_objects(prefix.as_deref()).await?;
            emit(json, &objects, |objects| {
                for obj in objects {
                    println!("{:>12}  {}  {}", obj.size, obj.last_modified, obj.key);
                }
                println!("{} object(s)", objects.len());
            })
        }
        Command::Put {
            path,
            name,
            overwrite,
        } => {
            let path = Path::new(&path);
            let total = tokio::fs::metadata(path)
                .await
                .map(|meta| meta.len())
                .unwrap_or_default();
            let label = name.clone().unwrap_or_else(|| path.display().to_string());
            let progress = Arc::new(ProgressPercentage::new(label, total));
            let receipt = service
                .upload_file(path, name.as_deref(), overwrite, progress)
                .await;
            eprintln!();
            let receipt = receipt?;
            emit(json, &receipt, |receipt| {
                println!(
                    "uploaded {} as `{}` ({} bytes{})",
                    receipt.source.display(),
                    receipt.key,
                    receipt.bytes_sent,
                    if receipt.replaced { ", replaced" } else { "" }
                )
            })
        }
        Command::Mkdir { name, replace } => {
            let created = service.create_folder(&name, replace).await?;
            emit(json, &json!({ "folder": name, "created": created }), |_| {
                if created {
                    println!("folder `{name}` created");
                } else {
                    println!("folder `{name}` already exists");
                }
            })
        }
        Command::Rm { key } => {
            service.delete(&key).await?;
            emit(json, &json!({ "deleted": key }), |_| println!("`{key}` deleted"))
        }
        Command::Empty { prefix } => {
            let count = service.delete_folder_contents(&prefix).await?;
            emit(json, &json!({ "folder": prefix, "deleted": count }), |_| {
                println!("deleted {count} object(s) from `{prefix}`")
            })
        }
        Command::Purge { prefix } => {
            let count = service.purge_folder(&prefix).await?;
            emit(json, &json!({ "folder": prefix, "deleted": count }), |_| {
                println!("purged `{prefix}` ({count} object(s))")
            })
        }
        Command::Mv { old, new } => {
            service.move_file(&old, &new).await?;
            emit(json, &json!({ "from": old, "to": new }), |_| {
                println!("moved `{old}` to `{new}`")
            })
        }
        Command::Mvdir { old, new } => {
            let report = service.move_folder(&old, &new).await?;
            emit(json, &report, |report| {
                println!(
                    "moved folder `{}` to `{}` ({} object(s))",
                    report.from,
                    report.to,
                    report.moved.len()
                )
            })
        }
        Command::Link { key, expires } => {
            let url = service
                .get_link(&key, Duration::from_secs(expires))
                .await?;
            emit(
                json,
                &json!({ "key": key, "url": url, "expires_in": expires }),
                |_| println!("{url}"),
            )
        }
        Command::Migrate => bail!("migrate runs before a store is opened"),
    }
}

async fn migrate(cfg: &AppConfig, json: bool) -> Result<()> {
    if cfg.backend != Backend::Local {
        bail!("migrate applies to the local backend only");
    }
    let db = cfg.open_database().await?;
    let statements = LocalStore::migrate(&db)
        .await
        .context("applying the local metadata schema")?;
    tracing::info!("Database migration complete.");
    emit(json, &json!({ "statements": statements }), |_| {
        println!("applied {statements} migration statement(s)")
    })
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

/// Machine-readable failure, including the report of an aborted folder move.
fn print_error(err: &anyhow::Error) -> Result<()> {
    let body = match err.downcast_ref::<BucketError>() {
        Some(BucketError::FolderMoveAborted { report, .. }) => json!({
            "error": err.to_string(),
            "kind": "Partial",
            "report": report,
        }),
        Some(bucket_err) => json!({ "error": err.to_string(), "kind": bucket_err.kind() }),
        None => json!({ "error": format!("{err:#}") }),
    };
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn redacted(cfg: &AppConfig) -> AppConfig {
    AppConfig {
        secret_key: cfg.secret_key.as_ref().map(|_| "<redacted>".into()),
        session_token: cfg.session_token.as_ref().map(|_| "<redacted>".into()),
        link_secret: "<redacted>".into(),
        ..cfg.clone()
    }
}
