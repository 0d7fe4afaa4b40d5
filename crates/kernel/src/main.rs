//! Media field kernel CLI.
//!
//! Runs the temp file purge scheduler and exposes the file handling
//! services as one-shot commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use mediafield_kernel::file::shard;
use mediafield_kernel::media_field::{FieldEditor, MediaFieldSettings};
use mediafield_kernel::permissions::{
    ALL_PERMISSIONS, AuthorizationRequest, MANAGE_MEDIA_FIELDS_FOLDER, User,
};
use mediafield_kernel::settings::MediaSiteSettings;
use mediafield_kernel::{AppState, Config};

#[derive(Parser)]
#[command(name = "mediafield")]
#[command(about = "Media field file handling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the temp file purge on a schedule until interrupted
    Serve,
    /// Run one temp file purge pass
    Purge,
    /// Stage a local file in the temp folder as a limited editor upload
    Upload {
        /// File to upload
        file: PathBuf,
    },
    /// Apply a limited editor submission to a content item
    Reconcile {
        /// 26-character content item id
        #[arg(long)]
        content_item_id: String,
        /// JSON array of file descriptors
        #[arg(long)]
        items: String,
        /// Field display name used in messages
        #[arg(long, default_value = "Media")]
        name: String,
        /// Editor mode (limited or full)
        #[arg(long, default_value = "limited")]
        editor: String,
        /// Require at least one media
        #[arg(long)]
        required: bool,
        /// Allow more than one media
        #[arg(long)]
        multiple: bool,
    },
    /// Print the shard path for a content item id
    Shard {
        /// 26-character content item id
        id: String,
    },
    /// Inspect or change media site settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Check whether a user may access a path under the media fields guard
    CheckPath {
        /// Path relative to the file store root
        path: String,
        /// Permissions held by the checking user
        #[arg(long = "grant")]
        grants: Vec<String>,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Print the media settings
    Show,
    /// Set the age in minutes after which temp files are purged (0 disables)
    SetPurgeAge {
        minutes: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();

    let config = Config::from_env().context("failed to load configuration")?;
    let state = AppState::new(&config);

    match cli.command {
        Commands::Serve => serve(&config, &state).await,
        Commands::Purge => {
            let report = state.purge().purge().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Upload { file } => upload(&state, &file).await,
        Commands::Reconcile {
            content_item_id,
            items,
            name,
            editor,
            required,
            multiple,
        } => {
            let settings = MediaFieldSettings {
                display_name: name,
                editor: editor.parse::<FieldEditor>()?,
                required,
                multiple,
            };
            reconcile(&state, &settings, &items, &content_item_id).await
        }
        Commands::Shard { id } => {
            println!("{}", shard(&id)?);
            Ok(())
        }
        Commands::Settings { command } => settings(&state, command).await,
        Commands::CheckPath { path, grants } => check_path(&state, &path, &grants),
    }
}

async fn serve(config: &Config, state: &AppState) -> Result<()> {
    state
        .layout()
        .ensure_exists(state.store().as_ref())
        .await
        .context("failed to create media fields folders")?;

    info!(
        root = %config.media_root.display(),
        folder = %state.layout().root(),
        interval_secs = config.purge_interval.as_secs(),
        "starting temp file purge scheduler"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = state.cron().clone().spawn(config.purge_interval, shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    shutdown_tx.send(true).ok();
    handle.await.context("cron scheduler panicked")?;
    Ok(())
}

async fn upload(state: &AppState, file: &Path) -> Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
        bail!("{} has no usable file name", file.display());
    };

    let path = state.limited_editor().stage_upload(name, &data).await?;
    println!("{path}");
    Ok(())
}

async fn reconcile(
    state: &AppState,
    settings: &MediaFieldSettings,
    items: &str,
    content_item_id: &str,
) -> Result<()> {
    let outcome = state
        .media_fields()
        .update(settings, items, content_item_id)
        .await
        .context("submitted items are not a valid JSON array of file descriptors")?;

    let report = serde_json::json!({
        "items": outcome.items,
        "paths": outcome.field.paths,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    for error in &outcome.errors {
        eprintln!("{error}");
    }
    if !outcome.is_valid() {
        bail!("{} validation error(s)", outcome.errors.len());
    }
    Ok(())
}

async fn settings(state: &AppState, command: SettingsCommands) -> Result<()> {
    match command {
        SettingsCommands::Show => {
            let current = MediaSiteSettings::load(state.settings().as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&current)?);
        }
        SettingsCommands::SetPurgeAge { minutes } => {
            // The local operator acts as site administrator.
            let operator = User::admin(Uuid::nil());
            let updated = MediaSiteSettings {
                limited_editor_delete_temp_files_older_than: minutes,
            };
            MediaSiteSettings::update(
                state.settings().as_ref(),
                state.permissions(),
                &operator,
                updated,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
    }
    Ok(())
}

fn check_path(state: &AppState, path: &str, grants: &[String]) -> Result<()> {
    let user = User::new(Uuid::new_v4());
    for grant in grants {
        if !ALL_PERMISSIONS.contains(&grant.as_str()) {
            bail!("unknown permission '{grant}'");
        }
        state.permissions().grant(user.id, grant);
    }

    let allowed = state.policy().authorize(&AuthorizationRequest {
        user: &user,
        permission: MANAGE_MEDIA_FIELDS_FOLDER,
        resource: Some(path),
    });
    state.permissions().invalidate_user(user.id);

    println!("{}", if allowed { "allowed" } else { "denied" });
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
