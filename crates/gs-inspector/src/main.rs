//! `gs-inspect` - command-line front end for the inspection core.
//!
//! Connects to running Jupyter kernels by connection file and streams
//! variable-inspection updates as JSON lines.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use jupyter_protocol::ConnectionInfo;
use tokio::fs;
use tokio::sync::broadcast;

use gs_inspector::{shell, VariableManager, ZmqKernelSession};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connection files of running kernels
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Attach to a kernel and stream inspection updates
    Watch {
        /// Path to the kernel's connection file
        connection_file: PathBuf,

        /// Identifier for this session (defaults to the connection
        /// file path)
        #[arg(long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    match cli.command {
        Commands::List { json } => list_kernels(json).await,
        Commands::Watch {
            connection_file,
            session,
        } => watch_kernel(connection_file, session).await,
    }
}

async fn list_kernels(json_output: bool) -> Result<()> {
    let runtime_dir = runtimelib::runtime_dir();

    let mut kernels: Vec<(String, PathBuf)> = Vec::new();
    if let Ok(mut entries) = fs::read_dir(&runtime_dir).await {
        while let Some(entry) = entries.next_entry().await.ok().flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path).await else {
                continue;
            };
            let Ok(info) = serde_json::from_str::<ConnectionInfo>(&content) else {
                continue;
            };
            let name = info
                .kernel_name
                .clone()
                .unwrap_or_else(|| "kernel".to_string());
            kernels.push((name, path));
        }
    }
    kernels.sort_by(|a, b| a.1.cmp(&b.1));

    if json_output {
        let rows: Vec<serde_json::Value> = kernels
            .iter()
            .map(|(name, path)| {
                serde_json::json!({ "name": name, "connection_file": path })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if kernels.is_empty() {
        println!("No running kernels found.");
    } else {
        for (name, path) in &kernels {
            println!("{:<20} {}", name, path.display());
        }
    }
    Ok(())
}

async fn watch_kernel(connection_file: PathBuf, session: Option<String>) -> Result<()> {
    let id = session.unwrap_or_else(|| connection_file.display().to_string());

    let kernel = ZmqKernelSession::connect(&connection_file).await?;
    let manager = VariableManager::new();
    let handler = shell::on_notebook_opened(&manager, kernel, &id).await?;
    manager.set_active_handler(Some(handler.clone()));

    let mut updates = handler.inspected();
    handler.ready().await;

    // Initial snapshot before any user activity.
    let initial = handler.clone();
    tokio::spawn(async move {
        initial.perform_inspection().await;
    });

    eprintln!("Watching {} (Ctrl-C to stop)", id);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => match update {
                Ok(update) => println!("{}", serde_json::to_string(&update)?),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    handler.dispose();
    Ok(())
}
