use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use kessel_core::app::{AppBuilder, KesselConfig, StopReason};
use kessel_core::domain::{Message, MessageId, Schedule};
use kessel_core::ports::QueueAdapter;
use kessel_core::telemetry::init_tracing;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "kessel", about = "Filesystem message queue worker and tools")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Queue directory (overrides file_queue_adapter.base_path)
    #[arg(long, global = true)]
    base_path: Option<PathBuf>,

    /// Log everything at trace level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a worker with the sample handlers until idle or signalled
    Run {
        /// Stop after this many consecutive empty polls (0 = never)
        #[arg(long)]
        shutdown_after: Option<u32>,

        /// Sleep between empty polls, in milliseconds
        #[arg(long)]
        sleep_ms: Option<u64>,
    },

    /// Enqueue messages
    Publish {
        /// Text placed in body.payload
        #[arg(long)]
        payload: String,

        /// Handler key (header.request_type)
        #[arg(long, default_value = "echo")]
        request_type: String,

        /// Number of copies to enqueue
        #[arg(long, default_value = "1")]
        count: u32,

        /// Hold the message back for this many seconds
        #[arg(long)]
        delay_secs: Option<u64>,

        /// Dead-letter the message if not delivered within this many seconds
        #[arg(long)]
        expire_in_secs: Option<u64>,
    },

    /// Dequeue one message, commit it as success and print it
    Pop,

    /// Print a message wherever it currently is
    Peek {
        /// Message id
        id: String,
    },

    /// Remove a queued message
    Delete {
        /// Message id
        id: String,
    },

    /// Print the state of a message
    State {
        /// Message id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => KesselConfig::from_json_file(path)
            .await
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => KesselConfig::default(),
    };
    if let Some(base_path) = cli.base_path {
        config.file_queue_adapter.base_path = base_path;
    }

    match cli.command {
        Commands::Run {
            shutdown_after,
            sleep_ms,
        } => {
            if let Some(n) = shutdown_after {
                config.shutdown_after_number_of_empty_iterations = (n > 0).then_some(n);
            }
            if let Some(ms) = sleep_ms {
                config.sleep_duration_ms = ms;
            }
            cmd_run(config).await
        }
        Commands::Publish {
            payload,
            request_type,
            count,
            delay_secs,
            expire_in_secs,
        } => {
            let adapter = open_adapter(&config).await?;
            cmd_publish(
                adapter.as_ref(),
                &payload,
                &request_type,
                count,
                delay_secs,
                expire_in_secs,
            )
            .await
        }
        Commands::Pop => cmd_pop(open_adapter(&config).await?.as_ref()).await,
        Commands::Peek { id } => cmd_peek(open_adapter(&config).await?.as_ref(), id).await,
        Commands::Delete { id } => cmd_delete(open_adapter(&config).await?.as_ref(), id).await,
        Commands::State { id } => cmd_state(open_adapter(&config).await?.as_ref(), id).await,
    }
}

async fn open_adapter(config: &KesselConfig) -> Result<Arc<dyn QueueAdapter>> {
    config.open_adapter().await.with_context(|| {
        format!(
            "opening queue at {}",
            config.file_queue_adapter.base_path.display()
        )
    })
}

async fn cmd_run(config: KesselConfig) -> Result<()> {
    let adapter = open_adapter(&config).await?;
    let app = AppBuilder::new()
        .with_sample_handlers(&config.sample_handlers)
        .context("registering sample handlers")?
        .build()?;
    let worker = app.worker(adapter, config.worker_config());

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => info!("received shutdown signal, finishing current message"),
            Err(e) => tracing::error!(error = %e, "cannot listen for shutdown signals"),
        }
        signal_token.cancel();
    });

    let summary = worker.run(token).await.context("worker stopped on a storage error")?;
    let reason = match summary.stop_reason {
        StopReason::Idle => "idle",
        StopReason::Shutdown => "shutdown requested",
    };
    info!(
        iterations = summary.iterations,
        processed = summary.processed,
        reason,
        "kessel shutdown"
    );
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("installing SIGTERM handler")?;
        tokio::select! {
            result = ctrl_c => result.context("listening for CTRL+C")?,
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("listening for CTRL+C")?;
    }

    Ok(())
}

async fn cmd_publish(
    adapter: &dyn QueueAdapter,
    payload: &str,
    request_type: &str,
    count: u32,
    delay_secs: Option<u64>,
    expire_in_secs: Option<u64>,
) -> Result<()> {
    for _ in 0..count {
        let mut message = Message::with_payload(payload)
            .with_request_type(request_type)
            .with_header_item("source", "kessel-cli")?;
        if let Some(secs) = delay_secs {
            message = message.with_delay(Schedule::After(Duration::from_secs(secs)));
        }
        if let Some(secs) = expire_in_secs {
            message = message.with_expiration(Schedule::After(Duration::from_secs(secs)));
        }

        let message = adapter.enqueue(message).await.context("enqueue")?;
        let id = message.require_id()?;
        info!(%id, request_type, "published");
        println!("{id}");
    }
    Ok(())
}

async fn cmd_pop(adapter: &dyn QueueAdapter) -> Result<()> {
    let Some(message) = adapter.dequeue().await.context("dequeue")? else {
        println!("no message available");
        return Ok(());
    };
    adapter
        .commit(&message, true)
        .await
        .context("commit popped message")?;
    println!("{message}");
    Ok(())
}

async fn cmd_peek(adapter: &dyn QueueAdapter, id: String) -> Result<()> {
    let id = MessageId::new(id);
    match adapter.peek(&id).await? {
        Some(message) => {
            println!("{message}");
            Ok(())
        }
        None => bail!("message {id} not found"),
    }
}

async fn cmd_delete(adapter: &dyn QueueAdapter, id: String) -> Result<()> {
    let id = MessageId::new(id);
    if adapter.delete(&id).await? {
        println!("deleted {id}");
        Ok(())
    } else {
        let state = adapter.lookup_state(&id).await?;
        bail!("message {id} is not queued (state: {state})")
    }
}

async fn cmd_state(adapter: &dyn QueueAdapter, id: String) -> Result<()> {
    let state = adapter.lookup_state(&MessageId::new(id)).await?;
    println!("{state}");
    Ok(())
}
