mod auth;
mod cli;
mod output;

use anyhow::{Context, Result, bail};
use clap::Parser;
use hub_client::WebSocketTransport;
use notify_center::{
    ConnectionState, NotificationConfig, NotificationSession, StoreChange,
    logging::{self, LogFormat, LoggingHandle},
};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info};

use crate::auth::CliAuth;
use crate::cli::{Args, Commands};
use crate::output::{TerminalToasts, print_state, render_record};

fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let format = if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    let logging = match logging::init(args.log_directive().as_deref(), format) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(args, &logging).await {
        error!("Application error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<NotificationConfig> {
    let mut config = match &args.config {
        Some(path) => NotificationConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => NotificationConfig::default(),
    };
    if let Some(hub_url) = &args.hub_url {
        config.hub_url = hub_url.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: Args, logging: &LoggingHandle) -> Result<()> {
    install_rustls_provider();

    let config = load_config(&args)?;
    // Command-line log flags win over the config file.
    if args.log_directive().is_none()
        && let Some(directive) = config.log_filter.as_deref()
    {
        logging.set_filter(directive)?;
    }
    debug!(filter = %logging.filter(), "Active log filter");

    let Some(user_id) = args.user_id.clone() else {
        bail!("a user id is required (--user-id or NOTIFY_USER_ID)");
    };
    let auth = Arc::new(CliAuth::new(args.token.clone(), user_id, args.roles.clone()));

    info!(hub = %config.hub_url, "Starting notification session");
    let transport = WebSocketTransport::new().with_handshake_timeout(config.handshake_timeout());
    let session = NotificationSession::new(
        config,
        auth,
        Arc::new(transport),
        Arc::new(TerminalToasts),
    )?;
    session.start().await?;

    let result = execute(&session, args.command).await;
    session.logout().await;
    result
}

async fn execute(session: &NotificationSession, command: Commands) -> Result<()> {
    match command {
        Commands::Listen { duration_secs } => listen(session, duration_secs).await,
        Commands::TestConnection { timeout_secs } => {
            wait_connected(session, Duration::from_secs(timeout_secs)).await?;
            session.test_connection().await?;
            println!("Connection test succeeded");
            Ok(())
        }
        Commands::TestNotification { timeout_secs } => {
            test_notification(session, Duration::from_secs(timeout_secs)).await
        }
    }
}

async fn wait_connected(session: &NotificationSession, timeout: Duration) -> Result<()> {
    let mut state = session.center().watch_connection_state();
    match tokio::time::timeout(timeout, state.wait_for(|s| *s == ConnectionState::Connected)).await
    {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) => bail!("notification session stopped before connecting"),
        Err(_) => bail!("hub not connected within {timeout:?}"),
    }
}

async fn listen(session: &NotificationSession, duration_secs: Option<u64>) -> Result<()> {
    let center = session.center();
    let mut changes = center.subscribe();
    let deadline = async {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = &mut deadline => break,
            change = changes.recv() => match change {
                Ok(StoreChange::ConnectionState { state }) => print_state(state),
                Ok(StoreChange::Added { notification }) => {
                    debug!(record = %render_record(&notification), "Stored notification");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Change stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    let snapshot = center.snapshot();
    println!(
        "{} notifications, {} unread",
        snapshot.notifications.len(),
        snapshot.unread_count
    );
    for record in &snapshot.notifications {
        println!("  {}", render_record(record));
    }
    Ok(())
}

async fn test_notification(session: &NotificationSession, timeout: Duration) -> Result<()> {
    wait_connected(session, timeout).await?;
    let mut changes = session.center().subscribe();
    session.test_notification().await?;

    let received = tokio::time::timeout(timeout, async {
        loop {
            match changes.recv().await {
                Ok(StoreChange::Added { notification }) => return Some(notification),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await;

    match received {
        Ok(Some(record)) => {
            println!("Received test notification: {}", render_record(&record));
            Ok(())
        }
        Ok(None) => bail!("notification session ended before the test notification arrived"),
        Err(_) => bail!("no test notification within {timeout:?}"),
    }
}
