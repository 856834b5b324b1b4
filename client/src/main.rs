use std::sync::Arc;

use clap::Parser;
use client::{
    config::{ClientConfig, load_config, load_config_from},
    connection::{ConnectionProvider, NotificationBackend},
    notification::{Notification, NotificationEvent},
    router::EventRouter,
};
use common::{
    notify_err,
    protocol::CloseReason,
    utils::errors::{NotifyError, NotifyErrorKind},
};
use tokio::{signal, sync::broadcast::error::RecvError, task::LocalSet};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::{Cli, Commands, ListArgs, SendArgs};

mod cli;

const DEFAULT_LOG_FILTER: &str = "warn";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), NotifyError> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let config = match cli.config.as_deref() {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let provider = ConnectionProvider::global();

    match cli.command {
        Commands::Send(args) => {
            LocalSet::new()
                .run_until(send(args, &config, provider))
                .await
        }
        Commands::Close { id } => provider.close_notification(id).await,
        Commands::List(args) => list(args, provider).await,
    }
}

fn init_logging(level: Option<&str>) {
    let env_filter = match level {
        Some(spec) => EnvFilter::new(spec),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().without_time().with_writer(std::io::stderr))
        .try_init()
        .ok();
}

async fn send(
    args: SendArgs,
    config: &ClientConfig,
    provider: Arc<ConnectionProvider>,
) -> Result<(), NotifyError> {
    let mut notification = Notification::with_backend(provider.clone());
    config.apply(&mut notification);

    notification.set_summary(args.summary);
    notification.set_body(args.body);
    if let Some(app_name) = args.app_name {
        notification.set_app_name(app_name);
    }
    if let Some(icon) = args.icon {
        notification.set_icon(icon);
    }
    if let Some(app_icon) = args.app_icon {
        notification.set_app_icon(app_icon);
    }
    if let Some(category) = args.category {
        notification.set_category(category);
    }
    if let Some(urgency) = args.urgency {
        notification.set_urgency(urgency.into());
    }
    if let Some(timeout) = args.timeout {
        notification.set_expire_timeout(timeout);
    }
    if let Some(id) = args.replaces_id {
        notification.set_replaces_id(id);
    }
    for (name, value) in args.hints {
        notification.set_hint_value(&name, value);
    }
    if !args.actions.is_empty() {
        notification.set_remote_actions(args.actions);
    }

    // Subscribe before publishing so early signals are not missed
    let listener = if args.wait {
        Some(provider.signals().await?)
    } else {
        None
    };

    if !notification.publish().await {
        return Err(notify_err!(
            NotifyErrorKind::DBusProxyCall,
            "Notification manager rejected or did not answer"
        ));
    }
    let id = notification.replaces_id();
    println!("{id}");

    let Some(signals) = listener else {
        return Ok(());
    };

    let mut events = notification.subscribe();
    let notification = notification.into_shared();
    let router = EventRouter::new();
    router.register(&notification);
    tokio::task::spawn_local({
        let router = router.clone();
        async move { router.listen(signals).await }
    });

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(NotificationEvent::Closed(reason)) => {
                    println!("closed {}", close_reason_name(reason));
                    break;
                }
                Ok(NotificationEvent::Clicked) => println!("clicked"),
                Ok(NotificationEvent::ActionInvoked(name)) => println!("action {name}"),
                Ok(NotificationEvent::InputActionInvoked { name, text }) => {
                    println!("input {name} {text}")
                }
                Ok(NotificationEvent::Changed(_)) => {}
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "Event receiver lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = signal::ctrl_c() => {
                info!(id, "Interrupted, closing notification");
                Notification::close_shared(&notification).await;
                break;
            }
        }
    }
    Ok(())
}

fn close_reason_name(reason: CloseReason) -> String {
    match reason {
        CloseReason::Other(code) => code.to_string(),
        known => known.as_ref().to_string(),
    }
}

async fn list(args: ListArgs, provider: Arc<ConnectionProvider>) -> Result<(), NotifyError> {
    let backend: Arc<dyn NotificationBackend> = provider;
    let found = match (args.owner, args.category) {
        (_, Some(category)) => Notification::notifications_by_category(backend, &category).await,
        (Some(owner), None) => Notification::notifications_by_owner(backend, &owner).await,
        (None, None) => Notification::notifications(backend).await,
    };

    for n in &found {
        println!(
            "{}\t{}\t{}\t{}",
            n.replaces_id(),
            n.app_name(),
            n.summary(),
            n.category()
        );
        for action in n.remote_actions() {
            println!("\taction {} ({})", action.name, action.display_name);
        }
    }
    if found.is_empty() {
        info!("No notifications");
    }
    Ok(())
}
