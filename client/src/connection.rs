use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use async_trait::async_trait;
use common::{
    notification::{NotificationData, NotificationRecord},
    notify_err,
    protocol::{CloseReason, ServiceSignal},
    utils::errors::{NotifyError, NotifyErrorKind},
};
use futures_util::{
    StreamExt,
    future::ready,
    stream::{self, BoxStream},
};
use once_cell::sync::Lazy;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use zbus::{Connection, proxy, zvariant::Value};

#[allow(clippy::too_many_arguments)]
#[proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
pub trait NotificationManager {
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: Vec<String>,
        hints: HashMap<String, Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;

    fn close_notification(&self, id: u32) -> zbus::Result<()>;

    fn get_notifications(&self, owner: &str) -> zbus::Result<Vec<NotificationRecord>>;

    fn get_notifications_by_category(
        &self,
        category: &str,
    ) -> zbus::Result<Vec<NotificationRecord>>;

    #[zbus(signal)]
    fn action_invoked(&self, id: u32, action_key: String) -> zbus::Result<()>;

    #[zbus(signal)]
    fn notification_closed(&self, id: u32, reason: u32) -> zbus::Result<()>;

    #[zbus(signal)]
    fn input_text_set(&self, id: u32, input_text: String) -> zbus::Result<()>;
}

/// Outbound calls a notification needs from the manager.
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    async fn notify(&self, data: &NotificationData) -> Result<u32, NotifyError>;
    async fn close_notification(&self, id: u32) -> Result<(), NotifyError>;
    async fn get_notifications(&self, owner: &str) -> Result<Vec<NotificationData>, NotifyError>;
    async fn get_notifications_by_category(
        &self,
        category: &str,
    ) -> Result<Vec<NotificationData>, NotifyError>;
}

static GLOBAL_PROVIDER: Lazy<Arc<ConnectionProvider>> =
    Lazy::new(|| Arc::new(ConnectionProvider::new()));

/// Owns the one connection and proxy shared by every notification.
///
/// The proxy is created lazily on first use. A connection may be supplied
/// beforehand with [`ConnectionProvider::use_connection`]; otherwise the
/// session bus is used.
#[derive(Default)]
pub struct ConnectionProvider {
    supplied: OnceLock<Connection>,
    proxy: OnceCell<NotificationManagerProxy<'static>>,
}
impl ConnectionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide provider, created on first access.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_PROVIDER)
    }

    /// Supplies the connection to use instead of the session bus.
    ///
    /// Rejected once the proxy exists or a connection was already supplied.
    pub fn use_connection(&self, conn: Connection) -> bool {
        if self.proxy.initialized() {
            warn!("Cannot override D-Bus connection - notifications already exist");
            return false;
        }
        if self.supplied.set(conn).is_err() {
            warn!("Cannot override D-Bus connection - a connection was already supplied");
            return false;
        }
        true
    }

    pub fn is_connected(&self) -> bool {
        self.proxy.initialized()
    }

    pub async fn proxy(&self) -> Result<&NotificationManagerProxy<'static>, NotifyError> {
        self.proxy
            .get_or_try_init(|| async {
                let conn = match self.supplied.get() {
                    Some(conn) => conn.clone(),
                    None => Connection::session()
                        .await
                        .map_err(|e| notify_err!(NotifyErrorKind::DBusConnect, e.to_string()))?,
                };
                debug!(unique_name = ?conn.unique_name(), "Creating notification manager proxy");
                NotificationManagerProxy::new(&conn)
                    .await
                    .map_err(|e| notify_err!(NotifyErrorKind::ProxyCreate, e.to_string()))
            })
            .await
    }

    /// Merged stream of the manager's notification signals.
    pub async fn signals(&self) -> Result<BoxStream<'static, ServiceSignal>, NotifyError> {
        let proxy = self.proxy().await?;

        let invoked = proxy
            .receive_action_invoked()
            .await
            .map_err(|e| notify_err!(NotifyErrorKind::DBusSignal, e.to_string()))?
            .filter_map(|signal| {
                ready(match signal.args() {
                    Ok(args) => Some(ServiceSignal::ActionInvoked {
                        id: *args.id(),
                        action_key: args.action_key().clone(),
                    }),
                    Err(e) => {
                        warn!(error = %e, "Malformed ActionInvoked signal");
                        None
                    }
                })
            });

        let closed = proxy
            .receive_notification_closed()
            .await
            .map_err(|e| notify_err!(NotifyErrorKind::DBusSignal, e.to_string()))?
            .filter_map(|signal| {
                ready(match signal.args() {
                    Ok(args) => Some(ServiceSignal::NotificationClosed {
                        id: *args.id(),
                        reason: CloseReason::from(*args.reason()),
                    }),
                    Err(e) => {
                        warn!(error = %e, "Malformed NotificationClosed signal");
                        None
                    }
                })
            });

        let input = proxy
            .receive_input_text_set()
            .await
            .map_err(|e| notify_err!(NotifyErrorKind::DBusSignal, e.to_string()))?
            .filter_map(|signal| {
                ready(match signal.args() {
                    Ok(args) => Some(ServiceSignal::InputTextSet {
                        id: *args.id(),
                        text: args.input_text().clone(),
                    }),
                    Err(e) => {
                        warn!(error = %e, "Malformed InputTextSet signal");
                        None
                    }
                })
            });

        Ok(stream::select(stream::select(invoked, closed), input).boxed())
    }
}

#[async_trait]
impl NotificationBackend for ConnectionProvider {
    async fn notify(&self, data: &NotificationData) -> Result<u32, NotifyError> {
        let proxy = self.proxy().await?;
        proxy
            .notify(
                &data.app_name,
                data.replaces_id,
                &data.app_icon,
                &data.summary,
                &data.body,
                data.wire_actions(),
                data.hints.to_wire(),
                data.expire_timeout,
            )
            .await
            .map_err(|e| notify_err!(NotifyErrorKind::DBusProxyCall, e.to_string()))
    }

    async fn close_notification(&self, id: u32) -> Result<(), NotifyError> {
        let proxy = self.proxy().await?;
        proxy
            .close_notification(id)
            .await
            .map_err(|e| notify_err!(NotifyErrorKind::DBusProxyCall, e.to_string()))
    }

    async fn get_notifications(&self, owner: &str) -> Result<Vec<NotificationData>, NotifyError> {
        let proxy = self.proxy().await?;
        let records = proxy
            .get_notifications(owner)
            .await
            .map_err(|e| notify_err!(NotifyErrorKind::DBusProxyCall, e.to_string()))?;
        Ok(records.into_iter().map(NotificationData::from).collect())
    }

    async fn get_notifications_by_category(
        &self,
        category: &str,
    ) -> Result<Vec<NotificationData>, NotifyError> {
        let proxy = self.proxy().await?;
        let records = proxy
            .get_notifications_by_category(category)
            .await
            .map_err(|e| notify_err!(NotifyErrorKind::DBusProxyCall, e.to_string()))?;
        Ok(records.into_iter().map(NotificationData::from).collect())
    }
}
