use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use common::{protocol::ServiceSignal, utils::errors::NotifyError};
use futures_util::{StreamExt, stream::BoxStream};
use tracing::{debug, warn};

use crate::{
    connection::ConnectionProvider,
    notification::{Notification, SharedNotification},
};

/// Fans manager signals out to every live notification.
///
/// Holds only weak references; dropping a notification unregisters it.
#[derive(Default)]
pub struct EventRouter {
    targets: RefCell<Vec<Weak<RefCell<Notification>>>>,
}
impl EventRouter {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn register(&self, notification: &SharedNotification) {
        self.targets.borrow_mut().push(Rc::downgrade(notification));
    }

    pub fn live_count(&self) -> usize {
        self.targets
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Delivers `signal` to each registered notification. Returns how many claimed it.
    pub fn dispatch(&self, signal: &ServiceSignal) -> usize {
        let live: Vec<SharedNotification> = {
            let mut targets = self.targets.borrow_mut();
            targets.retain(|w| w.strong_count() > 0);
            targets.iter().filter_map(Weak::upgrade).collect()
        };

        let mut claimed = 0;
        for notification in live {
            match notification.try_borrow_mut() {
                Ok(mut n) => {
                    if n.handle_signal(signal) {
                        claimed += 1;
                    }
                }
                Err(_) => warn!(id = signal.id(), "Notification busy, dropping signal"),
            }
        }
        if claimed == 0 {
            debug!(id = signal.id(), "Signal for unknown notification");
        }
        claimed
    }

    /// Listens for manager signals until the stream ends.
    pub async fn run(&self, provider: &ConnectionProvider) -> Result<(), NotifyError> {
        let signals = provider.signals().await?;
        self.listen(signals).await;
        Ok(())
    }

    /// Dispatches from an already subscribed signal stream.
    pub async fn listen(&self, mut signals: BoxStream<'static, ServiceSignal>) {
        while let Some(signal) = signals.next().await {
            self.dispatch(&signal);
        }
        debug!("Notification signal stream ended");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use common::{notification::NotificationData, protocol::CloseReason};

    use super::*;
    use crate::{connection::NotificationBackend, notification::NotificationEvent};

    struct NullBackend;

    #[async_trait]
    impl NotificationBackend for NullBackend {
        async fn notify(&self, data: &NotificationData) -> Result<u32, NotifyError> {
            Ok(data.replaces_id)
        }
        async fn close_notification(&self, _id: u32) -> Result<(), NotifyError> {
            Ok(())
        }
        async fn get_notifications(&self, _owner: &str) -> Result<Vec<NotificationData>, NotifyError> {
            Ok(Vec::new())
        }
        async fn get_notifications_by_category(
            &self,
            _category: &str,
        ) -> Result<Vec<NotificationData>, NotifyError> {
            Ok(Vec::new())
        }
    }

    /// Echoes the requested id after yielding once, like a manager round trip.
    struct SlowBackend;

    #[async_trait]
    impl NotificationBackend for SlowBackend {
        async fn notify(&self, data: &NotificationData) -> Result<u32, NotifyError> {
            tokio::task::yield_now().await;
            Ok(data.replaces_id)
        }
        async fn close_notification(&self, _id: u32) -> Result<(), NotifyError> {
            tokio::task::yield_now().await;
            Ok(())
        }
        async fn get_notifications(&self, _owner: &str) -> Result<Vec<NotificationData>, NotifyError> {
            Ok(Vec::new())
        }
        async fn get_notifications_by_category(
            &self,
            _category: &str,
        ) -> Result<Vec<NotificationData>, NotifyError> {
            Ok(Vec::new())
        }
    }

    fn published(id: u32) -> SharedNotification {
        let mut n = Notification::with_backend(Arc::new(NullBackend));
        n.set_replaces_id(id);
        n.into_shared()
    }

    fn closed(id: u32) -> ServiceSignal {
        ServiceSignal::NotificationClosed {
            id,
            reason: CloseReason::Closed,
        }
    }

    #[test]
    fn signal_reaches_only_matching_notification() {
        let router = EventRouter::new();
        let a = published(1);
        let b = published(2);
        router.register(&a);
        router.register(&b);
        let mut rx = b.borrow().subscribe();

        assert_eq!(router.dispatch(&closed(2)), 1);
        assert_eq!(a.borrow().replaces_id(), 1);
        assert_eq!(b.borrow().replaces_id(), 0);
        assert_eq!(
            rx.try_recv().unwrap(),
            NotificationEvent::Closed(CloseReason::Closed)
        );
    }

    #[test]
    fn dropped_notifications_are_pruned() {
        let router = EventRouter::new();
        let a = published(1);
        router.register(&a);
        router.register(&published(2));

        assert_eq!(router.live_count(), 1);
        assert_eq!(router.dispatch(&closed(2)), 0);
        assert_eq!(router.targets.borrow().len(), 1);
        drop(a);
        assert_eq!(router.live_count(), 0);
    }

    #[test]
    fn borrowed_notification_is_skipped() {
        let router = EventRouter::new();
        let a = published(3);
        router.register(&a);

        let _guard = a.borrow_mut();
        assert_eq!(router.dispatch(&closed(3)), 0);
    }

    #[tokio::test]
    async fn signal_during_republish_is_delivered() {
        let router = EventRouter::new();
        let mut n = Notification::with_backend(Arc::new(SlowBackend));
        n.set_replaces_id(5);
        let shared = n.into_shared();
        router.register(&shared);
        let mut rx = shared.borrow().subscribe();

        let (published, claimed) = tokio::join!(Notification::publish_shared(&shared), async {
            router.dispatch(&closed(5))
        });

        assert!(published);
        assert_eq!(claimed, 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            NotificationEvent::Closed(CloseReason::Closed)
        );
    }

    #[tokio::test]
    async fn signal_during_close_is_delivered() {
        let router = EventRouter::new();
        let mut n = Notification::with_backend(Arc::new(SlowBackend));
        n.set_replaces_id(6);
        let shared = n.into_shared();
        router.register(&shared);

        let ((), claimed) = tokio::join!(Notification::close_shared(&shared), async {
            router.dispatch(&closed(6))
        });

        assert_eq!(claimed, 1);
        assert_eq!(shared.borrow().replaces_id(), 0);
    }
}
