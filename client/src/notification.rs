use std::{cell::RefCell, rc::Rc, sync::Arc};

use chrono::{DateTime, FixedOffset};
use common::{
    actions::{
        DEFAULT_ACTION_NAME, RemoteAction, encode_action_hints, remote_action_hint,
        remote_action_icon_hint, remote_action_input_hint, remote_action_type_hint,
        decode_action_hints,
    },
    callback::CallbackTarget,
    hints::{
        HINT_CATEGORY, HINT_IMAGE_DATA, HINT_IMAGE_PATH, HINT_ITEM_COUNT, HINT_MAX_CONTENT_LINES,
        HINT_ORIGIN, HINT_OWNER, HINT_PREVIEW_BODY, HINT_PREVIEW_SUMMARY, HINT_PROGRESS,
        HINT_SOUND_FILE, HINT_SOUND_NAME, HINT_SUB_TEXT, HINT_TIMESTAMP, HINT_TRANSIENT,
        HINT_URGENCY, HintValue, ImageData, format_timestamp,
    },
    notification::NotificationData,
    protocol::{CloseReason, ServiceSignal, Urgency},
    utils::{errors::NotifyError, process::process_name},
};
use strum::{AsRefStr, EnumIter};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::connection::{ConnectionProvider, NotificationBackend};

/// Progress value meaning "in progress, amount unknown".
pub const PROGRESS_INDETERMINATE: f64 = -1.0;

const EVENT_CAPACITY: usize = 64;

pub type SharedNotification = Rc<RefCell<Notification>>;

/// Properties that report changes through [`NotificationEvent::Changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
pub enum Property {
    Category,
    AppName,
    ReplacesId,
    Icon,
    AppIcon,
    Summary,
    Body,
    Urgency,
    ExpireTimeout,
    Timestamp,
    PreviewSummary,
    PreviewBody,
    SubText,
    Sound,
    SoundName,
    IconData,
    ItemCount,
    RemoteActions,
    RemoteDBusCall,
    Origin,
    MaxContentLines,
    IsTransient,
    Progress,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    /// The default action was invoked.
    Clicked,
    ActionInvoked(String),
    InputActionInvoked { name: String, text: String },
    Closed(CloseReason),
    Changed(Property),
}

/// A client-side notification.
///
/// Property setters only touch local state; nothing reaches the manager until
/// [`Notification::publish`] is called.
pub struct Notification {
    data: NotificationData,
    remote_actions: Vec<RemoteAction>,
    input_text: String,
    backend: Arc<dyn NotificationBackend>,
    events: broadcast::Sender<NotificationEvent>,
}
impl Notification {
    /// Creates a notification bound to the process-wide connection.
    pub fn new() -> Self {
        Self::with_backend(ConnectionProvider::global())
    }

    pub fn with_backend(backend: Arc<dyn NotificationBackend>) -> Self {
        let mut data = NotificationData::default();
        data.hints.insert(HINT_URGENCY, i32::from(Urgency::Normal));
        Self::from_parts(data, Vec::new(), backend)
    }

    /// Wraps data received from the manager, decoding its remote actions.
    pub fn from_data(data: NotificationData, backend: Arc<dyn NotificationBackend>) -> Self {
        let remote_actions = decode_action_hints(&data.actions, &data.hints);
        Self::from_parts(data, remote_actions, backend)
    }

    fn from_parts(
        data: NotificationData,
        remote_actions: Vec<RemoteAction>,
        backend: Arc<dyn NotificationBackend>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            data,
            remote_actions,
            input_text: String::new(),
            backend,
            events,
        }
    }

    pub fn into_shared(self) -> SharedNotification {
        Rc::new(RefCell::new(self))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.events.subscribe()
    }

    pub fn data(&self) -> &NotificationData {
        &self.data
    }

    /// Most recent input text reported by the manager.
    pub fn input_text(&self) -> &str {
        &self.input_text
    }

    fn emit(&self, event: NotificationEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn changed(&self, property: Property) {
        self.emit(NotificationEvent::Changed(property));
    }

    fn set_string_hint(&mut self, key: &str, value: String, property: Property) {
        if value != self.data.hints.string(key) {
            self.data.hints.insert(key, value);
            self.changed(property);
        }
    }

    // ----- Record fields -----
    pub fn app_name(&self) -> &str {
        &self.data.app_name
    }
    pub fn set_app_name(&mut self, app_name: impl Into<String>) {
        let app_name = app_name.into();
        if app_name != self.data.app_name {
            self.data.app_name = app_name;
            self.changed(Property::AppName);
        }
    }

    /// Id assigned by the manager, 0 while unpublished.
    pub fn replaces_id(&self) -> u32 {
        self.data.replaces_id
    }
    /// A non-zero id makes the next publish replace that notification.
    pub fn set_replaces_id(&mut self, id: u32) {
        if id != self.data.replaces_id {
            self.data.replaces_id = id;
            self.changed(Property::ReplacesId);
        }
    }

    pub fn app_icon(&self) -> &str {
        &self.data.app_icon
    }
    pub fn set_app_icon(&mut self, app_icon: impl Into<String>) {
        let app_icon = app_icon.into();
        if app_icon != self.data.app_icon {
            self.data.app_icon = app_icon;
            self.changed(Property::AppIcon);
        }
    }

    pub fn summary(&self) -> &str {
        &self.data.summary
    }
    pub fn set_summary(&mut self, summary: impl Into<String>) {
        let summary = summary.into();
        if summary != self.data.summary {
            self.data.summary = summary;
            self.changed(Property::Summary);
        }
    }

    pub fn body(&self) -> &str {
        &self.data.body
    }
    pub fn set_body(&mut self, body: impl Into<String>) {
        let body = body.into();
        if body != self.data.body {
            self.data.body = body;
            self.changed(Property::Body);
        }
    }

    /// Milliseconds; -1 leaves it to the manager, 0 never expires.
    pub fn expire_timeout(&self) -> i32 {
        self.data.expire_timeout
    }
    pub fn set_expire_timeout(&mut self, milliseconds: i32) {
        if milliseconds != self.data.expire_timeout {
            self.data.expire_timeout = milliseconds;
            self.changed(Property::ExpireTimeout);
        }
    }

    // ----- Hint backed properties -----
    pub fn category(&self) -> String {
        self.data.hints.string(HINT_CATEGORY)
    }
    pub fn set_category(&mut self, category: impl Into<String>) {
        self.set_string_hint(HINT_CATEGORY, category.into(), Property::Category);
    }

    /// Icon path, URI or theme name, sent as `image-path`.
    pub fn icon(&self) -> String {
        self.data.hints.string(HINT_IMAGE_PATH)
    }
    pub fn set_icon(&mut self, icon: impl Into<String>) {
        self.set_string_hint(HINT_IMAGE_PATH, icon.into(), Property::Icon);
    }

    pub fn urgency(&self) -> Urgency {
        Urgency::clamped(self.data.hints.int(HINT_URGENCY))
    }
    pub fn set_urgency(&mut self, urgency: Urgency) {
        if urgency != self.urgency() {
            self.data.hints.insert(HINT_URGENCY, i32::from(urgency));
            self.changed(Property::Urgency);
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.data.hints.datetime(HINT_TIMESTAMP)
    }
    pub fn set_timestamp(&mut self, timestamp: DateTime<FixedOffset>) {
        if Some(timestamp) != self.timestamp() {
            self.data
                .hints
                .insert(HINT_TIMESTAMP, format_timestamp(&timestamp));
            self.changed(Property::Timestamp);
        }
    }

    pub fn preview_summary(&self) -> String {
        self.data.hints.string(HINT_PREVIEW_SUMMARY)
    }
    pub fn set_preview_summary(&mut self, preview_summary: impl Into<String>) {
        let value = preview_summary.into();
        // An explicit empty value must survive publish defaulting
        if !self.data.hints.contains_key(HINT_PREVIEW_SUMMARY) || value != self.preview_summary() {
            self.data.hints.insert(HINT_PREVIEW_SUMMARY, value);
            self.changed(Property::PreviewSummary);
        }
    }

    pub fn preview_body(&self) -> String {
        self.data.hints.string(HINT_PREVIEW_BODY)
    }
    pub fn set_preview_body(&mut self, preview_body: impl Into<String>) {
        let value = preview_body.into();
        if !self.data.hints.contains_key(HINT_PREVIEW_BODY) || value != self.preview_body() {
            self.data.hints.insert(HINT_PREVIEW_BODY, value);
            self.changed(Property::PreviewBody);
        }
    }

    pub fn sub_text(&self) -> String {
        self.data.hints.string(HINT_SUB_TEXT)
    }
    pub fn set_sub_text(&mut self, sub_text: impl Into<String>) {
        self.set_string_hint(HINT_SUB_TEXT, sub_text.into(), Property::SubText);
    }

    /// Sound file played on publication, sent as `sound-file`.
    pub fn sound(&self) -> String {
        self.data.hints.string(HINT_SOUND_FILE)
    }
    pub fn set_sound(&mut self, sound: impl Into<String>) {
        self.set_string_hint(HINT_SOUND_FILE, sound.into(), Property::Sound);
    }

    pub fn sound_name(&self) -> String {
        self.data.hints.string(HINT_SOUND_NAME)
    }
    pub fn set_sound_name(&mut self, sound_name: impl Into<String>) {
        self.set_string_hint(HINT_SOUND_NAME, sound_name.into(), Property::SoundName);
    }

    pub fn icon_data(&self) -> Option<ImageData> {
        self.data.hints.image(HINT_IMAGE_DATA).cloned()
    }
    pub fn set_icon_data(&mut self, image: ImageData) {
        if Some(&image) != self.data.hints.image(HINT_IMAGE_DATA) {
            self.data.hints.insert(HINT_IMAGE_DATA, image);
            self.changed(Property::IconData);
        }
    }

    pub fn item_count(&self) -> i32 {
        i32::try_from(self.data.hints.int(HINT_ITEM_COUNT)).unwrap_or_default()
    }
    pub fn set_item_count(&mut self, item_count: i32) {
        if item_count != self.item_count() {
            self.data.hints.insert(HINT_ITEM_COUNT, item_count);
            self.changed(Property::ItemCount);
        }
    }

    pub fn is_transient(&self) -> bool {
        self.data.hints.bool(HINT_TRANSIENT)
    }
    pub fn set_is_transient(&mut self, value: bool) {
        if value != self.is_transient() {
            self.data.hints.insert(HINT_TRANSIENT, value);
            self.changed(Property::IsTransient);
        }
    }

    /// `None` when no progress is shown.
    pub fn progress(&self) -> Option<f64> {
        self.data.hints.double(HINT_PROGRESS)
    }
    /// Stored as a double whatever the input type.
    pub fn set_progress(&mut self, value: impl Into<f64>) {
        let value = value.into();
        if Some(value) != self.progress() {
            self.data.hints.insert(HINT_PROGRESS, value);
            self.changed(Property::Progress);
        }
    }
    pub fn reset_progress(&mut self) {
        if self.data.hints.remove(HINT_PROGRESS).is_some() {
            self.changed(Property::Progress);
        }
    }

    #[deprecated(note = "use sub_text")]
    pub fn origin(&self) -> String {
        self.data.hints.string(HINT_ORIGIN)
    }
    #[deprecated(note = "use set_sub_text")]
    pub fn set_origin(&mut self, origin: impl Into<String>) {
        let origin = origin.into();
        if origin != self.data.hints.string(HINT_ORIGIN) {
            warn!(origin, "Notification sets deprecated origin property, use sub_text instead");
            self.data.hints.insert(HINT_ORIGIN, origin);
            self.changed(Property::Origin);
        }
    }

    #[deprecated]
    pub fn max_content_lines(&self) -> i32 {
        i32::try_from(self.data.hints.int(HINT_MAX_CONTENT_LINES)).unwrap_or_default()
    }
    #[deprecated]
    pub fn set_max_content_lines(&mut self, max: i32) {
        let current = i32::try_from(self.data.hints.int(HINT_MAX_CONTENT_LINES)).unwrap_or_default();
        if max != current {
            warn!("Notification max_content_lines property is deprecated");
            self.data.hints.insert(HINT_MAX_CONTENT_LINES, max);
            self.changed(Property::MaxContentLines);
        }
    }

    pub fn hint_value(&self, hint: &str) -> Option<&HintValue> {
        self.data.hints.get(hint)
    }
    /// Raw hint write. Bypasses change events.
    pub fn set_hint_value(&mut self, hint: &str, value: impl Into<HintValue>) {
        if hint.is_empty() {
            warn!("Invalid name given for notification hint");
            return;
        }
        self.data.hints.insert(hint, value);
    }

    // ----- Remote actions -----
    pub fn remote_actions(&self) -> &[RemoteAction] {
        &self.remote_actions
    }

    /// Replaces every remote action, along with the hints describing them.
    pub fn set_remote_actions(&mut self, remote_actions: Vec<RemoteAction>) {
        if remote_actions == self.remote_actions {
            return;
        }

        for old in self.remote_actions.iter().filter(|a| !a.name.is_empty()) {
            let name = old.name.as_str();
            for key in [
                remote_action_hint(name),
                remote_action_icon_hint(name),
                remote_action_input_hint(name),
                remote_action_type_hint(name),
            ] {
                self.data.hints.remove(&key);
            }
            if let Some(pos) = self.data.actions.iter().position(|a| a.name == name) {
                self.data.actions.remove(pos);
            }
        }

        let (infos, hints) = encode_action_hints(&remote_actions);
        self.data.actions.extend(infos);
        self.data.hints.extend(hints);
        self.remote_actions = remote_actions;

        self.changed(Property::RemoteActions);
        self.changed(Property::RemoteDBusCall);
    }
    pub fn set_remote_action(&mut self, remote_action: RemoteAction) {
        self.set_remote_actions(vec![remote_action]);
    }

    fn first_callback(&self) -> CallbackTarget {
        self.remote_actions
            .first()
            .and_then(|a| a.callback.clone())
            .unwrap_or_default()
    }

    /// Edits the callback of the first remote action, creating a `default` action if needed.
    fn update_first_callback(&mut self, update: impl FnOnce(&mut CallbackTarget) -> bool) {
        let mut action = self.remote_actions.first().cloned().unwrap_or_default();
        let mut callback = action.callback.take().unwrap_or_default();
        if !update(&mut callback) {
            return;
        }
        if action.name.is_empty() {
            action.name = DEFAULT_ACTION_NAME.into();
        }
        action.callback = Some(callback);
        self.set_remote_actions(vec![action]);
    }

    #[deprecated(note = "use remote_actions")]
    pub fn remote_dbus_call_service_name(&self) -> String {
        self.first_callback().service
    }
    #[deprecated(note = "use set_remote_actions")]
    pub fn set_remote_dbus_call_service_name(&mut self, service: &str) {
        self.update_first_callback(|cb| replace_if_changed(&mut cb.service, service));
    }
    #[deprecated(note = "use remote_actions")]
    pub fn remote_dbus_call_object_path(&self) -> String {
        self.first_callback().path
    }
    #[deprecated(note = "use set_remote_actions")]
    pub fn set_remote_dbus_call_object_path(&mut self, path: &str) {
        self.update_first_callback(|cb| replace_if_changed(&mut cb.path, path));
    }
    #[deprecated(note = "use remote_actions")]
    pub fn remote_dbus_call_interface(&self) -> String {
        self.first_callback().interface
    }
    #[deprecated(note = "use set_remote_actions")]
    pub fn set_remote_dbus_call_interface(&mut self, interface: &str) {
        self.update_first_callback(|cb| replace_if_changed(&mut cb.interface, interface));
    }
    #[deprecated(note = "use remote_actions")]
    pub fn remote_dbus_call_method_name(&self) -> String {
        self.first_callback().method
    }
    #[deprecated(note = "use set_remote_actions")]
    pub fn set_remote_dbus_call_method_name(&mut self, method: &str) {
        self.update_first_callback(|cb| replace_if_changed(&mut cb.method, method));
    }
    #[deprecated(note = "use remote_actions")]
    pub fn remote_dbus_call_arguments(&self) -> Vec<HintValue> {
        self.first_callback().arguments
    }
    #[deprecated(note = "use set_remote_actions")]
    pub fn set_remote_dbus_call_arguments(&mut self, arguments: Vec<HintValue>) {
        self.update_first_callback(|cb| {
            if cb.arguments == arguments {
                return false;
            }
            cb.arguments = arguments;
            true
        });
    }

    // ----- Manager calls -----

    /// Sends the notification to the manager and records the id it assigns.
    ///
    /// Returns `false` if the manager could not be reached.
    pub async fn publish(&mut self) -> bool {
        let data = self.prepare_publish();
        let reply = self.backend.notify(&data).await;
        self.apply_publish_reply(reply)
    }

    /// [`Notification::publish`] for a shared notification.
    ///
    /// The notification is not borrowed while the manager call is pending, so
    /// signals routed to it in the meantime are still delivered.
    pub async fn publish_shared(notification: &SharedNotification) -> bool {
        let (data, backend) = {
            let mut n = notification.borrow_mut();
            (n.prepare_publish(), Arc::clone(&n.backend))
        };
        let reply = backend.notify(&data).await;
        notification.borrow_mut().apply_publish_reply(reply)
    }

    fn apply_publish_reply(&mut self, reply: Result<u32, NotifyError>) -> bool {
        match reply {
            Ok(id) => {
                debug!(id, "Notification published");
                self.set_replaces_id(id);
                true
            }
            Err(e) => {
                warn!(error = %e, "Unable to publish notification");
                false
            }
        }
    }

    /// Validates actions and fills in owner and preview defaults.
    fn prepare_publish(&mut self) -> NotificationData {
        for action in self.remote_actions.iter().filter(|a| !a.is_valid()) {
            warn!(
                action = %action.name,
                callback_fields = action.callback_field_count(),
                "Invalid remote action specification"
            );
        }

        if !self.data.hints.contains_key(HINT_OWNER) {
            self.data.hints.insert(HINT_OWNER, process_name());
        }

        // Previews fall back to summary/body unless set, even to an empty value
        let mut data = self.data.clone();
        if !data.hints.contains_key(HINT_PREVIEW_SUMMARY) {
            data.hints.insert(HINT_PREVIEW_SUMMARY, data.summary.clone());
        }
        if !data.hints.contains_key(HINT_PREVIEW_BODY) {
            data.hints.insert(HINT_PREVIEW_BODY, data.body.clone());
        }
        data
    }

    /// Asks the manager to close this notification. The id resets to 0 immediately.
    pub async fn close(&mut self) {
        let id = self.data.replaces_id;
        if id == 0 {
            return;
        }
        let reply = self.backend.close_notification(id).await;
        self.apply_close_reply(id, reply);
    }

    /// [`Notification::close`] for a shared notification, without holding its borrow
    /// across the manager call.
    pub async fn close_shared(notification: &SharedNotification) {
        let (id, backend) = {
            let n = notification.borrow();
            (n.data.replaces_id, Arc::clone(&n.backend))
        };
        if id == 0 {
            return;
        }
        let reply = backend.close_notification(id).await;
        notification.borrow_mut().apply_close_reply(id, reply);
    }

    fn apply_close_reply(&mut self, id: u32, reply: Result<(), NotifyError>) {
        if let Err(e) = reply {
            warn!(id, error = %e, "Unable to close notification");
        }
        self.set_replaces_id(0);
    }

    /// Applies a manager signal. Returns whether it was addressed to this notification.
    pub fn handle_signal(&mut self, signal: &ServiceSignal) -> bool {
        let id = self.data.replaces_id;
        if id == 0 || signal.id() != id {
            return false;
        }

        match signal {
            ServiceSignal::ActionInvoked { action_key, .. } => self.action_invoked(action_key),
            ServiceSignal::NotificationClosed { reason, .. } => {
                self.emit(NotificationEvent::Closed(*reason));
                self.set_replaces_id(0);
            }
            ServiceSignal::InputTextSet { text, .. } => {
                if *text != self.input_text {
                    self.input_text = text.clone();
                }
            }
        }
        true
    }

    fn action_invoked(&self, action_key: &str) {
        let action = self
            .remote_actions
            .iter()
            .find(|a| !a.name.is_empty() && a.name == action_key);

        if let Some(action) = action {
            match &action.input {
                Some(input) if input.accepts(&self.input_text) => {
                    self.emit(NotificationEvent::InputActionInvoked {
                        name: action_key.to_owned(),
                        text: self.input_text.clone(),
                    });
                }
                Some(_) => {
                    debug!(action = action_key, "Dropping input action without acceptable input");
                }
                None => self.emit(NotificationEvent::ActionInvoked(action_key.to_owned())),
            }
        }

        if action_key == DEFAULT_ACTION_NAME {
            self.emit(NotificationEvent::Clicked);
        }
    }

    // ----- Queries -----

    /// Notifications currently held by the manager for this process.
    pub async fn notifications(backend: Arc<dyn NotificationBackend>) -> Vec<Notification> {
        Self::notifications_by_owner(backend, &process_name()).await
    }

    pub async fn notifications_by_owner(
        backend: Arc<dyn NotificationBackend>,
        owner: &str,
    ) -> Vec<Notification> {
        match backend.get_notifications(owner).await {
            Ok(list) => Self::wrap_all(list, &backend),
            Err(e) => {
                warn!(owner, error = %e, "Unable to fetch notifications");
                Vec::new()
            }
        }
    }

    pub async fn notifications_by_category(
        backend: Arc<dyn NotificationBackend>,
        category: &str,
    ) -> Vec<Notification> {
        match backend.get_notifications_by_category(category).await {
            Ok(list) => Self::wrap_all(list, &backend),
            Err(e) => {
                warn!(category, error = %e, "Unable to fetch notifications");
                Vec::new()
            }
        }
    }

    fn wrap_all(
        list: Vec<NotificationData>,
        backend: &Arc<dyn NotificationBackend>,
    ) -> Vec<Notification> {
        list.into_iter()
            .map(|data| Self::from_data(data, Arc::clone(backend)))
            .collect()
    }
}
impl Default for Notification {
    fn default() -> Self {
        Self::new()
    }
}

fn replace_if_changed(field: &mut String, value: &str) -> bool {
    if field == value {
        return false;
    }
    *field = value.to_owned();
    true
}

#[cfg(test)]
#[allow(deprecated)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    };

    use async_trait::async_trait;
    use common::{
        actions::{ActionInfo, encode_action_hints},
        utils::errors::{NotifyError, NotifyErrorKind},
    };
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    #[derive(Default)]
    struct FakeBackend {
        next_id: AtomicU32,
        published: Mutex<Vec<NotificationData>>,
        closed: Mutex<Vec<u32>>,
        stored: Mutex<Vec<NotificationData>>,
        offline: bool,
    }
    impl FakeBackend {
        fn offline() -> Self {
            Self {
                offline: true,
                ..Default::default()
            }
        }
        fn last_published(&self) -> NotificationData {
            self.published.lock().unwrap().last().cloned().unwrap()
        }
        fn check_online(&self) -> Result<(), NotifyError> {
            if self.offline {
                return Err(common::notify_err!(NotifyErrorKind::DBusConnect, "offline"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl NotificationBackend for FakeBackend {
        async fn notify(&self, data: &NotificationData) -> Result<u32, NotifyError> {
            self.check_online()?;
            self.published.lock().unwrap().push(data.clone());
            if data.replaces_id != 0 {
                return Ok(data.replaces_id);
            }
            Ok(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
        }
        async fn close_notification(&self, id: u32) -> Result<(), NotifyError> {
            self.check_online()?;
            self.closed.lock().unwrap().push(id);
            Ok(())
        }
        async fn get_notifications(&self, owner: &str) -> Result<Vec<NotificationData>, NotifyError> {
            Ok(self
                .stored
                .lock()
                .unwrap()
                .iter()
                .filter(|n| n.hints.string(HINT_OWNER) == owner)
                .cloned()
                .collect())
        }
        async fn get_notifications_by_category(
            &self,
            category: &str,
        ) -> Result<Vec<NotificationData>, NotifyError> {
            Ok(self
                .stored
                .lock()
                .unwrap()
                .iter()
                .filter(|n| n.hints.string(HINT_CATEGORY) == category)
                .cloned()
                .collect())
        }
    }

    fn setup() -> (Arc<FakeBackend>, Notification) {
        let backend = Arc::new(FakeBackend::default());
        let notification = Notification::with_backend(backend.clone());
        (backend, notification)
    }

    fn drain(rx: &mut broadcast::Receiver<NotificationEvent>) -> Vec<NotificationEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
        events
    }

    fn choice_action() -> RemoteAction {
        RemoteAction::new("answer", "Answer").with_input(
            "Pick one",
            false,
            vec!["Yes".into(), "No".into()],
        )
    }

    #[test]
    fn new_notification_defaults() {
        let (_, n) = setup();
        assert_eq!(n.replaces_id(), 0);
        assert_eq!(n.urgency(), Urgency::Normal);
        assert_eq!(n.hint_value(HINT_URGENCY), Some(&HintValue::Int(1)));
        assert_eq!(n.expire_timeout(), -1);
        assert!(n.progress().is_none());
    }

    #[test]
    fn urgency_is_clamped_on_read() {
        let (_, mut n) = setup();
        n.set_hint_value(HINT_URGENCY, 5i32);
        assert_eq!(n.urgency(), Urgency::Critical);
        n.set_hint_value(HINT_URGENCY, -3i32);
        assert_eq!(n.urgency(), Urgency::Low);
    }

    #[test]
    fn setters_only_report_real_changes() {
        let (_, mut n) = setup();
        let mut rx = n.subscribe();

        n.set_summary("Hello");
        n.set_summary("Hello");
        n.set_urgency(Urgency::Normal);
        n.set_category("x-nemo.example");
        n.set_category("x-nemo.example");
        n.set_item_count(0);
        n.set_item_count(3);

        assert_eq!(
            drain(&mut rx),
            [
                NotificationEvent::Changed(Property::Summary),
                NotificationEvent::Changed(Property::Category),
                NotificationEvent::Changed(Property::ItemCount),
            ]
        );
    }

    #[test]
    fn progress_is_stored_as_double() {
        let (_, mut n) = setup();
        n.set_progress(1i32);
        assert_eq!(n.hint_value(HINT_PROGRESS), Some(&HintValue::Double(1.0)));
        n.set_progress(PROGRESS_INDETERMINATE);
        assert_eq!(n.progress(), Some(-1.0));
        n.reset_progress();
        assert!(n.hint_value(HINT_PROGRESS).is_none());
    }

    #[test]
    fn timestamp_is_stored_as_iso_string() {
        let (_, mut n) = setup();
        let ts = DateTime::parse_from_rfc3339("2013-02-20T18:21:00+01:00").unwrap();
        n.set_timestamp(ts);
        assert_eq!(
            n.hint_value(HINT_TIMESTAMP),
            Some(&HintValue::from("2013-02-20T18:21:00+01:00"))
        );
        assert_eq!(n.timestamp(), Some(ts));
    }

    #[tokio::test]
    async fn publish_defaults_previews_from_summary_and_body() {
        let (backend, mut n) = setup();
        n.set_summary("S");
        n.set_body("B");

        assert!(n.publish().await);
        let sent = backend.last_published();
        assert_eq!(sent.hints.string(HINT_PREVIEW_SUMMARY), "S");
        assert_eq!(sent.hints.string(HINT_PREVIEW_BODY), "B");
        // Defaults are not written back into the local record
        assert!(n.hint_value(HINT_PREVIEW_SUMMARY).is_none());
        assert_eq!(n.replaces_id(), 1);
    }

    #[tokio::test]
    async fn publish_respects_explicit_empty_preview() {
        let (backend, mut n) = setup();
        n.set_summary("S");
        n.set_body("B");
        n.set_preview_summary("");

        n.publish().await;
        let sent = backend.last_published();
        assert_eq!(sent.hints.string(HINT_PREVIEW_SUMMARY), "");
        assert_eq!(sent.hints.string(HINT_PREVIEW_BODY), "B");
    }

    #[tokio::test]
    async fn owner_hint_is_set_once() {
        let (backend, mut n) = setup();
        n.publish().await;
        assert_eq!(backend.last_published().hints.string(HINT_OWNER), process_name());

        let (backend, mut n) = setup();
        n.set_hint_value(HINT_OWNER, "someone-else");
        n.publish().await;
        n.publish().await;
        assert_eq!(backend.last_published().hints.string(HINT_OWNER), "someone-else");
        assert_eq!(backend.published.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn republish_keeps_the_assigned_id() {
        let (backend, mut n) = setup();
        n.publish().await;
        n.set_body("updated");
        n.publish().await;

        assert_eq!(n.replaces_id(), 1);
        assert_eq!(backend.last_published().replaces_id, 1);
    }

    #[tokio::test]
    async fn failed_publish_keeps_state() {
        let backend = Arc::new(FakeBackend::offline());
        let mut n = Notification::with_backend(backend);
        assert!(!n.publish().await);
        assert_eq!(n.replaces_id(), 0);
    }

    #[tokio::test]
    async fn close_resets_id() {
        let (backend, mut n) = setup();
        n.close().await;
        assert!(backend.closed.lock().unwrap().is_empty());

        n.publish().await;
        n.close().await;
        assert_eq!(n.replaces_id(), 0);
        assert_eq!(*backend.closed.lock().unwrap(), [1]);

        n.publish().await;
        assert_eq!(n.replaces_id(), 2);
    }

    #[tokio::test]
    async fn close_is_optimistic_when_manager_fails() {
        let backend = Arc::new(FakeBackend::offline());
        let mut n = Notification::with_backend(backend);
        n.set_replaces_id(9);
        n.close().await;
        assert_eq!(n.replaces_id(), 0);
    }

    #[test]
    fn closed_signal_resets_id_and_emits() {
        let (_, mut n) = setup();
        n.set_replaces_id(4);
        let mut rx = n.subscribe();

        assert!(!n.handle_signal(&ServiceSignal::NotificationClosed {
            id: 5,
            reason: CloseReason::Expired,
        }));
        assert!(n.handle_signal(&ServiceSignal::NotificationClosed {
            id: 4,
            reason: CloseReason::DismissedByUser,
        }));

        assert_eq!(n.replaces_id(), 0);
        assert_eq!(
            drain(&mut rx),
            [
                NotificationEvent::Closed(CloseReason::DismissedByUser),
                NotificationEvent::Changed(Property::ReplacesId),
            ]
        );
    }

    #[test]
    fn unpublished_notifications_ignore_signals() {
        let (_, mut n) = setup();
        assert!(!n.handle_signal(&ServiceSignal::ActionInvoked {
            id: 0,
            action_key: "default".into(),
        }));
    }

    #[test]
    fn input_action_is_gated_on_choices() {
        let (_, mut n) = setup();
        n.set_remote_actions(vec![choice_action()]);
        n.set_replaces_id(3);
        let mut rx = n.subscribe();

        n.handle_signal(&ServiceSignal::InputTextSet {
            id: 3,
            text: "Maybe".into(),
        });
        assert_eq!(n.input_text(), "Maybe");
        n.handle_signal(&ServiceSignal::ActionInvoked {
            id: 3,
            action_key: "answer".into(),
        });
        assert!(drain(&mut rx).is_empty());

        n.handle_signal(&ServiceSignal::InputTextSet {
            id: 3,
            text: "Yes".into(),
        });
        n.handle_signal(&ServiceSignal::ActionInvoked {
            id: 3,
            action_key: "answer".into(),
        });
        assert_eq!(
            drain(&mut rx),
            [NotificationEvent::InputActionInvoked {
                name: "answer".into(),
                text: "Yes".into(),
            }]
        );
    }

    #[test]
    fn editable_input_accepts_free_text() {
        let (_, mut n) = setup();
        n.set_remote_action(RemoteAction::new("reply", "Reply").with_input(
            "Message",
            true,
            vec!["Ok".into()],
        ));
        n.set_replaces_id(3);
        let mut rx = n.subscribe();

        n.handle_signal(&ServiceSignal::ActionInvoked {
            id: 3,
            action_key: "reply".into(),
        });
        n.handle_signal(&ServiceSignal::InputTextSet {
            id: 3,
            text: "On my way".into(),
        });
        n.handle_signal(&ServiceSignal::ActionInvoked {
            id: 3,
            action_key: "reply".into(),
        });
        assert_eq!(
            drain(&mut rx),
            [NotificationEvent::InputActionInvoked {
                name: "reply".into(),
                text: "On my way".into(),
            }]
        );
    }

    #[test]
    fn default_action_always_clicks() {
        let (_, mut n) = setup();
        n.set_remote_actions(vec![
            RemoteAction::new("default", "Open").with_input("Pick", false, vec!["Yes".into()]),
        ]);
        n.set_replaces_id(8);
        let mut rx = n.subscribe();

        n.handle_signal(&ServiceSignal::ActionInvoked {
            id: 8,
            action_key: "default".into(),
        });
        assert_eq!(drain(&mut rx), [NotificationEvent::Clicked]);
    }

    #[test]
    fn plain_action_is_reported() {
        let (_, mut n) = setup();
        n.set_remote_actions(vec![
            RemoteAction::new("default", "Open"),
            RemoteAction::new("later", "Later"),
        ]);
        n.set_replaces_id(2);
        let mut rx = n.subscribe();

        n.handle_signal(&ServiceSignal::ActionInvoked {
            id: 2,
            action_key: "later".into(),
        });
        n.handle_signal(&ServiceSignal::ActionInvoked {
            id: 2,
            action_key: "default".into(),
        });
        n.handle_signal(&ServiceSignal::ActionInvoked {
            id: 2,
            action_key: "unknown".into(),
        });
        assert_eq!(
            drain(&mut rx),
            [
                NotificationEvent::ActionInvoked("later".into()),
                NotificationEvent::ActionInvoked("default".into()),
                NotificationEvent::Clicked,
            ]
        );
    }

    #[test]
    fn replacing_remote_actions_drops_old_hints() {
        let (_, mut n) = setup();
        n.set_remote_actions(vec![
            RemoteAction::new("open", "Open")
                .with_icon("icon-open")
                .with_callback(CallbackTarget::new("svc", "/p", "iface", "open")),
        ]);
        assert!(n.hint_value("x-nemo-remote-action-open").is_some());

        n.set_remote_actions(vec![RemoteAction::new("dismiss", "Dismiss")]);
        assert!(n.hint_value("x-nemo-remote-action-open").is_none());
        assert!(n.hint_value("x-nemo-remote-action-icon-open").is_none());
        assert_eq!(n.data().actions, [ActionInfo::new("dismiss", "Dismiss")]);
    }

    #[test]
    fn deprecated_callback_setters_build_default_action() {
        let (_, mut n) = setup();
        n.set_remote_dbus_call_service_name("org.example");
        n.set_remote_dbus_call_object_path("/example");
        n.set_remote_dbus_call_interface("org.example.Iface");
        n.set_remote_dbus_call_method_name("open");
        n.set_remote_dbus_call_arguments(vec![HintValue::from(1i32)]);

        assert_eq!(n.remote_actions().len(), 1);
        assert_eq!(n.remote_actions()[0].name, "default");
        assert_eq!(n.remote_dbus_call_method_name(), "open");
        assert_eq!(n.remote_dbus_call_arguments(), [HintValue::from(1i32)]);
        assert!(
            n.hint_value("x-nemo-remote-action-default")
                .and_then(HintValue::as_str)
                .is_some_and(|s| s.starts_with("org.example /example org.example.Iface open "))
        );
    }

    #[tokio::test]
    async fn queried_notifications_decode_remote_actions() {
        let backend = Arc::new(FakeBackend::default());
        let (infos, hints) = encode_action_hints(&[choice_action()]);
        let mut data = NotificationData {
            replaces_id: 12,
            actions: infos,
            hints,
            ..Default::default()
        };
        data.hints.insert(HINT_CATEGORY, "im");
        backend.stored.lock().unwrap().push(data);

        let found = Notification::notifications_by_category(backend.clone(), "im").await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].replaces_id(), 12);
        assert_eq!(found[0].remote_actions()[0].input, choice_action().input);

        assert!(Notification::notifications(backend).await.is_empty());
    }
}
