use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU32, Ordering},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    callback::CallbackTarget,
    hints::{
        HINT_REMOTE_ACTION_ICON_PREFIX, HINT_REMOTE_ACTION_INPUT_PREFIX,
        HINT_REMOTE_ACTION_PREFIX, HINT_REMOTE_ACTION_TYPE_PREFIX, HintValue, Hints,
    },
};

/// Action name invoked by a plain click on the notification.
pub const DEFAULT_ACTION_NAME: &str = "default";
/// Kind assigned to actions that carry an input block.
pub const INPUT_ACTION_KIND: &str = "input";

static AUTO_ACTION_COUNTER: AtomicU32 = AtomicU32::new(0);

/// An action as carried in the `Notify` action list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionInfo {
    pub name: String,
    pub display_name: String,
}
impl ActionInfo {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
        }
    }
}

/// Flattens actions into alternating name / display name tokens.
pub fn encode_actions(actions: &[ActionInfo]) -> Vec<String> {
    actions
        .iter()
        .flat_map(|a| [a.name.clone(), a.display_name.clone()])
        .collect()
}

/// Pairs up flattened tokens. An unpaired trailing name gets an empty display name.
pub fn decode_actions<S: AsRef<str>>(tokens: &[S]) -> Vec<ActionInfo> {
    tokens
        .chunks(2)
        .map(|pair| ActionInfo {
            name: pair[0].as_ref().to_owned(),
            display_name: pair
                .get(1)
                .map(|d| d.as_ref().to_owned())
                .unwrap_or_default(),
        })
        .collect()
}

pub fn remote_action_hint(name: &str) -> String {
    format!("{HINT_REMOTE_ACTION_PREFIX}{name}")
}
pub fn remote_action_icon_hint(name: &str) -> String {
    format!("{HINT_REMOTE_ACTION_ICON_PREFIX}{name}")
}
pub fn remote_action_input_hint(name: &str) -> String {
    format!("{HINT_REMOTE_ACTION_INPUT_PREFIX}{name}")
}
pub fn remote_action_type_hint(name: &str) -> String {
    format!("{HINT_REMOTE_ACTION_TYPE_PREFIX}{name}")
}

/// Text input requested from the user before an action may fire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionInput {
    pub label: String,
    pub editable: bool,
    /// `None` when no choice list was declared at all.
    pub choices: Option<Vec<String>>,
}
impl ActionInput {
    pub fn new(label: impl Into<String>, editable: bool, choices: Vec<String>) -> Self {
        Self {
            label: label.into(),
            editable,
            choices: Some(choices),
        }
    }

    /// Whether `text` satisfies this input block.
    pub fn accepts(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        match &self.choices {
            Some(choices) if !self.editable => choices.iter().any(|c| c == text),
            _ => true,
        }
    }

    pub fn to_hint(&self) -> HintValue {
        let mut map = BTreeMap::new();
        map.insert("label".to_string(), HintValue::from(self.label.clone()));
        map.insert("editable".to_string(), HintValue::from(self.editable));
        if let Some(choices) = &self.choices {
            map.insert("choices".to_string(), HintValue::from(choices.clone()));
        }
        HintValue::Map(map)
    }

    /// Anything other than a map decodes to an empty input block.
    pub fn from_hint(value: &HintValue) -> Self {
        let Some(map) = value.as_map() else {
            return Self::default();
        };
        Self {
            label: map
                .get("label")
                .and_then(HintValue::to_text)
                .unwrap_or_default(),
            editable: map
                .get("editable")
                .and_then(HintValue::to_bool)
                .unwrap_or(false),
            choices: map.get("choices").map(HintValue::to_string_list),
        }
    }
}

/// Client-side action description, richer than [`ActionInfo`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RemoteAction {
    pub name: String,
    pub display_name: String,
    pub icon: String,
    pub callback: Option<CallbackTarget>,
    pub input: Option<ActionInput>,
    /// Transmitted as the `type` of the action.
    pub kind: String,
}
impl RemoteAction {
    /// An empty `name` is replaced by a generated `action_<unix-time>_<n>`.
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        let mut name = name.into();
        if name.is_empty() {
            let n = AUTO_ACTION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
            name = format!("action_{}_{}", chrono::Utc::now().timestamp(), n);
        }
        Self {
            name,
            display_name: display_name.into(),
            ..Default::default()
        }
    }
    pub fn with_callback(mut self, callback: CallbackTarget) -> Self {
        self.callback = Some(callback);
        self
    }
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }
    pub fn with_input(mut self, label: impl Into<String>, editable: bool, choices: Vec<String>) -> Self {
        self.input = Some(ActionInput::new(label, editable, choices));
        self
    }
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn callback_field_count(&self) -> usize {
        self.callback.as_ref().map_or(0, CallbackTarget::field_count)
    }

    /// A usable action is named and has either no callback or a complete one.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && matches!(self.callback_field_count(), 0 | 4)
    }
}

/// Splits remote actions into the wire action list and the hints describing them.
///
/// Unnamed actions are dropped.
pub fn encode_action_hints(actions: &[RemoteAction]) -> (Vec<ActionInfo>, Hints) {
    let mut infos = Vec::with_capacity(actions.len());
    let mut hints = Hints::new();

    for action in actions.iter().filter(|a| !a.name.is_empty()) {
        let name = action.name.as_str();
        infos.push(ActionInfo::new(name, action.display_name.clone()));

        if let Some(callback) = action.callback.as_ref().filter(|c| c.is_complete()) {
            match callback.encode() {
                Ok(encoded) => {
                    hints.insert(remote_action_hint(name), encoded);
                }
                Err(e) => warn!(action = name, error = %e, "Unable to encode remote action"),
            }
        }
        if !action.icon.is_empty() {
            hints.insert(remote_action_icon_hint(name), action.icon.clone());
        }

        let mut kind = action.kind.clone();
        if let Some(input) = &action.input {
            hints.insert(remote_action_input_hint(name), input.to_hint());
            if kind.is_empty() {
                kind = INPUT_ACTION_KIND.into();
            }
        }
        if !kind.is_empty() {
            hints.insert(remote_action_type_hint(name), kind);
        }
    }

    (infos, hints)
}

/// Rebuilds remote actions from the wire action list and hints, in list order.
///
/// A missing or unusable callback hint leaves `callback` empty; such actions
/// are still returned. The `type` hint is decoded as well.
pub fn decode_action_hints(actions: &[ActionInfo], hints: &Hints) -> Vec<RemoteAction> {
    actions
        .iter()
        .filter(|info| !info.name.is_empty())
        .map(|info| {
            let name = info.name.as_str();
            let callback = hints
                .get(&remote_action_hint(name))
                .and_then(HintValue::to_text)
                .filter(|hint| !hint.is_empty())
                .and_then(|hint| match CallbackTarget::decode(&hint) {
                    Ok(target) => target,
                    Err(e) => {
                        warn!(action = name, error = %e, "Unable to decode remote action arguments");
                        None
                    }
                });

            RemoteAction {
                name: info.name.clone(),
                display_name: info.display_name.clone(),
                icon: hints.string(&remote_action_icon_hint(name)),
                callback,
                input: hints
                    .get(&remote_action_input_hint(name))
                    .map(ActionInput::from_hint),
                kind: hints.string(&remote_action_type_hint(name)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infos(pairs: &[(&str, &str)]) -> Vec<ActionInfo> {
        pairs.iter().map(|(n, d)| ActionInfo::new(*n, *d)).collect()
    }

    #[test]
    fn flat_actions_round_trip() {
        let actions = infos(&[("default", "Open"), ("reply", "Reply"), ("x", "")]);
        let encoded = encode_actions(&actions);
        assert_eq!(encoded, ["default", "Open", "reply", "Reply", "x", ""]);
        assert_eq!(decode_actions(&encoded), actions);
    }

    #[test]
    fn odd_token_count_pads_display_name() {
        assert_eq!(
            decode_actions(&["a", "b", "c"]),
            infos(&[("a", "b"), ("c", "")])
        );
        assert!(decode_actions::<&str>(&[]).is_empty());
    }

    #[test]
    fn encodes_all_action_hints() {
        let action = RemoteAction::new("reply", "Reply")
            .with_icon("icon-s-reply")
            .with_callback(CallbackTarget::new("svc", "/p", "iface", "reply"))
            .with_input("Message", true, vec![]);

        let (infos, hints) = encode_action_hints(&[action]);
        assert_eq!(infos, [ActionInfo::new("reply", "Reply")]);
        assert_eq!(hints.string("x-nemo-remote-action-reply"), "svc /p iface reply");
        assert_eq!(hints.string("x-nemo-remote-action-icon-reply"), "icon-s-reply");
        assert_eq!(hints.string("x-nemo-remote-action-type-reply"), "input");
        assert!(hints.get("x-nemo-remote-action-input-reply").is_some());
    }

    #[test]
    fn skips_unnamed_actions_and_partial_callbacks() {
        let unnamed = RemoteAction {
            display_name: "Nothing".into(),
            ..Default::default()
        };
        let partial = RemoteAction::new("open", "Open").with_callback(CallbackTarget {
            service: "svc".into(),
            ..Default::default()
        });

        let (infos, hints) = encode_action_hints(&[unnamed, partial]);
        assert_eq!(infos, [ActionInfo::new("open", "Open")]);
        assert!(hints.is_empty());
    }

    #[test]
    fn remote_actions_round_trip_through_hints() {
        let actions = vec![
            RemoteAction::new("default", "Do something")
                .with_icon("icon-s-do-it")
                .with_callback(
                    CallbackTarget::new("org.example", "/example", "org.example", "doSomething")
                        .with_arguments(vec![HintValue::from("argument"), HintValue::from(1i32)]),
                ),
            RemoteAction::new("ignore", "Ignore").with_input(
                "Please select",
                false,
                vec!["Yes".into(), "No".into()],
            ),
        ];

        let (infos, hints) = encode_action_hints(&actions);
        let decoded = decode_action_hints(&infos, &hints);

        assert_eq!(decoded[0], actions[0]);
        assert_eq!(decoded[1].input, actions[1].input);
        assert_eq!(decoded[1].kind, INPUT_ACTION_KIND);
        assert!(decoded[1].callback.is_none());
    }

    #[test]
    fn invalid_callback_hint_keeps_action() {
        let mut hints = Hints::new();
        hints.insert(remote_action_hint("open"), "only three tokens");
        hints.insert(remote_action_hint("broken"), "svc /p iface m %%%");
        // String argument whose length prefix claims u64::MAX bytes
        hints.insert(remote_action_hint("huge"), "svc /p iface m B/3//////////w==");

        let decoded = decode_action_hints(
            &infos(&[("open", "Open"), ("broken", "Broken"), ("huge", "Huge")]),
            &hints,
        );
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].display_name, "Open");
        assert!(decoded.iter().all(|a| a.callback.is_none()));
    }

    #[test]
    fn input_gating() {
        let strict = ActionInput::new("Pick", false, vec!["Yes".into(), "No".into()]);
        assert!(strict.accepts("Yes"));
        assert!(!strict.accepts("Maybe"));
        assert!(!strict.accepts(""));

        let editable = ActionInput::new("Pick", true, vec!["Yes".into()]);
        assert!(editable.accepts("Maybe"));

        let free = ActionInput::from_hint(&HintValue::from("not a map"));
        assert!(free.accepts("anything"));
        assert!(!free.accepts(""));
    }

    #[test]
    fn generated_names_are_unique() {
        let a = RemoteAction::new("", "A");
        let b = RemoteAction::new("", "B");
        assert!(a.name.starts_with("action_"));
        assert_ne!(a.name, b.name);
    }
}
