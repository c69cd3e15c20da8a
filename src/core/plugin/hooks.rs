//! The hook catalogue: named extension points in the traversal lifecycle
//! and the typed payload each one carries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::engine::{CurrentNode, ResolvedChoice};
use crate::schema::save::SaveState;

/// A named extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HookName {
    #[serde(rename = "engine:start")]
    EngineStart,
    #[serde(rename = "node:before-enter")]
    NodeBeforeEnter,
    #[serde(rename = "node:after-enter")]
    NodeAfterEnter,
    #[serde(rename = "node:before-leave")]
    NodeBeforeLeave,
    #[serde(rename = "choice:filter")]
    ChoiceFilter,
    #[serde(rename = "content:process")]
    ContentProcess,
    #[serde(rename = "content:render")]
    ContentRender,
    #[serde(rename = "choice:before-select")]
    ChoiceBeforeSelect,
    #[serde(rename = "choice:select")]
    ChoiceSelect,
    #[serde(rename = "data:save")]
    DataSave,
    #[serde(rename = "data:load")]
    DataLoad,
}

impl HookName {
    pub const ALL: [HookName; 11] = [
        HookName::EngineStart,
        HookName::NodeBeforeEnter,
        HookName::NodeAfterEnter,
        HookName::NodeBeforeLeave,
        HookName::ChoiceFilter,
        HookName::ContentProcess,
        HookName::ContentRender,
        HookName::ChoiceBeforeSelect,
        HookName::ChoiceSelect,
        HookName::DataSave,
        HookName::DataLoad,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookName::EngineStart => "engine:start",
            HookName::NodeBeforeEnter => "node:before-enter",
            HookName::NodeAfterEnter => "node:after-enter",
            HookName::NodeBeforeLeave => "node:before-leave",
            HookName::ChoiceFilter => "choice:filter",
            HookName::ContentProcess => "content:process",
            HookName::ContentRender => "content:render",
            HookName::ChoiceBeforeSelect => "choice:before-select",
            HookName::ChoiceSelect => "choice:select",
            HookName::DataSave => "data:save",
            HookName::DataLoad => "data:load",
        }
    }

    /// Notification hooks: their output is ignored by the engine.
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            HookName::EngineStart
                | HookName::NodeBeforeEnter
                | HookName::NodeAfterEnter
                | HookName::NodeBeforeLeave
                | HookName::ChoiceBeforeSelect
                | HookName::ChoiceSelect
        )
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookName::ALL
            .iter()
            .copied()
            .find(|h| h.as_str() == s)
            .ok_or_else(|| format!("unknown hook '{}'", s))
    }
}

/// Data passed through a hook. Handlers receive the previous handler's
/// output and must return the same variant.
#[derive(Debug, Clone, PartialEq)]
pub enum HookPayload {
    EngineStart,
    NodeBeforeEnter {
        node_id: String,
    },
    NodeAfterEnter {
        node_id: String,
        node: CurrentNode,
    },
    NodeBeforeLeave {
        node_id: String,
    },
    ChoiceFilter {
        node_id: String,
        choices: Vec<ResolvedChoice>,
    },
    ContentProcess {
        node_id: String,
        text: String,
    },
    ContentRender {
        node_id: String,
        text: String,
        available_choices: Vec<ResolvedChoice>,
        /// Filled in by a renderer; `None` until one runs.
        rendered_html: Option<String>,
    },
    ChoiceBeforeSelect {
        choice_id: String,
        target_node_id: String,
    },
    ChoiceSelect {
        choice_id: String,
        node_id: String,
    },
    DataSave(SaveState),
    DataLoad(SaveState),
}

impl HookPayload {
    pub fn hook(&self) -> HookName {
        match self {
            HookPayload::EngineStart => HookName::EngineStart,
            HookPayload::NodeBeforeEnter { .. } => HookName::NodeBeforeEnter,
            HookPayload::NodeAfterEnter { .. } => HookName::NodeAfterEnter,
            HookPayload::NodeBeforeLeave { .. } => HookName::NodeBeforeLeave,
            HookPayload::ChoiceFilter { .. } => HookName::ChoiceFilter,
            HookPayload::ContentProcess { .. } => HookName::ContentProcess,
            HookPayload::ContentRender { .. } => HookName::ContentRender,
            HookPayload::ChoiceBeforeSelect { .. } => HookName::ChoiceBeforeSelect,
            HookPayload::ChoiceSelect { .. } => HookName::ChoiceSelect,
            HookPayload::DataSave(_) => HookName::DataSave,
            HookPayload::DataLoad(_) => HookName::DataLoad,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_strings() {
        for hook in HookName::ALL {
            assert_eq!(hook.as_str().parse::<HookName>(), Ok(hook));
        }
        assert!("node:enter".parse::<HookName>().is_err());
    }

    #[test]
    fn serde_uses_catalogue_names() {
        let json = serde_json::to_string(&HookName::ChoiceBeforeSelect).unwrap();
        assert_eq!(json, "\"choice:before-select\"");
    }

    #[test]
    fn payload_reports_its_hook() {
        let payload = HookPayload::ContentProcess {
            node_id: "1".into(),
            text: "hi".into(),
        };
        assert_eq!(payload.hook(), HookName::ContentProcess);
        assert!(!payload.hook().is_event());
        assert!(HookPayload::EngineStart.hook().is_event());
    }
}
