//! Assistant personas and the single typed extraction step that resolves
//! which persona a request addresses.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssistantType {
    #[serde(rename = "changeManagement")]
    ChangeManagement,
    #[serde(rename = "changePlanning")]
    ChangePlanning,
}

impl Default for AssistantType {
    fn default() -> Self {
        AssistantType::ChangeManagement
    }
}

impl AssistantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssistantType::ChangeManagement => "changeManagement",
            AssistantType::ChangePlanning => "changePlanning",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AssistantType::ChangeManagement => "Change Management Assistant",
            AssistantType::ChangePlanning => "Change Planning Assistant",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AssistantType::ChangeManagement => {
                "Get help with managing change processes and implementation"
            }
            AssistantType::ChangePlanning => {
                "Advanced planning tools for organizational change management"
            }
        }
    }

    pub fn parse(value: &str) -> Option<AssistantType> {
        match value {
            "changeManagement" => Some(AssistantType::ChangeManagement),
            "changePlanning" => Some(AssistantType::ChangePlanning),
            _ => None,
        }
    }

    pub fn all() -> &'static [AssistantType] {
        &[
            AssistantType::ChangeManagement,
            AssistantType::ChangePlanning,
        ]
    }
}

/// Resolves the assistant type from a request in one place, with one defined
/// precedence order: query `assistantType`, query `type`, query `assistant`,
/// then body `assistantType`, body `type`, body `data.assistantType`.
/// Invalid or absent values resolve to the default persona.
pub fn resolve_assistant_type(
    query: &HashMap<String, String>,
    body: Option<&Value>,
) -> AssistantType {
    let candidates = [
        query.get("assistantType").map(String::as_str),
        query.get("type").map(String::as_str),
        query.get("assistant").map(String::as_str),
        body.and_then(|b| b.get("assistantType")).and_then(Value::as_str),
        body.and_then(|b| b.get("type")).and_then(Value::as_str),
        body.and_then(|b| b.pointer("/data/assistantType"))
            .and_then(Value::as_str),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(AssistantType::parse)
        .unwrap_or_default()
}
