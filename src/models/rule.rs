use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleProperties {
    pub cwe: Option<String>,
    pub wasc: Option<String>,
    pub risk_category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One vulnerability class as described by the tool that reported it.
/// Emitted once per rule id per normalized report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    pub id: String,
    pub short_description: String,
    pub full_description: String,
    pub help_text: String,
    /// Reference links rendered as markdown.
    #[serde(default)]
    pub help_markdown: String,
    pub properties: RuleProperties,
}
