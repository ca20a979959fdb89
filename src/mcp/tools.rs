//! The tool surface: `create_flowchart`, `create_sankey`, `get_syntax_help`.
//!
//! Tools are a closed set. Names coming off the wire are resolved with
//! [`Tool::from_name`]; anything else is answered with an error-flagged
//! result rather than a protocol error, so the client always gets a reply.
//!
//! Arguments are deserialised with serde (the schema check) and then
//! validated for the constraints serde cannot express. Both failures become
//! error-flagged tool results.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::chart::{js_number, syntax, Flow, LinkBuilder, SyntaxTopic};
use crate::error::ValidationError;

/// Lines or flows shown in a response preview.
const PREVIEW_LIMIT: usize = 10;

/// A tool definition for the `tools/list` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Returns the text of the first content item.
    #[must_use]
    pub fn first_text(&self) -> &str {
        match self.content.first() {
            Some(ToolContent::Text { text }) => text,
            None => "",
        }
    }
}

/// The tools this server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Encode a flowchart outline into a share link.
    CreateFlowchart,
    /// Render flows into Sankey source and encode a share link.
    CreateSankey,
    /// Return the DSL reference.
    GetSyntaxHelp,
}

impl Tool {
    /// Every tool, in listing order.
    pub const ALL: [Self; 3] = [Self::CreateFlowchart, Self::CreateSankey, Self::GetSyntaxHelp];

    /// Wire name of the tool.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CreateFlowchart => "create_flowchart",
            Self::CreateSankey => "create_sankey",
            Self::GetSyntaxHelp => "get_syntax_help",
        }
    }

    /// Resolves a wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    /// Returns the `tools/list` entry for this tool.
    #[must_use]
    pub fn definition(self) -> ToolDefinition {
        match self {
            Self::CreateFlowchart => ToolDefinition {
                name: self.name(),
                description: "Create a flowchart on chhart.app using text-based DSL syntax. \
                              Returns a shareable URL to view and edit the flowchart.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "content": {
                            "type": "string",
                            "description": "Flowchart content in Chhart DSL format (indented outline structure)"
                        },
                        "title": {
                            "type": "string",
                            "description": "Optional title for the flowchart"
                        }
                    },
                    "required": ["content"]
                }),
            },
            Self::CreateSankey => ToolDefinition {
                name: self.name(),
                description: "Create a Sankey diagram on chhart.app showing flows between nodes. \
                              Returns a shareable URL to view and edit the diagram.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "flows": {
                            "type": "array",
                            "description": "Array of flows between nodes",
                            "minItems": 1,
                            "items": {
                                "type": "object",
                                "properties": {
                                    "source": {
                                        "type": "string",
                                        "description": "Source node name"
                                    },
                                    "target": {
                                        "type": "string",
                                        "description": "Target node name"
                                    },
                                    "value": {
                                        "type": "number",
                                        "exclusiveMinimum": 0,
                                        "description": "Flow value/weight (must be positive)"
                                    }
                                },
                                "required": ["source", "target", "value"]
                            }
                        },
                        "title": {
                            "type": "string",
                            "description": "Optional title for the Sankey diagram"
                        }
                    },
                    "required": ["flows"]
                }),
            },
            Self::GetSyntaxHelp => ToolDefinition {
                name: self.name(),
                description: "Get documentation and examples for Chhart's flowchart and Sankey \
                              diagram syntax.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "type": {
                            "type": "string",
                            "enum": ["flowchart", "sankey", "all"],
                            "description": "Which syntax documentation to retrieve",
                            "default": "all"
                        }
                    }
                }),
            },
        }
    }
}

/// Returns the definitions for `tools/list`.
#[must_use]
pub fn definitions() -> Vec<ToolDefinition> {
    Tool::ALL.into_iter().map(Tool::definition).collect()
}

/// Arguments of `create_flowchart`.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowchartInput {
    /// Outline source.
    pub content: String,
    /// Optional diagram title.
    #[serde(default)]
    pub title: Option<String>,
}

impl FlowchartInput {
    /// Rejects blank content.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the content is empty after trimming.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.content.trim().is_empty() {
            return Err(ValidationError::new("Flowchart content cannot be empty"));
        }
        Ok(())
    }
}

/// Arguments of `create_sankey`.
#[derive(Debug, Clone, Deserialize)]
pub struct SankeyInput {
    /// Weighted edges.
    pub flows: Vec<Flow>,
    /// Optional diagram title.
    #[serde(default)]
    pub title: Option<String>,
}

impl SankeyInput {
    /// Requires at least one flow and strictly positive, finite values.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming the first offending flow.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.flows.is_empty() {
            return Err(ValidationError::new("At least one flow is required"));
        }

        for (index, flow) in self.flows.iter().enumerate() {
            if !flow.value.is_finite() || flow.value <= 0.0 {
                return Err(ValidationError::new(format!(
                    "Flow value must be positive (flow {index}: {} → {} = {})",
                    flow.source,
                    flow.target,
                    js_number(flow.value)
                )));
            }
        }
        Ok(())
    }
}

/// Arguments of `get_syntax_help`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyntaxHelpInput {
    /// Which reference to return.
    #[serde(default, rename = "type")]
    pub topic: SyntaxTopic,
}

/// Runs a tool.
///
/// Never fails: malformed or invalid arguments produce an error-flagged
/// result.
#[must_use]
pub fn call(tool: Tool, arguments: &Value, links: &LinkBuilder) -> ToolCallResult {
    let outcome = match tool {
        Tool::CreateFlowchart => {
            parse_arguments::<FlowchartInput>(arguments).map(|input| create_flowchart(&input, links))
        }
        Tool::CreateSankey => {
            parse_arguments::<SankeyInput>(arguments).map(|input| create_sankey(&input, links))
        }
        Tool::GetSyntaxHelp => {
            // An absent argument object means "all".
            if arguments.is_null() {
                Ok(get_syntax_help(&SyntaxHelpInput::default()))
            } else {
                parse_arguments::<SyntaxHelpInput>(arguments).map(|input| get_syntax_help(&input))
            }
        }
    };

    outcome.unwrap_or_else(|e| {
        ToolCallResult::error(format!("Error executing tool {}: {e}", tool.name()))
    })
}

fn parse_arguments<T: DeserializeOwned>(arguments: &Value) -> Result<T, serde_json::Error> {
    T::deserialize(arguments)
}

fn title_line(title: Option<&str>) -> String {
    title
        .filter(|t| !t.is_empty())
        .map(|t| format!("**Title:** {t}\n"))
        .unwrap_or_default()
}

fn create_flowchart(input: &FlowchartInput, links: &LinkBuilder) -> ToolCallResult {
    if let Err(e) = input.validate() {
        return ToolCallResult::error(format!("Error: {e}"));
    }

    let title = input.title.as_deref();
    let url = links.flowchart(&input.content, title);

    let lines: Vec<&str> = input
        .content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    let preview = lines
        .iter()
        .take(PREVIEW_LIMIT)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    let more = if lines.len() > PREVIEW_LIMIT {
        "\n... (truncated)"
    } else {
        ""
    };

    ToolCallResult::text(format!(
        "✅ Flowchart created successfully!\n\n\
         **Shareable URL:**\n{url}\n\n\
         **Preview:**\n```\n{preview}{more}\n```\n\n\
         {title}**Total nodes:** {count}\n\n\
         Open the URL in your browser to view and edit the flowchart on chhart.app.",
        title = title_line(title),
        count = lines.len(),
    ))
}

fn create_sankey(input: &SankeyInput, links: &LinkBuilder) -> ToolCallResult {
    if let Err(e) = input.validate() {
        return ToolCallResult::error(format!("Error: {e}"));
    }

    let title = input.title.as_deref();
    let url = links.sankey(&input.flows, title);

    let preview = input
        .flows
        .iter()
        .take(PREVIEW_LIMIT)
        .map(|f| format!("  {} → {} ({})", f.source, f.target, js_number(f.value)))
        .collect::<Vec<_>>()
        .join("\n");
    let more = if input.flows.len() > PREVIEW_LIMIT {
        "\n  ... (truncated)"
    } else {
        ""
    };

    let total: f64 = input.flows.iter().map(|f| f.value).sum();
    let nodes: HashSet<&str> = input
        .flows
        .iter()
        .flat_map(|f| [f.source.as_str(), f.target.as_str()])
        .collect();

    ToolCallResult::text(format!(
        "✅ Sankey diagram created successfully!\n\n\
         **Shareable URL:**\n{url}\n\n\
         **Flow Preview:**\n{preview}{more}\n\n\
         {title}**Statistics:**\n\
         - Total flows: {flows}\n\
         - Unique nodes: {nodes}\n\
         - Total flow value: {total}\n\n\
         Open the URL in your browser to view and edit the Sankey diagram on chhart.app.",
        title = title_line(title),
        flows = input.flows.len(),
        nodes = nodes.len(),
        total = js_number(total),
    ))
}

fn get_syntax_help(input: &SyntaxHelpInput) -> ToolCallResult {
    ToolCallResult::text(syntax::render(input.topic))
}
