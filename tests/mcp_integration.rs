//! Integration tests for MCP protocol handling.
//!
//! These tests drive a full session through [`McpServer`]: handshake, tool
//! discovery, tool calls, and error replies. Share links are decoded to
//! check that the diagram round-trips.

use chhart_mcp::chart::{codec, LinkBuilder};
use chhart_mcp::mcp::protocol::{parse_message, IncomingMessage, RequestId};
use chhart_mcp::mcp::{McpServer, ServerFactory, ServerState};
use serde_json::{json, Value};

// =============================================================================
// Helpers
// =============================================================================

fn request(id: u64, method: &str, params: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
}

fn call(id: u64, tool: &str, arguments: Value) -> String {
    request(id, "tools/call", json!({"name": tool, "arguments": arguments}))
}

fn send(server: &mut McpServer, line: &str) -> Value {
    let reply = server.handle_line(line).expect("request should get a reply");
    assert!(!reply.contains('\n'), "replies must be single-line");
    serde_json::from_str(&reply).unwrap()
}

fn initialised_server(factory: &ServerFactory) -> McpServer {
    let mut server = factory.session();
    let reply = send(
        &mut server,
        &request(
            0,
            "initialize",
            json!({
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": {"name": "integration", "version": "1.0.0"}
            }),
        ),
    );
    assert_eq!(reply["result"]["protocolVersion"], "2025-06-18");
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .is_none());
    assert_eq!(server.state(), ServerState::Running);
    server
}

fn tool_text(reply: &Value) -> &str {
    reply["result"]["content"][0]["text"].as_str().unwrap()
}

fn link_in(text: &str) -> &str {
    text.lines()
        .find(|line| line.starts_with("http"))
        .expect("tool output should contain a link")
}

/// Splits a share link into (origin, kind, decoded content, raw title).
fn unpack(url: &str) -> (String, String, String, Option<String>) {
    let (origin, fragment) = url.split_once("/#").unwrap();
    let (payload, title) = match fragment.split_once("&title=") {
        Some((payload, title)) => (payload, Some(title.to_string())),
        None => (fragment, None),
    };
    let (kind, token) = payload.split_once('=').unwrap();
    (
        origin.to_string(),
        kind.to_string(),
        codec::decode(token).unwrap(),
        title,
    )
}

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let result = parse_message(json).unwrap();
    assert!(result.is_initialize());

    if let IncomingMessage::Request(req) = result {
        assert_eq!(req.method, "initialize");
        assert_eq!(req.id, RequestId::Number(1));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_notification() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }"#;

    match parse_message(json) {
        Ok(IncomingMessage::Notification(notif)) => {
            assert_eq!(notif.method, "notifications/initialized");
        }
        other => panic!("Expected Notification, got {other:?}"),
    }
}

#[test]
fn test_parse_invalid_json() {
    assert!(parse_message("not valid json").is_err());
}

#[test]
fn test_parse_missing_jsonrpc_version() {
    assert!(parse_message(r#"{"id": 1, "method": "test"}"#).is_err());
}

// =============================================================================
// Session Tests
// =============================================================================

#[test]
fn test_tools_list_advertises_three_tools() {
    let mut server = initialised_server(&ServerFactory::default());
    let reply = send(&mut server, &request(1, "tools/list", json!({})));

    let names: Vec<&str> = reply["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["create_flowchart", "create_sankey", "get_syntax_help"]);
}

#[test]
fn test_flowchart_link_round_trips() {
    let mut server = initialised_server(&ServerFactory::default());
    let content = "Start\n  Process data\n  End";
    let reply = send(
        &mut server,
        &call(2, "create_flowchart", json!({"content": content, "title": "My Flow"})),
    );

    assert!(reply["result"].get("isError").is_none());
    let text = tool_text(&reply);
    assert!(text.contains("**Total nodes:** 3"));
    assert!(text.contains("**Title:** My Flow"));

    let (origin, kind, decoded, title) = unpack(link_in(text));
    assert_eq!(origin, "https://chhart.app");
    assert_eq!(kind, "flowchart");
    assert_eq!(decoded, content);
    assert_eq!(title.as_deref(), Some("My%20Flow"));
}

#[test]
fn test_sankey_link_groups_by_source() {
    let mut server = initialised_server(&ServerFactory::default());
    let reply = send(
        &mut server,
        &call(
            3,
            "create_sankey",
            json!({
                "flows": [
                    {"source": "Income", "target": "Rent", "value": 1500},
                    {"source": "Income", "target": "Food", "value": 600},
                    {"source": "Savings", "target": "Stocks", "value": 250.5}
                ],
                "title": "Budget Flow"
            }),
        ),
    );

    let text = tool_text(&reply);
    assert!(text.contains("- Total flows: 3"));
    assert!(text.contains("- Unique nodes: 5"));

    let (_, kind, decoded, title) = unpack(link_in(text));
    assert_eq!(kind, "sankey");
    assert_eq!(
        decoded,
        "Income\n  [value=1500] Rent\n  [value=600] Food\nSavings\n  [value=250.5] Stocks"
    );
    assert_eq!(title.as_deref(), Some("Budget%20Flow"));
}

#[test]
fn test_custom_origin_is_used() {
    let factory = ServerFactory::new(LinkBuilder::new("http://localhost:5173/"));
    let mut server = initialised_server(&factory);
    let reply = send(&mut server, &call(4, "create_flowchart", json!({"content": "A"})));

    let url = link_in(tool_text(&reply));
    assert!(url.starts_with("http://localhost:5173/#flowchart="));
    assert!(!url.contains("&title="));
}

#[test]
fn test_syntax_help_topics() {
    let mut server = initialised_server(&ServerFactory::default());

    let all = send(&mut server, &call(5, "get_syntax_help", json!({})));
    let text = tool_text(&all);
    assert!(text.starts_with("# Chhart Syntax Documentation"));
    assert!(text.contains("Flowchart"));
    assert!(text.contains("Sankey"));

    let sankey = send(&mut server, &call(6, "get_syntax_help", json!({"type": "sankey"})));
    assert!(tool_text(&sankey).contains("[value="));
}

#[test]
fn test_validation_errors_are_tool_errors() {
    let mut server = initialised_server(&ServerFactory::default());

    let empty = send(&mut server, &call(7, "create_flowchart", json!({"content": "   "})));
    assert_eq!(empty["result"]["isError"], true);
    assert_eq!(tool_text(&empty), "Error: Flowchart content cannot be empty");

    let no_flows = send(&mut server, &call(8, "create_sankey", json!({"flows": []})));
    assert_eq!(no_flows["result"]["isError"], true);
    assert_eq!(tool_text(&no_flows), "Error: At least one flow is required");

    let negative = send(
        &mut server,
        &call(
            9,
            "create_sankey",
            json!({"flows": [{"source": "A", "target": "B", "value": -1}]}),
        ),
    );
    assert_eq!(negative["result"]["isError"], true);
}

#[test]
fn test_unknown_tool_and_method() {
    let mut server = initialised_server(&ServerFactory::default());

    let tool = send(&mut server, &call(10, "create_pie_chart", json!({})));
    assert_eq!(tool["result"]["isError"], true);
    assert_eq!(tool_text(&tool), "Unknown tool: create_pie_chart");

    let method = send(&mut server, &request(11, "resources/list", json!({})));
    assert_eq!(method["error"]["code"], -32601);
    assert_eq!(method["id"], 11);
}

#[test]
fn test_tools_require_handshake() {
    let mut server = ServerFactory::default().session();
    let reply = send(&mut server, &request(1, "tools/list", json!({})));
    assert!(reply.get("error").is_some());

    let ping = send(&mut server, &request(2, "ping", json!({})));
    assert_eq!(ping["result"], json!({}));
}

#[test]
fn test_stateless_server_needs_no_handshake() {
    let mut server = ServerFactory::default().stateless();
    let reply = send(&mut server, &call(1, "create_flowchart", json!({"content": "A > B"})));
    assert!(link_in(tool_text(&reply)).contains("#flowchart="));
}

#[test]
fn test_sessions_do_not_share_state() {
    let factory = ServerFactory::default();
    let mut first = initialised_server(&factory);
    let mut second = factory.session();

    assert_eq!(first.state(), ServerState::Running);
    assert_eq!(second.state(), ServerState::AwaitingInit);

    let reply = send(&mut second, &request(1, "tools/list", json!({})));
    assert!(reply.get("error").is_some());
    let reply = send(&mut first, &request(1, "tools/list", json!({})));
    assert!(reply.get("result").is_some());
}
