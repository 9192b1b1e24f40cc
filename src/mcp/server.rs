// MCP server implementation

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::mcp::tools;
use crate::workspace::Workspace;

/// JSON-RPC message
#[derive(Debug, Serialize, Deserialize)]
struct JsonRpcMessage {
    jsonrpc: String,
    id: Option<Value>,
    method: Option<String>,
    params: Option<Value>,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC error
#[derive(Debug, Serialize, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    data: Option<Value>,
}

/// MCP tool definition
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    name: String,
    description: String,
    input_schema: Value,
}

/// MCP server capabilities
#[derive(Debug, Serialize, Deserialize)]
struct ServerCapabilities {
    tools: Option<Value>,
}

/// MCP server info
#[derive(Debug, Serialize, Deserialize)]
struct ServerInfo {
    name: String,
    version: String,
}

/// MCP initialize result
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    protocol_version: String,
    capabilities: ServerCapabilities,
    server_info: ServerInfo,
}

const REFACTOR_TOOLS: &[&str] = &[
    "semgraph_rename",
    "semgraph_change_signature",
    "semgraph_implement_interface",
    "semgraph_generate_constructor",
    "semgraph_extract_interface",
    "semgraph_safe_delete",
    "semgraph_create_type",
    "semgraph_move_type",
];

/// `{"type": "object", ...}` with the given properties
fn schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

/// Properties shared by every mutating tool
fn apply_flags(mut properties: Value) -> Value {
    properties["preview"] = json!({
        "type": "boolean",
        "default": false,
        "description": "Return diffs without writing anything"
    });
    properties["validate"] = json!({
        "type": "boolean",
        "default": false,
        "description": "Run the configured build and a residual scan after applying"
    });
    properties
}

/// Name plus the optional hints used to disambiguate it
fn symbol_properties(description: &str) -> Value {
    json!({
        "name": { "type": "string", "description": description },
        "containing_type": { "type": "string", "description": "Name of the declaring type" },
        "file_path": { "type": "string", "description": "File declaring the symbol" }
    })
}

fn with(mut properties: Value, extra: Value) -> Value {
    if let (Some(target), Some(extra)) = (properties.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            target.insert(key.clone(), value.clone());
        }
    }
    properties
}

/// MCP server
pub struct McpServer {
    workspace: Workspace,
    cancel: CancellationToken,
}

impl McpServer {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            cancel: CancellationToken::new(),
        }
    }

    /// Run the MCP server
    pub async fn run(self) -> Result<()> {
        info!("Starting MCP server for {}", self.workspace.root().display());

        let (tx, mut rx) = mpsc::unbounded_channel();

        // stdin is blocking; read it off the runtime threads
        tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if let Err(e) = tx.send(line) {
                            error!("Failed to send line to channel: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error reading from stdin: {}", e);
                        break;
                    }
                }
            }
        });

        // Main message processing loop
        while let Some(line) = rx.recv().await {
            if line.trim().is_empty() {
                continue;
            }
            debug!("Received: {}", line);

            let response = match self.handle_message(&line).await {
                Ok(response) => response,
                Err(e) => {
                    error!("Error handling message: {}", e);
                    let error_response = json!({
                        "jsonrpc": "2.0",
                        "id": null,
                        "error": {
                            "code": -32700,
                            "message": format!("Parse error: {}", e)
                        }
                    });
                    Some(serde_json::to_string(&error_response)?)
                }
            };
            if let Some(response) = response {
                let mut stdout = io::stdout().lock();
                writeln!(stdout, "{}", response)?;
                stdout.flush()?;
            }
        }

        info!("MCP server stopped");
        Ok(())
    }

    /// Handle a JSON-RPC message
    async fn handle_message(&self, message: &str) -> Result<Option<String>> {
        let msg: JsonRpcMessage = serde_json::from_str(message)?;

        // Notifications never get a response
        if msg.id.is_none() {
            debug!("Notification: {}", msg.method.as_deref().unwrap_or("<none>"));
            return Ok(None);
        }

        match msg.method.as_deref() {
            Some("initialize") => {
                let result = InitializeResult {
                    protocol_version: "2024-11-05".to_string(),
                    capabilities: ServerCapabilities {
                        tools: Some(json!({})),
                    },
                    server_info: ServerInfo {
                        name: "semgraph".to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    },
                };

                let response = json!({
                    "jsonrpc": "2.0",
                    "id": msg.id,
                    "result": result
                });

                Ok(Some(serde_json::to_string(&response)?))
            }

            Some("tools/list") => {
                let tools = self.list_tools();
                let response = json!({
                    "jsonrpc": "2.0",
                    "id": msg.id,
                    "result": { "tools": tools }
                });

                Ok(Some(serde_json::to_string(&response)?))
            }

            Some("tools/call") => {
                let name = msg.params.as_ref().and_then(|p| p["name"].as_str());
                if let (Some(params), Some(name)) = (&msg.params, name) {
                    let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
                    match self.call_tool(name, &args).await {
                        Some(result) => {
                            let response = json!({
                                "jsonrpc": "2.0",
                                "id": msg.id,
                                "result": result
                            });
                            Ok(Some(serde_json::to_string(&response)?))
                        }
                        None => {
                            warn!("Unknown tool: {}", name);
                            let error = json!({
                                "jsonrpc": "2.0",
                                "id": msg.id,
                                "error": {
                                    "code": -32602,
                                    "message": format!("Unknown tool: {}", name)
                                }
                            });
                            Ok(Some(serde_json::to_string(&error)?))
                        }
                    }
                } else {
                    let error = json!({
                        "jsonrpc": "2.0",
                        "id": msg.id,
                        "error": {
                            "code": -32602,
                            "message": "Invalid params"
                        }
                    });
                    Ok(Some(serde_json::to_string(&error)?))
                }
            }

            Some("shutdown") => {
                info!("Received shutdown request");
                self.cancel.cancel();
                let response = json!({
                    "jsonrpc": "2.0",
                    "id": msg.id,
                    "result": null
                });
                Ok(Some(serde_json::to_string(&response)?))
            }

            _ => {
                let error = json!({
                    "jsonrpc": "2.0",
                    "id": msg.id,
                    "error": {
                        "code": -32601,
                        "message": "Method not found"
                    }
                });
                Ok(Some(serde_json::to_string(&error)?))
            }
        }
    }

    /// List available tools
    fn list_tools(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: "semgraph_index".to_string(),
                description: "Rebuild the code graph of the workspace".to_string(),
                input_schema: schema(json!({}), &[]),
            },
            Tool {
                name: "semgraph_query".to_string(),
                description: "Follow graph relationships from a symbol".to_string(),
                input_schema: schema(
                    json!({
                        "query_type": {
                            "type": "string",
                            "enum": ["callers", "callees", "implementations", "derived_types", "members"],
                            "description": "Relationship to follow"
                        },
                        "target": {
                            "type": "string",
                            "description": "Symbol name or display name"
                        }
                    }),
                    &["query_type", "target"],
                ),
            },
            Tool {
                name: "semgraph_search".to_string(),
                description: "Search graph nodes by name".to_string(),
                input_schema: schema(
                    json!({
                        "pattern": { "type": "string", "description": "Substring of the node name" },
                        "node_type": {
                            "type": "string",
                            "enum": ["solution", "project", "file", "namespace", "class", "interface", "struct",
                                     "record", "enum", "constructor", "method", "property", "field", "event"],
                            "description": "Filter by node type"
                        },
                        "limit": { "type": "integer", "default": 20, "description": "Maximum number of results" }
                    }),
                    &["pattern"],
                ),
            },
            Tool {
                name: "semgraph_stats".to_string(),
                description: "Node and edge counts of the stored graph".to_string(),
                input_schema: schema(json!({}), &[]),
            },
            Tool {
                name: "semgraph_analyze_rename".to_string(),
                description: "Blast radius of a rename: references, related symbols and a suggested plan".to_string(),
                input_schema: schema(
                    with(
                        symbol_properties("Symbol to rename"),
                        json!({ "new_name": { "type": "string" } }),
                    ),
                    &["name", "new_name"],
                ),
            },
            Tool {
                name: "semgraph_rename".to_string(),
                description: "Rename a symbol and every reference to it".to_string(),
                input_schema: schema(
                    apply_flags(with(
                        symbol_properties("Symbol to rename"),
                        json!({ "new_name": { "type": "string" } }),
                    )),
                    &["name", "new_name"],
                ),
            },
            Tool {
                name: "semgraph_change_signature".to_string(),
                description: "Add or remove method parameters and update call sites".to_string(),
                input_schema: schema(
                    apply_flags(with(
                        symbol_properties("Method to change"),
                        json!({
                            "add_parameters": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "name": { "type": "string" },
                                        "type": { "type": "string" },
                                        "default_value": { "type": "string" }
                                    },
                                    "required": ["name", "type"]
                                }
                            },
                            "remove_parameters": { "type": "array", "items": { "type": "string" } }
                        }),
                    )),
                    &["name"],
                ),
            },
            Tool {
                name: "semgraph_implement_interface".to_string(),
                description: "Stub every interface member a class does not implement yet".to_string(),
                input_schema: schema(
                    apply_flags(json!({
                        "class_name": { "type": "string" },
                        "interface_name": { "type": "string" },
                        "file_path": { "type": "string" },
                        "explicit": { "type": "boolean", "default": false }
                    })),
                    &["class_name", "interface_name"],
                ),
            },
            Tool {
                name: "semgraph_generate_constructor".to_string(),
                description: "Generate a constructor initializing read-only fields and get-only properties".to_string(),
                input_schema: schema(
                    apply_flags(json!({
                        "class_name": { "type": "string" },
                        "file_path": { "type": "string" },
                        "members": { "type": "array", "items": { "type": "string" } }
                    })),
                    &["class_name"],
                ),
            },
            Tool {
                name: "semgraph_extract_interface".to_string(),
                description: "Extract an interface from a class's public instance members".to_string(),
                input_schema: schema(
                    apply_flags(json!({
                        "class_name": { "type": "string" },
                        "file_path": { "type": "string" },
                        "interface_name": { "type": "string" },
                        "members": { "type": "array", "items": { "type": "string" } },
                        "output_path": { "type": "string" }
                    })),
                    &["class_name"],
                ),
            },
            Tool {
                name: "semgraph_safe_delete".to_string(),
                description: "Delete a symbol only if nothing references it".to_string(),
                input_schema: schema(apply_flags(symbol_properties("Symbol to delete")), &["name"]),
            },
            Tool {
                name: "semgraph_create_type".to_string(),
                description: "Create a new type in its own file".to_string(),
                input_schema: schema(
                    apply_flags(json!({
                        "name": { "type": "string" },
                        "kind": {
                            "type": "string",
                            "enum": ["class", "interface", "struct", "record", "record struct"],
                            "default": "class"
                        },
                        "directory": { "type": "string", "description": "Relative to the workspace root" },
                        "namespace": { "type": "string" },
                        "modifiers": { "type": "array", "items": { "type": "string" } },
                        "base_type": { "type": "string" },
                        "interfaces": { "type": "array", "items": { "type": "string" } },
                        "attributes": { "type": "array", "items": { "type": "string" } },
                        "type_parameters": { "type": "array", "items": { "type": "string" } },
                        "usings": { "type": "array", "items": { "type": "string" } }
                    })),
                    &["name"],
                ),
            },
            Tool {
                name: "semgraph_move_type".to_string(),
                description: "Move a type into a file of its own".to_string(),
                input_schema: schema(
                    apply_flags(with(
                        symbol_properties("Type to move"),
                        json!({ "target_file": { "type": "string" } }),
                    )),
                    &["name"],
                ),
            },
        ]
    }

    /// Call a tool; `None` for an unknown tool name
    async fn call_tool(&self, name: &str, args: &Value) -> Option<Value> {
        let outcome = match name {
            "semgraph_index" => tools::index(&self.workspace, args, &self.cancel.child_token()).await,
            "semgraph_query" => tools::query(&self.workspace, args).await,
            "semgraph_search" => tools::search(&self.workspace, args).await,
            "semgraph_stats" => tools::stats(&self.workspace, args).await,
            "semgraph_analyze_rename" => tools::analyze(&self.workspace, args).await,
            _ if REFACTOR_TOOLS.contains(&name) => tools::refactor(&self.workspace, name, args).await,
            _ => return None,
        };
        Some(outcome.unwrap_or_else(|e| {
            warn!("Tool {} failed: {:#}", name, e);
            tools::failure(&e)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::{tempdir, TempDir};

    const JOBS: &str = r#"namespace Jobs
{
    public class Nightly
    {
        public void Run() { }
    }

    public class Hourly
    {
        public void Run() { }
    }
}
"#;

    fn server() -> (TempDir, McpServer) {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Jobs.cs"), JOBS).unwrap();
        let mut config = Config::default();
        config.refactor.build_command = String::new();
        let workspace = Workspace::with_config(dir.path(), config);
        (dir, McpServer::new(workspace))
    }

    async fn send(server: &McpServer, message: Value) -> Value {
        let response = server.handle_message(&message.to_string()).await.unwrap().unwrap();
        serde_json::from_str(&response).unwrap()
    }

    fn call(id: u64, name: &str, arguments: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        })
    }

    #[tokio::test]
    async fn test_initialize_and_list_tools() {
        let (_dir, server) = server();
        let init = send(&server, json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize" })).await;
        assert_eq!(init["result"]["serverInfo"]["name"], "semgraph");
        assert_eq!(init["result"]["protocolVersion"], "2024-11-05");

        let list = send(&server, json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" })).await;
        let tools = list["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 5 + REFACTOR_TOOLS.len());
        for tool in tools {
            assert!(tool["inputSchema"]["type"] == "object", "{}", tool["name"]);
        }
    }

    #[tokio::test]
    async fn test_unknown_method_and_notifications() {
        let (_dir, server) = server();
        let response = send(&server, json!({ "jsonrpc": "2.0", "id": 3, "method": "resources/list" })).await;
        assert_eq!(response["error"]["code"], -32601);

        let notification = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
        assert!(server.handle_message(&notification.to_string()).await.unwrap().is_none());
        assert!(server.handle_message("not json").await.is_err());
    }

    #[tokio::test]
    async fn test_tool_calls() {
        let (dir, server) = server();

        let unknown = send(&server, call(4, "semgraph_teleport", json!({}))).await;
        assert_eq!(unknown["error"]["code"], -32602);

        let ambiguous = send(&server, call(5, "semgraph_rename", json!({ "name": "Run", "new_name": "Execute" }))).await;
        assert_eq!(ambiguous["result"]["isError"], true);
        let text = ambiguous["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("Jobs.Nightly.Run()"));
        assert!(text.contains("Jobs.Hourly.Run()"));

        let renamed = send(
            &server,
            call(6, "semgraph_rename", json!({ "name": "Run", "containing_type": "Hourly", "new_name": "Execute" })),
        )
        .await;
        assert!(renamed["result"].get("isError").is_none(), "{}", renamed);
        let source = std::fs::read_to_string(dir.path().join("Jobs.cs")).unwrap();
        assert!(source.contains("public void Execute() { }"));
        assert!(source.contains("public void Run() { }"));

        let indexed = send(&server, call(7, "semgraph_index", json!({}))).await;
        assert!(indexed["result"].get("isError").is_none(), "{}", indexed);
        let members = send(&server, call(8, "semgraph_query", json!({ "query_type": "members", "target": "Hourly" }))).await;
        let text = members["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("Jobs.Hourly.Execute()"), "{}", text);
    }

    #[tokio::test]
    async fn test_shutdown_cancels() {
        let (_dir, server) = server();
        let response = send(&server, json!({ "jsonrpc": "2.0", "id": 9, "method": "shutdown" })).await;
        assert!(response["result"].is_null());
        assert!(server.cancel.is_cancelled());
    }
}
