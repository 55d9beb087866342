/// HTTP front end for the proof proxy
/// Exposes the proxy as MCP tools over JSON-RPC
/// - POST /mcp    — tools/list, tools/call
/// - GET  /health — liveness

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::Extension,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use proof_proxy::{OutboundRequest, ProxyConfig, ProxyError, ProxyFetch, ProxyKind, ZkfetchToolOptions};

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const CALL_FAILED: i32 = -32000;

/// Shared server state
struct AppState {
    client: reqwest::Client,
    /// Unwraps tool-server answers before returning them
    tool_proxy: ProxyFetch,
    /// Returns target bodies as-is
    fetch_proxy: ProxyFetch,
    target_mcp_url: Option<String>,
}

type SharedState = Arc<AppState>;

#[derive(Debug, Deserialize)]
struct McpRequest {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct McpResponse {
    jsonrpc: String,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<McpError>,
}

#[derive(Debug, Serialize)]
struct McpError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl McpResponse {
    fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(McpError {
                code,
                message: message.into(),
                data,
            }),
        }
    }
}

type McpReply = (StatusCode, Json<McpResponse>);

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// JSON-RPC endpoint. The body is parsed by hand so malformed JSON gets a
/// JSON-RPC parse error instead of an extractor rejection.
async fn handle_mcp(Extension(state): Extension<SharedState>, body: String) -> McpReply {
    let req: McpRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!("[MCP] Parse error: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(McpResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e), None)),
            );
        }
    };
    tracing::info!("[MCP] Received request: method={}, id={:?}", req.method, req.id);

    match req.method.as_str() {
        "initialize" => (
            StatusCode::OK,
            Json(McpResponse::ok(
                req.id,
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "proof-proxy", "version": env!("CARGO_PKG_VERSION")}
                }),
            )),
        ),
        "tools/list" => (StatusCode::OK, Json(McpResponse::ok(req.id, tool_definitions()))),
        "tools/call" => call_tool(&state, req.id, req.params.unwrap_or(Value::Null)).await,
        other => {
            tracing::warn!("[MCP] Unknown method: {}", other);
            (
                StatusCode::BAD_REQUEST,
                Json(McpResponse::error(
                    req.id,
                    METHOD_NOT_FOUND,
                    format!("Method not found: {}", other),
                    None,
                )),
            )
        }
    }
}

async fn call_tool(state: &AppState, id: Option<Value>, params: Value) -> McpReply {
    let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    let outcome = match name {
        "call_tool_with_proof" => call_tool_with_proof(state, &arguments).await,
        "fetch_with_proof" => fetch_with_proof(state, &arguments).await,
        other => {
            tracing::warn!("[MCP] Unknown tool: {}", other);
            return (
                StatusCode::BAD_REQUEST,
                Json(McpResponse::error(id, METHOD_NOT_FOUND, format!("Unknown tool: {}", other), None)),
            );
        }
    };

    match outcome {
        Ok(Ok(result)) => {
            let text = match serde_json::to_string(&result.caller_response()) {
                Ok(text) => text,
                Err(e) => {
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(McpResponse::error(id, CALL_FAILED, e.to_string(), None)),
                    )
                }
            };
            (
                StatusCode::OK,
                Json(McpResponse::ok(id, json!({"content": [{"type": "text", "text": text}]}))),
            )
        }
        Ok(Err(e)) => {
            tracing::error!("[MCP] {} failed at {} stage: {}", name, e.stage(), e);
            (
                StatusCode::BAD_GATEWAY,
                Json(McpResponse::error(
                    id,
                    CALL_FAILED,
                    e.to_string(),
                    Some(json!({"stage": e.stage()})),
                )),
            )
        }
        Err(message) => (
            StatusCode::BAD_REQUEST,
            Json(McpResponse::error(id, INVALID_PARAMS, message, None)),
        ),
    }
}

/// Outer `Err` is an invalid-params message, inner `Err` a failed call
type ToolOutcome = Result<Result<proof_proxy::ProxiedResult, ProxyError>, String>;

async fn call_tool_with_proof(state: &AppState, arguments: &Value) -> ToolOutcome {
    let target = state
        .target_mcp_url
        .as_deref()
        .ok_or_else(|| "TARGET_MCP_URL is not configured".to_string())?;
    let tool_name = arguments
        .get("tool_name")
        .and_then(Value::as_str)
        .ok_or_else(|| "Missing required field: tool_name".to_string())?;
    let tool_arguments = arguments.get("arguments").cloned().unwrap_or_else(|| json!({}));

    // Per-call options replace the tool's map entry for this call only
    let proxy = match per_call_options(arguments)? {
        Some(options) => {
            let mut config = state.tool_proxy.config().clone();
            config
                .tool_options_map
                .get_or_insert_with(Default::default)
                .insert(tool_name.to_string(), options);
            match ProxyFetch::with_client(config, state.client.clone()) {
                Ok(proxy) => proxy,
                Err(e) => return Ok(Err(e)),
            }
        }
        None => state.tool_proxy.clone(),
    };

    tracing::info!("[MCP] Proxying tool {} to {}", tool_name, target);
    Ok(proxy.call_tool(target, tool_name, tool_arguments).await)
}

async fn fetch_with_proof(state: &AppState, arguments: &Value) -> ToolOutcome {
    let url = arguments
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| "Missing required field: url".to_string())?;
    let method = arguments.get("method").and_then(Value::as_str).unwrap_or("GET");
    let body = arguments.get("body").cloned().filter(|b| !b.is_null());

    let proxy = match per_call_options(arguments)? {
        Some(options) => {
            let config = state.fetch_proxy.config().clone().with_default_options(options);
            match ProxyFetch::with_client(config, state.client.clone()) {
                Ok(proxy) => proxy,
                Err(e) => return Ok(Err(e)),
            }
        }
        None => state.fetch_proxy.clone(),
    };

    tracing::info!("[MCP] Fetching {} {} with proof", method, url);
    Ok(proxy.request(OutboundRequest::new(url, method, body)).await)
}

/// Options given with a single call, either in full as `options` or as a
/// `hidden_parameters` shorthand
fn per_call_options(arguments: &Value) -> Result<Option<ZkfetchToolOptions>, String> {
    let options = arguments.get("options").filter(|o| !o.is_null());
    let hidden = arguments.get("hidden_parameters").filter(|h| !h.is_null());

    let raw = match (options, hidden) {
        (Some(_), Some(_)) => {
            return Err("Pass either options or hidden_parameters, not both".to_string())
        }
        (Some(options), None) => options.clone(),
        (None, Some(hidden)) => json!({"privateOptions": {"hiddenParameters": hidden}}),
        (None, None) => return Ok(None),
    };

    ZkfetchToolOptions::from_json(raw)
        .map(Some)
        .map_err(|e| format!("Invalid options: {}", e))
}

fn tool_definitions() -> Value {
    json!({
        "tools": [
            {
                "name": "call_tool_with_proof",
                "description": "Invoke a tool on the target MCP server and return its result with a verifiable proof",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "tool_name": {"type": "string", "description": "Name of the tool on the target server"},
                        "arguments": {"type": "object", "description": "Arguments passed to the tool"},
                        "hidden_parameters": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Argument names to keep out of the proof for this call"
                        },
                        "options": {"type": "object", "description": "Redaction options for this call, replacing the tool's configured ones"}
                    },
                    "required": ["tool_name"]
                }
            },
            {
                "name": "fetch_with_proof",
                "description": "Fetch a URL and return the response with a verifiable proof",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "url": {"type": "string", "description": "HTTPS URL to fetch"},
                        "method": {"type": "string", "description": "HTTP method (default GET)"},
                        "body": {"type": "object", "description": "Request body"},
                        "hidden_parameters": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Query or body parameters to keep out of the proof"
                        },
                        "options": {"type": "object", "description": "Redaction options for this fetch"}
                    },
                    "required": ["url"]
                }
            }
        ]
    })
}

/// Each tool needs its own kind, so `config.kind` (PROXY_KIND) is ignored here;
/// it only matters to library users holding a single `ProxyFetch`.
fn build_state(config: ProxyConfig, target_mcp_url: Option<String>) -> Result<AppState> {
    let client = reqwest::Client::new();

    let mut tool_config = config.clone();
    tool_config.kind = ProxyKind::ToolCall;
    let mut fetch_config = config;
    fetch_config.kind = ProxyKind::DirectFetch;

    Ok(AppState {
        tool_proxy: ProxyFetch::with_client(tool_config, client.clone())?,
        fetch_proxy: ProxyFetch::with_client(fetch_config, client.clone())?,
        client,
        target_mcp_url,
    })
}

fn app(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/mcp", post(handle_mcp))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ProxyConfig::from_env()?;
    let target_mcp_url = std::env::var("TARGET_MCP_URL").ok();
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8004".to_string())
        .parse::<u16>()?;

    tracing::info!("[INIT] zkfetch endpoint: {}/zkfetch", config.url.trim_end_matches('/'));
    if let Some(attestation) = config.attestation_config.as_ref().filter(|a| a.enabled) {
        tracing::info!("[INIT] Attestation service: {}", attestation.service_url);
    }
    match &target_mcp_url {
        Some(url) => tracing::info!("[INIT] Target MCP server: {}", url),
        None => tracing::warn!("[INIT] TARGET_MCP_URL not set; call_tool_with_proof is unavailable"),
    }

    let state = Arc::new(build_state(config, target_mcp_url)?);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("[STARTUP] ✓ Proof proxy running on http://{}", addr);
    tracing::info!("  POST /mcp     — MCP protocol endpoint");
    tracing::info!("  GET  /health  — Check server health");

    axum::serve(listener, app(state)).await?;
    Ok(())
}
