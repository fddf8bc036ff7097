pub mod handlers;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::error::PluginError;
use crate::AppContext;

// ─── JSON-RPC 2.0 types ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

// ─── Error codes ─────────────────────────────────────────────────────────────
//
// notConnected  = -32001  (call azure_devops_connect first)
// connectFailed = -32002  (bad credential / unreachable organization)
// serviceError  = -32003  (Azure DevOps rejected or failed a request)

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const NOT_CONNECTED: i32 = -32001;
const CONNECT_FAILED: i32 = -32002;
const SERVICE_ERROR: i32 = -32003;

fn error_code(e: &PluginError) -> i32 {
    match e {
        PluginError::NotConnected => NOT_CONNECTED,
        PluginError::Connect(_) => CONNECT_FAILED,
        PluginError::Service(_) => SERVICE_ERROR,
        PluginError::InvalidParams(_) => INVALID_PARAMS,
        PluginError::MethodNotFound(_) => METHOD_NOT_FOUND,
    }
}

// ─── Server ──────────────────────────────────────────────────────────────────

pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "RPC server listening (WebSocket + HTTP health on same port)");

    // Graceful shutdown: resolve on SIGTERM (Unix) or Ctrl-C (all platforms).
    // Pinned so we can use it in the select! loop without moving.
    let shutdown = make_shutdown_future();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("shutdown signal received — stopping RPC server");
                break;
            }

            conn = listener.accept() => {
                let (stream, peer) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        error!(err = %e, "accept error");
                        continue;
                    }
                };
                debug!(peer = %peer, "new connection");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx).await {
                        warn!(peer = %peer, err = %e, "connection error");
                    }
                });
            }
        }
    }

    info!("RPC server stopped");
    Ok(())
}

/// Respond to an HTTP `GET /health` request with a JSON status document.
///
/// The daemon shares its port for both WebSocket (JSON-RPC) and a plain
/// HTTP health endpoint so the editor's checkhealth can probe liveness
/// without a WS client.
async fn handle_health_check(mut stream: tokio::net::TcpStream, ctx: &AppContext) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Consume the request (we don't inspect it — any GET /health is fine).
    let mut req_buf = vec![0u8; 2048];
    let _ = stream.read(&mut req_buf).await;

    let uptime_secs = ctx.started_at.elapsed().as_secs();
    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": uptime_secs,
        "connected": ctx.connections.is_connected().await,
        "port": ctx.config.port,
    });
    let body_str = body.to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body_str.len(),
        body_str
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Returns a future that resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM *and* Ctrl-C.
/// On other platforms we listen for Ctrl-C only.
async fn make_shutdown_future() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, ctx: Arc<AppContext>) -> Result<()> {
    // Peek at the first bytes to distinguish HTTP health checks from
    // WebSocket upgrades — both share the same port. All GET requests other
    // than /health fall through to the WS handshake as normal.
    let mut peek_buf = [0u8; 12];
    let n = stream.peek(&mut peek_buf).await.unwrap_or(0);
    if n >= 11 && &peek_buf[..11] == b"GET /health" {
        return handle_health_check(stream, &ctx).await;
    }

    let ws = accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    // Requests are answered strictly in arrival order; the connection task
    // awaits each dispatch before reading the next frame, which is what
    // keeps session-slot access sequential per client.
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let response = dispatch_text(&text, &ctx).await;
                if let Err(e) = sink.send(Message::Text(response)).await {
                    warn!(err = %e, "send error");
                    break;
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = sink.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(err = %e, "ws error");
                break;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Parse, dispatch, and serialize one request. Every failure — parse,
/// routing, session guard, service call — ends up as a structured error
/// response; nothing unwinds into the transport.
pub async fn dispatch_text(text: &str, ctx: &AppContext) -> String {
    let req: RpcRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(_) => {
            return error_response(Value::Null, PARSE_ERROR, "Parse error");
        }
    };

    if req.jsonrpc != "2.0" {
        return error_response(
            req.id.unwrap_or(Value::Null),
            INVALID_REQUEST,
            "Invalid Request",
        );
    }

    let id = req.id.unwrap_or(Value::Null);
    let params = req.params.unwrap_or(Value::Null);

    debug!(method = %req.method, "rpc dispatch");

    match dispatch(&req.method, params, ctx).await {
        Ok(value) => {
            let resp = RpcResponse {
                jsonrpc: "2.0",
                id,
                result: Some(value),
                error: None,
            };
            serde_json::to_string(&resp).unwrap_or_default()
        }
        Err(e) => error_response(id, error_code(&e), &e.to_string()),
    }
}

async fn dispatch(method: &str, params: Value, ctx: &AppContext) -> Result<Value, PluginError> {
    match method {
        "azure_devops_connect" => handlers::devops::connect(params, ctx).await,
        "azure_devops_list_projects" => handlers::devops::list_projects(params, ctx).await,
        "azure_devops_list_work_items" => handlers::devops::list_work_items(params, ctx).await,
        _ => Err(PluginError::MethodNotFound(method.to_string())),
    }
}

fn error_response(id: Value, code: i32, message: &str) -> String {
    let resp = RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(RpcError {
            code,
            message: message.to_string(),
        }),
    };
    serde_json::to_string(&resp).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azdo::models::{IdentityRef, TeamProject, WorkItem, WorkItemFields};
    use crate::azdo::{Connector, WorkTracker};
    use crate::config::DaemonConfig;
    use crate::connection::ConnectionManager;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockTracker {
        projects: Vec<TeamProject>,
        ids: Vec<u64>,
        items: Vec<WorkItem>,
        fail_with: Option<String>,
        fetch_calls: AtomicUsize,
    }

    #[async_trait]
    impl WorkTracker for Arc<MockTracker> {
        async fn list_projects(&self) -> Result<Vec<TeamProject>, PluginError> {
            if let Some(msg) = &self.fail_with {
                return Err(PluginError::Service(msg.clone()));
            }
            Ok(self.projects.clone())
        }

        async fn query_work_item_ids(&self, _project: &str) -> Result<Vec<u64>, PluginError> {
            if let Some(msg) = &self.fail_with {
                return Err(PluginError::Service(msg.clone()));
            }
            Ok(self.ids.clone())
        }

        async fn work_items(&self, _ids: &[u64]) -> Result<Vec<WorkItem>, PluginError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.items.clone())
        }
    }

    struct MockConnector {
        tracker: Arc<MockTracker>,
        reject_with: Option<String>,
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(
            &self,
            _organization_url: &str,
            _token: &str,
        ) -> Result<Arc<dyn WorkTracker>, PluginError> {
            if let Some(msg) = &self.reject_with {
                return Err(PluginError::Connect(msg.clone()));
            }
            Ok(Arc::new(self.tracker.clone()))
        }
    }

    fn make_ctx(tracker: Arc<MockTracker>, reject_with: Option<&str>) -> AppContext {
        AppContext {
            config: Arc::new(DaemonConfig::default()),
            connections: Arc::new(ConnectionManager::new(Box::new(MockConnector {
                tracker,
                reject_with: reject_with.map(str::to_string),
            }))),
            started_at: std::time::Instant::now(),
        }
    }

    fn request(method: &str, params: Value) -> String {
        serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params})
            .to_string()
    }

    async fn call(ctx: &AppContext, method: &str, params: Value) -> Value {
        let raw = dispatch_text(&request(method, params), ctx).await;
        serde_json::from_str(&raw).unwrap()
    }

    async fn connect(ctx: &AppContext) -> Value {
        call(
            ctx,
            "azure_devops_connect",
            serde_json::json!(["https://dev.azure.com/org", "pat"]),
        )
        .await
    }

    fn project(name: &str, description: Option<&str>, id: &str) -> TeamProject {
        TeamProject {
            id: id.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
        }
    }

    fn item(id: u64, title: &str, state: &str, assignee: Option<&str>) -> WorkItem {
        WorkItem {
            id,
            fields: WorkItemFields {
                title: title.to_string(),
                state: state.to_string(),
                assigned_to: assignee.map(|name| IdentityRef {
                    display_name: name.to_string(),
                }),
            },
        }
    }

    #[tokio::test]
    async fn connect_returns_confirmation_string() {
        let ctx = make_ctx(Arc::new(MockTracker::default()), None);
        let resp = connect(&ctx).await;
        assert_eq!(
            resp["result"],
            "Connected to Azure DevOps successfully!"
        );
        assert!(resp.get("error").is_none());
    }

    #[tokio::test]
    async fn connect_failure_preserves_cause_text() {
        let ctx = make_ctx(Arc::new(MockTracker::default()), Some("TF400813: access denied"));
        let resp = connect(&ctx).await;
        assert_eq!(resp["error"]["code"], CONNECT_FAILED);
        assert_eq!(
            resp["error"]["message"],
            "Failed to connect: TF400813: access denied"
        );
    }

    #[tokio::test]
    async fn reads_before_connect_fail_without_touching_the_service() {
        let tracker = Arc::new(MockTracker::default());
        let ctx = make_ctx(tracker.clone(), None);

        for method in ["azure_devops_list_projects", "azure_devops_list_work_items"] {
            let resp = call(&ctx, method, serde_json::json!(["Foo"])).await;
            assert_eq!(resp["error"]["code"], NOT_CONNECTED, "{method}");
            assert_eq!(
                resp["error"]["message"],
                "Not connected to Azure DevOps. Please connect first."
            );
        }
        assert_eq!(tracker.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn list_projects_formats_blocks_in_service_order() {
        let tracker = Arc::new(MockTracker {
            projects: vec![
                project("Alpha", None, "1"),
                project("Beta", Some("desc"), "2"),
            ],
            ..Default::default()
        });
        let ctx = make_ctx(tracker, None);
        connect(&ctx).await;

        let resp = call(&ctx, "azure_devops_list_projects", Value::Null).await;
        let text = resp["result"].as_str().unwrap();
        assert!(text.contains("- Alpha (1)"));
        assert!(text.contains("- Beta (2)\n  desc"));
    }

    #[tokio::test]
    async fn list_projects_empty_yields_literal_message() {
        let ctx = make_ctx(Arc::new(MockTracker::default()), None);
        connect(&ctx).await;
        let resp = call(&ctx, "azure_devops_list_projects", Value::Null).await;
        assert_eq!(resp["result"], "No projects found.");
    }

    #[tokio::test]
    async fn empty_query_skips_batch_fetch() {
        let tracker = Arc::new(MockTracker::default());
        let ctx = make_ctx(tracker.clone(), None);
        connect(&ctx).await;

        let resp = call(
            &ctx,
            "azure_devops_list_work_items",
            serde_json::json!(["Foo"]),
        )
        .await;
        assert_eq!(resp["result"], "No work items found.");
        assert_eq!(tracker.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn work_items_are_fetched_and_rendered() {
        let tracker = Arc::new(MockTracker {
            ids: vec![7, 8],
            items: vec![
                item(7, "Fix login", "Active", Some("Jordan Lee")),
                item(8, "Old bug", "Closed", None),
            ],
            ..Default::default()
        });
        let ctx = make_ctx(tracker.clone(), None);
        connect(&ctx).await;

        let resp = call(
            &ctx,
            "azure_devops_list_work_items",
            serde_json::json!(["Foo"]),
        )
        .await;
        let text = resp["result"].as_str().unwrap();
        assert!(text.contains("● #7 - Fix login [Active] (Jordan Lee)"));
        assert!(text.contains("✔ #8 - Old bug [Closed]"));
        assert_eq!(tracker.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn service_failure_becomes_structured_error() {
        let tracker = Arc::new(MockTracker {
            fail_with: Some("VS402337: query failed".to_string()),
            ..Default::default()
        });
        let ctx = make_ctx(tracker, None);
        connect(&ctx).await;

        let resp = call(&ctx, "azure_devops_list_projects", Value::Null).await;
        assert_eq!(resp["error"]["code"], SERVICE_ERROR);
        assert_eq!(resp["error"]["message"], "VS402337: query failed");
    }

    #[tokio::test]
    async fn unknown_method_is_reported_not_fatal() {
        let ctx = make_ctx(Arc::new(MockTracker::default()), None);
        let resp = call(&ctx, "azure_devops_delete_everything", Value::Null).await;
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_params_are_invalid_params() {
        let ctx = make_ctx(Arc::new(MockTracker::default()), None);
        let resp = call(&ctx, "azure_devops_connect", serde_json::json!(["only-url"])).await;
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn garbage_input_is_a_parse_error() {
        let ctx = make_ctx(Arc::new(MockTracker::default()), None);
        let raw = dispatch_text("not json", &ctx).await;
        let resp: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(resp["error"]["code"], PARSE_ERROR);
    }

    #[tokio::test]
    async fn wrong_jsonrpc_version_is_invalid_request() {
        let ctx = make_ctx(Arc::new(MockTracker::default()), None);
        let raw = dispatch_text(
            r#"{"jsonrpc":"1.0","id":1,"method":"azure_devops_list_projects"}"#,
            &ctx,
        )
        .await;
        let resp: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(resp["error"]["code"], INVALID_REQUEST);
    }
}
