//! Newline-delimited JSON-RPC 2.0 over stdio.
//!
//! Two methods are exposed to the host: `tools/list` and `tools/call`.
//! Tool failures come back as JSON-RPC errors whose `data` field carries the
//! structured error object (stable code string, message, tool, timestamp,
//! non-secret context).

use crate::shell::InvocationShell;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const TOOL_ERROR: i64 = -32000;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    method: String,
    #[serde(default)]
    params: Value,
}

/// Reads requests from stdin until EOF, writing one response per line.
pub async fn run(shell: Arc<InvocationShell>) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let response = handle_line(&shell, trimmed).await;
        let mut serialized = response.to_string();
        serialized.push('\n');
        stdout.write_all(serialized.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

/// Handles one raw request line; always produces a response object.
pub async fn handle_line(shell: &InvocationShell, line: &str) -> Value {
    let request: RpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => {
            return error_response(Value::Null, PARSE_ERROR, &format!("parse error: {err}"), None);
        }
    };
    dispatch(shell, request).await
}

async fn dispatch(shell: &InvocationShell, request: RpcRequest) -> Value {
    match request.method.as_str() {
        "tools/list" => {
            let tools = shell.list_tools();
            json!({
                "jsonrpc": "2.0",
                "id": request.id,
                "result": {"tools": tools}
            })
        }
        "tools/call" => {
            let Some(name) = request.params["name"].as_str() else {
                return error_response(
                    request.id,
                    INVALID_REQUEST,
                    "tools/call requires a string 'name'",
                    None,
                );
            };
            let arguments = if request.params["arguments"].is_null() {
                json!({})
            } else {
                request.params["arguments"].clone()
            };
            match shell.invoke(name, arguments).await {
                Ok(result) => json!({
                    "jsonrpc": "2.0",
                    "id": request.id,
                    "result": result
                }),
                Err(err) => error_response(
                    request.id,
                    TOOL_ERROR,
                    err.message(),
                    Some(err.to_wire()),
                ),
            }
        }
        other => error_response(
            request.id,
            METHOD_NOT_FOUND,
            &format!("unknown method '{other}'"),
            None,
        ),
    }
}

fn error_response(id: Value, code: i64, message: &str, data: Option<Value>) -> Value {
    let mut error = json!({"code": code, "message": message});
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({"jsonrpc": "2.0", "id": id, "error": error})
}
