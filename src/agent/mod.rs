//! The AI-agent tool server: JSON-RPC 2.0 tool dispatch over standard
//! streams.
//!
//! The protocol surface is the MCP tool triplet — `initialize`,
//! `tools/list`, `tools/call` — with one JSON object per line on stdin
//! and responses on stdout.  Notifications (requests without an id)
//! are acknowledged silently.  Requests are served on worker threads;
//! they all contend on the shared vault lock, and the `run` tools
//! additionally contend on the width-5 semaphore.

pub mod runner;
pub mod sanitize;
pub mod tools;

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{Result, SecretCtlError};
use tools::AgentContext;

/// Protocol version echoed by `initialize`.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC error code for tool failures.
const INTERNAL_ERROR: i64 = -32603;

/// JSON-RPC error code for unknown methods.
const METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC error code for malformed params.
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Serve requests from `input` until EOF.  Each request runs on its
/// own thread; the output stream is shared behind a mutex.
pub fn serve<R: BufRead, W: Write + Send + 'static>(
    ctx: Arc<AgentContext>,
    input: R,
    output: W,
) -> Result<()> {
    let output = Arc::new(Mutex::new(output));
    let mut workers = Vec::new();

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let ctx = Arc::clone(&ctx);
        let output = Arc::clone(&output);
        workers.push(std::thread::spawn(move || {
            if let Some(response) = handle_line(&ctx, &line) {
                if let Ok(mut out) = output.lock() {
                    let _ = serde_json::to_writer(&mut *out, &response);
                    let _ = out.write_all(b"\n");
                    let _ = out.flush();
                }
            }
        }));
    }

    for worker in workers {
        let _ = worker.join();
    }
    Ok(())
}

/// Serve on the process's stdin/stdout.
pub fn serve_stdio(ctx: Arc<AgentContext>) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve(ctx, stdin.lock(), stdout)
}

/// Handle one request line; `None` for notifications.
fn handle_line(ctx: &AgentContext, line: &str) -> Option<Value> {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            return Some(error_response(
                Value::Null,
                -32700,
                &format!("parse error: {e}"),
            ));
        }
    };

    // Notifications carry no id and get no response.
    let id = request.id?;

    let response = match request.method.as_str() {
        "initialize" => json_result(id, initialize_result()),
        "tools/list" => json_result(id, json!({ "tools": tool_descriptors() })),
        "tools/call" => handle_tool_call(ctx, id, &request.params),
        "ping" => json_result(id, json!({})),
        other => error_response(id, METHOD_NOT_FOUND, &format!("unknown method '{other}'")),
    };
    Some(response)
}

fn handle_tool_call(ctx: &AgentContext, id: Value, params: &Value) -> Value {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return error_response(id, INVALID_PARAMS, "missing tool name");
    };
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    match dispatch_tool(ctx, name, &arguments) {
        Ok(result) => json_result(
            id,
            json!({
                "content": [{ "type": "text", "text": result.to_string() }],
                "isError": false,
            }),
        ),
        Err(err) => {
            // Tool-level failures are reported in-band so the agent
            // can read them; protocol-level errors stay JSON-RPC.
            json_result(
                id,
                json!({
                    "content": [{ "type": "text", "text": err.to_string() }],
                    "isError": true,
                }),
            )
        }
    }
}

/// Route a `tools/call` to its implementation.
fn dispatch_tool(ctx: &AgentContext, name: &str, arguments: &Value) -> Result<Value> {
    match name {
        "list" => {
            let args: tools::ListArgs = parse_args(arguments)?;
            to_value(tools::list(ctx, &args)?)
        }
        "exists" => {
            let key = required_str(arguments, "key")?;
            to_value(tools::exists(ctx, key)?)
        }
        "get_masked" => {
            let key = required_str(arguments, "key")?;
            to_value(tools::get_masked(ctx, key)?)
        }
        "list_fields" => {
            let key = required_str(arguments, "key")?;
            to_value(tools::list_fields(ctx, key)?)
        }
        "get_field" => {
            let key = required_str(arguments, "key")?;
            let field = required_str(arguments, "field")?;
            to_value(tools::get_field(ctx, key, field)?)
        }
        "run" => {
            let args: tools::RunArgs = parse_args(arguments)?;
            to_value(tools::run(ctx, &args)?)
        }
        "run_with_bindings" => {
            let args: tools::RunWithBindingsArgs = parse_args(arguments)?;
            to_value(tools::run_with_bindings(ctx, &args)?)
        }
        other => Err(SecretCtlError::CommandFailed(format!(
            "unknown tool '{other}'"
        ))),
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": {
            "name": "secretctl",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": { "tools": {} },
    })
}

/// Static tool descriptors for `tools/list`.
fn tool_descriptors() -> Value {
    json!([
        {
            "name": "list",
            "description": "List secret metadata (keys, tags, field counts, timestamps). Never returns values. Optional filters: tag, expiring_within_days.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "tag": { "type": "string" },
                    "expiring_within_days": { "type": "integer" }
                }
            }
        },
        {
            "name": "exists",
            "description": "Check whether a secret exists and return its metadata.",
            "inputSchema": {
                "type": "object",
                "properties": { "key": { "type": "string" } },
                "required": ["key"]
            }
        },
        {
            "name": "get_masked",
            "description": "Get a secret with sensitive field values masked and non-sensitive values in full.",
            "inputSchema": {
                "type": "object",
                "properties": { "key": { "type": "string" } },
                "required": ["key"]
            }
        },
        {
            "name": "list_fields",
            "description": "List field metadata (names, sensitivity, hints, aliases) for one secret. No values.",
            "inputSchema": {
                "type": "object",
                "properties": { "key": { "type": "string" } },
                "required": ["key"]
            }
        },
        {
            "name": "get_field",
            "description": "Get the value of one non-sensitive field. Sensitive fields are always denied.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "key": { "type": "string" },
                    "field": { "type": "string" }
                },
                "required": ["key", "field"]
            }
        },
        {
            "name": "run",
            "description": "Run an allowed command with secrets injected as environment variables. Key patterns support glob syntax. Output is sanitized.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "keys": { "type": "array", "items": { "type": "string" } },
                    "command": { "type": "string" },
                    "args": { "type": "array", "items": { "type": "string" } },
                    "prefix": { "type": "string" },
                    "env": { "type": "string" },
                    "timeout_secs": { "type": "integer" }
                },
                "required": ["keys", "command"]
            }
        },
        {
            "name": "run_with_bindings",
            "description": "Run an allowed command with environment variables taken from each secret's bindings map. Output is sanitized.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "keys": { "type": "array", "items": { "type": "string" } },
                    "command": { "type": "string" },
                    "args": { "type": "array", "items": { "type": "string" } },
                    "timeout_secs": { "type": "integer" }
                },
                "required": ["keys", "command"]
            }
        }
    ])
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: &Value) -> Result<T> {
    serde_json::from_value(arguments.clone())
        .map_err(|e| SecretCtlError::CommandFailed(format!("invalid tool arguments: {e}")))
}

fn required_str<'a>(arguments: &'a Value, name: &str) -> Result<&'a str> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| SecretCtlError::CommandFailed(format!("missing argument '{name}'")))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| SecretCtlError::SerializationError(format!("tool result: {e}")))
}

fn json_result(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}
