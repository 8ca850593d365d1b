//! DevTools inspector transport over WebSocket.
//!
//! Speaks the inspector's JSON-RPC framing to an endpoint such as the one
//! printed by `node --inspect` (`ws://127.0.0.1:9229/<uuid>`) or a browser's
//! `webSocketDebuggerUrl`. Each request carries a fresh id; events and
//! replies to other ids are skipped while waiting.

use super::{ProfilerCommand, ProfilerTransport};
use crate::result::{CoverageError, CoverageResult};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Deserialize)]
struct InspectorReply {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<InspectorFault>,
}

#[derive(Debug, Deserialize)]
struct InspectorFault {
    code: i64,
    message: String,
}

/// Inspector connection over a WebSocket endpoint
pub struct InspectorTransport {
    endpoint: String,
    socket: Option<Socket>,
    next_id: u64,
}

impl std::fmt::Debug for InspectorTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspectorTransport")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.socket.is_some())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl InspectorTransport {
    /// Create a transport for the given `ws://` endpoint
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            socket: None,
            next_id: 0,
        }
    }

    /// WebSocket endpoint
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether the socket is open
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.socket.is_some()
    }
}

fn request_frame(id: u64, command: &ProfilerCommand) -> String {
    let mut request = json!({ "id": id, "method": command.method() });
    if let Some(params) = command.params() {
        request["params"] = params;
    }
    request.to_string()
}

/// Interpret one inbound frame; `None` means it was not our reply
fn match_reply(text: &str, id: u64, method: &str) -> CoverageResult<Option<Value>> {
    let reply: InspectorReply = serde_json::from_str(text)?;
    if reply.id != Some(id) {
        return Ok(None);
    }
    if let Some(fault) = reply.error {
        return Err(CoverageError::protocol(
            method,
            format!("{} (code {})", fault.message, fault.code),
        ));
    }
    Ok(Some(reply.result.unwrap_or(Value::Null)))
}

#[async_trait]
impl ProfilerTransport for InspectorTransport {
    async fn open(&mut self) -> CoverageResult<()> {
        let (socket, _response) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| CoverageError::connection_failed(format!("{}: {e}", self.endpoint)))?;
        self.socket = Some(socket);
        Ok(())
    }

    async fn post(&mut self, command: ProfilerCommand) -> CoverageResult<Value> {
        let method = command.method();
        self.next_id += 1;
        let id = self.next_id;
        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| CoverageError::channel_closed(method))?;

        socket
            .send(Message::Text(request_frame(id, &command).into()))
            .await
            .map_err(|e| CoverageError::protocol(method, e.to_string()))?;

        while let Some(frame) = socket.next().await {
            let frame = frame.map_err(|e| CoverageError::protocol(method, e.to_string()))?;
            let text = match frame {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            if let Some(result) = match_reply(text.as_str(), id, method)? {
                return Ok(result);
            }
        }

        Err(CoverageError::channel_closed(method))
    }

    async fn close(&mut self) -> CoverageResult<()> {
        if let Some(mut socket) = self.socket.take() {
            socket
                .close(None)
                .await
                .map_err(|e| CoverageError::protocol("close", e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::PreciseCoverageConfig;

    #[test]
    fn test_request_frame_without_params() {
        let frame: Value =
            serde_json::from_str(&request_frame(3, &ProfilerCommand::Enable)).unwrap();
        assert_eq!(frame["id"], 3);
        assert_eq!(frame["method"], "Profiler.enable");
        assert!(frame.get("params").is_none());
    }

    #[test]
    fn test_request_frame_with_params() {
        let command = ProfilerCommand::StartPreciseCoverage(PreciseCoverageConfig::default());
        let frame: Value = serde_json::from_str(&request_frame(4, &command)).unwrap();
        assert_eq!(frame["params"]["callCount"], true);
        assert_eq!(frame["params"]["detailed"], false);
    }

    #[test]
    fn test_match_reply_skips_events_and_other_ids() {
        let event = r#"{"method":"Debugger.scriptParsed","params":{}}"#;
        assert!(match_reply(event, 1, "Profiler.enable").unwrap().is_none());

        let other = r#"{"id":2,"result":{}}"#;
        assert!(match_reply(other, 1, "Profiler.enable").unwrap().is_none());
    }

    #[test]
    fn test_match_reply_returns_result() {
        let reply = r#"{"id":5,"result":{"result":[],"timestamp":1.0}}"#;
        let value = match_reply(reply, 5, "Profiler.takePreciseCoverage")
            .unwrap()
            .unwrap();
        assert_eq!(value["timestamp"], 1.0);
    }

    #[test]
    fn test_match_reply_maps_protocol_error() {
        let reply = r#"{"id":6,"error":{"code":-32000,"message":"Profiler is not enabled"}}"#;
        let err = match_reply(reply, 6, "Profiler.startPreciseCoverage").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Profiler.startPreciseCoverage"));
        assert!(message.contains("Profiler is not enabled"));
        assert!(message.contains("-32000"));
    }

    #[test]
    fn test_match_reply_rejects_garbage() {
        assert!(match_reply("not json", 1, "Profiler.enable").is_err());
    }

    #[tokio::test]
    async fn test_post_without_open_is_channel_closed() {
        let mut transport = InspectorTransport::new("ws://127.0.0.1:9/unused");
        let err = transport.post(ProfilerCommand::Enable).await.unwrap_err();
        assert!(matches!(err, CoverageError::ChannelClosed { .. }));
        assert!(!transport.is_connected());
    }

    /// Minimal inspector: emits an event before every reply, then answers
    async fn spawn_fake_inspector() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(frame)) = ws.next().await {
                let Message::Text(text) = frame else { continue };
                let request: Value = serde_json::from_str(text.as_str()).unwrap();
                let event = json!({ "method": "Profiler.consoleProfileStarted", "params": {} });
                ws.send(Message::Text(event.to_string().into())).await.unwrap();
                let reply = match request["method"].as_str() {
                    Some("Profiler.takePreciseCoverage") => json!({
                        "id": request["id"],
                        "result": {
                            "result": [{ "scriptId": "1", "url": "file:///p/a.js", "functions": [] }],
                            "timestamp": 2.0
                        }
                    }),
                    Some("Profiler.disable") => json!({
                        "id": request["id"],
                        "error": { "code": -32601, "message": "disable refused" }
                    }),
                    _ => json!({ "id": request["id"], "result": {} }),
                };
                ws.send(Message::Text(reply.to_string().into())).await.unwrap();
            }
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn test_round_trip_against_fake_inspector() {
        let endpoint = spawn_fake_inspector().await;
        let mut transport = InspectorTransport::new(endpoint);
        transport.open().await.unwrap();
        assert!(transport.is_connected());

        transport.post(ProfilerCommand::Enable).await.unwrap();
        let coverage = transport
            .post(ProfilerCommand::TakePreciseCoverage)
            .await
            .unwrap();
        assert_eq!(coverage["result"][0]["url"], "file:///p/a.js");

        let err = transport.post(ProfilerCommand::Disable).await.unwrap_err();
        assert!(err.to_string().contains("disable refused"));

        transport.close().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_open_unreachable_endpoint_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut transport = InspectorTransport::new(format!("ws://{addr}"));
        let err = transport.open().await.unwrap_err();
        assert!(matches!(err, CoverageError::ConnectionFailed { .. }));
    }

    #[tokio::test]
    async fn test_close_without_open_is_ok() {
        let mut transport = InspectorTransport::new("ws://127.0.0.1:9/unused");
        assert!(transport.close().await.is_ok());
        assert_eq!(transport.endpoint(), "ws://127.0.0.1:9/unused");
    }
}
