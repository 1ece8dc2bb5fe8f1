//! GraphQL-over-WebSocket subscription client
//!
//! Two incompatible message dialects are in use in the wild: the `graphql-transport-ws`
//! protocol names the start message `subscribe`, the legacy `graphql-ws` protocol names it
//! `start`. The client walks its dialect list in order and keeps the first one whose
//! handshake reaches [`HandshakeState::Subscribed`].

use crate::error::{AuditError, Result};
use crate::network::{Deadline, Headers};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Time allowed for one dialect to get from connect to subscribed
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Operation id used for the single subscription a session carries
pub const SUBSCRIPTION_ID: &str = "1";

/// Message-type dialect of a GraphQL WebSocket server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `graphql-transport-ws`
    Subscribe,
    /// Legacy `graphql-ws` (subscriptions-transport-ws)
    Start,
}

impl Dialect {
    /// Attempt order
    pub const ALL: [Dialect; 2] = [Dialect::Subscribe, Dialect::Start];

    /// `type` of the message that starts a subscription
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Subscribe => "subscribe",
            Dialect::Start => "start",
        }
    }

    /// Conventional `Sec-WebSocket-Protocol` for the dialect
    pub fn subprotocol(self) -> &'static str {
        match self {
            Dialect::Subscribe => "graphql-transport-ws",
            Dialect::Start => "graphql-ws",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one dialect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Disconnected,
    Connected,
    Initialized,
    Subscribed,
}

/// JSON frame exchanged with the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl WsMessage {
    pub fn connection_init() -> Self {
        Self {
            kind: "connection_init".to_string(),
            id: None,
            payload: Some(json!({})),
        }
    }

    pub fn start(dialect: Dialect, id: &str, query: &str) -> Self {
        Self {
            kind: dialect.as_str().to_string(),
            id: Some(id.to_string()),
            payload: Some(json!({ "query": query })),
        }
    }
}

/// Opens subscriptions against one WebSocket endpoint
#[derive(Debug, Clone)]
pub struct SubscriptionClient {
    url: String,
    headers: Headers,
    dialects: Vec<Dialect>,
    handshake_timeout: Duration,
    negotiate_subprotocol: bool,
}

impl SubscriptionClient {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            headers: Headers::new(),
            dialects: Dialect::ALL.to_vec(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            negotiate_subprotocol: true,
        }
    }

    /// Headers sent on the upgrade request
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_dialects(mut self, dialects: Vec<Dialect>) -> Self {
        self.dialects = dialects;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Whether each attempt advertises its dialect's subprotocol
    pub fn with_subprotocol_negotiation(mut self, enabled: bool) -> Self {
        self.negotiate_subprotocol = enabled;
        self
    }

    /// Try each dialect in order; the first to reach `Subscribed` wins
    pub async fn subscribe(&self, query: &str, deadline: &Deadline) -> Result<SubscriptionSession> {
        let mut last_error = None;

        for &dialect in &self.dialects {
            match self.attempt(dialect, query, deadline).await {
                Ok(session) => {
                    info!("Subscription message sent successfully using {:?} dialect", dialect.as_str());
                    return Ok(session);
                }
                Err(e) if deadline.is_cancelled() => return Err(e),
                Err(e) if deadline.is_expired() => {
                    return Err(match e {
                        AuditError::TimedOut { .. } => e,
                        other => AuditError::timed_out(format!(
                            "subscription deadline elapsed during {} handshake: {}",
                            dialect, other
                        )),
                    })
                }
                Err(e) => {
                    warn!("Subscription attempt with {:?} dialect failed: {}", dialect.as_str(), e);
                    last_error = Some(e);
                }
            }
        }

        let tried: Vec<&str> = self.dialects.iter().map(|d| d.as_str()).collect();
        Err(AuditError::handshake(match last_error {
            Some(e) => format!("no dialect succeeded (tried {}), last error: {}", tried.join(", "), e),
            None => "no dialects configured".to_string(),
        }))
    }

    async fn attempt(&self, dialect: Dialect, query: &str, deadline: &Deadline) -> Result<SubscriptionSession> {
        let request = self.build_request(dialect)?;
        let attempt_deadline = deadline.child_with_timeout(self.handshake_timeout);
        let mut state = HandshakeState::Disconnected;

        let handshake = async {
            debug!("Connecting to {} for {:?} dialect", self.url, dialect.as_str());
            let (mut socket, _response) = connect_async(request)
                .await
                .map_err(|e| AuditError::handshake(format!("failed to connect: {}", e)))?;
            state = HandshakeState::Connected;

            send_json(&mut socket, &WsMessage::connection_init()).await?;
            let ack = read_ack(&mut socket).await?;
            debug!("Received ack using {:?} dialect: {:?}", dialect.as_str(), ack.kind);
            state = HandshakeState::Initialized;

            send_json(&mut socket, &WsMessage::start(dialect, SUBSCRIPTION_ID, query)).await?;
            state = HandshakeState::Subscribed;

            Ok(SubscriptionSession {
                socket,
                dialect,
                id: SUBSCRIPTION_ID.to_string(),
            })
        };

        let result = attempt_deadline
            .run(&format!("{} handshake", dialect), handshake)
            .await;
        result.map_err(|e| match e {
            AuditError::HandshakeFailure { message } => {
                AuditError::handshake(format!("{} (state: {:?})", message, state))
            }
            other => other,
        })
    }

    fn build_request(&self, dialect: Dialect) -> Result<Request> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| AuditError::validation(format!("Invalid WebSocket URL {}: {}", self.url, e)))?;

        for (key, value) in &self.headers {
            let name = key
                .parse::<HeaderName>()
                .map_err(|e| AuditError::validation(format!("Invalid header name {}: {}", key, e)))?;
            let value = value
                .parse::<HeaderValue>()
                .map_err(|e| AuditError::validation(format!("Invalid header value for {}: {}", key, e)))?;
            request.headers_mut().insert(name, value);
        }

        if self.negotiate_subprotocol {
            request.headers_mut().insert(
                "Sec-WebSocket-Protocol",
                HeaderValue::from_static(dialect.subprotocol()),
            );
        }

        Ok(request)
    }
}

async fn send_json(socket: &mut WsStream, message: &WsMessage) -> Result<()> {
    let text = serde_json::to_string(message)?;
    socket
        .send(Message::Text(text))
        .await
        .map_err(|e| AuditError::handshake(format!("failed to send {}: {}", message.kind, e)))
}

/// Wait for the single message that acknowledges `connection_init`
async fn read_ack(socket: &mut WsStream) -> Result<WsMessage> {
    loop {
        let text = match socket.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(data))) => String::from_utf8_lossy(&data).into_owned(),
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
            Some(Ok(Message::Close(frame))) => {
                return Err(AuditError::handshake(format!(
                    "server closed the connection before connection_ack ({:?})",
                    frame
                )))
            }
            Some(Err(e)) => {
                return Err(AuditError::handshake(format!("failed to read connection_ack: {}", e)))
            }
            None => return Err(AuditError::handshake("connection ended before connection_ack")),
        };

        let message: WsMessage = serde_json::from_str(&text)
            .map_err(|e| AuditError::handshake(format!("malformed connection_ack {:?}: {}", text, e)))?;
        if message.kind == "connection_error" {
            return Err(AuditError::handshake(format!(
                "server rejected connection_init: {}",
                message.payload.unwrap_or(Value::Null)
            )));
        }
        if message.kind != "connection_ack" {
            debug!("Expected connection_ack, got {:?}; accepting it as the acknowledgement", message.kind);
        }
        return Ok(message);
    }
}

/// An open socket with one active subscription
pub struct SubscriptionSession {
    socket: WsStream,
    dialect: Dialect,
    id: String,
}

impl fmt::Debug for SubscriptionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSession")
            .field("dialect", &self.dialect)
            .field("id", &self.id)
            .finish()
    }
}

impl SubscriptionSession {
    /// Dialect that completed the handshake
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Forward every inbound message to `on_message` until the server closes the socket.
    ///
    /// A read error ends the loop and is returned; there is no reconnect.
    pub async fn listen<F>(&mut self, deadline: &Deadline, mut on_message: F) -> Result<()>
    where
        F: FnMut(WsMessage),
    {
        let socket = &mut self.socket;
        let reader = async {
            while let Some(frame) = socket.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(data)) => String::from_utf8_lossy(&data).into_owned(),
                    Ok(Message::Close(frame)) => {
                        info!("Subscription closed by server: {:?}", frame);
                        return Ok(());
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        return Err(AuditError::network(format!("error reading message: {}", e)))
                    }
                };
                match serde_json::from_str::<WsMessage>(&text) {
                    Ok(message) => on_message(message),
                    Err(e) => warn!("Ignoring malformed message {:?}: {}", text, e),
                }
            }
            Ok(())
        };
        deadline.run("subscription", reader).await
    }

    /// Send a close frame and wait for the socket to shut down
    pub async fn close(mut self) -> Result<()> {
        self.socket
            .close(None)
            .await
            .map_err(|e| AuditError::network(format!("error closing subscription: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request as ServerRequest, Response as ServerResponse,
    };

    /// Server that acknowledges only connections asking for `ack_protocol`.
    /// Returns its URL and a log of what each connection did.
    async fn spawn_server(ack_protocol: Option<&'static str>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&events);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let mut requested = String::new();
                    let callback = |request: &ServerRequest,
                                    mut response: ServerResponse|
                     -> std::result::Result<ServerResponse, ErrorResponse> {
                        if let Some(protocol) = request.headers().get("Sec-WebSocket-Protocol") {
                            requested = protocol.to_str().unwrap_or_default().to_string();
                            response
                                .headers_mut()
                                .insert("Sec-WebSocket-Protocol", protocol.clone());
                        }
                        Ok(response)
                    };
                    let mut ws = accept_hdr_async(stream, callback).await.unwrap();
                    log.lock().unwrap().push(format!("protocol:{}", requested));

                    // connection_init
                    let _ = ws.next().await;
                    if ack_protocol != Some(requested.as_str()) {
                        let _ = ws.close(None).await;
                        return;
                    }
                    ws.send(Message::Text(json!({ "type": "connection_ack" }).to_string()))
                        .await
                        .unwrap();

                    if let Some(Ok(Message::Text(text))) = ws.next().await {
                        let start: WsMessage = serde_json::from_str(&text).unwrap();
                        log.lock().unwrap().push(format!("message:{}", start.kind));
                        let data = json!({
                            "type": if start.kind == "start" { "data" } else { "next" },
                            "id": start.id,
                            "payload": { "data": { "tick": 1 } }
                        });
                        ws.send(Message::Text(data.to_string())).await.unwrap();
                    }
                    let _ = ws.close(None).await;
                });
            }
        });

        (format!("ws://{}/graphql", addr), events)
    }

    #[test]
    fn test_message_shapes() {
        let init = serde_json::to_value(WsMessage::connection_init()).unwrap();
        assert_eq!(init, json!({ "type": "connection_init", "payload": {} }));

        let start = serde_json::to_value(WsMessage::start(Dialect::Start, "1", "subscription { tick }")).unwrap();
        assert_eq!(
            start,
            json!({ "type": "start", "id": "1", "payload": { "query": "subscription { tick }" } })
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_start_dialect() {
        let (url, events) = spawn_server(Some("graphql-ws")).await;
        let client = SubscriptionClient::new(url);
        let deadline = Deadline::after(Duration::from_secs(10));

        let mut session = client.subscribe("subscription { tick }", &deadline).await.unwrap();
        assert_eq!(session.dialect(), Dialect::Start);
        assert_eq!(session.id(), "1");

        let mut received = Vec::new();
        session
            .listen(&deadline, |message| received.push(message))
            .await
            .unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, "data");

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "protocol:graphql-transport-ws".to_string(),
                "protocol:graphql-ws".to_string(),
                "message:start".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_first_dialect_wins_when_acknowledged() {
        let (url, events) = spawn_server(Some("graphql-transport-ws")).await;
        let session = SubscriptionClient::new(url)
            .subscribe("subscription { tick }", &Deadline::after(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(session.dialect(), Dialect::Subscribe);
        session.close().await.ok();
        assert_eq!(events.lock().unwrap()[0], "protocol:graphql-transport-ws");
    }

    #[tokio::test]
    async fn test_all_dialects_failing_is_handshake_failure() {
        let (url, events) = spawn_server(None).await;
        let result = SubscriptionClient::new(url)
            .subscribe("subscription { tick }", &Deadline::after(Duration::from_secs(10)))
            .await;
        assert!(matches!(result, Err(AuditError::HandshakeFailure { .. })));
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_handshake_failure() {
        let result = SubscriptionClient::new("ws://127.0.0.1:1/graphql")
            .subscribe("subscription { tick }", &Deadline::after(Duration::from_secs(5)))
            .await;
        assert!(matches!(result, Err(AuditError::HandshakeFailure { .. })));
    }

    /// Accepts TCP connections and never answers the upgrade
    async fn spawn_silent_listener() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        format!("ws://{}/graphql", addr)
    }

    #[tokio::test]
    async fn test_elapsed_deadline_is_timed_out_not_handshake_failure() {
        let url = spawn_silent_listener().await;
        let started = std::time::Instant::now();
        let result = SubscriptionClient::new(url)
            .subscribe("subscription { tick }", &Deadline::after(Duration::from_millis(300)))
            .await;
        assert!(matches!(result, Err(AuditError::TimedOut { .. })), "{:?}", result.err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_per_dialect_timeout_still_falls_through() {
        let url = spawn_silent_listener().await;
        let result = SubscriptionClient::new(url)
            .with_handshake_timeout(Duration::from_millis(100))
            .subscribe("subscription { tick }", &Deadline::after(Duration::from_secs(10)))
            .await;
        assert!(matches!(result, Err(AuditError::HandshakeFailure { .. })));
    }

    #[tokio::test]
    async fn test_restricted_dialect_list() {
        let (url, events) = spawn_server(Some("graphql-ws")).await;
        let session = SubscriptionClient::new(url)
            .with_dialects(vec![Dialect::Start])
            .subscribe("subscription { tick }", &Deadline::after(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(session.dialect(), Dialect::Start);
        session.close().await.ok();
        assert_eq!(events.lock().unwrap()[0], "protocol:graphql-ws");
    }

    #[test]
    fn test_request_carries_headers_and_subprotocol() {
        let mut headers = Headers::new();
        headers.insert("Authorization".to_string(), "Bearer abc".to_string());
        let client = SubscriptionClient::new("ws://localhost/graphql").with_headers(headers);

        let request = client.build_request(Dialect::Start).unwrap();
        assert_eq!(request.headers()["authorization"], "Bearer abc");
        assert_eq!(request.headers()["sec-websocket-protocol"], "graphql-ws");

        let plain = client
            .with_subprotocol_negotiation(false)
            .build_request(Dialect::Subscribe)
            .unwrap();
        assert!(plain.headers().get("sec-websocket-protocol").is_none());
    }
}
