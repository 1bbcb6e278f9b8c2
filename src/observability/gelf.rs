//! GELF 1.1 transport over UDP or TCP.
//!
//! # Responsibilities
//! - Parse `udp://host:port` / `tcp://host:port` endpoints
//! - Encode a log entry as a GELF JSON message
//! - UDP: send one datagram, or chunk large messages
//! - TCP: NUL-terminated frames over a lazily (re)connected stream
//!
//! # Design Decisions
//! - Messages are sent uncompressed
//! - A failed TCP write reconnects once before the error is reported
//! - Nested values are sent as JSON text; GELF fields must be scalars

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};

use crate::observability::shipper::{LogEntry, Transport, TransportError};

/// Largest datagram sent unchunked.
pub const MAX_DATAGRAM_BYTES: usize = 8192;

/// Chunk header: magic (2) + message id (8) + sequence (1) + count (1).
const CHUNK_HEADER_BYTES: usize = 12;

/// GELF limit on chunks per message.
pub const MAX_CHUNKS: usize = 128;

const CHUNK_MAGIC: [u8; 2] = [0x1e, 0x0f];

/// Informational.
const GELF_LEVEL: u8 = 6;

/// Where to send GELF messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GelfEndpoint {
    Udp { host: String, port: u16 },
    Tcp { host: String, port: u16 },
}

impl GelfEndpoint {
    pub fn parse(server: &str) -> Result<Self, TransportError> {
        let url = url::Url::parse(server).map_err(|e| TransportError::InvalidEndpoint {
            endpoint: server.to_string(),
            reason: e.to_string(),
        })?;
        let host = url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TransportError::InvalidEndpoint {
                endpoint: server.to_string(),
                reason: "missing host".into(),
            })?;
        let port = url.port().ok_or_else(|| TransportError::InvalidEndpoint {
            endpoint: server.to_string(),
            reason: "missing port".into(),
        })?;

        match url.scheme() {
            "udp" => Ok(GelfEndpoint::Udp { host, port }),
            "tcp" => Ok(GelfEndpoint::Tcp { host, port }),
            other => Err(TransportError::UnsupportedScheme(other.to_string())),
        }
    }

    fn address(&self) -> (&str, u16) {
        match self {
            GelfEndpoint::Udp { host, port } | GelfEndpoint::Tcp { host, port } => (host, *port),
        }
    }
}

impl std::fmt::Display for GelfEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GelfEndpoint::Udp { host, port } => write!(f, "udp://{host}:{port}"),
            GelfEndpoint::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

/// GELF sender for one endpoint.
pub struct GelfTransport {
    endpoint: GelfEndpoint,
    source_host: String,
    udp: Option<UdpSocket>,
    tcp: Option<TcpStream>,
}

impl GelfTransport {
    pub fn new(endpoint: GelfEndpoint) -> Self {
        Self {
            endpoint,
            source_host: local_hostname(),
            udp: None,
            tcp: None,
        }
    }

    pub fn endpoint(&self) -> &GelfEndpoint {
        &self.endpoint
    }

    async fn send_udp(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let socket = match self.udp.take() {
            Some(socket) => socket,
            None => {
                let (host, port) = self.endpoint.address();
                let bind = if host.contains(':') { "[::]:0" } else { "0.0.0.0:0" };
                let socket = UdpSocket::bind(bind).await?;
                socket.connect((host, port)).await?;
                socket
            }
        };

        let result = if payload.len() <= MAX_DATAGRAM_BYTES {
            socket.send(payload).await.map(|_| ()).map_err(TransportError::from)
        } else {
            send_chunks(&socket, payload).await
        };
        self.udp = Some(socket);
        result
    }

    async fn send_tcp(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.extend_from_slice(payload);
        frame.push(0);

        if self.write_tcp(&frame).await.is_ok() {
            return Ok(());
        }
        tracing::debug!(endpoint = %self.endpoint, "GELF TCP write failed, reconnecting");
        self.write_tcp(&frame).await
    }

    /// A stream that fails a write is dropped; the next write reconnects.
    async fn write_tcp(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let mut stream = match self.tcp.take() {
            Some(stream) => stream,
            None => {
                let (host, port) = self.endpoint.address();
                TcpStream::connect((host, port)).await?
            }
        };
        stream.write_all(frame).await?;
        self.tcp = Some(stream);
        Ok(())
    }
}

async fn send_chunks(socket: &UdpSocket, payload: &[u8]) -> Result<(), TransportError> {
    for chunk in chunk_message(payload, rand::random::<[u8; 8]>())? {
        socket.send(&chunk).await?;
    }
    Ok(())
}

impl Transport for GelfTransport {
    async fn send(&mut self, entry: &LogEntry) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(&encode_message(entry, &self.source_host))?;
        match self.endpoint {
            GelfEndpoint::Udp { .. } => self.send_udp(&payload).await,
            GelfEndpoint::Tcp { .. } => self.send_tcp(&payload).await,
        }
    }
}

/// Build the GELF JSON document for `entry`.
pub fn encode_message(entry: &LogEntry, source_host: &str) -> Value {
    let mut message = Map::new();
    message.insert("version".into(), Value::from("1.1"));
    message.insert("host".into(), Value::from(source_host));
    message.insert("short_message".into(), Value::from(entry.message.as_str()));
    message.insert("timestamp".into(), Value::from(entry.timestamp));
    message.insert("level".into(), Value::from(GELF_LEVEL));

    for (name, value) in &entry.fields {
        let value = match value {
            Value::Null => continue,
            Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
            scalar => scalar.clone(),
        };
        message.insert(additional_field_name(name), value);
    }
    Value::Object(message)
}

/// `_<name>` with disallowed characters replaced; `id` is reserved by GELF.
pub fn additional_field_name(name: &str) -> String {
    let clean: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if clean == "id" {
        "_request_field_id".into()
    } else {
        format!("_{clean}")
    }
}

/// Split `payload` into GELF chunks tagged with `message_id`.
pub fn chunk_message(payload: &[u8], message_id: [u8; 8]) -> Result<Vec<Vec<u8>>, TransportError> {
    let data_per_chunk = MAX_DATAGRAM_BYTES - CHUNK_HEADER_BYTES;
    let count = payload.len().div_ceil(data_per_chunk);
    if count > MAX_CHUNKS {
        return Err(TransportError::TooLarge {
            size: payload.len(),
            chunks: count,
        });
    }

    Ok(payload
        .chunks(data_per_chunk)
        .enumerate()
        .map(|(sequence, data)| {
            let mut chunk = Vec::with_capacity(CHUNK_HEADER_BYTES + data.len());
            chunk.extend_from_slice(&CHUNK_MAGIC);
            chunk.extend_from_slice(&message_id);
            chunk.push(sequence as u8);
            chunk.push(count as u8);
            chunk.extend_from_slice(data);
            chunk
        })
        .collect())
}

/// Epoch seconds with millisecond precision.
pub fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64 / 1000.0)
        .unwrap_or(0.0)
}

fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "web-deadend".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn entry() -> LogEntry {
        LogEntry {
            message: "GET / 204 1ms".into(),
            timestamp: 1_729_117_800.5,
            fields: Map::from_iter([
                ("id".to_string(), json!("abc")),
                ("response_status".to_string(), json!(204)),
                ("headers".to_string(), json!({"host": "x"})),
                ("body_user name".to_string(), json!("root")),
                ("remote_addr".to_string(), Value::Null),
            ]),
        }
    }

    #[test]
    fn test_parse_endpoints() {
        assert_eq!(
            GelfEndpoint::parse("udp://graylog:12201").unwrap(),
            GelfEndpoint::Udp { host: "graylog".into(), port: 12201 }
        );
        assert_eq!(
            GelfEndpoint::parse("tcp://[::1]:12201").unwrap(),
            GelfEndpoint::Tcp { host: "::1".into(), port: 12201 }
        );
        assert!(matches!(
            GelfEndpoint::parse("http://graylog:12201"),
            Err(TransportError::UnsupportedScheme(s)) if s == "http"
        ));
        assert!(matches!(
            GelfEndpoint::parse("udp://graylog"),
            Err(TransportError::InvalidEndpoint { .. })
        ));
        assert!(GelfEndpoint::parse("graylog:12201").is_err());
    }

    #[test]
    fn test_encode_message() {
        let message = encode_message(&entry(), "honeypot-1");
        assert_eq!(message["version"], "1.1");
        assert_eq!(message["host"], "honeypot-1");
        assert_eq!(message["short_message"], "GET / 204 1ms");
        assert_eq!(message["level"], 6);
        assert_eq!(message["timestamp"], 1_729_117_800.5);
        assert_eq!(message["_request_field_id"], "abc");
        assert_eq!(message["_response_status"], 204);
        assert_eq!(message["_headers"], r#"{"host":"x"}"#);
        assert_eq!(message["_body_user_name"], "root");
        assert!(message.get("_remote_addr").is_none());
        assert!(message.get("_id").is_none());
    }

    #[test]
    fn test_chunking() {
        let payload = vec![b'x'; MAX_DATAGRAM_BYTES * 2];
        let id = [1, 2, 3, 4, 5, 6, 7, 8];
        let chunks = chunk_message(&payload, id).unwrap();
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(&chunk[..2], &CHUNK_MAGIC);
            assert_eq!(&chunk[2..10], &id);
            assert_eq!(chunk[10], i as u8);
            assert_eq!(chunk[11], 3);
            assert!(chunk.len() <= MAX_DATAGRAM_BYTES);
        }
        let total: usize = chunks.iter().map(|c| c.len() - CHUNK_HEADER_BYTES).sum();
        assert_eq!(total, payload.len());
    }

    #[test]
    fn test_too_many_chunks() {
        let payload = vec![0u8; (MAX_DATAGRAM_BYTES - CHUNK_HEADER_BYTES) * MAX_CHUNKS + 1];
        assert!(matches!(
            chunk_message(&payload, [0; 8]),
            Err(TransportError::TooLarge { chunks: 129, .. })
        ));
    }

    #[tokio::test]
    async fn test_udp_send() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();
        let mut transport = GelfTransport::new(GelfEndpoint::Udp {
            host: "127.0.0.1".into(),
            port,
        });

        transport.send(&entry()).await.unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
        let n = receiver.recv(&mut buf).await.unwrap();
        let message: Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(message["short_message"], "GET / 204 1ms");
    }

    #[tokio::test]
    async fn test_tcp_send_is_nul_terminated() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut transport = GelfTransport::new(GelfEndpoint::Tcp {
            host: "127.0.0.1".into(),
            port,
        });

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            loop {
                let mut byte = [0u8; 1];
                socket.read_exact(&mut byte).await.unwrap();
                if byte[0] == 0 {
                    break;
                }
                buf.push(byte[0]);
            }
            buf
        });

        transport.send(&entry()).await.unwrap();
        let frame = server.await.unwrap();
        let message: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(message["_response_status"], 204);
    }

    #[tokio::test]
    async fn test_tcp_unreachable_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut transport = GelfTransport::new(GelfEndpoint::Tcp {
            host: "127.0.0.1".into(),
            port,
        });
        assert!(matches!(transport.send(&entry()).await, Err(TransportError::Io(_))));
    }
}
