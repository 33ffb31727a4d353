// In-process MQTT 3.1.1 broker for subscriber tests.
//
// Each accepted client gets CONNACK and SUBACK, then its socket is handed
// to the test as a `BrokerSession`. Dropping the session closes the socket.
#![allow(dead_code, clippy::unwrap_used)]

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(5);

const CONNECT: u8 = 1;
const SUBSCRIBE: u8 = 8;

pub struct FakeBroker {
    port: u16,
    sessions: mpsc::UnboundedReceiver<BrokerSession>,
    accept: JoinHandle<()>,
}

/// One subscribed client.
pub struct BrokerSession {
    pub username: String,
    pub password: String,
    pub topic: String,
    stream: TcpStream,
}

impl FakeBroker {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, sessions) = mpsc::unbounded_channel();

        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Ok(session) = handshake(stream).await {
                        let _ = tx.send(session);
                    }
                });
            }
        });

        Self {
            port,
            sessions,
            accept,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the next client to finish subscribing.
    pub async fn next_session(&mut self) -> BrokerSession {
        tokio::time::timeout(WAIT, self.sessions.recv())
            .await
            .expect("no client subscribed in time")
            .expect("broker stopped")
    }

    /// Whether another client has subscribed since the last `next_session`.
    pub fn has_pending_session(&mut self) -> bool {
        self.sessions.try_recv().is_ok()
    }
}

impl Drop for FakeBroker {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

impl BrokerSession {
    /// Send a QoS 0 PUBLISH.
    pub async fn publish(&mut self, topic: &str, payload: &[u8]) {
        let mut body = Vec::with_capacity(2 + topic.len() + payload.len());
        body.extend_from_slice(&u16::try_from(topic.len()).unwrap().to_be_bytes());
        body.extend_from_slice(topic.as_bytes());
        body.extend_from_slice(payload);

        let mut packet = vec![0x30];
        encode_remaining_length(body.len(), &mut packet);
        packet.extend_from_slice(&body);
        self.stream.write_all(&packet).await.unwrap();
    }
}

async fn handshake(mut stream: TcpStream) -> io::Result<BrokerSession> {
    let (kind, body) = read_packet(&mut stream).await?;
    if kind != CONNECT {
        return Err(io::Error::other("expected CONNECT"));
    }
    let (username, password) = connect_credentials(&body);
    stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await?;

    let body = loop {
        let (kind, body) = read_packet(&mut stream).await?;
        if kind == SUBSCRIBE {
            break body;
        }
    };
    let mut pos = 2;
    let topic = read_string(&body, &mut pos);
    // SUBACK echoes the packet id and grants QoS 0.
    stream
        .write_all(&[0x90, 0x03, body[0], body[1], 0x00])
        .await?;

    Ok(BrokerSession {
        username,
        password,
        topic,
        stream,
    })
}

/// Returns the packet type (high nibble) and the body.
async fn read_packet(stream: &mut TcpStream) -> io::Result<(u8, Vec<u8>)> {
    let header = stream.read_u8().await?;
    let mut len = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await?;
        len |= usize::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    let mut body = vec![0; len];
    stream.read_exact(&mut body).await?;
    Ok((header >> 4, body))
}

fn connect_credentials(body: &[u8]) -> (String, String) {
    // Protocol name (6) + level (1) put the flags at offset 7, then keep-alive.
    let flags = body[7];
    let mut pos = 10;
    let _client_id = read_string(body, &mut pos);
    if flags & 0x04 != 0 {
        let _will_topic = read_string(body, &mut pos);
        let _will_message = read_string(body, &mut pos);
    }
    let username = if flags & 0x80 != 0 {
        read_string(body, &mut pos)
    } else {
        String::new()
    };
    let password = if flags & 0x40 != 0 {
        read_string(body, &mut pos)
    } else {
        String::new()
    };
    (username, password)
}

fn read_string(buf: &[u8], pos: &mut usize) -> String {
    let len = usize::from(u16::from_be_bytes([buf[*pos], buf[*pos + 1]]));
    *pos += 2;
    let s = String::from_utf8_lossy(&buf[*pos..*pos + len]).into_owned();
    *pos += len;
    s
}

fn encode_remaining_length(mut len: usize, out: &mut Vec<u8>) {
    loop {
        let mut byte = u8::try_from(len % 128).unwrap();
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if len == 0 {
            break;
        }
    }
}
