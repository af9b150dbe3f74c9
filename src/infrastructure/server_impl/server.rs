use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use eyre::{bail, eyre, WrapErr};
use http::Method;
use listenfd::ListenFd;
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use crate::application::FixedResponder;
use crate::infrastructure::server_impl::request::{has_head_end, parse_head, BodyFraming};
use crate::infrastructure::server_impl::response::{
    closes_connection, encode, error_response, http_date,
};
use crate::AnyResult;

const READ_BUF_SIZE: usize = 4096;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);
const LINGER: Duration = Duration::from_millis(500);
/// Largest request body read and thrown away to keep a connection open.
const MAX_DRAIN: usize = 256 * 1024;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Longest wait for the next bytes of a request, idle keep-alive included.
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_header_bytes: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            max_header_bytes: 1 << 20,
        }
    }
}

/// Takes the socket handed over by systemfd/systemd if there is one, otherwise binds `addr`.
pub async fn bind_listener(addr: SocketAddr) -> AnyResult<TcpListener> {
    let mut listenfd = ListenFd::from_env();
    if let Some(listener) = listenfd
        .take_tcp_listener(0)
        .wrap_err("failed to take inherited socket")?
    {
        listener.set_nonblocking(true)?;
        tracing::debug!("using inherited socket");
        return Ok(TcpListener::from_std(listener)?);
    }

    TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))
}

/// Accepts connections forever, one task each, all answered by `responder`.
pub async fn serve(
    listener: TcpListener,
    responder: Arc<FixedResponder>,
    limits: ConnectionLimits,
) -> AnyResult<()> {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(error = %err, "failed to accept connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let responder = Arc::clone(&responder);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(socket, &responder, limits).await {
                tracing::debug!(%peer, error = %err, "connection dropped");
            }
        });
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    responder: &FixedResponder,
    limits: ConnectionLimits,
) -> AnyResult<()> {
    socket.set_nodelay(true)?;
    let mut buf = BytesMut::with_capacity(READ_BUF_SIZE);

    loop {
        // bytes already searched for the end of the head
        let mut scanned = 0;
        let head = loop {
            if has_head_end(&buf, scanned) || buf.len() > limits.max_header_bytes {
                match parse_head(&buf, limits.max_header_bytes) {
                    Ok(Some(head)) => break head,
                    Ok(None) => {}
                    Err(err) => {
                        tracing::debug!(error = %err, "rejecting request");
                        let response = error_response(err.status_code());
                        let bytes = encode(&response, false, false, &now());
                        write_all(&mut socket, &bytes, limits.write_timeout).await?;
                        linger_close(socket).await;
                        return Ok(());
                    }
                }
            }

            scanned = buf.len();
            if !fill_buf(&mut socket, &mut buf, limits.read_timeout).await? {
                return Ok(());
            }
        };
        buf.advance(head.head_len);

        let response = responder.respond(&head.request);

        // the answer never waits for the body; it is drained afterwards only when that
        // is cheap and the client is actually sending it
        let keep_alive = head.keep_alive
            && !closes_connection(&response)
            && match head.framing {
                BodyFraming::Empty => true,
                BodyFraming::Length(len) => {
                    len <= MAX_DRAIN && !(head.expect_continue && buf.len() < len)
                }
                // chunked bodies are never decoded, so the next request can't be found
                BodyFraming::Chunked => false,
            };

        let head_only = head.request.method() == Method::HEAD;
        let bytes = encode(&response, head_only, keep_alive, &now());
        write_all(&mut socket, &bytes, limits.write_timeout).await?;

        if !keep_alive {
            linger_close(socket).await;
            return Ok(());
        }

        if let BodyFraming::Length(len) = head.framing {
            discard_body(&mut socket, &mut buf, len, limits.read_timeout).await?;
        }
    }
}

/// Reads more of the request into `buf`. `false` once the client has closed.
async fn fill_buf(
    socket: &mut TcpStream,
    buf: &mut BytesMut,
    read_timeout: Duration,
) -> AnyResult<bool> {
    buf.reserve(READ_BUF_SIZE);
    let read = timeout(read_timeout, socket.read_buf(buf))
        .await
        .map_err(|_| eyre!("no request data within {read_timeout:?}"))??;
    Ok(read > 0)
}

async fn discard_body(
    socket: &mut TcpStream,
    buf: &mut BytesMut,
    mut remaining: usize,
    read_timeout: Duration,
) -> AnyResult<()> {
    loop {
        let take = remaining.min(buf.len());
        buf.advance(take);
        remaining -= take;

        if remaining == 0 {
            return Ok(());
        }
        if !fill_buf(socket, buf, read_timeout).await? {
            bail!("client closed the connection with {remaining} body bytes left");
        }
    }
}

async fn write_all(socket: &mut TcpStream, bytes: &[u8], write_timeout: Duration) -> AnyResult<()> {
    timeout(write_timeout, socket.write_all(bytes))
        .await
        .map_err(|_| eyre!("response not written within {write_timeout:?}"))?
        .wrap_err("failed to write response")
}

/// Half-closes, then drains whatever the client still sends so the response isn't lost
/// to a reset.
async fn linger_close(mut socket: TcpStream) {
    if socket.shutdown().await.is_err() {
        return;
    }

    let mut sink = [0; READ_BUF_SIZE];
    let _ = timeout(LINGER, async {
        while matches!(socket.read(&mut sink).await, Ok(n) if n > 0) {}
    })
    .await;
}

fn now() -> String {
    http_date(OffsetDateTime::now_utc())
}
