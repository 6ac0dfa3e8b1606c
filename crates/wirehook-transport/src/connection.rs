//! Connection driver shared by the server and the client.
//!
//! Splits the socket into a framed read loop (owned by the driver future)
//! and a framed writer task (fed through the [`ChannelContext`]).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;
use wirehook_protocol::{ChannelError, LineCodec};

use crate::context::{ChannelContext, ChannelId, Outbound};
use crate::handler::ChannelHandler;

const READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// Per-connection limits derived from the transport configuration.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionSettings {
    pub max_frame_len: usize,
    pub idle_timeout: Option<Duration>,
}

/// Set up a connection and attach `handler` to it.
///
/// `handler_added` has run by the time this returns. The returned future
/// drives the read side until the peer leaves, the connection is closed
/// locally, it idles out, or `shutdown` flips to `true`.
pub(crate) fn attach<H: ChannelHandler>(
    stream: TcpStream,
    handler: Arc<H>,
    settings: ConnectionSettings,
    shutdown: watch::Receiver<bool>,
) -> (ChannelContext, impl Future<Output = ()> + Send + 'static) {
    let peer_addr = stream.peer_addr().ok();
    let _ = stream.set_nodelay(true);
    let (reader, writer) = stream.into_split();

    let (tx, rx) = mpsc::unbounded_channel();
    let ctx = ChannelContext::new(ChannelId::new(), peer_addr, tx);
    let writer_task = tokio::spawn(write_loop(
        ctx.id(),
        FramedWrite::new(writer, LineCodec::new(settings.max_frame_len)),
        rx,
    ));

    debug!(channel = %ctx.id(), peer = ?peer_addr, "Channel opened");
    handler.handler_added(&ctx);

    let driver_ctx = ctx.clone();
    let driver = async move {
        let ctx = driver_ctx;
        let mut shutdown = shutdown;
        let mut writer_task = Some(writer_task);
        let mut frames = FramedRead::with_capacity(
            reader,
            LineCodec::new(settings.max_frame_len),
            READ_BUFFER_CAPACITY,
        );

        loop {
            let idle = async {
                match settings.idle_timeout {
                    Some(timeout) => tokio::time::sleep(timeout).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                frame = frames.next() => match frame {
                    Some(Ok(line)) => handler.channel_read(&ctx, line).await,
                    Some(Err(e)) => {
                        handler.exception_caught(&ctx, &e);
                        break;
                    }
                    None => {
                        debug!(channel = %ctx.id(), "Peer closed the connection");
                        break;
                    }
                },
                _ = async {
                    match writer_task.as_mut() {
                        Some(task) => { let _ = task.await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    writer_task = None;
                    debug!(channel = %ctx.id(), "Writer finished, closing channel");
                    break;
                }
                _ = idle => {
                    debug!(channel = %ctx.id(), "Idle timeout");
                    break;
                }
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        ctx.close();
        if let Some(task) = writer_task {
            let _ = task.await;
        }
        handler.handler_removed(&ctx);
        debug!(channel = %ctx.id(), "Channel closed");
    };

    (ctx, driver)
}

/// Resolves once the flag is raised. Never resolves if the sender is gone.
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn write_loop(
    id: ChannelId,
    mut frames: FramedWrite<OwnedWriteHalf, LineCodec>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Outbound::Write { message, ack } => {
                let result = frames.send(message).await;
                let broken = matches!(result, Err(ChannelError::Io(_)));
                if let Err(e) = &result {
                    debug!(channel = %id, code = e.code(), "Write failed: {e}");
                }
                let _ = ack.send(result);
                if broken {
                    break;
                }
            }
            Outbound::Close => break,
        }
    }

    // Refuse new writes, then fail whatever was queued behind the close
    rx.close();
    while let Ok(command) = rx.try_recv() {
        if let Outbound::Write { ack, .. } = command {
            let _ = ack.send(Err(ChannelError::Closed));
        }
    }
    let _ = SinkExt::<String>::close(&mut frames).await;
}
