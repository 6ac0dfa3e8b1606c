//! End-to-end integration tests: lobby server over TCP, cached write
//! handles on both ends, and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use wirehook_handler::{HandlerError, Lobby, WriteHandler};
use wirehook_protocol::WireEvent;
use wirehook_transport::{TransportClient, TransportConfig, TransportServer};

/// Start a lobby server on a random port.
async fn start_lobby() -> (TransportServer, Arc<Lobby>) {
    let lobby = Lobby::new();
    let factory_lobby = lobby.clone();
    let config = TransportConfig {
        port: 0, // OS-assigned
        ..TransportConfig::default()
    };
    let server = TransportServer::start(config, move || factory_lobby.handler())
        .await
        .unwrap();
    (server, lobby)
}

/// Connect a raw TCP peer and consume its `connected` greeting.
async fn join(port: u16) -> (BufReader<TcpStream>, String) {
    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut peer = BufReader::new(stream);
    let greeting = read_event(&mut peer).await;
    assert_eq!(greeting["event"], "connected");
    assert_eq!(greeting["serverVersion"], "0.1.0");
    let channel_id = greeting["channelId"].as_str().unwrap().to_string();
    (peer, channel_id)
}

async fn read_event(peer: &mut BufReader<TcpStream>) -> Value {
    let mut line = String::new();
    timeout(Duration::from_secs(5), peer.read_line(&mut line))
        .await
        .expect("Timeout waiting for event")
        .expect("Read failed");
    assert!(line.ends_with('\n'), "unterminated line: {line:?}");
    serde_json::from_str(line.trim_end()).unwrap()
}

async fn wait_for_peers(lobby: &Lobby, count: usize) {
    timeout(Duration::from_secs(5), async {
        while lobby.len() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("lobby never reached {count} peers (has {})", lobby.len()));
}

#[tokio::test]
async fn greeting_carries_channel_id() {
    let (mut server, lobby) = start_lobby().await;
    let (_peer, channel_id) = join(server.port()).await;
    assert!(!channel_id.is_empty());
    assert_eq!(lobby.len(), 1);
    server.stop().await;
}

#[tokio::test]
async fn lines_are_relayed_between_peers() {
    let (mut server, lobby) = start_lobby().await;
    let (mut alice, alice_id) = join(server.port()).await;
    let (mut bob, _bob_id) = join(server.port()).await;
    wait_for_peers(&lobby, 2).await;

    alice.get_mut().write_all(b"hi bob\n").await.unwrap();
    let event = read_event(&mut bob).await;
    assert_eq!(event["event"], "message");
    assert_eq!(event["from"], alice_id);
    assert_eq!(event["text"], "hi bob");

    // Alice does not hear her own line; the next thing she sees is Bob's reply
    bob.get_mut().write_all(b"hey alice\n").await.unwrap();
    let event = read_event(&mut alice).await;
    assert_eq!(event["text"], "hey alice");

    server.stop().await;
}

#[tokio::test]
async fn server_broadcast_uses_cached_handles() {
    let (mut server, lobby) = start_lobby().await;
    let (mut alice, _) = join(server.port()).await;
    let (mut bob, _) = join(server.port()).await;
    wait_for_peers(&lobby, 2).await;

    // Sent from the test task, outside of any handler callback
    let queued = lobby.broadcast(&WireEvent::message("server", "hello everyone"));
    assert_eq!(queued, 2);

    for peer in [&mut alice, &mut bob] {
        let event = read_event(peer).await;
        assert_eq!(event["from"], "server");
        assert_eq!(event["text"], "hello everyone");
    }
    server.stop().await;
}

#[tokio::test]
async fn departed_peers_leave_the_lobby() {
    let (mut server, lobby) = start_lobby().await;
    let (alice, _) = join(server.port()).await;
    let (_bob, _) = join(server.port()).await;
    wait_for_peers(&lobby, 2).await;

    drop(alice);
    wait_for_peers(&lobby, 1).await;
    assert_eq!(lobby.broadcast(&WireEvent::message("server", "still here?")), 1);
    server.stop().await;
}

#[tokio::test]
async fn goodbye_is_flushed_before_shutdown() {
    let (mut server, lobby) = start_lobby().await;
    let (mut peer, _) = join(server.port()).await;
    wait_for_peers(&lobby, 1).await;

    lobby.broadcast(&WireEvent::goodbye("server shutting down"));
    server.stop().await;

    let event = read_event(&mut peer).await;
    assert_eq!(event["event"], "goodbye");
    assert_eq!(event["reason"], "server shutting down");

    let mut rest = Vec::new();
    timeout(Duration::from_secs(5), peer.read_to_end(&mut rest))
        .await
        .expect("Timeout waiting for close")
        .unwrap();
    assert!(rest.is_empty());
    assert!(lobby.is_empty());
}

#[tokio::test]
async fn client_write_handler_sends_through_cached_context() {
    let (mut server, lobby) = start_lobby().await;
    let (mut watcher, _) = join(server.port()).await;

    let handler = Arc::new(WriteHandler::new());
    assert!(matches!(handler.send("early"), Err(HandlerError::NotAttached)));

    let client = TransportClient::connect(
        ("127.0.0.1", server.port()),
        &TransportConfig::default(),
        handler.clone(),
    )
    .await
    .unwrap();
    assert!(handler.is_attached());
    assert_eq!(handler.context().unwrap().id(), client.context().id());

    wait_for_peers(&lobby, 2).await;
    handler.send_and_flush("from a cached handle").await.unwrap();

    let event = read_event(&mut watcher).await;
    assert_eq!(event["text"], "from a cached handle");

    client.close().await;
    let err = handler.send_and_flush("after close").await.unwrap_err();
    assert_eq!(err.code(), "channel.closed");

    server.stop().await;
}
