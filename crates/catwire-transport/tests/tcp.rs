//! Integration tests for the TCP transport: framing, bidirectional flow,
//! and clean close behavior over a real localhost socket.

use catwire_protocol::{Header, Message, Status, Verb};
use catwire_transport::{Connection, Connector, TcpAcceptor, TcpConnector, TransportError};

/// Binds an acceptor on a random port and returns it with its address.
async fn bind_acceptor() -> (TcpAcceptor, String) {
    let acceptor = TcpAcceptor::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = acceptor
        .local_addr()
        .expect("should have local addr")
        .to_string();
    (acceptor, addr)
}

#[tokio::test]
async fn test_request_and_response_cross_the_socket() {
    let (mut acceptor, addr) = bind_acceptor().await;

    let mut connector = TcpConnector::new(addr);
    let (client, server) = tokio::join!(connector.connect(), acceptor.accept());
    let mut client = client.expect("client should connect");
    let mut server = server.expect("server should accept");

    let checkin = Message::request(Verb::CheckIn)
        .with_header(Header::Type, "Trader")
        .with_header(Header::Version, "1");
    client.send(&checkin).await.unwrap();

    let received = server.recv().await.unwrap().expect("frame should arrive");
    assert_eq!(received, checkin);

    server
        .send(&Message::response(Status::Ok).with_header(Header::Id, "t-01"))
        .await
        .unwrap();

    let response = client.recv().await.unwrap().expect("response should arrive");
    assert_eq!(response.status(), Some(Status::Ok));
    assert_eq!(response.header(Header::Id), Some("t-01"));
}

#[tokio::test]
async fn test_back_to_back_frames_stay_separate() {
    let (mut acceptor, addr) = bind_acceptor().await;

    let mut connector = TcpConnector::new(addr);
    let (client, server) = tokio::join!(connector.connect(), acceptor.accept());
    let mut client = client.unwrap();
    let mut server = server.unwrap();

    let first = Message::request(Verb::Ask).with_header(Header::Value, "9.5 1");
    let second = Message::request(Verb::Bid)
        .with_header(Header::Value, "10 2")
        .with_tag("1.3");
    client.send(&first).await.unwrap();
    client.send(&second).await.unwrap();

    assert_eq!(server.recv().await.unwrap().unwrap(), first);
    assert_eq!(server.recv().await.unwrap().unwrap(), second);
}

#[tokio::test]
async fn test_recv_returns_none_after_peer_close() {
    let (mut acceptor, addr) = bind_acceptor().await;

    let mut connector = TcpConnector::new(addr);
    let (client, server) = tokio::join!(connector.connect(), acceptor.accept());
    let mut client = client.unwrap();
    let mut server = server.unwrap();

    client.close().await.unwrap();
    drop(client);

    assert!(server.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn test_connect_to_unbound_port_fails() {
    // Bind then drop a listener to get a port that is very likely closed.
    let (acceptor, addr) = bind_acceptor().await;
    drop(acceptor);

    let mut connector = TcpConnector::new(addr);
    let result = connector.connect().await;
    assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
}

#[tokio::test]
async fn test_garbage_frame_surfaces_protocol_error() {
    use tokio::io::AsyncWriteExt;

    let (mut acceptor, addr) = bind_acceptor().await;

    let raw = tokio::net::TcpStream::connect(&addr);
    let (raw, server) = tokio::join!(raw, acceptor.accept());
    let mut raw = raw.unwrap();
    let mut server = server.unwrap();

    raw.write_all(b"HELLO WORLD\r\n\r\n").await.unwrap();
    raw.flush().await.unwrap();

    let err = server.recv().await.unwrap_err();
    assert!(matches!(err, TransportError::Protocol(_)));
}
