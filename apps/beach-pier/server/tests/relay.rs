mod common;

use beach_pier_client::{ConnectMode, PierClient};
use beach_pier_server::HandshakeMode;

use common::{eventually, start, test_config};

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

async fn named(
    addr: std::net::SocketAddr,
    mode: ConnectMode,
    name: &str,
) -> Result<PierClient, Box<dyn std::error::Error + Send + Sync>> {
    let mut client = PierClient::connect(addr, mode).await?;
    client
        .request(format!("/username {name}"), &format!("Hello {name}"))
        .await?;
    Ok(client)
}

#[test_timeout::tokio_timeout_test(20)]
async fn alice_reaches_bob_and_history_records_it() -> TestResult {
    let server = start(test_config(HandshakeMode::Single)).await;
    let mut alice = named(server.addr, ConnectMode::Single, "Alice").await?;
    let mut bob = named(server.addr, ConnectMode::Single, "Bob").await?;

    let reply = alice
        .request(format!("/target {}", bob.identity()), "Connected to")
        .await?;
    assert_eq!(
        reply.last().map(String::as_str),
        Some(format!("[SERVER] Connected to {}", bob.identity()).as_str())
    );

    alice.request("hi", "Sending message to").await?;
    let delivered = bob.read_until("Alice: hi").await?;
    assert_eq!(delivered.last().map(String::as_str), Some("Alice: hi"));

    let history = alice.request("/history", "Alice: hi").await?;
    assert!(history
        .iter()
        .any(|line| line == &format!("[SERVER] History with {}:", bob.identity())));
    let entry = history.last().expect("history entry");
    assert!(entry.trim_start().starts_with('['), "missing timestamp: {entry}");
    assert!(entry.ends_with("] Alice: hi"));

    // Bob's view of the same conversation is the same log.
    bob.request(format!("/target {}", alice.identity()), "Connected to")
        .await?;
    let bobs_view = bob.request("/history", "Alice: hi").await?;
    assert_eq!(bobs_view.last(), history.last());
    assert_eq!(
        server.history.get(bob.identity(), alice.identity()).len(),
        1
    );
    Ok(())
}

#[test_timeout::tokio_timeout_test(20)]
async fn payload_without_target_is_refused() -> TestResult {
    let server = start(test_config(HandshakeMode::Single)).await;
    let mut client = PierClient::connect(server.addr, ConnectMode::Single).await?;

    client.send("hello").await?;
    assert_eq!(
        client.next_line().await?,
        "[SERVER] No target selected. Select with /target <target_uuid>"
    );
    Ok(())
}

#[test_timeout::tokio_timeout_test(20)]
async fn self_and_unknown_targets_are_rejected() -> TestResult {
    let server = start(test_config(HandshakeMode::Single)).await;
    let mut alice = named(server.addr, ConnectMode::Single, "Alice").await?;
    let bob = named(server.addr, ConnectMode::Single, "Bob").await?;

    alice
        .request(format!("/target {}", bob.identity()), "Connected to")
        .await?;

    alice.send(format!("/target {}", alice.identity())).await?;
    assert_eq!(alice.next_line().await?, "[SERVER] Error: cannot target self");

    alice
        .send("/target 00000000-0000-0000-0000-000000000000")
        .await?;
    assert!(alice
        .next_line()
        .await?
        .starts_with("[SERVER] Error: target not found"));

    alice.send("/target").await?;
    assert_eq!(
        alice.next_line().await?,
        format!("[SERVER] Current target: {}", bob.identity())
    );
    Ok(())
}

#[test_timeout::tokio_timeout_test(20)]
async fn list_shows_every_session_with_self_marked() -> TestResult {
    let server = start(test_config(HandshakeMode::Single)).await;
    let mut alice = named(server.addr, ConnectMode::Single, "Alice").await?;
    let bob = named(server.addr, ConnectMode::Single, "Bob").await?;

    let listing = alice.request("/list", "(self)").await?;
    let all = listing.join("\n");
    assert!(all.contains("[SERVER] Active Clients:"));
    assert!(all.contains(&format!("{} Alice (self)", alice.identity())));

    // Entries are sorted by identity, so Bob may come after the self line.
    let listing = if all.contains(&format!("{} Bob", bob.identity())) {
        all
    } else {
        let rest = alice.read_until(&bob.identity().to_string()).await?;
        all + "\n" + &rest.join("\n")
    };
    assert!(listing.contains(&format!("{} Bob", bob.identity())));
    Ok(())
}

#[test_timeout::tokio_timeout_test(20)]
async fn exit_notifies_target_and_deregisters() -> TestResult {
    let server = start(test_config(HandshakeMode::Single)).await;
    let mut alice = named(server.addr, ConnectMode::Single, "Alice").await?;
    let mut bob = named(server.addr, ConnectMode::Single, "Bob").await?;
    let alice_id = alice.identity();

    alice
        .request(format!("/target {}", bob.identity()), "Connected to")
        .await?;
    alice.request("/exit", "Goodbye").await?;
    alice.wait_closed().await?;

    let notice = bob.read_until("has exited").await?;
    assert_eq!(
        notice.last().map(String::as_str),
        Some(format!("[SERVER] {alice_id} (Alice) has exited").as_str())
    );
    assert!(!server.registry.contains(alice_id));
    assert!(server.registry.contains(bob.identity()));

    bob.request(format!("/target {alice_id}"), "target not found")
        .await?;
    Ok(())
}

#[test_timeout::tokio_timeout_test(20)]
async fn dropped_connection_is_deregistered_and_reported_to_senders() -> TestResult {
    let server = start(test_config(HandshakeMode::Single)).await;
    let mut alice = named(server.addr, ConnectMode::Single, "Alice").await?;
    let bob = named(server.addr, ConnectMode::Single, "Bob").await?;
    let bob_id = bob.identity();

    alice
        .request(format!("/target {bob_id}"), "Connected to")
        .await?;
    drop(bob);

    let registry = server.registry.clone();
    assert!(eventually(|| !registry.contains(bob_id)).await);

    alice.send("still there?").await?;
    assert_eq!(alice.next_line().await?, "[SERVER] Error: target exited");
    Ok(())
}

#[test_timeout::tokio_timeout_test(20)]
async fn dual_channel_handshake_relays_like_single() -> TestResult {
    let server = start(test_config(HandshakeMode::DualChannel)).await;
    let mut alice = named(server.addr, ConnectMode::DualChannel, "Alice").await?;
    let mut bob = named(server.addr, ConnectMode::DualChannel, "Bob").await?;

    alice
        .request(format!("/target {}", bob.identity()), "Connected to")
        .await?;
    alice.request("over two sockets", "Sending message to").await?;
    let delivered = bob.read_until("over two sockets").await?;
    assert_eq!(
        delivered.last().map(String::as_str),
        Some("Alice: over two sockets")
    );

    alice.request("/exit", "Goodbye").await?;
    let registry = server.registry.clone();
    let alice_id = alice.identity();
    assert!(eventually(|| !registry.contains(alice_id)).await);
    Ok(())
}

#[test_timeout::tokio_timeout_test(20)]
async fn overlong_line_ends_the_session() -> TestResult {
    let mut config = test_config(HandshakeMode::Single);
    config.session.max_line_length = 32;
    let server = start(config).await;
    let mut client = PierClient::connect(server.addr, ConnectMode::Single).await?;
    let id = client.identity();

    client.send("x".repeat(64)).await?;
    // Unread input may turn the close into a reset; either ends the stream.
    let _ = client.wait_closed().await;
    let registry = server.registry.clone();
    assert!(eventually(|| !registry.contains(id)).await);
    Ok(())
}
