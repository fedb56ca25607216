//! Integration tests for the device session handshake and control flow.
//!
//! These tests exercise `DeviceSession` through its *public* API the same
//! way the application layer uses it, with the TLS transport replaced by an
//! in-memory duplex pipe (`DeviceSession::attach` accepts any line
//! transport; `connect` merely wires the TLS stream into it).  The test
//! plays the appliance side of the conversation:
//!
//! ```text
//! Appliance (test)                         Session under test
//! ────────────────                         ──────────────────
//! DRC-1.00
//! <Update Type="InvalidateAccount"/>
//!                                          <Request Type="AuthToken">… or
//!                                          <Request Type="GetToken" />
//! <Response Type="AuthToken" Status="Okay"/>
//!                                          fetch_status() →
//!                                          <Request Type="DeviceState" …>
//! <Response Type="DeviceState" …>…
//! ```

use std::sync::Arc;
use std::time::Duration;

use aircon_controller::infrastructure::network::session::{DeviceSession, SessionError};
use aircon_core::DeviceDescriptor;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf};

const TOKEN: &str = "33965903-4482-M306-1002-000000000000";
const GREETING: &str = "DRC-1.00\r\n";
const INVALIDATE: &str =
    "<?xml version=\"1.0\" encoding=\"utf-8\" ?><Update Type=\"InvalidateAccount\"/>\r\n";
const AUTH_OKAY: &str =
    "<?xml version=\"1.0\" encoding=\"utf-8\" ?><Response Type=\"AuthToken\" Status=\"Okay\"/>\r\n";
const AUTH_FAIL: &str = "<?xml version=\"1.0\" encoding=\"utf-8\" ?><Response Status=\"Fail\" Type=\"Authenticate\" ErrorCode=\"301\" />\r\n";

type ApplianceReader = Lines<BufReader<ReadHalf<tokio::io::DuplexStream>>>;
type ApplianceWriter = WriteHalf<tokio::io::DuplexStream>;

fn descriptor() -> DeviceDescriptor {
    DeviceDescriptor {
        mac: "7825AD124BA0".to_owned(),
        ip: "192.168.1.23".parse().unwrap(),
        info: Default::default(),
    }
}

/// Builds a session attached to an in-memory pipe and returns the
/// appliance-side reader/writer.
async fn attached_session(token: Option<&str>) -> (Arc<DeviceSession>, ApplianceReader, ApplianceWriter) {
    let (client, server) = tokio::io::duplex(4096);
    let session = Arc::new(DeviceSession::new(
        descriptor(),
        token.map(str::to_owned),
    ));
    session.attach(client).await;

    let (read_half, write_half) = tokio::io::split(server);
    (session, BufReader::new(read_half).lines(), write_half)
}

async fn next_request(reader: &mut ApplianceReader) -> String {
    tokio::time::timeout(Duration::from_secs(5), reader.next_line())
        .await
        .expect("request within deadline")
        .expect("transport open")
        .expect("line present")
}

/// Asserts that no request arrives within a short grace window.
async fn assert_no_request(reader: &mut ApplianceReader) {
    let result = tokio::time::timeout(Duration::from_millis(200), reader.next_line()).await;
    assert!(result.is_err(), "unexpected request: {result:?}");
}

#[tokio::test]
async fn test_invalidate_with_stored_token_answers_auth_token_verbatim() {
    let (_session, mut reader, mut writer) = attached_session(Some(TOKEN)).await;

    writer.write_all(GREETING.as_bytes()).await.unwrap();
    writer.write_all(INVALIDATE.as_bytes()).await.unwrap();

    assert_eq!(
        next_request(&mut reader).await,
        format!(r#"<Request Type="AuthToken"><User Token="{TOKEN}" /></Request>"#)
    );
}

#[tokio::test]
async fn test_invalidate_without_token_answers_pairing_request() {
    let (_session, mut reader, mut writer) = attached_session(None).await;

    writer.write_all(GREETING.as_bytes()).await.unwrap();
    writer.write_all(INVALIDATE.as_bytes()).await.unwrap();

    assert_eq!(next_request(&mut reader).await, r#"<Request Type="GetToken" />"#);
}

#[tokio::test]
async fn test_fetch_status_waits_for_login_then_sends_exactly_one_request() {
    let (session, mut reader, mut writer) = attached_session(Some(TOKEN)).await;

    writer.write_all(GREETING.as_bytes()).await.unwrap();
    writer.write_all(INVALIDATE.as_bytes()).await.unwrap();
    let _auth_request = next_request(&mut reader).await;

    // Start the fetch before login completes: no DeviceState request may
    // leave the session yet.
    let fetching = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.fetch_status().await }
    });
    assert_no_request(&mut reader).await;

    // Complete the login; now exactly one DeviceState request must arrive.
    writer.write_all(AUTH_OKAY.as_bytes()).await.unwrap();
    assert_eq!(
        next_request(&mut reader).await,
        r#"<Request Type="DeviceState" DUID="7825AD124BA0"></Request>"#
    );
    assert_no_request(&mut reader).await;

    let state_line = concat!(
        r#"<?xml version="1.0" encoding="utf-8" ?>"#,
        r#"<Response Type="DeviceState" Status="Okay"/>"#,
        r#"<Attr ID="AC_FUN_POWER" Type="Enum" Value="On" />"#,
        r#"<Attr ID="AC_FUN_TEMPSET" Type="Int" Value="23" />"#,
        "\r\n",
    );
    writer.write_all(state_line.as_bytes()).await.unwrap();

    let state = fetching.await.unwrap().expect("fetch succeeds");
    assert_eq!(state.attribute("AC_FUN_POWER"), Some("On"));
    assert_eq!(state.attribute("AC_FUN_TEMPSET"), Some("23"));
    assert!(!state.pending_status);

    // A second fetch sends exactly one further request.
    let fetching = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.fetch_status().await }
    });
    assert_eq!(
        next_request(&mut reader).await,
        r#"<Request Type="DeviceState" DUID="7825AD124BA0"></Request>"#
    );
    assert_no_request(&mut reader).await;
    writer.write_all(state_line.as_bytes()).await.unwrap();
    fetching.await.unwrap().expect("second fetch succeeds");
}

#[tokio::test]
async fn test_pairing_flow_stores_the_issued_token() {
    let (session, mut reader, mut writer) = attached_session(None).await;

    writer.write_all(GREETING.as_bytes()).await.unwrap();
    writer.write_all(INVALIDATE.as_bytes()).await.unwrap();
    assert_eq!(next_request(&mut reader).await, r#"<Request Type="GetToken" />"#);

    writer
        .write_all(
            "<?xml version=\"1.0\" encoding=\"utf-8\" ?><Response Type=\"GetToken\" Status=\"Ready\"/>\r\n"
                .as_bytes(),
        )
        .await
        .unwrap();

    // The user power-cycles the appliance; it issues a fresh token.
    writer
        .write_all(
            format!(
                "<?xml version=\"1.0\" encoding=\"utf-8\" ?><Update Type=\"GetToken\" Status=\"Completed\" Token=\"{TOKEN}\"/>\r\n"
            )
            .as_bytes(),
        )
        .await
        .unwrap();

    session.wait_for_login().await.expect("pairing completes");
    assert_eq!(session.token().await.as_deref(), Some(TOKEN));

    let state = session.state().await;
    assert!(state.login_success);
    assert!(!state.waiting);
}

#[tokio::test]
async fn test_auth_failure_is_surfaced_to_waiters() {
    let (session, mut reader, mut writer) = attached_session(Some(TOKEN)).await;

    writer.write_all(GREETING.as_bytes()).await.unwrap();
    writer.write_all(INVALIDATE.as_bytes()).await.unwrap();
    let _auth_request = next_request(&mut reader).await;
    writer.write_all(AUTH_FAIL.as_bytes()).await.unwrap();

    let error = session.fetch_status().await.expect_err("auth failed");
    match error {
        SessionError::AuthenticationFailed { error_code } => assert_eq!(error_code, "301"),
        other => panic!("expected AuthenticationFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_hang_up_before_login_fails_waiters() {
    let (session, _reader, writer) = attached_session(Some(TOKEN)).await;

    // The appliance drops the connection without a word.
    drop(writer);
    drop(_reader);

    let error = session.wait_for_login().await.expect_err("hang up");
    assert!(matches!(error, SessionError::UnexpectedHangUp));
}

#[tokio::test]
async fn test_disconnect_stops_line_processing_and_closes_the_transport() {
    let (session, mut reader, mut writer) = attached_session(Some(TOKEN)).await;

    writer.write_all(GREETING.as_bytes()).await.unwrap();
    session.disconnect().await;

    // Lines arriving after the voluntary disconnect must not be consumed;
    // the transport may already be closed, so the writes are best-effort.
    let _ = writer.write_all(INVALIDATE.as_bytes()).await;
    let _ = writer.write_all(AUTH_OKAY.as_bytes()).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(
        !session.state().await.login_success,
        "session kept processing lines after voluntary disconnect"
    );

    // The controller side dropped its transport half; the appliance sees a
    // clean end of stream rather than a half-open connection.
    let closed = tokio::time::timeout(Duration::from_secs(5), reader.next_line())
        .await
        .expect("transport closes");
    assert!(matches!(closed, Ok(None)));

    // Further operations report the missing transport, not a hang-up.
    let error = session.fetch_status().await.expect_err("disconnected");
    assert!(matches!(error, SessionError::NotConnected));
}

#[tokio::test]
async fn test_operations_without_transport_fail_not_connected() {
    let session = DeviceSession::new(descriptor(), Some(TOKEN.to_owned()));

    let error = session.fetch_status().await.expect_err("no transport");
    assert!(matches!(error, SessionError::NotConnected));

    let error = session.set_temperature(23).await.expect_err("no transport");
    assert!(matches!(error, SessionError::NotConnected));
}

#[tokio::test]
async fn test_device_control_sends_attribute_pair_after_login() {
    let (session, mut reader, mut writer) = attached_session(Some(TOKEN)).await;

    writer.write_all(GREETING.as_bytes()).await.unwrap();
    writer.write_all(INVALIDATE.as_bytes()).await.unwrap();
    let _auth_request = next_request(&mut reader).await;
    writer.write_all(AUTH_OKAY.as_bytes()).await.unwrap();

    session.set_temperature(23).await.expect("control sent");

    let request = next_request(&mut reader).await;
    assert!(request.starts_with(r#"<Request Type="DeviceControl"><Control CommandID="cmd"#));
    assert!(request.contains(r#"DUID="7825AD124BA0""#));
    assert!(request.contains(r#"<Attr ID="AC_FUN_TEMPSET" Value="23" />"#));
}
