//! Integration tests for nefit-client.
//!
//! These drive a full client against the in-process device end of a
//! [`MemoryConnector`] session.

use std::sync::Arc;
use std::time::Duration;

use nefit_client::crypto::Encryptor;
use nefit_client::transport::{MemoryConnector, MemoryDevice, SentMessage, TlsVersion};
use nefit_client::{
    uris, CallContext, Client, Config, ConnectionState, NefitError, Payload, PushNotification,
    UserMode,
};
use tokio::sync::{mpsc, Semaphore};

const SERIAL: &str = "123456789";
const ACCESS_KEY: &str = "abcdefghij";
const PASSWORD: &str = "testpass";

fn config() -> Config {
    Config::new(SERIAL, ACCESS_KEY, PASSWORD)
        .max_retries(2)
        .retry_timeout(Duration::from_millis(300))
}

fn encryptor() -> Encryptor {
    Encryptor::new(ACCESS_KEY, PASSWORD).unwrap()
}

async fn connected(config: Config) -> (Client, Arc<MemoryDevice>) {
    let (connector, device) = MemoryConnector::new();
    let client = Client::builder(config)
        .connector(connector)
        .build()
        .unwrap();
    client.connect(&CallContext::new()).await.unwrap();
    (client, Arc::new(device))
}

/// Method and URI from the request line.
fn request_line(msg: &SentMessage) -> (String, String) {
    let line = msg.text.lines().next().unwrap_or_default();
    let mut parts = line.split(' ');
    let method = parts.next().unwrap_or_default().to_string();
    let uri = parts.next().unwrap_or_default().to_string();
    (method, uri)
}

/// Decrypted body of a PUT request.
fn request_payload(msg: &SentMessage) -> String {
    let (_, body) = msg.text.split_once("\r\n\r\n").unwrap();
    encryptor().decrypt_and_strip(body).unwrap()
}

fn json_reply(json: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{}",
        encryptor().encrypt(json)
    )
}

fn status_reply(code: u16, reason: &str) -> String {
    format!("HTTP/1.1 {} {}\r\n\r\n", code, reason)
}

/// Answer every request with `reply(request)`, or stay silent on `None`.
fn serve<F>(device: Arc<MemoryDevice>, reply: F) -> tokio::task::JoinHandle<()>
where
    F: Fn(&SentMessage) -> Option<String> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(msg) = device.next_message().await {
            if let Some(text) = reply(&msg) {
                device.send_chat(text);
            }
        }
    })
}

#[tokio::test]
async fn test_session_addressing_and_tls() {
    let (client, device) = connected(config()).await;

    let params = device.session_params().unwrap();
    assert_eq!(params.address, "wa2-mz36-qrmzh6.bosch.de:5222");
    assert_eq!(params.jid, "rrccontact_123456789@wa2-mz36-qrmzh6.bosch.de");
    assert_eq!(params.password, "Ct7ZR03b_abcdefghij");
    assert!(params.tls.starttls);
    assert_eq!(params.tls.min_version, TlsVersion::Tls12);
    assert_eq!(params.tls.server_name, "wa2-mz36-qrmzh6.bosch.de");

    assert_eq!(client.state(), ConnectionState::Connected);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_get_returns_decrypted_json() {
    let (client, device) = connected(config()).await;

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    serve(device.clone(), move |msg| {
        let _ = seen_tx.send(msg.clone());
        Some(json_reply(
            r#"{"id":"/system/appliance/systemPressure","type":"floatValue","value":1.8,"unitOfMeasure":"bar"}"#,
        ))
    });

    let payload = client
        .get(&CallContext::new(), uris::PRESSURE)
        .await
        .unwrap();
    assert_eq!(payload.value(), Some(&serde_json::json!(1.8)));
    assert_eq!(payload.id(), Some(uris::PRESSURE));

    let sent = seen_rx.recv().await.unwrap();
    assert_eq!(sent.to, "rrcgateway_123456789@wa2-mz36-qrmzh6.bosch.de");
    assert_eq!(
        sent.text,
        "GET /system/appliance/systemPressure HTTP/1.1\r\nUser-Agent: NefitEasy\r\n\r\n"
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_get_plain_text_payload() {
    let (client, device) = connected(config()).await;
    serve(device.clone(), |_| {
        Some(format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n{}",
            encryptor().encrypt("hello")
        ))
    });

    let payload = client.get(&CallContext::new(), "/x").await.unwrap();
    assert_eq!(payload, Payload::Text("hello".to_string()));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_get_non_200_surfaces_status() {
    let (client, device) = connected(config()).await;

    let (count_tx, mut count_rx) = mpsc::unbounded_channel();
    serve(device.clone(), move |_| {
        let _ = count_tx.send(());
        Some(status_reply(404, "Not Found"))
    });

    let err = client.get(&CallContext::new(), "/nope").await.unwrap_err();
    assert_eq!(err.remote_status(), Some((404, "Not Found")));
    assert!(matches!(err, NefitError::RequestFailed { attempts: 1, .. }));

    count_rx.recv().await.unwrap();
    assert!(count_rx.try_recv().is_err());
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_get_retries_after_timeout() {
    let (client, device) = connected(config()).await;

    // Ignore the first request, answer the second.
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = calls.clone();
    serve(device.clone(), move |_| {
        let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        (n > 0).then(|| json_reply(r#"{"value":"clock"}"#))
    });

    let payload = client.get(&CallContext::new(), uris::USER_MODE).await.unwrap();
    assert_eq!(payload.value(), Some(&serde_json::json!("clock")));
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_get_gives_up_after_max_attempts() {
    let (client, device) = connected(config()).await;
    serve(device.clone(), |_| None);

    let err = client.get(&CallContext::new(), "/silent").await.unwrap_err();
    match &err {
        NefitError::RequestFailed { attempts, uri, .. } => {
            assert_eq!(*attempts, 3);
            assert_eq!(uri, "/silent");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.root().is_timeout());
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_put_sends_encrypted_json() {
    let (client, device) = connected(config()).await;

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    serve(device.clone(), move |msg| {
        let _ = seen_tx.send(msg.clone());
        Some(status_reply(204, "No Content"))
    });

    client
        .put(
            &CallContext::new(),
            uris::MANUAL_SETPOINT,
            &serde_json::json!({ "value": 21.5 }),
        )
        .await
        .unwrap();

    let sent = seen_rx.recv().await.unwrap();
    assert_eq!(
        request_line(&sent),
        ("PUT".to_string(), uris::MANUAL_SETPOINT.to_string())
    );
    assert!(sent.text.contains("Content-Type: application/json\r\n"));
    assert!(sent.text.contains("Content-Length: 24\r\n"));
    assert!(sent.text.contains("User-Agent: NefitEasy\r\n"));
    assert_eq!(request_payload(&sent), r#"{"value":21.5}"#);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_put_raw_sends_verbatim() {
    let (client, device) = connected(config()).await;

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    serve(device.clone(), move |msg| {
        let _ = seen_tx.send(request_payload(msg));
        Some(status_reply(204, "No Content"))
    });

    client
        .put_raw(&CallContext::new(), "/x", r#"{"value":"on"}"#)
        .await
        .unwrap();
    assert_eq!(seen_rx.recv().await.unwrap(), r#"{"value":"on"}"#);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_put_rejection_is_not_retried() {
    let (client, device) = connected(config()).await;

    let (count_tx, mut count_rx) = mpsc::unbounded_channel();
    serve(device.clone(), move |_| {
        let _ = count_tx.send(());
        Some(status_reply(400, "Bad Request"))
    });

    let err = client
        .put(&CallContext::new(), uris::USER_MODE, &serde_json::json!({ "value": "bogus" }))
        .await
        .unwrap_err();

    assert_eq!(err.remote_status(), Some((400, "Bad Request")));
    assert!(matches!(err, NefitError::RequestFailed { attempts: 1, .. }));

    count_rx.recv().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(count_rx.try_recv().is_err());
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_error_stanza_fails_pending_request() {
    let (client, device) = connected(config()).await;

    let responder = device.clone();
    tokio::spawn(async move {
        while responder.next_message().await.is_some() {
            responder.send_error("service-unavailable");
        }
    });

    let err = client.get(&CallContext::new(), "/x").await.unwrap_err();
    assert!(matches!(err.root(), NefitError::ErrorStanza(t) if t == "service-unavailable"));
    assert!(matches!(err, NefitError::RequestFailed { attempts: 1, .. }));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_push_notification_reaches_subscribers() {
    let (client, device) = connected(config()).await;

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    for tag in ["a", "b"] {
        let seen_tx = seen_tx.clone();
        client.subscribe(move |n: PushNotification| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send((tag, n));
            }
        });
    }

    device.send_chat(json_reply(r#"{"id":"/ecus/rrc/uiStatus","value":{"UMD":"clock"}}"#));

    let mut got = Vec::new();
    for _ in 0..2 {
        let (tag, n) = tokio::time::timeout(Duration::from_secs(1), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n.uri, uris::STATUS);
        assert_eq!(
            n.payload.value(),
            Some(&serde_json::json!({ "UMD": "clock" }))
        );
        got.push(tag);
    }
    got.sort();
    assert_eq!(got, vec!["a", "b"]);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_full_notification_buffer_keeps_buffered_and_serves_requests() {
    let (connector, device) = MemoryConnector::new();
    let client = Client::builder(config())
        .connector(connector)
        .notification_capacity(1)
        .build()
        .unwrap();
    client.connect(&CallContext::new()).await.unwrap();
    let device = Arc::new(device);

    let gate = Arc::new(Semaphore::new(0));
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    {
        let gate = gate.clone();
        client.subscribe(move |n: PushNotification| {
            let seen_tx = seen_tx.clone();
            let gate = gate.clone();
            async move {
                let _ = seen_tx.send(n.uri);
                let _ = gate.acquire().await;
            }
        });
    }

    // All three arrive in one burst; only the first fits the buffer.
    for i in 0..3 {
        device.send_chat(json_reply(&format!(r#"{{"id":"/push/{}","value":{}}}"#, i, i)));
    }

    let first = tokio::time::timeout(Duration::from_secs(1), seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, "/push/0");

    // The subscriber is still parked on the gate.
    serve(device.clone(), |_| Some(json_reply(r#"{"id":"/x","value":7}"#)));
    let payload = tokio::time::timeout(
        Duration::from_secs(1),
        client.get(&CallContext::new(), "/x"),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(payload.value(), Some(&serde_json::json!(7)));

    gate.add_permits(10);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(seen_rx.try_recv().is_err());

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_requests_are_serialized() {
    let (client, device) = connected(
        Config::new(SERIAL, ACCESS_KEY, PASSWORD)
            .max_retries(0)
            .retry_timeout(Duration::from_secs(5)),
    )
    .await;

    let mut calls = Vec::new();
    for i in 0..3 {
        let client = client.clone();
        calls.push(tokio::spawn(async move {
            client.get(&CallContext::new(), &format!("/r{}", i)).await
        }));
    }

    for _ in 0..3 {
        let msg = device.next_message().await.unwrap();
        // Nothing else may be on the wire until this one is answered.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(device.try_next_message().is_none());

        let (_, uri) = request_line(&msg);
        device.send_chat(json_reply(&format!(r#"{{"id":"{}","value":1}}"#, uri)));
    }

    for (i, call) in calls.into_iter().enumerate() {
        let payload = call.await.unwrap().unwrap();
        assert_eq!(payload.id(), Some(format!("/r{}", i).as_str()));
    }

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_call_returns_promptly() {
    let (client, device) = connected(
        Config::new(SERIAL, ACCESS_KEY, PASSWORD).retry_timeout(Duration::from_secs(30)),
    )
    .await;
    serve(device.clone(), |_| None);

    let ctx = CallContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = tokio::time::timeout(Duration::from_secs(2), client.get(&ctx, "/x"))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err.root(), NefitError::Cancelled));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_close_shuts_everything_down() {
    let (client, device) = connected(config()).await;

    client.close().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(!client.is_connected());
    assert!(device.is_closed());

    let err = client.get(&CallContext::new(), "/x").await.unwrap_err();
    assert!(matches!(err, NefitError::NotConnected));

    // Idempotent.
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_set_temperature_issues_three_puts() {
    let (client, device) = connected(config()).await;

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    serve(device.clone(), move |msg| {
        let _ = seen_tx.send((request_line(msg).1, request_payload(msg)));
        Some(status_reply(204, "No Content"))
    });

    client
        .set_temperature(&CallContext::new(), 19.5)
        .await
        .unwrap();

    let mut puts = Vec::new();
    for _ in 0..3 {
        puts.push(seen_rx.recv().await.unwrap());
    }
    assert_eq!(
        puts,
        vec![
            (uris::MANUAL_SETPOINT.to_string(), r#"{"value":19.5}"#.to_string()),
            (
                uris::MANUAL_TEMP_OVERRIDE_STATUS.to_string(),
                r#"{"value":"on"}"#.to_string()
            ),
            (
                uris::MANUAL_TEMP_OVERRIDE_TEMP.to_string(),
                r#"{"value":19.5}"#.to_string()
            ),
        ]
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_hot_water_follows_user_mode() {
    let (client, device) = connected(config()).await;

    let (put_tx, mut put_rx) = mpsc::unbounded_channel();
    serve(device.clone(), move |msg| {
        let (method, uri) = request_line(msg);
        match (method.as_str(), uri.as_str()) {
            ("GET", uris::USER_MODE) => Some(json_reply(r#"{"value":"clock"}"#)),
            ("GET", uris::HOT_WATER_CLOCK_MODE) => Some(json_reply(r#"{"value":"on"}"#)),
            ("PUT", _) => {
                let _ = put_tx.send((uri, request_payload(msg)));
                Some(status_reply(204, "No Content"))
            }
            _ => Some(status_reply(404, "Not Found")),
        }
    });

    let ctx = CallContext::new();
    assert_eq!(client.user_mode(&ctx).await.unwrap(), UserMode::Clock);
    assert!(client.hot_water_supply(&ctx).await.unwrap());

    client.set_hot_water_supply(&ctx, false).await.unwrap();
    assert_eq!(
        put_rx.recv().await.unwrap(),
        (
            uris::HOT_WATER_CLOCK_MODE.to_string(),
            r#"{"value":"off"}"#.to_string()
        )
    );

    client.set_user_mode(&ctx, UserMode::Manual).await.unwrap();
    assert_eq!(
        put_rx.recv().await.unwrap(),
        (uris::USER_MODE.to_string(), r#"{"value":"manual"}"#.to_string())
    );

    client.close().await.unwrap();
}
