mod common;

use std::time::Duration;

use apollo_client::transport::{Outcome, Transport};
use apollo_client::{Error, Resolver, Result, SingleHostResolver};
use common::{MockServer, Step};

/// Fixed list of hosts, tried in order.
struct Hosts(Vec<String>);

impl Resolver for Hosts {
    fn resolve(&self) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

fn transport(max_retries: u32) -> Transport {
    Transport::new(Duration::from_millis(300), Duration::from_millis(10), max_retries).unwrap()
}

#[tokio::test]
async fn test_retries_through_timeout_and_bad_status() {
    let mock = MockServer::start().await;
    mock.script(&[Step::Hang, Step::Status(404), Step::Status(200)]);
    let resolver = SingleHostResolver::new(&mock.addr);

    let outcome = transport(3)
        .execute::<serde_json::Value>(&resolver, "flaky", None)
        .await
        .unwrap();

    assert_eq!(outcome.into_body(), Some(serde_json::json!({"ok": true})));
    assert_eq!(mock.hits("flaky"), 3);
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    let mock = MockServer::start().await;
    mock.script(&[Step::Hang, Step::Status(404), Step::Status(200)]);
    let resolver = SingleHostResolver::new(&mock.addr);

    let err = transport(2)
        .execute::<serde_json::Value>(&resolver, "flaky", None)
        .await
        .unwrap_err();

    match err {
        Error::AllHostsFailed(errors) => {
            assert_eq!(errors.len(), 2);
            assert!(matches!(errors.errors()[1], Error::InvalidStatus(404)));
            assert!(errors.to_string().starts_with("2 errors occurred: err 0- "));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_not_modified_and_gateway_timeout_are_outcomes() {
    let mock = MockServer::start().await;
    mock.script(&[Step::Status(304), Step::Status(504)]);
    let resolver = SingleHostResolver::new(&mock.addr);
    let t = transport(3);

    let first = t.execute::<serde_json::Value>(&resolver, "flaky", None).await.unwrap();
    assert!(matches!(first, Outcome::NotModified));

    let second = t.execute::<serde_json::Value>(&resolver, "flaky", None).await.unwrap();
    assert!(matches!(second, Outcome::GatewayTimeout));
    assert_eq!(mock.hits("flaky"), 2);
}

#[tokio::test]
async fn test_undecodable_body_counts_as_failed_attempt() {
    let mock = MockServer::start().await;
    mock.script(&[Step::Status(200)]);
    let resolver = SingleHostResolver::new(&mock.addr);

    // {"ok": true} is not a list
    let err = transport(1)
        .execute::<Vec<String>>(&resolver, "flaky", None)
        .await
        .unwrap_err();
    match err {
        Error::AllHostsFailed(errors) => assert!(matches!(errors.errors()[0], Error::Decode(_))),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_zero_retries_never_contacts_host() {
    let mock = MockServer::start().await;
    let resolver = SingleHostResolver::new(&mock.addr);

    let err = transport(0)
        .execute::<serde_json::Value>(&resolver, "flaky", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AllHostsFailed(ref e) if e.is_empty()));
    assert_eq!(mock.hits("flaky"), 0);
}

#[tokio::test]
async fn test_fails_over_to_next_host() {
    let mock = MockServer::start().await;
    mock.script(&[Step::Status(200)]);
    let resolver = Hosts(vec!["http://127.0.0.1:1".to_string(), mock.addr.clone()]);

    let outcome = transport(2)
        .execute::<serde_json::Value>(&resolver, "flaky", None)
        .await
        .unwrap();

    assert_eq!(outcome.into_body(), Some(serde_json::json!({"ok": true})));
    assert_eq!(mock.hits("flaky"), 1);
}

#[tokio::test]
async fn test_every_host_failing_collects_all_attempts() {
    let mock = MockServer::start().await;
    mock.script(&[Step::Status(500), Step::Status(502)]);
    let resolver = Hosts(vec!["http://127.0.0.1:1".to_string(), mock.addr.clone()]);

    let err = transport(2)
        .execute::<serde_json::Value>(&resolver, "flaky", None)
        .await
        .unwrap_err();
    match err {
        Error::AllHostsFailed(errors) => {
            // two refused connections, then two bad statuses from the mock
            assert_eq!(errors.len(), 4);
            assert!(matches!(errors.errors()[0], Error::Http(_)));
            assert!(matches!(errors.errors()[2], Error::InvalidStatus(500)));
            assert!(matches!(errors.errors()[3], Error::InvalidStatus(502)));
        }
        other => panic!("unexpected error: {other}"),
    }
}
