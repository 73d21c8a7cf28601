use std::time::Duration;

use sentinel_watch::AgentClient;
use sentinel_watch::AgentConnector;
use sentinel_watch::ChangeSubscription;
use sentinel_watch::Error;
use sentinel_watch::NetworkError;
use sentinel_watch::ProtocolError;
use sentinel_watch::PubSub;
use sentinel_watch::SentinelClient;
use sentinel_watch::SentinelOptions;
use sentinel_watch::TcpConnector;
use tokio::time::timeout;

use crate::common::closed_addr;
use crate::common::FakeSentinelServer;
use crate::common::SWITCH_MASTER;
use crate::enable_logger;

const WAIT: Duration = Duration::from_secs(2);

fn options() -> SentinelOptions {
    SentinelOptions {
        connect_timeout: Duration::from_millis(500),
        request_timeout: Duration::from_millis(500),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_query_master_address() {
    enable_logger();
    let server = FakeSentinelServer::start("mymaster", Some(("127.0.0.1", 6379))).await;
    let client = SentinelClient::connect(server.addr.clone(), options()).await.unwrap();

    client.ping().await.unwrap();
    assert_eq!(
        client.get_master_addr_by_name("mymaster").await.unwrap(),
        Some("127.0.0.1:6379".to_string())
    );
    assert_eq!(client.get_master_addr_by_name("unknown").await.unwrap(), None);

    server.set_master(Some(("127.0.0.2", 6380)));
    assert_eq!(
        client.get_master_addr_by_name("mymaster").await.unwrap(),
        Some("127.0.0.2:6380".to_string())
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_list_known_sentinels() {
    enable_logger();
    let server = FakeSentinelServer::start("mymaster", Some(("127.0.0.1", 6379))).await;
    server.set_peers(&[("127.0.0.1", 26380), ("127.0.0.1", 26381)]);
    let client = SentinelClient::connect(server.addr.clone(), options()).await.unwrap();

    assert_eq!(
        client.sentinels("mymaster").await.unwrap(),
        vec!["127.0.0.1:26380".to_string(), "127.0.0.1:26381".to_string()]
    );
    assert!(matches!(
        client.sentinels("unknown").await,
        Err(Error::Protocol(ProtocolError::Server(_)))
    ));

    // the connection survives an error reply
    client.ping().await.unwrap();
}

#[tokio::test]
async fn test_authentication() {
    enable_logger();
    let server =
        FakeSentinelServer::start_with_password("mymaster", Some(("127.0.0.1", 6379)), Some("s3cret")).await;

    let authed = SentinelOptions {
        password: Some("s3cret".to_string()),
        ..options()
    };
    let client = SentinelClient::connect(server.addr.clone(), authed).await.unwrap();
    assert!(client.get_master_addr_by_name("mymaster").await.unwrap().is_some());

    let wrong = SentinelOptions {
        password: Some("nope".to_string()),
        ..options()
    };
    assert!(matches!(
        SentinelClient::connect(server.addr.clone(), wrong).await,
        Err(Error::Protocol(ProtocolError::Server(_)))
    ));

    let anonymous = SentinelClient::connect(server.addr.clone(), options()).await.unwrap();
    assert!(matches!(
        anonymous.get_master_addr_by_name("mymaster").await,
        Err(Error::Protocol(ProtocolError::Server(_)))
    ));
}

#[tokio::test]
async fn test_connect_refused() {
    enable_logger();
    let addr = closed_addr().await;

    assert!(matches!(
        SentinelClient::connect(addr.clone(), options()).await,
        Err(Error::Network(NetworkError::Connect { .. }))
    ));
    assert!(TcpConnector::new(options()).connect(&addr).await.is_err());
}

#[tokio::test]
async fn test_client_close_twice() {
    enable_logger();
    let server = FakeSentinelServer::start("mymaster", Some(("127.0.0.1", 6379))).await;
    let client = SentinelClient::connect(server.addr.clone(), options()).await.unwrap();

    client.close().await.unwrap();
    assert!(matches!(client.close().await, Err(Error::AlreadyClosed(_))));
    assert!(matches!(client.ping().await, Err(Error::AlreadyClosed(_))));
}

#[tokio::test]
async fn test_client_request_fails_after_sentinel_shutdown() {
    enable_logger();
    let mut server = FakeSentinelServer::start("mymaster", Some(("127.0.0.1", 6379))).await;
    let client = SentinelClient::connect(server.addr.clone(), options()).await.unwrap();
    client.ping().await.unwrap();

    server.shutdown().await;
    assert!(client.ping().await.is_err());
}

#[tokio::test]
async fn test_subscription_delivers_messages() {
    enable_logger();
    let server = FakeSentinelServer::start("mymaster", Some(("127.0.0.1", 6379))).await;
    let client = TcpConnector::new(options()).connect(&server.addr).await.unwrap();

    let subscription = client.subscribe(SWITCH_MASTER).await.unwrap();
    assert!(server.wait_for_subscribers(1, WAIT).await);

    server.publish("+sdown", "master mymaster 127.0.0.1 6379");
    server.publish(SWITCH_MASTER, "mymaster 127.0.0.1 6379 127.0.0.2 6379");

    let message = timeout(WAIT, subscription.receive()).await.unwrap();
    assert_eq!(message.as_deref(), Some("mymaster 127.0.0.1 6379 127.0.0.2 6379"));

    subscription.close().await.unwrap();
    assert_eq!(timeout(WAIT, subscription.receive()).await.unwrap(), None);
    assert!(server.wait_for_subscribers(0, WAIT).await);
    assert!(matches!(subscription.close().await, Err(Error::AlreadyClosed(_))));
}

#[tokio::test]
async fn test_subscription_ends_when_sentinel_goes_away() {
    enable_logger();
    let mut server = FakeSentinelServer::start("mymaster", Some(("127.0.0.1", 6379))).await;
    let subscription = PubSub::open(&server.addr, &options(), SWITCH_MASTER).await.unwrap();
    assert_eq!(subscription.channel(), SWITCH_MASTER);
    assert!(server.wait_for_subscribers(1, WAIT).await);

    server.shutdown().await;

    assert_eq!(timeout(WAIT, subscription.receive()).await.unwrap(), None);
    subscription.close().await.unwrap();
}
