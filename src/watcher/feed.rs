use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::AgentClient;
use crate::AgentConnector;
use crate::ChangeSubscription;
use crate::MasterResolver;
use crate::Result;
use crate::SwitchMasterEvent;
use crate::SWITCH_MASTER_CHANNEL;

/// Per-sentinel resources owned by the watcher
///
/// Client and subscription live in one record so they cannot drift apart.
/// Each slot is released independently and left empty afterwards.
pub(super) struct AgentFeed {
    pub(super) addr: String,
    client: Option<Arc<dyn AgentClient>>,
    subscription: Option<Arc<dyn ChangeSubscription>>,
    listener: Option<JoinHandle<()>>,
}

impl AgentFeed {
    /// Connects to `addr`, subscribes to `+switch-master` and spawns the
    /// listener
    ///
    /// Failures are logged and leave the corresponding slots empty; losing
    /// one feed only costs redundancy.
    pub(super) async fn open(
        addr: String,
        connector: Arc<dyn AgentConnector>,
        resolver: Arc<dyn MasterResolver>,
    ) -> Self {
        info!("Listening for {} on {:?}", SWITCH_MASTER_CHANNEL, addr);
        let mut feed = Self {
            addr,
            client: None,
            subscription: None,
            listener: None,
        };

        let client = match connector.connect(&feed.addr).await {
            Ok(client) => client,
            Err(e) => {
                warn!("sentinel {:?} unavailable, feed disabled: {}", feed.addr, e);
                return feed;
            }
        };
        feed.client = Some(client.clone());

        match client.subscribe(SWITCH_MASTER_CHANNEL).await {
            Ok(subscription) => {
                feed.listener = Some(tokio::spawn(listen(
                    resolver,
                    subscription.clone(),
                    feed.addr.clone(),
                )));
                feed.subscription = Some(subscription);
            }
            Err(e) => warn!("subscribe to {} on {:?} failed: {}", SWITCH_MASTER_CHANNEL, feed.addr, e),
        }

        feed
    }

    pub(super) fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub(super) async fn close_subscription(&mut self) -> Result<()> {
        let Some(subscription) = self.subscription.take() else {
            return Ok(());
        };
        let result = subscription.close().await;
        if let Err(e) = &result {
            warn!("closing subscription on {:?} failed: {}", self.addr, e);
        }
        result
    }

    pub(super) async fn close_client(&mut self) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        let result = client.close().await;
        if let Err(e) = &result {
            warn!("closing sentinel client {:?} failed: {}", self.addr, e);
        }
        result
    }
}

/// Drains one subscription into the resolver's arbitration
///
/// Ends silently when the subscription is closed or its connection drops.
async fn listen(
    resolver: Arc<dyn MasterResolver>,
    subscription: Arc<dyn ChangeSubscription>,
    sentinel_addr: String,
) {
    let master_name = resolver.master_name();
    while let Some(payload) = subscription.receive().await {
        match SwitchMasterEvent::parse(&payload) {
            Ok(event) if event.master_name == master_name => {
                debug!("{} from {:?}: {:?}", SWITCH_MASTER_CHANNEL, sentinel_addr, event);
                resolver.try_switch_master(&event.new_addr);
            }
            Ok(event) => debug!("ignoring {} for master {:?}", SWITCH_MASTER_CHANNEL, event.master_name),
            Err(e) => warn!("sentinel {:?}: {}", sentinel_addr, e),
        }
    }
    debug!("stopped listening for {} on {:?}", SWITCH_MASTER_CHANNEL, sentinel_addr);
}
