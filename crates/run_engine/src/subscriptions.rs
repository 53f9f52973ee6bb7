use std::sync::Arc;

use stream_protocol::{Channel, EventHandler, EventSource, RunId, Subscription};
use tracing::debug;

use crate::error::LaunchError;

/// The four channel subscriptions of one run, released together.
///
/// Acquisition is all-or-nothing: if any channel fails, the ones already
/// acquired are released before the error is returned. Dropping the value
/// releases every channel.
#[derive(Debug)]
pub struct RunSubscriptions {
    run_id: RunId,
    subscriptions: Vec<Subscription>,
}

impl RunSubscriptions {
    pub fn acquire(
        source: &dyn EventSource,
        run_id: RunId,
        handler: EventHandler,
    ) -> Result<Self, LaunchError> {
        let mut subscriptions = Vec::with_capacity(Channel::ALL.len());
        for channel in Channel::ALL {
            match source.subscribe(channel, run_id, Arc::clone(&handler)) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(message) => {
                    debug!(run_id, %channel, acquired = subscriptions.len(), "releasing partial subscriptions");
                    drop(subscriptions);
                    return Err(LaunchError::Subscribe {
                        run_id,
                        channel,
                        message,
                    });
                }
            }
        }

        debug!(run_id, "subscribed to run channels");
        Ok(Self {
            run_id,
            subscriptions,
        })
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn keys(&self) -> Vec<&str> {
        self.subscriptions.iter().map(Subscription::key).collect()
    }

    /// Releases all channels now.
    pub fn release(self) {
        debug!(run_id = self.run_id, "releasing run channels");
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
    }
}
