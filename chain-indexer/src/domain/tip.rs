// This file is part of wasm-indexer.
// Copyright (C) 2025 Wasm Indexer Contributors
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::node::Node;
use futures::StreamExt;
use log::{debug, warn};
use std::{pin::pin, sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::{self, JoinHandle},
    time::sleep,
};

const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// The latest block height known to exist on the remote node, fed by a WebSocket `NewBlock`
/// subscription and by polling in parallel. Either source satisfies the initial ready signal;
/// WebSocket disconnects are non-fatal as polling keeps running.
#[derive(Clone)]
pub struct TipTracker {
    receiver: watch::Receiver<Option<u64>>,
    _tasks: Arc<TaskGuard>,
}

impl TipTracker {
    /// Spawn the polling and subscription tasks for the given node.
    pub fn spawn<N>(node: N, poll_interval: Duration) -> Self
    where
        N: Node,
    {
        let (sender, receiver) = watch::channel(None);
        let sender = Arc::new(sender);

        let poll_task = task::spawn(poll_tip(node.clone(), sender.clone(), poll_interval));
        let subscribe_task = task::spawn(subscribe_tip(node, sender));

        Self {
            receiver,
            _tasks: Arc::new(TaskGuard(vec![poll_task, subscribe_task])),
        }
    }

    /// The latest known tip, `None` until the first signal from either source.
    pub fn latest(&self) -> Option<u64> {
        *self.receiver.borrow()
    }

    /// Wait until the tip is known at all and return it.
    pub async fn ready(&mut self) -> u64 {
        let tip = self
            .receiver
            .wait_for(|tip| tip.is_some())
            .await
            .expect("tip tracker tasks hold the sender");
        tip.expect("tip is some")
    }
}

struct TaskGuard(Vec<JoinHandle<()>>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

fn advance(sender: &watch::Sender<Option<u64>>, height: u64) {
    sender.send_if_modified(|tip| {
        if tip.is_none_or(|tip| height > tip) {
            *tip = Some(height);
            true
        } else {
            false
        }
    });
}

async fn poll_tip<N>(node: N, sender: Arc<watch::Sender<Option<u64>>>, poll_interval: Duration)
where
    N: Node,
{
    loop {
        match node.height().await {
            Ok(height) => advance(&sender, height),
            Err(error) => warn!(error:%; "cannot poll node height"),
        }

        sleep(poll_interval).await;
    }
}

async fn subscribe_tip<N>(node: N, sender: Arc<watch::Sender<Option<u64>>>)
where
    N: Node,
{
    let mut reconnect_delay = RECONNECT_BASE_DELAY;

    loop {
        let mut heights = pin!(node.new_block_heights());

        while let Some(height) = heights.next().await {
            match height {
                Ok(height) => {
                    advance(&sender, height);
                    reconnect_delay = RECONNECT_BASE_DELAY;
                }

                Err(error) => {
                    warn!(error:%; "new-block subscription failed");
                    break;
                }
            }
        }

        debug!(delay:? = reconnect_delay; "new-block subscription ended, reconnecting");
        sleep(reconnect_delay).await;
        reconnect_delay = (reconnect_delay * 2).min(RECONNECT_MAX_DELAY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::{BlockData, NodeError, NodeStatus};
    use futures::{Stream, stream};
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Clone)]
    struct MockNode {
        polled_height: Option<Arc<AtomicU64>>,
        subscribed_heights: Vec<u64>,
    }

    impl Node for MockNode {
        async fn status(&self) -> Result<NodeStatus, NodeError> {
            unimplemented!("not used by the tip tracker")
        }

        async fn height(&self) -> Result<u64, NodeError> {
            self.polled_height
                .as_ref()
                .map(|height| height.load(Ordering::SeqCst))
                .ok_or(NodeError::RateLimited)
        }

        async fn block(&self, _height: u64) -> Result<BlockData, NodeError> {
            unimplemented!("not used by the tip tracker")
        }

        fn new_block_heights(&self) -> impl Stream<Item = Result<u64, NodeError>> + Send {
            stream::iter(self.subscribed_heights.clone().into_iter().map(Ok))
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_ready_from_either_source() {
        // Subscription yields nothing, polling provides the signal.
        let mut tip = TipTracker::spawn(
            MockNode {
                polled_height: Some(Arc::new(AtomicU64::new(42))),
                subscribed_heights: vec![],
            },
            Duration::from_secs(3),
        );
        assert_eq!(tip.ready().await, 42);

        // Polling fails, the subscription alone provides the signal.
        let mut tip = TipTracker::spawn(
            MockNode {
                polled_height: None,
                subscribed_heights: vec![7, 9, 8],
            },
            Duration::from_secs(3),
        );
        assert_eq!(tip.ready().await, 7);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_tip_is_monotonic() {
        let polled_height = Arc::new(AtomicU64::new(100));
        let tip = TipTracker::spawn(
            MockNode {
                polled_height: Some(polled_height.clone()),
                subscribed_heights: vec![105],
            },
            Duration::from_secs(3),
        );

        let mut receiver = tip.receiver.clone();
        receiver.wait_for(|tip| *tip == Some(105)).await.unwrap();

        // A lagging poll must not rewind the tip.
        polled_height.store(101, Ordering::SeqCst);
        sleep(Duration::from_secs(4)).await;
        assert_eq!(tip.latest(), Some(105));
    }
}
