//! Poller - scheduled / retry set から ready queue への昇格
//!
//! # フロー（1 イテレーション）
//! 1. 各 promotion set から score <= now のエントリを取得
//! 2. デコードして宛先の queue を決める（壊れたデータは削除してログ）
//! 3. `OrderedStore::promote` で「削除できた時だけ push」をアトミックに実行
//! 4. 削除できなかった = 別の poller が先に取った → 黙ってスキップ
//!
//! 削除と push が 1 つのトランザクションなので、複数 poller が同時に動いても
//! 二重昇格せず、削除後に push が失敗して消える（orphan）こともありません。
//!
//! ループは ticker ではなく「処理 → sleep」の繰り返しなので、遅いイテレーションは
//! 自然に間隔が空きます。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::TaskMessage;
use crate::ports::{Clock, OrderedStore, StoreError, to_score};
use crate::queue::Keys;

pub struct Poller {
    store: Arc<dyn OrderedStore>,
    keys: Keys,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        store: Arc<dyn OrderedStore>,
        keys: Keys,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            keys,
            clock,
            interval,
        }
    }

    /// Loop until the shutdown flag flips to `true` (or its sender is dropped).
    #[instrument(name = "poller", skip_all)]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "poller started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.poll_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("poller stopped");
    }

    /// One pass over both promotion sets. Returns how many entries this call promoted.
    pub async fn poll_once(&self) -> usize {
        let now = to_score(self.clock.now());
        let mut promoted = 0;

        for set in self.keys.promotion_sets() {
            let members = match self.store.due(set, now).await {
                Ok(members) => members,
                Err(e) => {
                    warn!(set, error = %e, "failed to query due entries");
                    continue;
                }
            };

            for member in members {
                match self.promote_entry(set, &member).await {
                    Ok(true) => promoted += 1,
                    Ok(false) => {}
                    Err(e) => warn!(set, error = %e, "failed to promote entry"),
                }
            }
        }
        promoted
    }

    async fn promote_entry(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let message = match TaskMessage::decode(member) {
            Ok(message) if !message.queue.is_empty() => message,
            Ok(_) => {
                error!(set, member, "discarding entry without a queue name");
                self.store.remove(set, member).await?;
                return Ok(false);
            }
            Err(e) => {
                error!(set, member, error = %e, "discarding undecodable entry");
                self.store.remove(set, member).await?;
                return Ok(false);
            }
        };

        let ready = self.keys.queue(&message.queue);
        let moved = self.store.promote(set, member, &ready).await?;
        if moved {
            debug!(set, task_id = %message.id, queue = %message.queue, "task promoted");
        }
        Ok(moved)
    }
}
