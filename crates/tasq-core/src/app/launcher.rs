//! Launcher - poller / dispatcher / worker pool の組み立てと起動・停止
//!
//! # 起動時検証（Fail-fast）
//! - `build()` で設定値と handler 登録（最低 1 queue）をチェック
//! - 同じ queue への二重登録は `handle()` の時点でエラー
//!
//! # シャットダウン
//! 1. watch channel で停止を通知（新規の取り出しを止める）
//! 2. poller / dispatcher ループの終了を待つ
//! 3. worker pool を drain して実行中の handler の完了を待つ
//!
//! 実行中の handler を強制キャンセルはしません。

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::app::dispatcher::{Dispatcher, DispatcherOptions};
use crate::app::poller::Poller;
use crate::app::pool::WorkerPool;
use crate::app::registry::{HandlerRegistry, TaskHandler};
use crate::config::Config;
use crate::domain::TasqError;
use crate::impls::RedisStore;
use crate::ports::{Clock, OrderedStore, SystemClock};
use crate::queue::Keys;

/// Builds a [`Launcher`].
///
/// ```ignore
/// let mut launcher = Launcher::builder(store)
///     .config(config)
///     .handle("default", EmailHandler)?
///     .build()?;
/// launcher.start()?;
/// ```
pub struct LauncherBuilder {
    store: Arc<dyn OrderedStore>,
    config: Config,
    clock: Arc<dyn Clock>,
    registry: HandlerRegistry,
}

impl LauncherBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach the handler for `queue`. One handler per queue.
    pub fn handle(
        mut self,
        queue: impl Into<String>,
        handler: impl TaskHandler + 'static,
    ) -> Result<Self, TasqError> {
        self.registry.register(queue, Arc::new(handler))?;
        Ok(self)
    }

    pub fn build(self) -> Result<Launcher, TasqError> {
        self.config.validate()?;
        if self.registry.is_empty() {
            return Err(TasqError::NoHandlers);
        }

        let keys = Keys::new(&self.config.key_prefix);
        let pool = WorkerPool::new(self.config.pool_size);
        let poller = Poller::new(
            Arc::clone(&self.store),
            keys.clone(),
            Arc::clone(&self.clock),
            self.config.poll_interval(),
        );
        let dispatcher = Dispatcher::new(
            self.store,
            keys,
            self.clock,
            self.registry,
            pool.clone(),
            DispatcherOptions {
                policy: self.config.retry_policy(),
                dequeue_timeout: self.config.dequeue_timeout(),
                dead_retention: self.config.dead_retention(),
            },
        );
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Launcher {
            poller: Arc::new(poller),
            dispatcher: Arc::new(dispatcher),
            pool,
            shutdown_tx,
            joins: Vec::new(),
            started: false,
        })
    }
}

/// Owns the background loops of one worker process.
pub struct Launcher {
    poller: Arc<Poller>,
    dispatcher: Arc<Dispatcher>,
    pool: WorkerPool,
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
    started: bool,
}

impl Launcher {
    pub fn builder(store: Arc<dyn OrderedStore>) -> LauncherBuilder {
        LauncherBuilder {
            store,
            config: Config::default(),
            clock: Arc::new(SystemClock),
            registry: HandlerRegistry::new(),
        }
    }

    /// Builder backed by the Redis store named in `config`.
    pub async fn connect(config: Config) -> Result<LauncherBuilder, TasqError> {
        let store = RedisStore::connect(&config.redis).await?;
        Ok(Self::builder(Arc::new(store)).config(config))
    }

    /// Spawn the poller and dispatcher loops and return immediately.
    pub fn start(&mut self) -> Result<(), TasqError> {
        if self.started {
            return Err(TasqError::AlreadyStarted);
        }
        self.started = true;

        let poller = Arc::clone(&self.poller);
        let rx = self.shutdown_tx.subscribe();
        self.joins
            .push(tokio::spawn(async move { poller.run(rx).await }));

        let dispatcher = Arc::clone(&self.dispatcher);
        let rx = self.shutdown_tx.subscribe();
        self.joins.push(tokio::spawn(dispatcher.run(rx)));

        info!(
            queues = ?self.queues(),
            pool_size = self.pool.capacity(),
            "launcher started"
        );
        Ok(())
    }

    /// Stop fetching, then wait for every in-flight task to finish.
    ///
    /// Safe to call more than once; later calls return once the first has drained.
    pub async fn terminate(&mut self) -> Result<(), TasqError> {
        if !self.started {
            return Err(TasqError::NotStarted);
        }
        info!(in_flight = self.in_flight(), "launcher shutting down");

        self.shutdown_tx.send_replace(true);
        for join in self.joins.drain(..) {
            if let Err(e) = join.await {
                warn!(error = %e, "background loop ended abnormally");
            }
        }
        self.pool.drain().await;

        info!("launcher stopped");
        Ok(())
    }

    pub fn in_flight(&self) -> usize {
        if self.pool.is_closed() {
            return 0;
        }
        self.pool.in_flight()
    }

    pub fn queues(&self) -> Vec<String> {
        self.dispatcher.queues().map(str::to_string).collect()
    }
}
