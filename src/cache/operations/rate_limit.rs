use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient, RedisResult, aio::MultiplexedConnection};
use tokio::{
    sync::oneshot,
    time::{Instant, sleep, timeout},
};

use super::CounterStore;
use crate::{cache::models::KeyTtl, error::StoreError};

/// 单次重连的最大退避
const MAX_BACKOFF_MS: u64 = 2000;

/// Redis 连接参数
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub command_timeout: Duration,
    pub connect_timeout: Duration,
    /// 首次连接失败后的重连次数
    pub connect_retries: u32,
    /// 重连全部失败后拒绝访问存储的时长
    pub cooldown: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_millis(250),
            connect_timeout: Duration::from_millis(500),
            connect_retries: 3,
            cooldown: Duration::from_secs(5),
        }
    }
}

#[derive(Default)]
enum ConnectionState {
    #[default]
    Idle,
    /// 后台任务正在连接
    Connecting,
    Ready(MultiplexedConnection),
    Down(Instant),
}

type FirstAttempt = oneshot::Sender<Result<MultiplexedConnection, StoreError>>;

struct Shared {
    client: RedisClient,
    options: StoreOptions,
    // 锁只在状态切换时持有，不跨越任何 await
    state: Mutex<ConnectionState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 连接循环，在独立任务中运行；第一次尝试的结果交给触发它的调用方
    async fn connect(self: Arc<Self>, first: FirstAttempt) {
        let mut first = Some(first);
        let mut attempt: u32 = 0;

        loop {
            let err = match timeout(
                self.options.connect_timeout,
                self.client.get_multiplexed_async_connection(),
            )
            .await
            {
                Ok(Ok(conn)) => {
                    tracing::info!(attempt, "Redis connection established");
                    *self.state() = ConnectionState::Ready(conn.clone());
                    if let Some(tx) = first.take() {
                        let _ = tx.send(Ok(conn));
                    }
                    return;
                }
                Ok(Err(e)) => StoreError::Redis(e),
                Err(_) => StoreError::Timeout(self.options.connect_timeout),
            };

            if attempt >= self.options.connect_retries {
                tracing::error!(
                    error = %err,
                    cooldown = ?self.options.cooldown,
                    "Redis unreachable, rate limiting will fail open"
                );
                *self.state() = ConnectionState::Down(Instant::now() + self.options.cooldown);
                if let Some(tx) = first.take() {
                    let _ = tx.send(Err(err));
                }
                return;
            }
            attempt += 1;

            let delay = backoff(attempt);
            tracing::warn!(attempt, error = %err, "Redis connection failed, retrying in {:?}", delay);
            if let Some(tx) = first.take() {
                let _ = tx.send(Err(err));
            }
            sleep(delay).await;
        }
    }
}

/// 基于 Redis 的计数器存储
///
/// 进程内只保留一个多路复用连接，所有请求共享。连接断开后由后台任务
/// 重连，期间其他请求立即得到 `StoreError::Unavailable`。
pub struct RedisCounterStore {
    shared: Option<Arc<Shared>>,
}

impl RedisCounterStore {
    /// URL 无效时不会失败，之后的每次调用都返回 `StoreError::NotConfigured`
    pub fn open(redis_url: &str, options: StoreOptions) -> Self {
        let shared = match RedisClient::open(redis_url) {
            Ok(client) => Some(Arc::new(Shared {
                client,
                options,
                state: Mutex::new(ConnectionState::Idle),
            })),
            Err(e) => {
                tracing::error!(error = %e, "Invalid Redis URL, rate limiting will fail open");
                None
            }
        };

        Self { shared }
    }

    /// 断开缓存的连接
    pub async fn close(&self) {
        if let Some(shared) = &self.shared {
            let mut state = shared.state();
            if matches!(*state, ConnectionState::Ready(_)) {
                *state = ConnectionState::Idle;
                tracing::info!("Redis connection closed");
            }
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let shared = self.shared.as_ref().ok_or(StoreError::NotConfigured)?;

        {
            let mut state = shared.state();
            match &*state {
                ConnectionState::Ready(conn) => return Ok(conn.clone()),
                ConnectionState::Connecting => return Err(StoreError::Unavailable),
                ConnectionState::Down(until) if Instant::now() < *until => {
                    return Err(StoreError::CoolingDown);
                }
                _ => {}
            }
            *state = ConnectionState::Connecting;
        }

        // 调用方只等待第一次尝试，重试留在后台；调用方被取消也不会卡在 Connecting
        let (tx, rx) = oneshot::channel();
        tokio::spawn(shared.clone().connect(tx));
        rx.await.unwrap_or(Err(StoreError::Unavailable))
    }

    fn discard_connection(&self) {
        if let Some(shared) = &self.shared {
            let mut state = shared.state();
            if matches!(*state, ConnectionState::Ready(_)) {
                *state = ConnectionState::Idle;
            }
        }
    }

    fn command_timeout(&self) -> Duration {
        self.shared
            .as_ref()
            .map(|shared| shared.options.command_timeout)
            .unwrap_or_default()
    }

    async fn run<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send,
        F: FnOnce(MultiplexedConnection) -> Fut + Send,
        Fut: Future<Output = RedisResult<T>> + Send,
    {
        let conn = self.connection().await?;
        let command_timeout = self.command_timeout();

        match timeout(command_timeout, op(conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
                    self.discard_connection();
                }
                Err(e.into())
            }
            Err(_) => {
                self.discard_connection();
                Err(StoreError::Timeout(command_timeout))
            }
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis((u64::from(attempt) * 50).min(MAX_BACKOFF_MS))
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        // INCR 在 Redis 端是原子的，并发请求拿到的值各不相同
        let count: i64 = self
            .run(|mut conn| async move { conn.incr(key, 1).await })
            .await?;

        u64::try_from(count).map_err(|_| StoreError::UnexpectedValue(count))
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<(), StoreError> {
        let seconds = seconds as i64;
        let _: () = self
            .run(|mut conn| async move { conn.expire(key, seconds).await })
            .await?;
        Ok(())
    }

    async fn time_to_live(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let ttl: i64 = self
            .run(|mut conn| async move { conn.ttl(key).await })
            .await?;

        KeyTtl::from_redis(ttl).ok_or(StoreError::UnexpectedValue(ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff(1), Duration::from_millis(50));
        assert_eq!(backoff(3), Duration::from_millis(150));
        assert_eq!(backoff(100), Duration::from_millis(MAX_BACKOFF_MS));
    }

    #[tokio::test]
    async fn invalid_url_reports_not_configured() {
        let store = RedisCounterStore::open("not a url", StoreOptions::default());
        assert!(matches!(
            store.increment("rate_limit:k").await,
            Err(StoreError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn unreachable_server_cools_down() {
        let options = StoreOptions {
            command_timeout: Duration::from_millis(100),
            connect_timeout: Duration::from_millis(100),
            connect_retries: 0,
            cooldown: Duration::from_secs(60),
        };
        // 端口 1 上没有 Redis
        let store = RedisCounterStore::open("redis://127.0.0.1:1/", options);

        assert!(store.increment("rate_limit:k").await.is_err());
        assert!(matches!(
            store.increment("rate_limit:k").await,
            Err(StoreError::CoolingDown)
        ));
    }

    #[tokio::test]
    async fn retries_run_in_the_background() {
        let options = StoreOptions {
            command_timeout: Duration::from_millis(100),
            connect_timeout: Duration::from_millis(100),
            connect_retries: 3,
            cooldown: Duration::from_secs(60),
        };
        let store = RedisCounterStore::open("redis://127.0.0.1:1/", options);

        // 第一次尝试失败后立即返回，重连仍在进行
        assert!(matches!(
            store.increment("rate_limit:k").await,
            Err(StoreError::Redis(_) | StoreError::Timeout(_))
        ));
        assert!(matches!(
            store.increment("rate_limit:k").await,
            Err(StoreError::Unavailable)
        ));

        // 50 + 100 + 150 ms 退避加上三次失败的尝试之后进入冷却
        sleep(Duration::from_millis(1_000)).await;
        assert!(matches!(
            store.increment("rate_limit:k").await,
            Err(StoreError::CoolingDown)
        ));
    }
}
