//! Database connection management for SQL Server (tiberius over tokio)

use crate::error::{AgentError, Result};
use std::sync::Mutex;
use std::time::Duration;
use tiberius::{Client, Config};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

pub type MssqlClient = Client<Compat<TcpStream>>;

pub const MAX_CONNECTIONS: usize = 10;

/// Parse an ADO.NET connection string such as
/// `server=tcp:localhost,1433;database=pq;user=sa;password=...;TrustServerCertificate=true`.
pub fn connection_config(connection_string: &str) -> Result<Config> {
    Config::from_ado_string(connection_string)
        .map_err(|e| AgentError::Config(format!("Invalid database connection string: {}", e)))
}

/// Open one client, bounded by `connect_timeout`.
pub async fn connect(config: &Config, connect_timeout: Duration) -> Result<MssqlClient> {
    let attempt = async {
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| AgentError::DataAccess(format!("Connection failed: {}", e)))?;
        tcp.set_nodelay(true)
            .map_err(|e| AgentError::DataAccess(format!("Connection failed: {}", e)))?;
        let client = Client::connect(config.clone(), tcp.compat_write()).await?;
        Ok::<_, AgentError>(client)
    };
    match timeout(connect_timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::DataAccess(format!(
            "Connection timed out after {}s",
            connect_timeout.as_secs()
        ))),
    }
}

/// Small connection pool: at most `MAX_CONNECTIONS` clients in flight, idle
/// clients reused, broken clients dropped.
pub struct MssqlPool {
    config: Config,
    acquire_timeout: Duration,
    permits: Semaphore,
    idle: Mutex<Vec<MssqlClient>>,
}

impl MssqlPool {
    /// Build a pool without touching the network; connection errors surface per query.
    pub fn lazy(connection_string: &str, acquire_timeout: Duration) -> Result<Self> {
        Ok(Self {
            config: connection_config(connection_string)?,
            acquire_timeout,
            permits: Semaphore::new(MAX_CONNECTIONS),
            idle: Mutex::new(Vec::new()),
        })
    }

    /// Run `work` on a pooled client. The client goes back to the pool only if `work` succeeded.
    pub async fn with_client<T, F>(&self, work: F) -> Result<T>
    where
        F: for<'c> FnOnce(
            &'c mut MssqlClient,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<T>> + Send + 'c>>,
    {
        let _permit = match timeout(self.acquire_timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(AgentError::DataAccess("Connection pool closed".to_string())),
            Err(_) => {
                return Err(AgentError::DataAccess(
                    "Timed out waiting for a database connection".to_string(),
                ))
            }
        };

        let reused = self.take_idle();
        let mut client = match reused {
            Some(client) => client,
            None => {
                debug!("opening new database connection");
                connect(&self.config, self.acquire_timeout).await?
            }
        };

        let result = work(&mut client).await;
        if result.is_ok() {
            self.put_idle(client);
        }
        result
    }

    fn take_idle(&self) -> Option<MssqlClient> {
        self.idle.lock().ok().and_then(|mut idle| idle.pop())
    }

    fn put_idle(&self, client: MssqlClient) {
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < MAX_CONNECTIONS {
                idle.push(client);
            }
        }
    }
}

/// Connect eagerly and verify the server answers.
pub async fn init_pool(connection_string: &str, acquire_timeout: Duration) -> Result<MssqlPool> {
    let pool = MssqlPool::lazy(connection_string, acquire_timeout)?;

    // Test the connection
    pool.with_client(|client| {
        Box::pin(async move {
            client.simple_query("SELECT 1").await?.into_results().await?;
            Ok(())
        })
    })
    .await?;

    info!(addr = %pool.config.get_addr(), "database connection verified");
    Ok(pool)
}
