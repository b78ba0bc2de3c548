//! SQL client with failover.
//!
//! Every statement goes through [`Client::execute_with_retry`]: pick an
//! endpoint, make one transport call, classify the outcome, and either
//! return, give up, or quarantine the endpoint and try the next one after
//! an exponential backoff.

use crate::config::ClientOptions;
use crate::error::{MonkError, MonkResult};
use crate::pool::{Endpoint, ServerPool};
use crate::protocol::{self, ResultBatch, SqlArgs, SqlRequest};
use crate::retry::RetryPolicy;
use crate::transport::{HttpTransport, Method, Request, Response, Transport};
use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Handle to a MonkDB cluster.
///
/// Cheap to share behind an `Arc`; all requests use the same server pool.
///
/// # Example
/// ```ignore
/// let client = Client::new(ClientOptions::new(["http://db1:4200", "http://db2:4200"]))?;
/// let batch = client.sql("SELECT name FROM sys.nodes", SqlArgs::None).await?;
/// ```
pub struct Client {
    pool: Arc<ServerPool>,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    sql_path: String,
    closed: AtomicBool,
}

impl Client {
    /// Client over HTTP.
    pub fn new(options: ClientOptions) -> MonkResult<Self> {
        let transport = HttpTransport::new(&options)?;
        Self::with_transport(&options, Arc::new(transport))
    }

    /// Client over a custom transport.
    pub fn with_transport(
        options: &ClientOptions,
        transport: Arc<dyn Transport>,
    ) -> MonkResult<Self> {
        options.validate()?;
        let policy = options.retry_policy();
        Ok(Self {
            pool: Arc::new(ServerPool::new(&options.servers, policy.quarantine)),
            transport,
            policy,
            sql_path: options.sql_path(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn pool(&self) -> &Arc<ServerPool> {
        &self.pool
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute one statement.
    pub async fn sql(&self, stmt: &str, args: impl Into<SqlArgs>) -> MonkResult<ResultBatch> {
        self.sql_cancellable(stmt, args, &CancellationToken::new()).await
    }

    /// Execute one statement, giving up as soon as `cancel` fires.
    pub async fn sql_cancellable(
        &self,
        stmt: &str,
        args: impl Into<SqlArgs>,
        cancel: &CancellationToken,
    ) -> MonkResult<ResultBatch> {
        self.ensure_open()?;
        if stmt.trim().is_empty() {
            return Err(MonkError::programming("SQL statement cannot be empty"));
        }

        let args = args.into();
        let body = Bytes::from(serde_json::to_vec(&SqlRequest::new(stmt, &args))?);
        let path = self.sql_path.as_str();
        let transport = &self.transport;

        tracing::debug!("Executing SQL: {}", stmt);
        self.execute_with_retry(cancel, |endpoint| {
            let request = Request::new(Method::POST, path).body(body.clone());
            async move {
                let response = transport.send(&endpoint, request).await?;
                decode_sql_response(&endpoint, response)
            }
        })
        .await
    }

    /// Run `attempt` against successive endpoints until it succeeds, fails
    /// terminally, or the attempt budget is spent.
    ///
    /// Only errors with [`MonkError::is_retryable`] move on to the next
    /// endpoint. Cancellation never quarantines the endpoint.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> MonkResult<T>
    where
        F: FnMut(Endpoint) -> Fut,
        Fut: Future<Output = MonkResult<T>>,
    {
        let mut last_error: Option<MonkError> = None;

        for n in 0..self.policy.max_attempts {
            if cancel.is_cancelled() {
                return Err(MonkError::Cancelled);
            }

            match self.pool.next().await {
                Ok(endpoint) => {
                    tracing::debug!(
                        "Attempt {}/{} on {}",
                        n + 1,
                        self.policy.max_attempts,
                        endpoint
                    );
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(MonkError::Cancelled),
                        outcome = attempt(endpoint.clone()) => outcome,
                    };
                    match outcome {
                        Ok(value) => return Ok(value),
                        Err(e) if e.is_retryable() => {
                            tracing::warn!("Request to {} failed: {}", endpoint, e);
                            self.pool.mark_failed(&endpoint).await;
                            last_error = Some(e);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => {
                    tracing::warn!("No endpoint for attempt {}: {}", n + 1, e);
                    last_error = Some(e);
                }
            }

            if self.policy.has_next(n) {
                let wait = self.policy.wait(n);
                tracing::debug!("Backing off for {}ms", wait.as_millis());
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(MonkError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }

        let trace = last_error
            .as_ref()
            .and_then(|e| e.trace())
            .map(str::to_string);
        let cause = last_error.map_or_else(|| "no attempts made".to_string(), |e| e.to_string());
        Err(MonkError::Connection {
            message: format!("All servers failed. Last error: {}", cause),
            trace,
        })
    }

    /// One raw request against the next endpoint, without retry.
    pub async fn request(&self, request: Request) -> MonkResult<Response> {
        self.ensure_open()?;
        let endpoint = self.pool.next().await.map_err(|e| {
            MonkError::connection(format!(
                "No server for {} {}: {}",
                request.method, request.path, e
            ))
        })?;
        tracing::debug!("{} {} on {}", request.method, request.path, endpoint);
        self.transport.send(&endpoint, request).await
    }

    /// Stop accepting requests and drop every endpoint. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pool.close().await;
        tracing::debug!("Client closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> MonkResult<()> {
        if self.is_closed() {
            return Err(MonkError::programming("Client is closed"));
        }
        Ok(())
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("pool", &self.pool)
            .field("policy", &self.policy)
            .field("sql_path", &self.sql_path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Classify one `/_sql` response.
///
/// 5xx and unreadable success bodies come back as connection errors so the
/// retry engine moves on; everything else below 500 is final.
fn decode_sql_response(endpoint: &Endpoint, response: Response) -> MonkResult<ResultBatch> {
    if response.is_server_error() {
        return Err(MonkError::connection(format!(
            "{} responded with {}",
            endpoint, response.status
        )));
    }

    let body = match response.body_json() {
        Ok(body) => body,
        Err(e) if response.is_success() => {
            return Err(MonkError::connection(format!(
                "Malformed response from {}: {}",
                endpoint, e
            )));
        }
        Err(_) => None,
    };

    if !response.is_success() {
        return Err(protocol::decode_error(response.status, body.as_ref()));
    }
    match body {
        Some(body) if protocol::has_error_payload(&body) => {
            Err(protocol::decode_error(response.status, Some(&body)))
        }
        Some(body) => ResultBatch::from_json(body),
        None => Err(MonkError::connection(format!(
            "Empty response from {}",
            endpoint
        ))),
    }
}
