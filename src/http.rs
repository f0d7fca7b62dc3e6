//! OpenAI 和 Suno 客户端共用的 HTTP 工具

use std::future::Future;
use std::time::Duration;
use tracing::warn;
use crate::error::{ServiceError, ServiceResult};

/// 非 2xx 响应转换为 `RequestFailed`，保留响应体
pub async fn check_status(response: reqwest::Response) -> ServiceResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::RequestFailed {
        status: status.as_u16(),
        body,
    })
}

/// 对可重试的错误按指数退避重试，最多额外重试 `max_retries` 次
pub async fn with_retry<F, Fut, T>(
    service: &str,
    max_retries: u32,
    backoff: Duration,
    operation: F,
) -> ServiceResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = backoff * 2u32.pow(attempt);
                warn!(
                    "{} 请求失败（第 {} 次），{:?} 后重试: {}",
                    service,
                    attempt + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> ServiceError {
        ServiceError::RequestFailed {
            status: 503,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", 2, Duration::from_millis(1), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(unavailable())
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: ServiceResult<()> = with_retry("test", 1, Duration::from_millis(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(unavailable())
        })
        .await;

        assert!(matches!(result, Err(ServiceError::RequestFailed { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: ServiceResult<()> = with_retry("test", 3, Duration::from_millis(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::RequestFailed {
                status: 400,
                body: "bad".to_string(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
