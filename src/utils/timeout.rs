//! Timeout utilities
//!
//! Wraps module hooks that run third-party code so a hung hook cannot stall
//! application start or shutdown.

use std::time::Duration;
use tokio::time::timeout;

/// Default upper bound for a module `initialize` hook
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default upper bound for a module `cleanup` hook
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Execute operation with custom timeout
pub async fn with_custom_timeout<F, T>(
    operation: F,
    duration: Duration,
) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    timeout(duration, operation).await
}

/// Execute operation with the default cleanup timeout
pub async fn with_cleanup_timeout<F, T>(operation: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    timeout(DEFAULT_CLEANUP_TIMEOUT, operation).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_custom_timeout_elapses() {
        let result = with_custom_timeout(
            tokio::time::sleep(Duration::from_millis(200)),
            Duration::from_millis(10),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_custom_timeout_passes_value_through() {
        let result = with_custom_timeout(async { 7 }, Duration::from_secs(1)).await;
        assert_eq!(result.unwrap(), 7);
    }
}
