//! Primary-then-fallback transport.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use super::{Transport, TransportLink};
use crate::error::RealtimeError;

/// Tries `primary` first and opens `fallback` only when the primary
/// cannot be established. The choice is made again on every open.
#[derive(Debug, Clone)]
pub struct FallbackTransport {
    primary: Arc<dyn Transport>,
    fallback: Arc<dyn Transport>,
}

impl FallbackTransport {
    /// Creates a fallback chain of two transports.
    #[must_use]
    pub fn new(primary: Arc<dyn Transport>, fallback: Arc<dyn Transport>) -> Self {
        Self { primary, fallback }
    }
}

impl Transport for FallbackTransport {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn open(&self) -> BoxFuture<'_, Result<TransportLink, RealtimeError>> {
        async move {
            match self.primary.open().await {
                Ok(link) => Ok(link),
                Err(err) => {
                    tracing::warn!(
                        primary = self.primary.name(),
                        fallback = self.fallback.name(),
                        error = %err,
                        "primary transport unavailable, falling back"
                    );
                    self.fallback.open().await
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    #[tokio::test]
    async fn uses_fallback_when_primary_refuses() {
        let (primary, primary_listener) = MemoryTransport::pair();
        drop(primary_listener);
        let (secondary, mut secondary_listener) = MemoryTransport::pair();

        let transport = FallbackTransport::new(Arc::new(primary), Arc::new(secondary));
        let Ok(link) = transport.open().await else {
            panic!("fallback should open");
        };
        assert!(secondary_listener.try_accept().is_some());
        drop(link);
    }

    #[tokio::test]
    async fn prefers_primary() {
        let (primary, mut primary_listener) = MemoryTransport::pair();
        let (secondary, mut secondary_listener) = MemoryTransport::pair();

        let transport = FallbackTransport::new(Arc::new(primary), Arc::new(secondary));
        assert!(transport.open().await.is_ok());
        assert!(primary_listener.try_accept().is_some());
        assert!(secondary_listener.try_accept().is_none());
    }

    #[tokio::test]
    async fn fails_when_both_refuse() {
        let (primary, _) = MemoryTransport::pair();
        let (secondary, _) = MemoryTransport::pair();
        let transport = FallbackTransport::new(Arc::new(primary), Arc::new(secondary));
        assert!(transport.open().await.is_err());
    }
}
