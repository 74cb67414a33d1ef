//! BoxProviderClient -- object-safe dynamic dispatch wrapper for ProviderClient.
//!
//! 1. Define an object-safe `ProviderClientDyn` trait with boxed futures
//! 2. Blanket-impl `ProviderClientDyn` for all `T: ProviderClient`
//! 3. `BoxProviderClient` wraps `Box<dyn ProviderClientDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use switchboard_types::dispatch::ProviderReply;
use switchboard_types::error::ProviderError;

use super::provider::{InvokeRequest, ProviderClient};

/// Object-safe version of [`ProviderClient`] with boxed futures.
pub trait ProviderClientDyn: Send + Sync {
    fn name(&self) -> &str;

    fn invoke_boxed<'a>(
        &'a self,
        request: &'a InvokeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderReply, ProviderError>> + Send + 'a>>;
}

impl<T: ProviderClient> ProviderClientDyn for T {
    fn name(&self) -> &str {
        ProviderClient::name(self)
    }

    fn invoke_boxed<'a>(
        &'a self,
        request: &'a InvokeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderReply, ProviderError>> + Send + 'a>> {
        Box::pin(self.invoke(request))
    }
}

/// Type-erased provider client for runtime selection.
///
/// Since `ProviderClient` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxProviderClient` delegates to the inner `ProviderClientDyn`.
pub struct BoxProviderClient {
    inner: Box<dyn ProviderClientDyn + Send + Sync>,
}

impl BoxProviderClient {
    pub fn new<T: ProviderClient + 'static>(client: T) -> Self {
        Self {
            inner: Box::new(client),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn invoke(&self, request: &InvokeRequest) -> Result<ProviderReply, ProviderError> {
        self.inner.invoke_boxed(request).await
    }
}

impl std::fmt::Debug for BoxProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxProviderClient")
            .field("name", &self.name())
            .finish()
    }
}
