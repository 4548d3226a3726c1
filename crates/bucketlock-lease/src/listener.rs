//! Termination listeners and the resource seams they act on

use std::future::Future;

use async_trait::async_trait;

/// Callback invoked when another process asks for the lease.
///
/// Runs on the coordinator's watch task; an implementation must return in
/// bounded time.
#[async_trait]
pub trait TerminationListener: Send + Sync {
    async fn access_termination_requested(&self);
}

/// Any `Fn() -> impl Future` closure is a listener.
#[async_trait]
impl<F, Fut> TerminationListener for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn access_termination_requested(&self) {
        (self)().await
    }
}

/// A resource guarded by the lease that can be shut down on hand-off.
///
/// `shutdown` must be idempotent and safe to call while other operations on
/// the resource are in flight.
#[async_trait]
pub trait ProtectedResource: Send + Sync {
    async fn shutdown(&self);
}

/// A resource that can stay open but stop accepting writes.
pub trait ReadOnlyToggle: Send + Sync {
    fn set_read_only(&self, read_only: bool);
}
