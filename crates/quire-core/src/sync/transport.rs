//! Transport abstraction for the two sync exchanges.

use std::future::Future;

use crate::protocol::{DeltaSyncRequest, DeltaSyncResponse, QueueSyncRequest, QueueSyncResponse};

use super::SyncResult;

/// Carries sync requests to the server.
///
/// `token` is the per-device credential of the signed-in user. The HTTP
/// implementation is [`super::HttpTransport`]; tests plug in an in-process
/// transport that calls the merge engine directly.
pub trait SyncTransport: Send + Sync {
    /// Push queued notes and pull the notes queued for this device.
    fn delta_sync(
        &self,
        token: &str,
        request: &DeltaSyncRequest,
    ) -> impl Future<Output = SyncResult<DeltaSyncResponse>> + Send;

    /// Exchange full head lists to rebuild the server-side queue.
    fn queue_sync(
        &self,
        token: &str,
        request: &QueueSyncRequest,
    ) -> impl Future<Output = SyncResult<QueueSyncResponse>> + Send;
}
