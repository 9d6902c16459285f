//! Host prober trait

use async_trait::async_trait;
use signhost_api::Host;

/// Something that can classify a host's current status
///
/// Implementations never fail: an unreachable host is a result, not an
/// error. The returned record differs from the input only in probe-owned
/// fields.
#[async_trait]
pub trait HostProber: Send + Sync {
    async fn probe(&self, host: Host) -> Host;
}
