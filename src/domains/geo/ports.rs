use crate::common::DomainResult;
use crate::domains::geo::types::GeocodeCandidate;
use async_trait::async_trait;

/// Port for the external address -> coordinate lookup. Implementations wrap
/// a network provider and must be treated as unreliable: timeouts and
/// rate-limit responses surface as `DomainError::TransientProvider`.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    /// Returns candidate matches for the address, best first or unordered;
    /// the resolver ranks them by confidence either way.
    async fn search(&self, address: &str) -> DomainResult<Vec<GeocodeCandidate>>;
}
