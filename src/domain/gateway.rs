use anyhow::Result;
use async_trait::async_trait;

/// Outbound call to the point service.
#[async_trait]
pub trait PointGateway: Send + Sync {
    /// Awards `amount` points, authenticated by `token`. Any error means no
    /// points were awarded.
    async fn create_point(&self, amount: i64, comment: &str, token: &str) -> Result<()>;
}
