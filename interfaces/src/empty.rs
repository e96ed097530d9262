use async_trait::async_trait;
use tracing::info;

use crate::defs::DeliveryClient;
use crate::defs::DeliveryError;
use crate::defs::OutgoingDigest;

/// Delivery that sends nothing. Backs `--dry-run`.
pub struct NoopDelivery;

#[async_trait]
impl DeliveryClient for NoopDelivery {
    fn transport_name(&self) -> String {
        "noop".to_string()
    }

    async fn send(&self, digest: &OutgoingDigest) -> Result<(), DeliveryError> {
        // Nothing leaves the process; the body goes to the log instead.
        info!(
            "Dry run: would send \"{}\" ({} bytes text, {} bytes html)",
            digest.subject,
            digest.plain_text.len(),
            digest.rich_text.len()
        );
        info!("{}", digest.plain_text);
        Ok(())
    }
}
