use super::gateway::FetchError;
use super::retry::{retry_with_policy, RetryPolicy};
use rand::Rng;
use tracing::info;

/// A pool entry that answered the egress probe with a new address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedProxy {
    pub address: String,
    pub egress_ip: String,
}

/// Normalizes a pool entry to a full proxy URL. Entries without a scheme are
/// treated as plain HTTP.
pub fn proxy_url(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

/// Picks random pool entries until one routes traffic through an egress
/// address different from `baseline_ip`. The probe runs through the
/// candidate itself, so a dead proxy fails here instead of during sampling.
///
/// An empty pool is not an error: rotation is skipped and traffic stays on
/// the direct connection.
pub fn rotate_with_probe<F>(
    pool: &[String],
    baseline_ip: &str,
    policy: RetryPolicy,
    mut probe: F,
) -> Result<Option<VerifiedProxy>, FetchError>
where
    F: FnMut(&str) -> Result<String, FetchError>,
{
    if pool.is_empty() {
        info!("proxy pool is empty, staying on the direct connection");
        return Ok(None);
    }

    let mut rng = rand::thread_rng();
    let verified = retry_with_policy(policy, "proxy rotation", || {
        let address = &pool[rng.gen_range(0..pool.len())];
        let egress_ip = probe(address)?;
        if egress_ip == baseline_ip {
            return Err(FetchError::ProxyUnverified {
                proxy: address.clone(),
            });
        }

        Ok(VerifiedProxy {
            address: address.clone(),
            egress_ip,
        })
    })?;

    Ok(Some(verified))
}
