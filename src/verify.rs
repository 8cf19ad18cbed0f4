//! Final verification once the node is `ready`.
use crate::error::{BootstrapError, Result};
use serde_json::Value;
use std::net::IpAddr;
use std::time::Duration;

const ADMIN_RANGE_START: &str = "/attributes/network/networks/admin/ranges/admin/start";

/// Admin node address from the `default` network proposal: the admin node
/// takes the first address of the admin range.
pub fn admin_address_from_network(network: &Value) -> Option<IpAddr> {
    network
        .pointer(ADMIN_RANGE_START)
        .and_then(Value::as_str)
        .and_then(|start| start.trim().parse().ok())
}

/// GET `url` and require a non-error response. Returns the HTTP status.
pub fn probe_web_ui(url: &str, timeout: Duration) -> Result<u16> {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    let agent: ureq::Agent = config.into();
    match agent.get(url).call() {
        Ok(response) => {
            let status = response.status().as_u16();
            tracing::info!(url, status, "web UI answered");
            Ok(status)
        }
        Err(err) => Err(BootstrapError::Verification(format!(
            "web UI at {url} did not answer: {err}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn admin_address_comes_from_the_admin_range() {
        let network = json!({
            "attributes": { "network": { "networks": { "admin": {
                "subnet": "192.168.124.0",
                "ranges": {
                    "admin": { "start": "192.168.124.10", "end": "192.168.124.11" },
                    "dhcp": { "start": "192.168.124.21", "end": "192.168.124.80" }
                }
            } } } }
        });
        assert_eq!(
            admin_address_from_network(&network),
            Some("192.168.124.10".parse().expect("ip"))
        );
        assert_eq!(admin_address_from_network(&json!({"attributes": {}})), None);
    }

    #[test]
    fn unreachable_web_ui_is_a_verification_error() {
        // Port 9 on loopback is discard; nothing listens there in test sandboxes.
        let err = probe_web_ui("http://127.0.0.1:9/", Duration::from_secs(2))
            .expect_err("nothing listening");
        assert_eq!(err.kind(), "verification");
    }
}
