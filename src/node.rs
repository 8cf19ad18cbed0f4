use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

/// Identity of the admin node, resolved once during preflight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub fqdn: String,
    pub domain: String,
    /// Routable addresses the FQDN resolves to, in resolver order.
    pub addresses: Vec<IpAddr>,
    /// First resolved address that is configured on a local interface.
    pub admin_address: IpAddr,
}

impl Node {
    /// Web UI base URL on the admin address.
    pub fn access_url(&self, port: u16) -> String {
        access_url(self.admin_address, port)
    }
}

pub fn access_url(address: IpAddr, port: u16) -> String {
    match address {
        IpAddr::V4(addr) => format!("http://{addr}:{port}"),
        IpAddr::V6(addr) => format!("http://[{addr}]:{port}"),
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.fqdn, self.admin_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_url_brackets_ipv6() {
        let mut node = Node {
            fqdn: "admin.cloud.test".to_string(),
            domain: "cloud.test".to_string(),
            addresses: Vec::new(),
            admin_address: "192.168.124.10".parse().expect("ipv4"),
        };
        assert_eq!(node.access_url(3000), "http://192.168.124.10:3000");
        node.admin_address = "fd00::10".parse().expect("ipv6");
        assert_eq!(node.access_url(3000), "http://[fd00::10]:3000");
    }
}
