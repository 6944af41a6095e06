//! Same-origin boundary for a scan: scheme, host, and port must all match
//! the target. Fixed once the scan starts.

use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl Scope {
    pub fn new(target: &Url) -> anyhow::Result<Self> {
        let host = target
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("target URL has no host: {}", target))?;

        Ok(Self {
            scheme: target.scheme().to_string(),
            host: host.to_string(),
            port: target.port_or_known_default(),
        })
    }

    pub fn permits(&self, url: &Url) -> bool {
        url.scheme() == self.scheme
            && url.host_str() == Some(self.host.as_str())
            && url.port_or_known_default() == self.port
    }
}
