//! Public-to-internal storage URL rewriting
//!
//! The object store hands browsers URLs bound to its published address
//! (e.g. `http://localhost:9100/...`). From inside the private network the
//! proxy has to reach the same objects through the store's internal address.

use url::Url;

/// The target URL could not be parsed as an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidUrl;

impl std::fmt::Display for InvalidUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("bad url")
    }
}

impl std::error::Error for InvalidUrl {}

/// Maps published storage addresses onto the internal storage base.
///
/// Immutable once built; a single rule is shared by every request.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    public_hosts: Vec<String>,
    public_ports: Vec<u16>,
    internal_base: Url,
}

impl RewriteRule {
    pub fn new(public_hosts: Vec<String>, public_ports: Vec<u16>, internal_base: Url) -> Self {
        let public_hosts = public_hosts
            .into_iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();

        Self {
            public_hosts,
            public_ports,
            internal_base,
        }
    }

    pub fn internal_base(&self) -> &Url {
        &self.internal_base
    }

    /// Parses `raw` and, if it addresses a published storage endpoint,
    /// points it at the internal base instead.
    ///
    /// Path, query and fragment are left untouched. URLs that do not match
    /// are returned as parsed.
    ///
    /// # Example
    ///
    /// ```
    /// # use stremmer::proxy::rewrite::RewriteRule;
    /// let rule = RewriteRule::new(
    ///     vec!["localhost".into()],
    ///     vec![9100],
    ///     url::Url::parse("http://minio-old:9000").unwrap(),
    /// );
    /// let url = rule.rewrite("http://localhost:9100/archivos/abc.mp4").unwrap();
    /// assert_eq!(url.as_str(), "http://minio-old:9000/archivos/abc.mp4");
    /// ```
    pub fn rewrite(&self, raw: &str) -> Result<Url, InvalidUrl> {
        let mut url = Url::parse(raw).map_err(|_| InvalidUrl)?;

        if !self.matches(&url) {
            return Ok(url);
        }

        let host = self.internal_base.host_str().ok_or(InvalidUrl)?;

        url.set_scheme(self.internal_base.scheme())
            .map_err(|_| InvalidUrl)?;
        url.set_host(Some(host)).map_err(|_| InvalidUrl)?;
        url.set_port(self.internal_base.port())
            .map_err(|_| InvalidUrl)?;

        Ok(url)
    }

    /// Only an explicit port counts; `http://localhost/` never matches.
    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let Some(port) = url.port() else {
            return false;
        };

        self.public_hosts.iter().any(|h| h == host) && self.public_ports.contains(&port)
    }
}
