use std::fmt;

use url::Url;

use crate::client::ClientError;

/// One remote resource: where to connect and what to ask for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub host: String,
    pub port: u16,
    /// Request target, always starting with `/`.
    pub path: String,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Self {
            host: host.into().to_ascii_lowercase(),
            port,
            path,
        }
    }

    /// Parses `[http://]host[:port][/path]`, applying `default_port` when the
    /// URL names none.
    pub fn parse(input: &str, default_port: u16) -> Result<Self, ClientError> {
        let input = input.trim();
        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("http://{input}")
        };

        let url = Url::parse(&with_scheme)
            .map_err(|e| ClientError::InvalidUrl(input.to_string(), e.to_string()))?;
        if url.scheme() != "http" {
            return Err(ClientError::InvalidUrl(
                input.to_string(),
                format!("unsupported scheme {}", url.scheme()),
            ));
        }

        // `Url` hides an explicit `:80`, so look at the authority text itself.
        let authority = with_scheme
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or_default()
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default();
        let explicit_port = authority
            .rsplit_once(':')
            .is_some_and(|(_, port)| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()));

        let port = match url.port() {
            Some(port) => port,
            None if explicit_port => 80,
            None => default_port,
        };
        Self::from_url(&url, port, input)
    }

    fn from_url(url: &Url, port: u16, original: &str) -> Result<Self, ClientError> {
        let host = url
            .host_str()
            .ok_or_else(|| ClientError::InvalidUrl(original.to_string(), "missing host".to_string()))?;

        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        Ok(Self::new(host, port, path))
    }

    /// Resolves a `Location` header, absolute or relative, against this target.
    pub fn resolve_location(&self, location: &str) -> Result<Self, ClientError> {
        let base = Url::parse(&format!("http://{}{}", self.authority(), self.path))
            .map_err(|e| ClientError::InvalidUrl(self.to_string(), e.to_string()))?;
        let next = base
            .join(location.trim())
            .map_err(|e| ClientError::InvalidUrl(location.to_string(), e.to_string()))?;
        if next.scheme() != "http" {
            return Err(ClientError::InvalidUrl(
                location.to_string(),
                format!("unsupported scheme {}", next.scheme()),
            ));
        }

        let port = next.port_or_known_default().unwrap_or(80);
        Self::from_url(&next, port, location)
    }

    /// `host:port`, the key of the connection cache.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `host:port/path`, the key of the freshness and redirect caches.
    pub fn cache_key(&self) -> String {
        format!("{}:{}{}", self.host, self.port, self.path)
    }

    /// Name under which a fetched body is saved.
    pub fn file_name(&self) -> String {
        let path = self.path.split(['?', '#']).next().unwrap_or_default();
        match path.rsplit('/').next() {
            Some(name) if !name.is_empty() && name != "." && name != ".." => name.to_string(),
            _ => "index.html".to_string(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}:{}{}", self.host, self.port, self.path)
    }
}
