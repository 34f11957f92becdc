//! Validated target addresses.

use std::fmt;

use url::Url;

use crate::error::ConfigurationError;

/// A target endpoint whose scheme is known to be handled by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    url: Url,
}

impl Address {
    /// Parse `raw` and check its scheme against `schemes`.
    ///
    /// Scheme comparison is case-insensitive.
    ///
    /// # Example
    ///
    /// ```
    /// use resock_core::Address;
    ///
    /// let addr = Address::parse("wss://example.com/feed", &["ws", "wss"]).unwrap();
    /// assert_eq!(addr.scheme(), "wss");
    /// assert!(Address::parse("http://example.com", &["ws", "wss"]).is_err());
    /// ```
    pub fn parse(raw: &str, schemes: &[&str]) -> Result<Self, ConfigurationError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| ConfigurationError::invalid_address(raw, e.to_string()))?;

        // `Url` already lowercases the scheme.
        if !schemes.iter().any(|s| s.eq_ignore_ascii_case(url.scheme())) {
            return Err(ConfigurationError::unsupported_scheme(
                raw,
                url.scheme(),
                schemes,
            ));
        }

        Ok(Self { url })
    }

    /// The full address as a string.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// The (lowercase) scheme.
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// The host, if the address has one.
    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    /// The explicit or scheme-default port.
    pub fn port(&self) -> Option<u16> {
        self.url.port_or_known_default()
    }

    /// The underlying parsed URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
