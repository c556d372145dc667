//! Request identity extraction
//!
//! The cache does not interpret requests beyond the canonical URL string
//! they produce; everything else about a request is the caller's business.

use url::Url;

/// Anything that can name a cacheable resource by canonical URL.
pub trait RequestIdentity {
    fn canonical_url(&self) -> &str;
}

impl RequestIdentity for str {
    fn canonical_url(&self) -> &str {
        self
    }
}

impl RequestIdentity for String {
    fn canonical_url(&self) -> &str {
        self.as_str()
    }
}

impl RequestIdentity for Url {
    fn canonical_url(&self) -> &str {
        self.as_str()
    }
}

impl<T: RequestIdentity + ?Sized> RequestIdentity for &T {
    fn canonical_url(&self) -> &str {
        (**self).canonical_url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::derive_key;

    #[test]
    fn test_url_and_string_agree() {
        let url = Url::parse("https://example.com/a/b?c=d").unwrap();
        let s = "https://example.com/a/b?c=d".to_string();

        assert_eq!(url.canonical_url(), s.canonical_url());
        assert_eq!(
            derive_key(url.canonical_url()),
            derive_key(s.as_str().canonical_url())
        );
    }

    #[test]
    fn test_url_is_normalized_before_keying() {
        // Url parsing lowercases the host and adds the root path
        let url = Url::parse("HTTPS://Example.COM").unwrap();
        assert_eq!(url.canonical_url(), "https://example.com/");
    }
}
