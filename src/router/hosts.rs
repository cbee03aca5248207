//! Host pattern lists (`ignore_hosts`, `allow_hosts`, `tcp_hosts`, `udp_hosts`)

use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};

/// Case-insensitive regexes searched anywhere in a `host:port` string
#[derive(Debug, Clone, Default)]
pub struct HostPatterns {
    patterns: Vec<Regex>,
}

impl HostPatterns {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                RegexBuilder::new(p.as_ref())
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| Error::Config(format!("Invalid host pattern {:?}: {}", p.as_ref(), e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_match(&self, host: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(host))
    }

    pub fn matches_any<S: AsRef<str>>(&self, hosts: &[S]) -> bool {
        hosts.iter().any(|h| self.is_match(h.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_semantics() {
        let patterns = HostPatterns::new(["example\\.com"]).unwrap();
        assert!(patterns.is_match("www.example.com:443"));
        assert!(patterns.is_match("WWW.EXAMPLE.COM:80"));
        assert!(!patterns.is_match("example.org:443"));
    }

    #[test]
    fn test_anchored() {
        let patterns = HostPatterns::new(["^10\\.", ":8443$"]).unwrap();
        assert!(patterns.is_match("10.1.2.3:80"));
        assert!(patterns.is_match("host:8443"));
        assert!(!patterns.is_match("110.1.2.3:80"));
        assert!(patterns.matches_any(&["a:1", "10.0.0.1:1"]));
    }

    #[test]
    fn test_empty() {
        let patterns = HostPatterns::default();
        assert!(patterns.is_empty());
        assert!(!patterns.is_match("anything"));
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(HostPatterns::new(["[a-"]), Err(Error::Config(_))));
    }
}
