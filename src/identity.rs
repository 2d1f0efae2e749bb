use crate::config::IdentityConfig;

/// Identity-prefix → display-name lookup, built once from config.
///
/// Longest prefix wins, so an operator can label a whole fleet with a short
/// prefix and still pin a precise name on one specific identity.
pub struct IdentityBook {
    // Sorted by prefix length, longest first
    labels: Vec<(String, String)>,
}

impl IdentityBook {
    pub fn new(config: &IdentityConfig) -> Self {
        let mut labels: Vec<(String, String)> = config
            .labels
            .iter()
            .filter(|l| !l.prefix.is_empty())
            .map(|l| (l.prefix.clone(), l.name.clone()))
            .collect();
        labels.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { labels }
    }

    pub fn resolve(&self, identity: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(prefix, _)| identity.starts_with(prefix.as_str()))
            .map(|(_, name)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}
