use async_trait::async_trait;
use formflow_core::{FormId, Result};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Identities a cached value can be addressed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    /// Persistent form id
    FormId(FormId),
    /// Auto-generated or custom public slug
    FormSlug(String),
    /// The aggregate listing of template forms
    TemplatesList,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::FormId(id) => write!(f, "form:id:{}", id),
            CacheKey::FormSlug(slug) => write!(f, "form:slug:{}", slug),
            CacheKey::TemplatesList => write!(f, "templates:list"),
        }
    }
}

/// Cache entry metadata
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub created_at: Instant,
    pub ttl: Option<Duration>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: Option<Duration>) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => self.created_at.elapsed() >= ttl,
            None => false,
        }
    }
}

/// Key-value cache consulted by the read paths.
///
/// Deleting a key that is not present is a no-op.
#[async_trait]
pub trait Cache<V>: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<V>>;

    async fn set(&self, key: CacheKey, value: V, ttl: Option<Duration>) -> Result<()>;

    async fn delete(&self, key: &CacheKey) -> Result<()>;
}

/// Cache performance statistics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_render_with_their_prefixes() {
        let id = FormId::nil();
        assert_eq!(
            CacheKey::FormId(id).to_string(),
            "form:id:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(CacheKey::FormSlug("spring".into()).to_string(), "form:slug:spring");
        assert_eq!(CacheKey::TemplatesList.to_string(), "templates:list");
    }

    #[test]
    fn hit_rate_handles_an_unused_cache() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 0.75);
    }
}
