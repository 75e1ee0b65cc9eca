use crate::{keys_for_all, Cache, CacheKey, InvalidationEvent};
use formflow_core::{CacheConfig, FormId, FormIdentity, FormSummary, PublicForm, Result};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A public form together with every identity it is cached under.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicFormEntry {
    pub identity: FormIdentity,
    pub form: PublicForm,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    PublicForm(Arc<PublicFormEntry>),
    Templates(Arc<Vec<FormSummary>>),
}

/// Read-through and invalidation rules for form reads.
///
/// Cache failures never fail a read or a mutation: reads fall through to the
/// loader and failed deletes are logged.
#[derive(Clone)]
pub struct CacheCoordinator {
    cache: Arc<dyn Cache<CachedValue>>,
    public_form_ttl: Duration,
    templates_ttl: Duration,
}

impl CacheCoordinator {
    pub fn new(cache: Arc<dyn Cache<CachedValue>>, config: &CacheConfig) -> Self {
        Self {
            cache,
            public_form_ttl: config.public_form_ttl(),
            templates_ttl: config.templates_ttl(),
        }
    }

    /// Deletes every key the event touches. Call after the write has succeeded.
    pub async fn invalidate(&self, event: &InvalidationEvent) {
        self.invalidate_all(std::slice::from_ref(event)).await;
    }

    pub async fn invalidate_all(&self, events: &[InvalidationEvent]) {
        let keys = keys_for_all(events);
        debug!(
            "Invalidating {} cache keys after {}: {}",
            keys.len(),
            events
                .iter()
                .map(InvalidationEvent::name)
                .collect::<Vec<_>>()
                .join(","),
            keys.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        );

        for key in &keys {
            if let Err(e) = self.cache.delete(key).await {
                warn!("Failed to invalidate {}: {}", key, e);
            }
        }
    }

    /// Public form view addressed by slug, loaded on a miss and then cached under
    /// the requested slug, the form id and every other slug of the form.
    pub async fn public_form<F, Fut>(&self, slug: &str, loader: F) -> Result<Option<PublicForm>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<PublicFormEntry>>>,
    {
        self.read_public(CacheKey::FormSlug(slug.to_string()), loader)
            .await
    }

    /// Same as [`CacheCoordinator::public_form`], addressed by form id.
    pub async fn public_form_by_id<F, Fut>(
        &self,
        form_id: FormId,
        loader: F,
    ) -> Result<Option<PublicForm>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<PublicFormEntry>>>,
    {
        self.read_public(CacheKey::FormId(form_id), loader).await
    }

    async fn read_public<F, Fut>(&self, key: CacheKey, loader: F) -> Result<Option<PublicForm>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<PublicFormEntry>>>,
    {
        if let Some(CachedValue::PublicForm(entry)) = self.lookup(&key).await {
            return Ok(Some(entry.form.clone()));
        }

        let Some(entry) = loader().await? else {
            return Ok(None);
        };
        let entry = Arc::new(entry);

        let keys = std::iter::once(key)
            .chain(std::iter::once(CacheKey::FormId(entry.identity.form_id)))
            .chain(
                entry
                    .identity
                    .slugs()
                    .map(|slug| CacheKey::FormSlug(slug.to_string())),
            );
        let mut stored = HashSet::new();
        for key in keys {
            if stored.insert(key.clone()) {
                self.store(
                    key,
                    CachedValue::PublicForm(entry.clone()),
                    self.public_form_ttl,
                )
                .await;
            }
        }

        Ok(Some(entry.form.clone()))
    }

    /// Template listing, loaded on a miss.
    pub async fn templates<F, Fut>(&self, loader: F) -> Result<Vec<FormSummary>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<FormSummary>>>,
    {
        if let Some(CachedValue::Templates(list)) = self.lookup(&CacheKey::TemplatesList).await {
            return Ok(list.as_ref().clone());
        }

        let list = Arc::new(loader().await?);
        self.store(
            CacheKey::TemplatesList,
            CachedValue::Templates(list.clone()),
            self.templates_ttl,
        )
        .await;
        Ok(list.as_ref().clone())
    }

    async fn lookup(&self, key: &CacheKey) -> Option<CachedValue> {
        match self.cache.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Cache read for {} failed, falling back to storage: {}", key, e);
                None
            }
        }
    }

    async fn store(&self, key: CacheKey, value: CachedValue, ttl: Duration) {
        if let Err(e) = self.cache.set(key.clone(), value, Some(ttl)).await {
            warn!("Failed to cache {}: {}", key, e);
        }
    }
}
