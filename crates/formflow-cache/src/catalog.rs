use crate::{CacheCoordinator, InvalidationEvent, PublicFormEntry};
use formflow_core::{
    generate_auto_slug, validate_custom_slug, FlowRow, FlowTree, FormFlowError, FormId,
    FormIdentity, FormRecord, FormStore, FormSummary, FormUpdate, InsertedForm, NewForm,
    PublicForm, Result,
};
use std::sync::Arc;
use tracing::info;

/// Form mutations and reads with cache maintenance applied after each write.
#[derive(Clone)]
pub struct FormCatalog {
    store: Arc<dyn FormStore>,
    cache: CacheCoordinator,
}

impl FormCatalog {
    pub fn new(store: Arc<dyn FormStore>, cache: CacheCoordinator) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &CacheCoordinator {
        &self.cache
    }

    pub async fn create(&self, form: NewForm) -> Result<InsertedForm> {
        let is_template = form.is_template;
        let inserted = self.store.create_form(form).await?;
        if is_template {
            let mut identity = FormIdentity::new(inserted.id);
            identity.is_template = true;
            self.cache
                .invalidate(&InvalidationEvent::FormUpdated(identity))
                .await;
        }
        Ok(inserted)
    }

    pub async fn update(&self, form_id: FormId, update: FormUpdate) -> Result<FormRecord> {
        let before = self.existing(form_id).await?;
        let after = self.store.update_form(form_id, update).await?;
        self.cache
            .invalidate_all(&[
                InvalidationEvent::FormUpdated(before.identity()),
                InvalidationEvent::FormUpdated(after.identity()),
            ])
            .await;
        Ok(after)
    }

    pub async fn delete(&self, form_id: FormId) -> Result<()> {
        let before = self.existing(form_id).await?;
        self.store.delete_form(form_id).await?;
        self.cache
            .invalidate(&InvalidationEvent::FormDeleted(before.identity()))
            .await;
        info!("Deleted form {}", form_id);
        Ok(())
    }

    /// Publishes under a fresh auto slug and, optionally, a custom slug. A blank
    /// custom slug clears any previous one.
    pub async fn publish(&self, form_id: FormId, custom_slug: Option<&str>) -> Result<FormRecord> {
        let before = self.existing(form_id).await?;

        let custom = match custom_slug.map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) => {
                let slug = validate_custom_slug(slug)?;
                let own = before.custom_slug.as_deref() == Some(slug.as_str());
                if !own && self.store.slug_exists(&slug).await? {
                    return Err(FormFlowError::SlugTaken(slug));
                }
                Some(slug)
            }
            None => None,
        };

        let auto_slug = generate_auto_slug();
        let after = self
            .store
            .publish_form(form_id, &auto_slug, custom.as_deref())
            .await?;

        self.cache
            .invalidate_all(&[
                InvalidationEvent::Published(before.identity()),
                InvalidationEvent::Published(after.identity()),
            ])
            .await;
        info!(
            "Published form {} as {}{}",
            form_id,
            auto_slug,
            custom
                .as_deref()
                .map(|c| format!(" and {}", c))
                .unwrap_or_default()
        );
        Ok(after)
    }

    pub async fn set_accepting_responses(
        &self,
        form_id: FormId,
        accepting: bool,
    ) -> Result<FormRecord> {
        let form = self.store.set_accepting_responses(form_id, accepting).await?;
        self.cache
            .invalidate(&InvalidationEvent::AcceptingResponsesChanged(
                form.identity(),
            ))
            .await;
        Ok(form)
    }

    /// Replaces the flow tree after checking the rows form a valid tree.
    pub async fn replace_flow(&self, form_id: FormId, rows: Vec<FlowRow>) -> Result<FlowTree> {
        let form = self.existing(form_id).await?;
        let tree = FlowTree::from_rows(rows.clone())?;
        self.store.replace_flow(form_id, &rows).await?;
        self.cache
            .invalidate(&InvalidationEvent::FlowChanged(form.identity()))
            .await;
        Ok(tree)
    }

    /// Public view of a published form, served from cache when possible.
    pub async fn public_form(&self, slug: &str) -> Result<Option<PublicForm>> {
        self.cache
            .public_form(slug, || async {
                match self.store.form_by_slug(slug).await? {
                    Some(form) => self.load_public(form).await.map(Some),
                    None => Ok(None),
                }
            })
            .await
    }

    pub async fn public_form_by_id(&self, form_id: FormId) -> Result<Option<PublicForm>> {
        self.cache
            .public_form_by_id(form_id, || async {
                match self.store.form(form_id).await? {
                    Some(form) if form.is_published() => self.load_public(form).await.map(Some),
                    _ => Ok(None),
                }
            })
            .await
    }

    pub async fn templates(&self) -> Result<Vec<FormSummary>> {
        self.cache
            .templates(|| async { self.store.list_templates().await })
            .await
    }

    /// The form a public submission for `slug` belongs to, provided it is
    /// currently accepting responses.
    pub async fn resolve_for_submission(&self, slug: &str) -> Result<FormId> {
        let form = self
            .public_form(slug)
            .await?
            .ok_or_else(|| FormFlowError::FormNotFound(slug.to_string()))?;
        if !form.accepting_responses {
            return Err(FormFlowError::FormNotAccepting(form.id));
        }
        Ok(form.id)
    }

    async fn existing(&self, form_id: FormId) -> Result<FormRecord> {
        self.store
            .form(form_id)
            .await?
            .ok_or_else(|| FormFlowError::FormNotFound(form_id.to_string()))
    }

    async fn load_public(&self, form: FormRecord) -> Result<PublicFormEntry> {
        let rows = self.store.flow_rows(form.id).await?;
        let tree = FlowTree::from_rows(rows)?;
        Ok(PublicFormEntry {
            identity: form.identity(),
            form: PublicForm {
                id: form.id,
                title: form.title,
                description: form.description,
                accepting_responses: form.accepting_responses,
                flow: tree.to_view(),
            },
        })
    }
}
