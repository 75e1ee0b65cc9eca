use crate::CacheKey;
use formflow_core::FormIdentity;
use std::collections::HashSet;

/// Successful form mutations that make cached reads stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationEvent {
    /// The flow tree was replaced
    FlowChanged(FormIdentity),
    /// Title, description or template flag changed
    FormUpdated(FormIdentity),
    FormDeleted(FormIdentity),
    /// Slugs were (re)assigned and the form made public
    Published(FormIdentity),
    AcceptingResponsesChanged(FormIdentity),
}

impl InvalidationEvent {
    pub fn identity(&self) -> &FormIdentity {
        match self {
            InvalidationEvent::FlowChanged(identity)
            | InvalidationEvent::FormUpdated(identity)
            | InvalidationEvent::FormDeleted(identity)
            | InvalidationEvent::Published(identity)
            | InvalidationEvent::AcceptingResponsesChanged(identity) => identity,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InvalidationEvent::FlowChanged(_) => "flow_changed",
            InvalidationEvent::FormUpdated(_) => "form_updated",
            InvalidationEvent::FormDeleted(_) => "form_deleted",
            InvalidationEvent::Published(_) => "published",
            InvalidationEvent::AcceptingResponsesChanged(_) => "accepting_responses_changed",
        }
    }
}

/// Keys to delete after `event`: the form id, every slug the form carries, and
/// the template listing when the form is a template.
pub fn keys_for(event: &InvalidationEvent) -> Vec<CacheKey> {
    keys_for_all(std::slice::from_ref(event))
}

/// Union of [`keys_for`] over several events, in first-seen order without
/// duplicates.
pub fn keys_for_all(events: &[InvalidationEvent]) -> Vec<CacheKey> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();

    for event in events {
        let identity = event.identity();
        let candidates = std::iter::once(CacheKey::FormId(identity.form_id))
            .chain(
                identity
                    .slugs()
                    .map(|slug| CacheKey::FormSlug(slug.to_string())),
            )
            .chain(identity.is_template.then_some(CacheKey::TemplatesList));

        for key in candidates {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
    }

    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use formflow_core::FormId;

    fn identity(auto: Option<&str>, custom: Option<&str>, is_template: bool) -> FormIdentity {
        FormIdentity {
            form_id: FormId::new_v4(),
            auto_slug: auto.map(str::to_string),
            custom_slug: custom.map(str::to_string),
            is_template,
        }
    }

    #[test]
    fn draft_form_only_invalidates_its_id() {
        let id = identity(None, None, false);
        let keys = keys_for(&InvalidationEvent::FormUpdated(id.clone()));
        assert_eq!(keys, vec![CacheKey::FormId(id.form_id)]);
    }

    #[test]
    fn published_template_invalidates_every_identity() {
        let id = identity(Some("Xy3_abc-def"), Some("spring-survey"), true);
        let keys = keys_for(&InvalidationEvent::FlowChanged(id.clone()));
        assert_eq!(
            keys,
            vec![
                CacheKey::FormId(id.form_id),
                CacheKey::FormSlug("Xy3_abc-def".into()),
                CacheKey::FormSlug("spring-survey".into()),
                CacheKey::TemplatesList,
            ]
        );
    }

    #[test]
    fn blank_and_repeated_slugs_are_skipped() {
        let id = identity(Some("same"), Some("same"), false);
        assert_eq!(keys_for(&InvalidationEvent::Published(id)).len(), 2);

        let id = identity(Some("auto"), Some("  "), false);
        assert_eq!(keys_for(&InvalidationEvent::FormDeleted(id)).len(), 2);
    }

    #[test]
    fn union_covers_old_and_new_slugs() {
        let before = identity(Some("old-auto"), Some("old-custom"), false);
        let mut after = before.clone();
        after.auto_slug = Some("new-auto".into());
        after.custom_slug = None;
        after.is_template = true;

        let keys = keys_for_all(&[
            InvalidationEvent::Published(before.clone()),
            InvalidationEvent::Published(after),
        ]);
        assert_eq!(
            keys,
            vec![
                CacheKey::FormId(before.form_id),
                CacheKey::FormSlug("old-auto".into()),
                CacheKey::FormSlug("old-custom".into()),
                CacheKey::FormSlug("new-auto".into()),
                CacheKey::TemplatesList,
            ]
        );
    }

    #[test]
    fn keys_are_deterministic() {
        let event =
            InvalidationEvent::AcceptingResponsesChanged(identity(Some("a1b"), None, true));
        assert_eq!(keys_for(&event), keys_for(&event));
    }
}
