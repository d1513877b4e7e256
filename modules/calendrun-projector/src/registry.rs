use std::sync::Arc;

use calendrun_common::events::{event_types, flows};
use calendrun_common::EventKey;
use calendrun_readmodel::ReadModel;

use crate::handler::ProjectionHandler;
use crate::handlers::{
    ChallengeOp, ChallengeProjection, ClubOp, ClubProjection, RunOp, RunProjection, TemplateOp,
    TemplateProjection, UserOp, UserProjection,
};

/// Static mapping from (flow type, event type) to the handler that projects
/// it. Iteration order is registration order and is the order units are
/// processed within a bucket.
#[derive(Default, Clone)]
pub struct DispatchRegistry {
    entries: Vec<(EventKey, Arc<dyn ProjectionHandler>)>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Re-registering a key replaces the handler in place.
    pub fn register(&mut self, key: EventKey, handler: Arc<dyn ProjectionHandler>) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = handler,
            None => self.entries.push((key, handler)),
        }
    }

    pub fn with(
        mut self,
        flow_type: &str,
        event_type: &str,
        handler: impl ProjectionHandler + 'static,
    ) -> Self {
        self.register(EventKey::new(flow_type, event_type), Arc::new(handler));
        self
    }

    pub fn get(&self, key: &EventKey) -> Option<Arc<dyn ProjectionHandler>> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, h)| h.clone())
    }

    pub fn keys(&self) -> impl Iterator<Item = &EventKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// The pair whose bucket listing stands in for all pairs during backlog
    /// catch-up.
    pub fn representative(&self) -> Option<&EventKey> {
        self.entries.first().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Only the pairs matching the given flow / event type filters.
    pub fn filtered(&self, flow_type: Option<&str>, event_type: Option<&str>) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(k, _)| flow_type.map_or(true, |f| k.flow_type == f))
            .filter(|(k, _)| event_type.map_or(true, |e| k.event_type == e))
            .cloned()
            .collect();
        Self { entries }
    }

    /// Every calendrun event type, wired to the read model.
    pub fn calendrun(store: ReadModel) -> Self {
        Self::new()
            .with(flows::RUN, event_types::RUN_LOGGED, RunProjection::new(store.clone(), RunOp::Logged))
            .with(flows::RUN, event_types::RUN_UPDATED, RunProjection::new(store.clone(), RunOp::Updated))
            .with(flows::RUN, event_types::RUN_DELETED, RunProjection::new(store.clone(), RunOp::Deleted))
            .with(
                flows::CHALLENGE,
                event_types::CHALLENGE_STARTED,
                ChallengeProjection::new(store.clone(), ChallengeOp::Started),
            )
            .with(
                flows::CHALLENGE,
                event_types::CHALLENGE_UPDATED,
                ChallengeProjection::new(store.clone(), ChallengeOp::Updated),
            )
            .with(
                flows::CHALLENGE,
                event_types::CHALLENGE_COMPLETED,
                ChallengeProjection::new(store.clone(), ChallengeOp::Completed),
            )
            .with(
                flows::CHALLENGE_TEMPLATE,
                event_types::TEMPLATE_CREATED,
                TemplateProjection::new(store.clone(), TemplateOp::Created),
            )
            .with(
                flows::CHALLENGE_TEMPLATE,
                event_types::TEMPLATE_UPDATED,
                TemplateProjection::new(store.clone(), TemplateOp::Updated),
            )
            .with(
                flows::CHALLENGE_TEMPLATE,
                event_types::TEMPLATE_DELETED,
                TemplateProjection::new(store.clone(), TemplateOp::Deleted),
            )
            .with(flows::CLUB, event_types::CLUB_CREATED, ClubProjection::new(store.clone(), ClubOp::Created))
            .with(flows::CLUB, event_types::CLUB_UPDATED, ClubProjection::new(store.clone(), ClubOp::Updated))
            .with(
                flows::CLUB,
                event_types::CLUB_MEMBER_JOINED,
                ClubProjection::new(store.clone(), ClubOp::MemberJoined),
            )
            .with(
                flows::CLUB,
                event_types::CLUB_MEMBER_LEFT,
                ClubProjection::new(store.clone(), ClubOp::MemberLeft),
            )
            .with(flows::USER, event_types::USER_CREATED, UserProjection::new(store.clone(), UserOp::Created))
            .with(flows::USER, event_types::USER_UPDATED, UserProjection::new(store, UserOp::Updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingHandler;

    fn registry() -> DispatchRegistry {
        DispatchRegistry::new()
            .with("run.0", "run.logged.0", RecordingHandler::new())
            .with("run.0", "run.deleted.0", RecordingHandler::new())
            .with("user.0", "user.created.0", RecordingHandler::new())
    }

    #[test]
    fn preserves_registration_order() {
        let keys: Vec<String> = registry().keys().map(|k| k.to_string()).collect();
        assert_eq!(
            keys,
            vec!["run.0/run.logged.0", "run.0/run.deleted.0", "user.0/user.created.0"]
        );
    }

    #[test]
    fn representative_is_first_entry() {
        let registry = registry();
        assert_eq!(
            registry.representative(),
            Some(&EventKey::new("run.0", "run.logged.0"))
        );
        assert!(DispatchRegistry::new().representative().is_none());
    }

    #[test]
    fn reregistering_replaces_without_reordering() {
        let mut registry = registry();
        registry.register(
            EventKey::new("run.0", "run.logged.0"),
            Arc::new(RecordingHandler::new()),
        );
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.representative(),
            Some(&EventKey::new("run.0", "run.logged.0"))
        );
    }

    #[test]
    fn filtered_keeps_matching_pairs() {
        let runs = registry().filtered(Some("run.0"), None);
        assert_eq!(runs.len(), 2);

        let deleted = registry().filtered(None, Some("run.deleted.0"));
        assert_eq!(deleted.len(), 1);
        assert!(deleted.get(&EventKey::new("run.0", "run.deleted.0")).is_some());

        assert!(registry().filtered(Some("club.0"), None).is_empty());
    }

    #[test]
    fn unknown_pair_has_no_handler() {
        assert!(registry().get(&EventKey::new("run.0", "run.archived.0")).is_none());
    }
}
