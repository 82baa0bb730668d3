//! # Box Projector
//!
//! Builds `BoxView`s from the log on every read. Nothing here is stored.

use shared_types::{BoxId, Event, EventType, IdentityId};

use crate::domain::cache_keys;
use crate::domain::errors::BoxError;
use crate::domain::filters::EventFilter;
use crate::domain::projection::{BoxSetting, BoxState, BoxView};
use crate::engine::aggregator::build_aggregate;
use crate::engine::formatter::format_event;
use crate::engine::identity_mapper::IdentityMapper;
use crate::ports::outbound::{BoxSettingRepo, CacheService, EventReader, FileStorageRepo};

/// Replay the build events of a box.
pub async fn compute_box_state<R: EventReader + ?Sized>(
    reader: &R,
    box_id: &BoxId,
) -> Result<BoxState, BoxError> {
    let events = reader
        .find(&EventFilter::for_box(*box_id).of_types(&EventType::REQUIRED_TO_BUILD))
        .await?;
    BoxState::replay(*box_id, &events)
}

/// Most recent event members see in the history.
pub async fn last_visible_event<R: EventReader + ?Sized>(
    reader: &R,
    box_id: &BoxId,
) -> Result<Event, BoxError> {
    reader
        .find(
            &EventFilter::for_box(*box_id)
                .of_types(&EventType::VISIBLE)
                .limit(1),
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| BoxError::not_found(format!("last event of box {box_id}")))
}

/// Collaborators needed to project a box.
pub struct Projector<'a, R: EventReader + ?Sized> {
    pub reader: &'a R,
    pub mapper: &'a IdentityMapper,
    pub files: &'a dyn FileStorageRepo,
    pub cache: &'a dyn CacheService,
    pub settings: &'a dyn BoxSettingRepo,
}

impl<'a, R: EventReader + ?Sized> Projector<'a, R> {
    /// Compute the view of a box.
    ///
    /// `viewer` adds its unread counter and settings; the creator is shown
    /// transparently only to itself. `last_event` skips the last event
    /// lookup when the caller already has it.
    pub async fn compute_box(
        &self,
        box_id: &BoxId,
        viewer: Option<&IdentityId>,
        last_event: Option<Event>,
    ) -> Result<BoxView, BoxError> {
        let state = compute_box_state(self.reader, box_id).await?;

        let creator_is_viewer = viewer == Some(&state.creator_id);
        let creator = self
            .mapper
            .get(&state.creator_id, creator_is_viewer)
            .await
            .map_err(|e| e.describe("retrieving creator"))?;

        let subject = match &state.subject_identity_id {
            Some(id) => Some(
                self.mapper
                    .get(id, true)
                    .await
                    .map_err(|e| e.describe("retrieving subject"))?,
            ),
            None => None,
        };

        let mut last = match last_event {
            Some(event) => event,
            None => last_visible_event(self.reader, box_id)
                .await
                .map_err(|e| e.describe("getting last event"))?,
        };
        build_aggregate(self.reader, self.files, &mut last)
            .await
            .map_err(|e| e.describe("building aggregate"))?;
        let last_event = format_event(self.mapper, last, false)
            .await
            .map_err(|e| e.describe("computing view of last event"))?;

        let mut view = BoxView {
            state,
            creator,
            subject,
            last_event,
            events_count: None,
            settings: None,
        };

        if let Some(viewer) = viewer {
            let count = self
                .cache
                .get_counter(&cache_keys::events_count_key(viewer, box_id))
                .await
                .map_err(|e| BoxError::from(e).describe("counting events for identity"))?;
            view.events_count = Some(count);

            let setting = self
                .settings
                .get(viewer, box_id)
                .await
                .map_err(|e| BoxError::from(e).describe("getting box setting"))?;
            view.settings = Some(setting.unwrap_or_else(|| BoxSetting::default_for(*viewer, *box_id)));
        }
        Ok(view)
    }
}
