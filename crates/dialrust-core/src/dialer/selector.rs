//! Contact Selector - Next batch of contacts due for a call

use super::window::CallingWindow;
use chrono::{DateTime, Utc};
use dialrust_common::Result;
use dialrust_storage::models::{Campaign, DueContact};
use dialrust_storage::repository::ContactStore;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Contact selector
pub struct ContactSelector {
    contacts: Arc<dyn ContactStore>,
}

impl ContactSelector {
    pub fn new(contacts: Arc<dyn ContactStore>) -> Self {
        Self { contacts }
    }

    /// Up to `limit` due contacts in store order.
    ///
    /// An empty batch means nothing is due. A contact is never returned twice
    /// in one batch. Attempts count toward "today" by the window's local day.
    pub async fn next_contacts(
        &self,
        campaign: &Campaign,
        window: &CallingWindow,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueContact>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let campaign_id = campaign.id;
        let batch = self
            .contacts
            .next_due(
                campaign_id,
                limit,
                campaign.max_retry_days,
                now,
                window.day_start(now),
            )
            .await?;

        let mut seen = HashSet::with_capacity(batch.len());
        let selected: Vec<DueContact> = batch
            .into_iter()
            .filter(|due| seen.insert(due.contact.id))
            .take(limit as usize)
            .collect();

        debug!(%campaign_id, limit, selected = selected.len(), "Selected contacts");
        Ok(selected)
    }
}
