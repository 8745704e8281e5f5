//! Label name to id resolution with on-demand creation
use crate::client::MailboxClient;
use crate::error::Result;
use crate::request::LabelName;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Resolves label names to ids for one mailbox.
///
/// Lookups are exact and case-sensitive. The label list is fetched once on
/// first use and kept for the rest of the run.
#[derive(Debug, Default)]
pub struct LabelResolver {
    label_cache: Option<HashMap<String, String>>, // name -> id mapping
}

impl LabelResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads all existing labels from the mailbox into the cache
    pub async fn load_existing_labels(&mut self, client: &dyn MailboxClient) -> Result<usize> {
        let labels = client.list_labels().await?;
        let count = labels.len();
        self.label_cache = Some(labels.into_iter().map(|l| (l.name, l.id)).collect());
        debug!("Loaded {} existing labels into cache", count);
        Ok(count)
    }

    async fn cache(&mut self, client: &dyn MailboxClient) -> Result<&mut HashMap<String, String>> {
        if self.label_cache.is_none() {
            self.load_existing_labels(client).await?;
        }
        Ok(self.label_cache.get_or_insert_with(HashMap::new))
    }

    /// Ids for every name, creating labels the mailbox does not have yet
    pub async fn resolve_or_create(
        &mut self,
        client: &dyn MailboxClient,
        names: &[LabelName],
    ) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(names.len());

        for name in names {
            if let Some(id) = self.cache(client).await?.get(name.as_str()) {
                ids.push(id.clone());
                continue;
            }

            let id = client.create_label(name.as_str()).await?;
            info!(label = %name, "Created label");
            self.cache(client)
                .await?
                .insert(name.to_string(), id.clone());
            ids.push(id);
        }

        Ok(ids)
    }

    /// Ids for the names that already exist; missing ones are skipped with a warning
    pub async fn resolve_existing(
        &mut self,
        client: &dyn MailboxClient,
        names: &[LabelName],
    ) -> Result<Vec<String>> {
        let cache = self.cache(client).await?;
        let mut ids = Vec::with_capacity(names.len());

        for name in names {
            match cache.get(name.as_str()) {
                Some(id) => ids.push(id.clone()),
                None => warn!(label = %name, "Label to remove does not exist; skipping"),
            }
        }

        Ok(ids)
    }
}
