//! Paginated `list=exturlusage` scan for one (language, domain) task.
//!
//! References are handed to the caller one API page at a time, so resolution
//! work starts after a single round trip instead of waiting for the full
//! enumeration of a domain's usage index.

use serde::Deserialize;
use serde_json::Value;

use crate::client::{ApiClient, FetchError, Paginated};
use crate::config::EXTURL_BATCH;
use crate::models::{LinkTask, PageReference};

pub struct LinkUsageScanner<'a> {
    task: LinkTask,
    pages: Paginated<'a>,
}

#[derive(Deserialize, Default)]
struct ExtUrlQuery {
    #[serde(default)]
    exturlusage: Vec<ExtUrlEntry>,
}

#[derive(Deserialize)]
struct ExtUrlEntry {
    pageid: u64,
    title: String,
    #[serde(default)]
    url: String,
}

impl<'a> LinkUsageScanner<'a> {
    pub fn new(client: &'a ApiClient, task: LinkTask) -> Self {
        let params = [
            ("action", "query".to_string()),
            ("list", "exturlusage".to_string()),
            ("euquery", task.domain.clone()),
            ("eulimit", EXTURL_BATCH.to_string()),
        ];
        let pages = client.paginate(&task.lang, &params);
        Self { task, pages }
    }

    /// One API page of references, or `None` once the index is exhausted.
    /// A page may be empty while the continuation is still live.
    pub async fn next_page(&mut self) -> Result<Option<Vec<PageReference>>, FetchError> {
        let Some(query) = self.pages.next_page().await? else {
            return Ok(None);
        };
        Ok(Some(self.parse(query)?))
    }

    fn parse(&self, query: Value) -> Result<Vec<PageReference>, FetchError> {
        let parsed: ExtUrlQuery = serde_json::from_value(query).map_err(|e| {
            FetchError::Permanent {
                reason: format!("unexpected exturlusage shape: {e}"),
            }
        })?;

        Ok(parsed
            .exturlusage
            .into_iter()
            .map(|entry| PageReference {
                lang: self.task.lang.clone(),
                domain: self.task.domain.clone(),
                title: entry.title,
                page_id: entry.pageid,
                url: entry.url,
            })
            .collect())
    }
}
