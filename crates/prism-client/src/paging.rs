use crate::{ApiVersion, PrismClient, Result};
use prism_common::Entity;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_PAGE_SIZE: &str = "100";

#[derive(Debug, Deserialize)]
struct V2Metadata {
    #[serde(default)]
    end_index: u64,
    #[serde(default)]
    grand_total_entities: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct V1Metadata {
    #[serde(default)]
    end_index: u64,
    #[serde(default)]
    grand_total_entities: u64,
}

/// Upper bound on pages fetched for one listing.
const MAX_PAGES: u64 = 1000;

/// `(end_index, grand_total_entities)` from a page's metadata.
fn page_position(version: ApiVersion, metadata: Value) -> Option<(u64, u64)> {
    let parsed = match version {
        ApiVersion::V2 => serde_json::from_value::<V2Metadata>(metadata)
            .map(|m| (m.end_index, m.grand_total_entities)),
        ApiVersion::V1 => serde_json::from_value::<V1Metadata>(metadata)
            .map(|m| (m.end_index, m.grand_total_entities)),
    };
    match parsed {
        Ok(position) => Some(position),
        Err(e) => {
            tracing::warn!(error = %e, "unreadable page metadata, stopping pagination");
            None
        }
    }
}

impl PrismClient {
    /// Fetch every page of a listing endpoint.
    ///
    /// `count` defaults to 100 unless present in `base_params`; `page` starts
    /// at 1. A page without `entities` or `metadata` ends the walk with what
    /// was gathered so far, as does an empty page, an `end_index` that does
    /// not advance, or reaching the page limit.
    pub async fn fetch_all_pages(
        &self,
        version: ApiVersion,
        path: &str,
        base_params: &[(&str, &str)],
    ) -> Result<Vec<Entity>> {
        let mut params: Vec<(&str, String)> = base_params
            .iter()
            .filter(|(k, _)| *k != "page")
            .map(|(k, v)| (*k, v.to_string()))
            .collect();
        if !params.iter().any(|(k, _)| *k == "count") {
            params.push(("count", DEFAULT_PAGE_SIZE.to_string()));
        }

        let mut all = Vec::new();
        let mut page: u64 = 1;
        let mut last_end: Option<u64> = None;
        loop {
            let page_text = page.to_string();
            let mut query: Vec<(&str, &str)> =
                params.iter().map(|(k, v)| (*k, v.as_str())).collect();
            query.push(("page", page_text.as_str()));

            let body = self.get(version, path, &query).await?;
            let Value::Object(mut obj) = body else {
                tracing::warn!(section = %self.section(), path, page, "page is not an object");
                break;
            };

            let Some(Value::Array(items)) = obj.remove("entities") else {
                break;
            };
            if items.is_empty() {
                break;
            }
            for item in items {
                match item {
                    Value::Object(entity) => all.push(entity),
                    other => tracing::warn!(path, value = %other, "skipping non-object entity"),
                }
            }

            let Some(metadata) = obj.remove("metadata") else {
                break;
            };
            let Some((end, total)) = page_position(version, metadata) else {
                break;
            };
            if end >= total {
                break;
            }
            if last_end.is_some_and(|prev| end <= prev) {
                tracing::warn!(section = %self.section(), path, page, end_index = end, "end_index did not advance, stopping pagination");
                break;
            }
            if page >= MAX_PAGES {
                tracing::warn!(section = %self.section(), path, page, "page limit reached, stopping pagination");
                break;
            }
            last_end = Some(end);
            page += 1;
        }

        tracing::debug!(section = %self.section(), path, pages = page, entities = all.len(), "pagination finished");
        Ok(all)
    }
}
