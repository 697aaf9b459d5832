//! Identifies head scripts, stylesheets, and imports that block first paint.
//!
//! Candidates come from the DOM: synchronous-by-declaration tags collected
//! in the page. Each candidate is confirmed against the pass's network
//! records, keeping only responses the parser itself initiated with an
//! HTML/CSS/script MIME type — a tag injected by script cannot block the
//! initial paint. A background poll installed before navigation flags every
//! link that is ever `rel=preload` or disabled, so a stylesheet promoted to
//! preload after the initial parse is excluded even though it started out
//! blocking.

use super::{Gatherer, NetworkRecord, PassContext, PassLoadData};
use crate::error::Result;
use crate::scripts;
use anyhow::{anyhow, Context as _};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

#[derive(Debug)]
pub struct TagsBlockingFirstPaint;

/// A synchronous head tag reported by the in-page collection script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TagCandidate {
    pub tag_name: String,
    pub url: String,
    pub rel: String,
    pub media: String,
    pub disabled: bool,
}

/// One confirmed blocking tag with its network cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingTag {
    pub tag: TagCandidate,
    pub transfer_size: u64,
    pub spend_time_ms: u64,
}

/// The artifact value: confirmed blocking tags plus their totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockingTagSummary {
    pub items: Vec<BlockingTag>,
    pub total_transfer_size: u64,
    pub total_spend_time_ms: u64,
}

#[async_trait]
impl Gatherer for TagsBlockingFirstPaint {
    fn name(&self) -> &'static str {
        "tags-blocking-first-paint"
    }

    /// Install the async-link poll on every new document, so links that
    /// mutate to preload between parse and `after_pass` are caught.
    async fn before_pass(&self, ctx: &PassContext<'_>) -> Result<()> {
        let source = scripts::get(scripts::SAVE_ASYNC_LINKS)
            .ok_or_else(|| anyhow!("script registry is missing {}", scripts::SAVE_ASYNC_LINKS))?;
        ctx.session
            .send_with_timeout(
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": source }),
                ctx.command_timeout,
            )
            .await?;
        Ok(())
    }

    async fn after_pass(
        &self,
        ctx: &PassContext<'_>,
        load: &PassLoadData,
    ) -> Result<serde_json::Value> {
        let source = scripts::get(scripts::COLLECT_BLOCKING_TAGS)
            .ok_or_else(|| anyhow!("script registry is missing {}", scripts::COLLECT_BLOCKING_TAGS))?;
        let raw = ctx.session.evaluate_async(source, ctx.command_timeout).await?;
        let candidates: Vec<TagCandidate> =
            serde_json::from_value(raw).context("blocking-tag script returned an unexpected shape")?;

        let summary = find_blocking_tags(candidates, &load.network_records);
        Ok(serde_json::to_value(summary).map_err(anyhow::Error::from)?)
    }
}

/// Cross-reference DOM candidates against the pass's network records.
pub(crate) fn find_blocking_tags(
    candidates: Vec<TagCandidate>,
    records: &[NetworkRecord],
) -> BlockingTagSummary {
    let indexed = filtered_and_indexed_by_url(records);

    let mut summary = BlockingTagSummary::default();
    for tag in candidates {
        let Some(record) = indexed.get(tag.url.as_str()) else {
            continue;
        };
        let spend_time_ms = ((record.end_time - record.start_time) * 1000.0).round() as u64;
        summary.total_transfer_size += record.transfer_size;
        summary.total_spend_time_ms += spend_time_ms;
        summary.items.push(BlockingTag {
            tag,
            transfer_size: record.transfer_size,
            spend_time_ms,
        });
    }
    summary
}

/// Index records by URL, keeping only responses that can block first paint:
/// HTML of any origin, and css/script responses the parser requested.
fn filtered_and_indexed_by_url(records: &[NetworkRecord]) -> HashMap<&str, &NetworkRecord> {
    records
        .iter()
        .filter(|record| {
            let is_html = record.mime_type.contains("html");
            let is_parser_script_or_style = (record.mime_type.contains("css")
                || record.mime_type.contains("script"))
                && record.initiator_type == "parser";
            is_html || is_parser_script_or_style
        })
        .map(|record| (record.url.as_str(), record))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, mime: &str, initiator: &str) -> NetworkRecord {
        NetworkRecord {
            url: url.to_string(),
            mime_type: mime.to_string(),
            initiator_type: initiator.to_string(),
            transfer_size: 1000,
            start_time: 2.0,
            end_time: 2.25,
            finished: true,
        }
    }

    fn link(url: &str) -> TagCandidate {
        TagCandidate {
            tag_name: "LINK".to_string(),
            url: url.to_string(),
            rel: "stylesheet".to_string(),
            media: "all".to_string(),
            disabled: false,
        }
    }

    #[test]
    fn parser_initiated_stylesheet_is_confirmed_blocking() {
        let records = vec![record("https://a.test/app.css", "text/css", "parser")];
        let summary = find_blocking_tags(vec![link("https://a.test/app.css")], &records);

        assert_eq!(summary.items.len(), 1);
        assert_eq!(summary.items[0].spend_time_ms, 250);
        assert_eq!(summary.total_transfer_size, 1000);
        assert_eq!(summary.total_spend_time_ms, 250);
    }

    #[test]
    fn script_injected_resources_are_excluded() {
        let records = vec![record("https://a.test/late.css", "text/css", "script")];
        let summary = find_blocking_tags(vec![link("https://a.test/late.css")], &records);
        assert!(summary.items.is_empty());
    }

    #[test]
    fn html_imports_block_regardless_of_initiator() {
        let records = vec![record("https://a.test/import.html", "text/html", "other")];
        let mut tag = link("https://a.test/import.html");
        tag.rel = "import".to_string();
        let summary = find_blocking_tags(vec![tag], &records);
        assert_eq!(summary.items.len(), 1);
    }

    #[test]
    fn image_responses_never_block() {
        let records = vec![record("https://a.test/logo.png", "image/png", "parser")];
        let summary = find_blocking_tags(vec![link("https://a.test/logo.png")], &records);
        assert!(summary.items.is_empty());
    }

    #[test]
    fn candidates_without_a_network_record_are_dropped() {
        let summary = find_blocking_tags(vec![link("https://a.test/ghost.css")], &[]);
        assert!(summary.items.is_empty());
        assert_eq!(summary.total_spend_time_ms, 0);
    }

    #[test]
    fn totals_sum_across_confirmed_tags() {
        let records = vec![
            record("https://a.test/one.css", "text/css", "parser"),
            record("https://a.test/two.js", "application/javascript", "parser"),
        ];
        let summary = find_blocking_tags(
            vec![link("https://a.test/one.css"), link("https://a.test/two.js")],
            &records,
        );
        assert_eq!(summary.items.len(), 2);
        assert_eq!(summary.total_transfer_size, 2000);
        assert_eq!(summary.total_spend_time_ms, 500);
    }
}
