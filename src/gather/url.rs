//! Records the final navigated URL.

use super::{Gatherer, PassContext, PassLoadData};
use crate::error::Result;
use crate::scripts;
use async_trait::async_trait;
use serde_json::json;

/// Captures `location.href` after the pass settles, so host-scoped audits
/// see the URL redirects actually landed on.
#[derive(Debug)]
pub struct UrlGatherer;

#[async_trait]
impl Gatherer for UrlGatherer {
    fn name(&self) -> &'static str {
        "url"
    }

    async fn after_pass(
        &self,
        ctx: &PassContext<'_>,
        _load: &PassLoadData,
    ) -> Result<serde_json::Value> {
        let script = scripts::get(scripts::FINAL_URL).unwrap_or("window.location.href");
        let final_url = ctx.session.evaluate_async(script, ctx.command_timeout).await?;
        Ok(json!({ "finalUrl": final_url }))
    }
}
