//! Index command

use super::runtime::{build_context, read_events, with_deadline};
use crate::RuntimeArgs;
use anyhow::Result;
use rpmrepo_core::{BucketOutcome, index_batch};
use serde_json::json;

/// Index every package in the batch and publish changed repositories.
///
/// # Errors
///
/// Input, configuration and pipeline failures, or an expired deadline.
pub async fn index(runtime: &RuntimeArgs) -> Result<()> {
    let events = read_events(&runtime.event)?;
    let ctx = build_context(runtime).await?;

    let outcomes = with_deadline(&ctx, runtime.timeout, index_batch(&ctx, events)).await?;

    for (bucket, outcome) in outcomes {
        let summary = match outcome {
            BucketOutcome::NoPackages => json!({ "bucket": bucket, "outcome": "no-packages" }),
            BucketOutcome::Unchanged { packages } => {
                json!({ "bucket": bucket, "outcome": "unchanged", "packages": packages })
            }
            BucketOutcome::Published { packages, repomd } => json!({
                "bucket": bucket,
                "outcome": "published",
                "packages": packages,
                "repomd": repomd.object_checksum.digest,
            }),
        };
        println!("{summary}");
    }
    Ok(())
}
