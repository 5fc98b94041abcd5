//! Signing commands

use super::runtime::{build_context, read_events, with_deadline};
use crate::{RuntimeArgs, SigningArgs, TargetArgs};
use anyhow::Result;
use rpmrepo_core::router;
use rpmrepo_core::{SignOutcome, SigningConfig, TargetConfig};

fn signing_config(args: &SigningArgs) -> Result<SigningConfig> {
    Ok(SigningConfig::new(
        args.signing_key_secret.clone(),
        args.signing_passphrase_secret.clone(),
    )?)
}

fn report(outcomes: &[SignOutcome]) {
    for outcome in outcomes {
        match outcome {
            SignOutcome::Signed(location) => println!("signed {location}"),
            SignOutcome::Skipped(location) => println!("skipped {location} (not found)"),
        }
    }
}

/// Sign every package in the batch.
///
/// # Errors
///
/// Invalid signing or target settings, input and pipeline failures, or an
/// expired deadline.
pub async fn sign_package(runtime: &RuntimeArgs, signing: &SigningArgs, target: &TargetArgs) -> Result<()> {
    // Configuration is checked before any input is read.
    let signing = signing_config(signing)?;
    let target = TargetConfig::new(
        target.target_bucket.clone(),
        target.target_path.clone(),
        target.base_path.clone(),
    )?;
    if target.is_in_place() {
        tracing::info!("no target configured, signing packages in place");
    }

    let events = read_events(&runtime.event)?;
    let ctx = build_context(runtime).await?;
    let outcomes = with_deadline(
        &ctx,
        runtime.timeout,
        router::sign_packages(&ctx, &signing, &target, events),
    )
    .await?;
    report(&outcomes);
    Ok(())
}

/// Write detached signatures for every object in the batch.
///
/// # Errors
///
/// Invalid signing settings, input and pipeline failures, or an expired
/// deadline.
pub async fn sign_metadata(runtime: &RuntimeArgs, signing: &SigningArgs) -> Result<()> {
    let signing = signing_config(signing)?;
    let events = read_events(&runtime.event)?;
    let ctx = build_context(runtime).await?;
    let outcomes = with_deadline(
        &ctx,
        runtime.timeout,
        router::sign_metadata(&ctx, &signing, events),
    )
    .await?;
    report(&outcomes);
    Ok(())
}
