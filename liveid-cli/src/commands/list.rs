//! List command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use liveid_core::LiveIdConfig;
use serde_json::json;

use crate::utils;

/// Execute the list command.
pub fn execute(config: &LiveIdConfig, as_json: bool, quiet: bool) -> Result<()> {
    let (_, gallery) = utils::load_gallery(&config.gallery_path)?;
    let identities = gallery.identities();

    if as_json {
        let entries: Vec<_> = identities
            .iter()
            .map(|identity| {
                json!({
                    "id": identity.id,
                    "display_name": identity.display_name,
                    "external_ref": identity.external_ref,
                    "enrolled_at": identity.enrolled_at,
                    "samples": identity.sample_count(),
                    "has_reference_sample": identity.reference_sample.is_some(),
                })
            })
            .collect();
        let out = serde_json::to_string_pretty(&entries).context("Failed to serialize identities")?;
        println!("{out}");
        return Ok(());
    }

    if quiet {
        return Ok(());
    }

    if identities.is_empty() {
        println!("{}", "No identities enrolled.".yellow());
        return Ok(());
    }

    println!(
        "{:<10} {:<24} {:<16} {:>7}  {}",
        "ID".bold(),
        "NAME".bold(),
        "REFERENCE".bold(),
        "SAMPLES".bold(),
        "ENROLLED".bold()
    );
    for identity in &identities {
        println!(
            "{:<10} {:<24} {:<16} {:>7}  {}",
            utils::short_id(&identity.id),
            identity.display_name,
            identity.external_ref,
            identity.sample_count(),
            utils::format_datetime(&identity.enrolled_at).dimmed()
        );
    }
    println!();
    println!("{} identities", identities.len());

    Ok(())
}
