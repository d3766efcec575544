//! Status command implementation.

use anyhow::Result;
use colored::Colorize;
use liveid_core::LiveIdConfig;

use crate::utils;

/// Execute the status command.
pub fn execute(config: &LiveIdConfig, quiet: bool) -> Result<()> {
    let (_, gallery) = utils::load_gallery(&config.gallery_path)?;
    let stats = gallery.stats();

    if quiet {
        return Ok(());
    }

    let readiness = if stats.is_ready() {
        "Ready".green().bold()
    } else {
        "Waiting for enrollment".yellow().bold()
    };
    let dimension = stats
        .dimension
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());

    println!();
    println!("{}", "LiveID gallery".bold());
    println!();
    println!("   {} {}", "Status:".dimmed(), readiness);
    println!("   {} {}", "Identities:".dimmed(), stats.identities);
    println!("   {} {}", "Samples:".dimmed(), stats.total_samples);
    println!("   {} {}", "Dimension:".dimmed(), dimension);
    println!(
        "   {} {}",
        "Gallery:".dimmed(),
        config.gallery_path.display()
    );
    println!(
        "   {} {:.2} (timeout {}s)",
        "Liveness:".dimmed(),
        config.gate.threshold,
        config.gate.timeout.as_secs()
    );
    println!(
        "   {} k={} max_distance={:.2}",
        "Matching:".dimmed(),
        config.matching.k,
        config.matching.max_distance
    );

    Ok(())
}
