//! Enroll command implementation.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use liveid_core::{
    CaptureConfig, CaptureController, CaptureState, DirectoryFrameSource, LiveIdConfig,
    LiveIdError, NewIdentity, PixelEmbedder,
};
use tracing::{info, warn};

use crate::utils;

/// Slack on top of `interval * target` before a stalled capture is abandoned.
const CAPTURE_GRACE: Duration = Duration::from_secs(5);

pub struct EnrollArgs {
    pub name: String,
    pub external_ref: String,
    pub frames: PathBuf,
    pub target: Option<usize>,
    pub interval_ms: Option<u64>,
}

/// Execute the enroll command.
pub async fn execute(config: LiveIdConfig, args: EnrollArgs, quiet: bool) -> Result<()> {
    let identity = NewIdentity::new(args.name, args.external_ref);
    identity.validate()?;

    let (store, gallery) = utils::load_gallery(&config.gallery_path)?;
    if gallery.find_by_external_ref(&identity.external_ref).is_some() {
        return Err(LiveIdError::DuplicateIdentity {
            external_ref: identity.external_ref,
        }
        .into());
    }

    let source = DirectoryFrameSource::new(&args.frames)
        .with_context(|| format!("Failed to read frames: {}", args.frames.display()))?;
    info!(dir = %args.frames.display(), files = source.len(), "Using frame directory as camera");

    let capture_config = CaptureConfig {
        interval: args
            .interval_ms
            .map(Duration::from_millis)
            .unwrap_or(config.capture.interval),
        target: args.target.unwrap_or(config.capture.target),
    };
    if capture_config.target == 0 {
        bail!("Capture target must be at least 1 sample");
    }
    let deadline = capture_config.interval * u32::try_from(capture_config.target).unwrap_or(u32::MAX)
        + CAPTURE_GRACE;

    let controller = CaptureController::new(Arc::new(source), capture_config)?;
    let display_name = identity.display_name.clone();
    let external_ref = identity.external_ref.clone();

    if !quiet {
        println!(
            "{} {} ({})",
            "Enrolling".bold(),
            display_name,
            external_ref.dimmed()
        );
    }

    let mut progress = controller.subscribe();
    controller.start(identity)?;

    let watched = tokio::time::timeout(deadline, async {
        loop {
            let current = *progress.borrow_and_update();
            if !quiet && current.state == CaptureState::Capturing {
                print!("\r   {} {}/{}", "Capturing".dimmed(), current.collected, current.target);
                let _ = std::io::stdout().flush();
            }
            if current.state != CaptureState::Capturing || progress.changed().await.is_err() {
                return current;
            }
        }
    })
    .await;

    let settled = match watched {
        Ok(settled) => settled,
        Err(_) => {
            controller.stop();
            warn!(collected = controller.progress().collected, "Capture stalled");
            bail!("Capture timed out: the frame directory stopped yielding frames");
        }
    };
    if !quiet {
        println!();
    }
    if settled.state != CaptureState::Complete {
        bail!(
            "Capture ended early with {}/{} samples",
            settled.collected,
            settled.target
        );
    }

    let embedder = PixelEmbedder::default();
    let enrolled = controller
        .save(&embedder, &gallery)
        .await
        .context("Failed to enroll identity")?;
    utils::save_gallery(&store, &gallery)?;

    info!(identity_id = %enrolled.id, samples = enrolled.sample_count(), "Identity enrolled");

    if !quiet {
        println!();
        println!("{}", "Identity enrolled!".green().bold());
        println!();
        println!("   {} {}", "Name:".dimmed(), enrolled.display_name);
        println!("   {} {}", "Reference:".dimmed(), enrolled.external_ref);
        println!("   {} {}", "ID:".dimmed(), enrolled.id);
        println!("   {} {}", "Samples:".dimmed(), enrolled.sample_count());
        println!(
            "   {} {}",
            "Gallery:".dimmed(),
            config.gallery_path.display()
        );
    }

    Ok(())
}
