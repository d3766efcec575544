//! Verify command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use liveid_core::liveness::{ClassifierConfig, ClassifierFactory, MockLivenessClassifier};
use liveid_core::{
    AttemptState, Frame, LiveIdConfig, LivenessClassifier, LivenessGate, MatchStatus,
    PixelEmbedder, StaticFrameSource, VerificationOrchestrator, VerificationOutcome,
};
use tracing::{error, info, warn};

use crate::utils;
use crate::MockLiveness;

/// Confidence reported by the scripted classifier.
const MOCK_CONFIDENCE: f32 = 0.95;

pub struct VerifyArgs {
    pub frame: PathBuf,
    pub mock_liveness: Option<MockLiveness>,
    pub k: Option<usize>,
    pub max_distance: Option<f32>,
    pub threshold: Option<f32>,
}

fn build_classifier(mock: Option<MockLiveness>, quiet: bool) -> Result<Arc<dyn LivenessClassifier>> {
    let Some(mock) = mock else {
        return ClassifierFactory::create(ClassifierConfig::Auto)
            .context("No liveness classifier available");
    };

    warn!(verdict = ?mock, "Using MOCK liveness classifier (not a real check!)");
    if !quiet {
        eprintln!(
            "{}",
            "Using MOCK liveness classifier (not a real check!)".yellow()
        );
    }
    let classifier = match mock {
        MockLiveness::Live => MockLivenessClassifier::live(MOCK_CONFIDENCE),
        MockLiveness::Spoof => MockLivenessClassifier::spoof(MOCK_CONFIDENCE),
        MockLiveness::Error => MockLivenessClassifier::failing("simulated classifier outage"),
    };
    Ok(Arc::new(classifier))
}

/// Execute the verify command.
pub async fn execute(config: LiveIdConfig, args: VerifyArgs, quiet: bool) -> Result<()> {
    let frame = Frame::from_path(&args.frame)
        .with_context(|| format!("Failed to read frame: {}", args.frame.display()))?;
    info!(path = %args.frame.display(), bytes = frame.len(), "Read probe frame");

    let (_, gallery) = utils::load_gallery(&config.gallery_path)?;
    if gallery.is_empty() {
        warn!("Gallery is empty, nobody can be identified");
    }

    let mut gate_config = config.gate.clone();
    if let Some(threshold) = args.threshold {
        gate_config.threshold = threshold;
    }
    let mut match_config = config.matching.clone();
    if let Some(k) = args.k {
        match_config.k = k;
    }
    if let Some(max_distance) = args.max_distance {
        match_config.max_distance = max_distance;
    }

    let classifier = build_classifier(args.mock_liveness, quiet)?;
    let gate = LivenessGate::new(classifier, gate_config);
    let orchestrator = VerificationOrchestrator::new(
        Arc::new(StaticFrameSource::new(frame)),
        Arc::new(gate),
        Arc::new(PixelEmbedder::default()),
        Arc::new(gallery),
        match_config,
    )?;

    let outcome = orchestrator.verify_and_identify().await?;
    report(&outcome, quiet)
}

fn report(outcome: &VerificationOutcome, quiet: bool) -> Result<()> {
    let verdict = &outcome.verdict;

    if !verdict.is_live {
        error!(
            confidence = verdict.confidence,
            reason = %verdict.reason,
            fallback = verdict.fallback,
            "Liveness rejected"
        );
        if !quiet {
            println!();
            println!("{}", "╔════════════════════════════════════════╗".red());
            println!(
                "{}",
                "║            SPOOF DETECTED              ║".red().bold()
            );
            println!("{}", "╚════════════════════════════════════════╝".red());
            println!();
            println!("   {} {:.2}", "Confidence:".dimmed(), verdict.confidence);
            println!("   {} {}", "Reason:".dimmed(), verdict.reason);
        }
        bail!("Access denied: liveness check failed ({})", verdict.reason);
    }

    if outcome.state == AttemptState::Error {
        let cause = outcome.error.as_deref().unwrap_or("unknown error");
        bail!("Identification failed: {cause}");
    }

    match &outcome.matching {
        MatchStatus::Matched(matched) => {
            info!(
                identity_id = %matched.identity_id,
                distance = matched.distance,
                votes = matched.votes,
                "Access granted"
            );
            if !quiet {
                println!();
                println!("{}", "╔════════════════════════════════════════╗".green());
                println!(
                    "{}",
                    "║            ACCESS GRANTED              ║".green().bold()
                );
                println!("{}", "╚════════════════════════════════════════╝".green());
                println!();
                println!(
                    "   {} {}",
                    "Welcome:".dimmed(),
                    matched.display_name.green().bold()
                );
                println!("   {} {}", "Reference:".dimmed(), matched.external_ref);
                println!("   {} {:.4}", "Distance:".dimmed(), matched.distance);
                println!("   {} {}", "Votes:".dimmed(), matched.votes);
                println!("   {} {:.2}", "Liveness:".dimmed(), verdict.confidence);
            }
            Ok(())
        }
        _ => {
            error!(confidence = verdict.confidence, "Live face did not match any identity");
            if !quiet {
                println!();
                println!("{}", "╔════════════════════════════════════════╗".yellow());
                println!(
                    "{}",
                    "║           UNKNOWN IDENTITY             ║".yellow().bold()
                );
                println!("{}", "╚════════════════════════════════════════╝".yellow());
                println!();
                println!("   {} {:.2}", "Liveness:".dimmed(), verdict.confidence);
                println!("   {} {}", "Match:".dimmed(), "No enrolled identity".yellow());
            }
            bail!("Access denied: no enrolled identity matched");
        }
    }
}
