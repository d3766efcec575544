//! CLI integration tests for liveid-cli.
//!
//! These tests run the actual binary against a temporary gallery and
//! generated face frames, checking outputs, exit codes and the snapshot file.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use image::{ImageBuffer, Luma};
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the liveid binary with liveness env vars cleared.
fn liveid() -> Command {
    let mut cmd = Command::cargo_bin("liveid").unwrap();
    cmd.env_remove("GEMINI_API_KEY")
        .env_remove("API_KEY")
        .env_remove("LIVENESS_API_URL")
        .env_remove("LIVEID_GALLERY");
    cmd
}

/// Write a synthetic grayscale "face"; `invert` produces its photographic negative.
fn write_face(path: &Path, invert: bool) {
    let img = ImageBuffer::from_fn(32, 32, |x, y| {
        let v = ((x * 8 + y * 4) % 256) as u8;
        Luma([if invert { 255 - v } else { v }])
    });
    img.save(path).unwrap();
}

struct Kiosk {
    temp: TempDir,
}

impl Kiosk {
    fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    fn gallery(&self) -> PathBuf {
        self.temp.path().join("gallery.json")
    }

    fn gallery_arg(&self) -> String {
        self.gallery().to_str().unwrap().to_string()
    }

    fn frames_dir(&self, invert: bool) -> PathBuf {
        let dir = self
            .temp
            .path()
            .join(if invert { "frames-neg" } else { "frames" });
        fs::create_dir_all(&dir).unwrap();
        write_face(&dir.join("001.png"), invert);
        write_face(&dir.join("002.png"), invert);
        dir
    }

    fn probe(&self, invert: bool) -> PathBuf {
        let path = self
            .temp
            .path()
            .join(if invert { "probe-neg.png" } else { "probe.png" });
        write_face(&path, invert);
        path
    }

    fn enroll(&self, name: &str, external_ref: &str, frames: &Path) -> assert_cmd::assert::Assert {
        liveid()
            .args([
                "--gallery",
                &self.gallery_arg(),
                "enroll",
                "--name",
                name,
                "--external-ref",
                external_ref,
                "--frames",
                frames.to_str().unwrap(),
                "--target",
                "3",
                "--interval-ms",
                "10",
            ])
            .assert()
    }

    fn verify(&self, probe: &Path, verdict: &str) -> assert_cmd::assert::Assert {
        liveid()
            .args([
                "--gallery",
                &self.gallery_arg(),
                "verify",
                "--frame",
                probe.to_str().unwrap(),
                "--mock-liveness",
                verdict,
            ])
            .assert()
    }
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays_usage() {
    liveid()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Liveness-gated face identification"))
        .stdout(predicate::str::contains("enroll"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_version_displays_version() {
    liveid()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("liveid"));
}

#[test]
fn test_help_shows_exit_codes() {
    liveid()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Exit codes:"))
        .stdout(predicate::str::contains("65"))
        .stdout(predicate::str::contains("69"));
}

#[test]
fn test_unknown_argument_is_usage_error() {
    liveid().args(["verify", "--bogus"]).assert().code(64);
}

#[test]
fn test_invalid_mock_verdict_is_usage_error() {
    let kiosk = Kiosk::new();
    let probe = kiosk.probe(false);
    liveid()
        .args([
            "verify",
            "--frame",
            probe.to_str().unwrap(),
            "--mock-liveness",
            "maybe",
        ])
        .assert()
        .code(64);
}

// ============================================================================
// Empty Gallery
// ============================================================================

#[test]
fn test_status_on_empty_gallery() {
    let kiosk = Kiosk::new();
    liveid()
        .args(["--gallery", &kiosk.gallery_arg(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Waiting for enrollment"))
        .stdout(predicate::str::contains("Identities:"));
    assert!(!kiosk.gallery().exists(), "status must not create the gallery");
}

#[test]
fn test_list_on_empty_gallery() {
    let kiosk = Kiosk::new();
    liveid()
        .args(["--gallery", &kiosk.gallery_arg(), "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No identities enrolled"));
}

#[test]
fn test_live_face_against_empty_gallery_is_denied() {
    let kiosk = Kiosk::new();
    kiosk
        .verify(&kiosk.probe(false), "live")
        .code(65)
        .stdout(predicate::str::contains("UNKNOWN IDENTITY"))
        .stderr(predicate::str::contains("Access denied"));
}

// ============================================================================
// Input Errors
// ============================================================================

#[test]
fn test_missing_probe_returns_input_error() {
    let kiosk = Kiosk::new();
    liveid()
        .args([
            "--gallery",
            &kiosk.gallery_arg(),
            "verify",
            "--frame",
            "nonexistent_probe.png",
            "--mock-liveness",
            "live",
        ])
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Failed to read frame"));
}

#[test]
fn test_missing_frames_dir_returns_input_error() {
    let kiosk = Kiosk::new();
    kiosk
        .enroll("Ada", "EMP-1", &kiosk.temp.path().join("no-such-dir"))
        .code(66)
        .stderr(predicate::str::contains("Failed to read frames"));
}

#[test]
fn test_blank_name_is_rejected() {
    let kiosk = Kiosk::new();
    let frames = kiosk.frames_dir(false);
    kiosk
        .enroll("   ", "EMP-1", &frames)
        .code(66)
        .stderr(predicate::str::contains("Display name is required"));
    assert!(!kiosk.gallery().exists());
}

#[test]
fn test_corrupt_gallery_returns_io_error() {
    let kiosk = Kiosk::new();
    fs::write(kiosk.gallery(), b"{ not json").unwrap();
    liveid()
        .args(["--gallery", &kiosk.gallery_arg(), "status"])
        .assert()
        .code(74);
}

// ============================================================================
// Enroll and Verify
// ============================================================================

#[test]
fn test_enroll_creates_gallery() {
    let kiosk = Kiosk::new();
    let frames = kiosk.frames_dir(false);

    kiosk
        .enroll("Ada Lovelace", "EMP-1", &frames)
        .success()
        .stdout(predicate::str::contains("Identity enrolled!"))
        .stdout(predicate::str::contains("Samples:"));

    let snapshot: serde_json::Value =
        serde_json::from_slice(&fs::read(kiosk.gallery()).unwrap()).unwrap();
    assert_eq!(snapshot["version"], 1);
    let identity = &snapshot["identities"][0];
    assert_eq!(identity["display_name"], "Ada Lovelace");
    assert_eq!(identity["external_ref"], "EMP-1");
    assert_eq!(identity["embeddings"].as_array().unwrap().len(), 3);
    assert_eq!(identity["reference_sample"]["mime_type"], "image/png");
}

#[test]
fn test_enrolled_face_is_granted() {
    let kiosk = Kiosk::new();
    kiosk.enroll("Ada", "EMP-1", &kiosk.frames_dir(false)).success();

    kiosk
        .verify(&kiosk.probe(false), "live")
        .success()
        .stdout(predicate::str::contains("ACCESS GRANTED"))
        .stdout(predicate::str::contains("Ada"))
        .stdout(predicate::str::contains("EMP-1"));
}

#[test]
fn test_spoof_is_denied_even_for_enrolled_face() {
    let kiosk = Kiosk::new();
    kiosk.enroll("Ada", "EMP-1", &kiosk.frames_dir(false)).success();

    kiosk
        .verify(&kiosk.probe(false), "spoof")
        .code(65)
        .stdout(predicate::str::contains("SPOOF DETECTED"))
        .stdout(predicate::str::contains("ACCESS GRANTED").not());
}

#[test]
fn test_classifier_outage_fails_closed() {
    let kiosk = Kiosk::new();
    kiosk.enroll("Ada", "EMP-1", &kiosk.frames_dir(false)).success();

    kiosk
        .verify(&kiosk.probe(false), "error")
        .code(65)
        .stdout(predicate::str::contains("System error during liveness check."));
}

#[test]
fn test_different_face_is_unknown() {
    let kiosk = Kiosk::new();
    kiosk.enroll("Ada", "EMP-1", &kiosk.frames_dir(false)).success();

    kiosk
        .verify(&kiosk.probe(true), "live")
        .code(65)
        .stdout(predicate::str::contains("UNKNOWN IDENTITY"));
}

#[test]
fn test_two_identities_each_recognized() {
    let kiosk = Kiosk::new();
    kiosk.enroll("Ada", "EMP-1", &kiosk.frames_dir(false)).success();
    kiosk.enroll("Grace", "EMP-2", &kiosk.frames_dir(true)).success();

    kiosk
        .verify(&kiosk.probe(false), "live")
        .success()
        .stdout(predicate::str::contains("EMP-1"));
    kiosk
        .verify(&kiosk.probe(true), "live")
        .success()
        .stdout(predicate::str::contains("EMP-2"));
}

#[test]
fn test_duplicate_external_ref_is_rejected() {
    let kiosk = Kiosk::new();
    let frames = kiosk.frames_dir(false);
    kiosk.enroll("Ada", "EMP-1", &frames).success();

    kiosk
        .enroll("Someone Else", "EMP-1", &frames)
        .code(65)
        .stderr(predicate::str::contains("already enrolled"));
}

#[test]
fn test_list_and_status_after_enrollment() {
    let kiosk = Kiosk::new();
    kiosk.enroll("Ada", "EMP-1", &kiosk.frames_dir(false)).success();

    liveid()
        .args(["--gallery", &kiosk.gallery_arg(), "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ada"))
        .stdout(predicate::str::contains("EMP-1"))
        .stdout(predicate::str::contains("1 identities"));

    liveid()
        .args(["--gallery", &kiosk.gallery_arg(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ready"))
        .stdout(predicate::str::contains("256"));
}

#[test]
fn test_list_json_output() {
    let kiosk = Kiosk::new();
    kiosk.enroll("Ada", "EMP-1", &kiosk.frames_dir(false)).success();

    let output = liveid()
        .args(["--gallery", &kiosk.gallery_arg(), "list", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    let entries: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(entries[0]["external_ref"], "EMP-1");
    assert_eq!(entries[0]["samples"], 3);
    assert_eq!(entries[0]["has_reference_sample"], true);
}

#[test]
fn test_gallery_from_env_var() {
    let kiosk = Kiosk::new();
    liveid()
        .env("LIVEID_GALLERY", kiosk.gallery())
        .args([
            "enroll",
            "--name",
            "Ada",
            "--external-ref",
            "EMP-1",
            "--frames",
            kiosk.frames_dir(false).to_str().unwrap(),
            "--target",
            "2",
            "--interval-ms",
            "10",
        ])
        .assert()
        .success();
    assert!(kiosk.gallery().exists());
}

// ============================================================================
// Output Modes
// ============================================================================

#[test]
fn test_quiet_mode_minimal_output() {
    let kiosk = Kiosk::new();
    liveid()
        .args([
            "--quiet",
            "--gallery",
            &kiosk.gallery_arg(),
            "enroll",
            "--name",
            "Ada",
            "--external-ref",
            "EMP-1",
            "--frames",
            kiosk.frames_dir(false).to_str().unwrap(),
            "--target",
            "2",
            "--interval-ms",
            "10",
        ])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_color_never_no_ansi() {
    let kiosk = Kiosk::new();
    let output = liveid()
        .args([
            "--color",
            "never",
            "--gallery",
            &kiosk.gallery_arg(),
            "verify",
            "--frame",
            kiosk.probe(false).to_str().unwrap(),
            "--mock-liveness",
            "spoof",
        ])
        .assert()
        .code(65);
    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    let stderr = String::from_utf8_lossy(&output.get_output().stderr);
    assert!(!stdout.contains("\x1b["), "stdout should not contain ANSI codes");
    assert!(!stderr.contains("\x1b["), "stderr should not contain ANSI codes");
}
