/// Crate version baked in at build time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Where the tool lives.
pub const REPOSITORY_URL: &str = "https://codeberg.org/backporter/backporter";

/// `backporter <version> (<url>)`
pub fn full() -> String {
    format!("backporter {VERSION} ({REPOSITORY_URL})")
}

/// Two-line provenance trailer for a backported commit.
pub fn signature_trailer(original_sha: &str) -> String {
    format!("Backport-of: {original_sha}\nBackported-by: backporter {VERSION}")
}

/// Append the trailer after a blank line.
pub fn sign_message(message: &str, original_sha: &str) -> String {
    format!(
        "{}\n\n{}",
        message.trim_end(),
        signature_trailer(original_sha)
    )
}
