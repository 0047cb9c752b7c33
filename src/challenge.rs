//! Anti-bot challenge detection and the operator suspend point.
//!
//! Detection is heuristic: known challenge markers in the page HTML.
//! Classification stays a pure function over a page snapshot so it is
//! testable without a browser; the suspend/resume state machine lives in
//! the walker and talks to a human through the injectable
//! [`OperatorPrompt`] trait.

use crate::model::Source;
use async_trait::async_trait;
use std::fmt;

/// The specific family of challenge detected on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    /// G2's own "Verification Required" interstitial.
    VerificationRequired,
    Recaptcha,
    Hcaptcha,
    /// Cloudflare Turnstile / "Just a moment..." interstitial.
    Cloudflare,
    /// FunCaptcha / Arkose Labs.
    Funcaptcha,
    /// Generic "prove you're human" phrasing.
    Generic,
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChallengeKind::VerificationRequired => "verification_required",
            ChallengeKind::Recaptcha => "recaptcha",
            ChallengeKind::Hcaptcha => "hcaptcha",
            ChallengeKind::Cloudflare => "cloudflare",
            ChallengeKind::Funcaptcha => "funcaptcha",
            ChallengeKind::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// Join kinds for log lines and error messages.
pub fn join_kinds(kinds: &[ChallengeKind]) -> String {
    kinds
        .iter()
        .map(ChallengeKind::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Classification of a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    /// Ordinary content; extraction can be trusted.
    Normal,
    /// A challenge interstitial a human can clear.
    Challenge(Vec<ChallengeKind>),
    /// A hard denial page. Terminal for the run, no operator attempt.
    Blocked,
}

/// Heuristic challenge classifier over raw page HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChallengeDetector;

impl ChallengeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Classify a page snapshot as normal, challenge, or blocked.
    pub fn classify(&self, html: &str) -> PageState {
        let lower = html.to_ascii_lowercase();

        if Self::is_hard_block(&lower) {
            return PageState::Blocked;
        }

        let mut kinds = Vec::new();
        if html.contains("captcha__human__title") && html.contains("Verification Required") {
            kinds.push(ChallengeKind::VerificationRequired);
        }
        if lower.contains("g-recaptcha") || lower.contains("grecaptcha") || lower.contains("recaptcha") {
            kinds.push(ChallengeKind::Recaptcha);
        }
        if lower.contains("h-captcha") || lower.contains("hcaptcha") {
            kinds.push(ChallengeKind::Hcaptcha);
        }
        if lower.contains("cf-turnstile")
            || lower.contains("just a moment")
            || (lower.contains("cloudflare") && lower.contains("challenge"))
        {
            kinds.push(ChallengeKind::Cloudflare);
        }
        if lower.contains("funcaptcha") || lower.contains("arkoselabs") {
            kinds.push(ChallengeKind::Funcaptcha);
        }
        if kinds.is_empty()
            && (lower.contains("captcha")
                || lower.contains("i'm not a robot")
                || lower.contains("i am not a robot")
                || lower.contains("prove you're human")
                || lower.contains("are you human")
                || lower.contains("bot detection"))
        {
            kinds.push(ChallengeKind::Generic);
        }

        if kinds.is_empty() {
            PageState::Normal
        } else {
            PageState::Challenge(kinds)
        }
    }

    fn is_hard_block(lower: &str) -> bool {
        (lower.contains("access denied") && lower.contains("permission"))
            || lower.contains("you have been blocked")
            || (lower.contains("error 1020") && lower.contains("cloudflare"))
    }
}

/// Human-in-the-loop suspend point for challenge resolution.
///
/// The walker calls `resolve_challenge` when a challenge is detected and
/// waits (bounded) for it to return, then re-classifies the page. Inject
/// a scripted implementation to test the suspend/resume cycle without a
/// browser or a human.
#[async_trait]
pub trait OperatorPrompt: Send {
    /// Hand control to the operator; return once they signal completion.
    async fn resolve_challenge(&mut self, source: Source, kinds: &[ChallengeKind]);
}

/// Console operator prompt: prints instructions and waits for Enter.
pub struct ConsolePrompt;

#[async_trait]
impl OperatorPrompt for ConsolePrompt {
    async fn resolve_challenge(&mut self, source: Source, kinds: &[ChallengeKind]) {
        eprintln!(
            "\nChallenge detected on {source} ({}). Solve it in the browser window, then press Enter to continue...",
            join_kinds(kinds)
        );
        let _ = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_listing_page_classifies_normal() {
        let html = r#"<html><body><article itemprop="review"><div>Great tool</div></article></body></html>"#;
        assert_eq!(ChallengeDetector::new().classify(html), PageState::Normal);
    }

    #[test]
    fn g2_verification_interstitial_is_a_challenge() {
        let html = r#"<html><body><div class="captcha__human__title">Verification Required</div></body></html>"#;
        match ChallengeDetector::new().classify(html) {
            PageState::Challenge(kinds) => {
                assert!(kinds.contains(&ChallengeKind::VerificationRequired));
            }
            other => panic!("expected challenge, got {other:?}"),
        }
    }

    #[test]
    fn cloudflare_interstitial_is_a_challenge() {
        let html = "<html><head><title>Just a moment...</title></head><body></body></html>";
        match ChallengeDetector::new().classify(html) {
            PageState::Challenge(kinds) => assert!(kinds.contains(&ChallengeKind::Cloudflare)),
            other => panic!("expected challenge, got {other:?}"),
        }
    }

    #[test]
    fn generic_phrasing_detected_once() {
        let html = "<html><body>Please prove you're human to continue</body></html>";
        match ChallengeDetector::new().classify(html) {
            PageState::Challenge(kinds) => assert_eq!(kinds, vec![ChallengeKind::Generic]),
            other => panic!("expected challenge, got {other:?}"),
        }
    }

    #[test]
    fn hard_denial_is_blocked_not_challenge() {
        let html = "<html><body><h1>Access Denied</h1><p>You don't have permission to access this page.</p></body></html>";
        assert_eq!(ChallengeDetector::new().classify(html), PageState::Blocked);
    }

    #[test]
    fn multiple_markers_all_reported() {
        let html = r#"<div class="g-recaptcha"></div><div class="h-captcha"></div>"#;
        match ChallengeDetector::new().classify(html) {
            PageState::Challenge(kinds) => {
                assert!(kinds.contains(&ChallengeKind::Recaptcha));
                assert!(kinds.contains(&ChallengeKind::Hcaptcha));
            }
            other => panic!("expected challenge, got {other:?}"),
        }
    }
}
