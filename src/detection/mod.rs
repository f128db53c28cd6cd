//! Block-marker detection.
//!
//! Classifies a fetched page as a block/challenge interstitial or as real
//! content. Signatures are case-insensitive regexes; blocking signatures fail
//! the attempt, suspicious ones only flag the content.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerSeverity {
    /// The page is an interstitial; the attempt failed.
    Blocking,
    /// Challenge hints are present but the page may still carry content.
    Suspicious,
}

/// Marker found in a page body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMarker {
    pub id: String,
    pub description: String,
    pub severity: MarkerSeverity,
}

impl std::fmt::Display for BlockMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id, self.description)
    }
}

#[derive(Debug, Clone)]
struct Signature {
    id: String,
    description: String,
    severity: MarkerSeverity,
    pattern: Regex,
}

impl Signature {
    fn marker(&self) -> BlockMarker {
        BlockMarker {
            id: self.id.clone(),
            description: self.description.clone(),
            severity: self.severity,
        }
    }
}

static BUILTIN_SIGNATURES: Lazy<Vec<Signature>> = Lazy::new(|| {
    let blocking = [
        (
            "automated_access",
            "automated access notice",
            r"automated access to amazon data|api-services-support@amazon\.com",
        ),
        ("captcha_form", "captcha form", r"/errors/validatecaptcha"),
        (
            "captcha_prompt",
            "captcha prompt",
            r"enter the characters you see below|type the characters you see in this image",
        ),
        ("robot_check", "robot check page", r"<title>\s*robot check\s*</title>"),
        ("access_denied", "access denied page", r"<title>\s*access denied\s*</title>"),
        (
            "cloudflare_interstitial",
            "cloudflare interstitial",
            r"<title>\s*just a moment\.\.\.\s*</title>|cf-browser-verification",
        ),
        (
            "cloudflare_block",
            "cloudflare firewall block",
            r"cf-error-code[^0-9]{0,16}10(?:10|15|20)",
        ),
    ];
    let suspicious = [
        (
            "captcha_widget",
            "captcha widget reference",
            r#"class=["'][^"']*(?:g-recaptcha|h-captcha|cf-turnstile)"#,
        ),
        ("opf_captcha", "opfcaptcha endpoint", r"opfcaptcha"),
    ];

    blocking
        .into_iter()
        .map(|entry| (entry, MarkerSeverity::Blocking))
        .chain(
            suspicious
                .into_iter()
                .map(|entry| (entry, MarkerSeverity::Suspicious)),
        )
        .map(|((id, description, pattern), severity)| Signature {
            id: id.to_string(),
            description: description.to_string(),
            severity,
            pattern: build_regex(pattern),
        })
        .collect()
});

/// Regex-driven detector for block and challenge pages.
#[derive(Debug, Clone)]
pub struct BlockDetector {
    signatures: Vec<Signature>,
}

impl BlockDetector {
    /// Detector loaded with the built-in signatures.
    pub fn new() -> Self {
        Self {
            signatures: BUILTIN_SIGNATURES.clone(),
        }
    }

    /// Detector with no signatures; every page passes.
    pub fn empty() -> Self {
        Self {
            signatures: Vec::new(),
        }
    }

    /// Add a custom signature.
    pub fn with_marker(
        mut self,
        id: impl Into<String>,
        description: impl Into<String>,
        severity: MarkerSeverity,
        pattern: &str,
    ) -> Result<Self, regex::Error> {
        let pattern = regex::RegexBuilder::new(pattern)
            .case_insensitive(true)
            .multi_line(true)
            .build()?;
        self.signatures.push(Signature {
            id: id.into(),
            description: description.into(),
            severity,
            pattern,
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Most severe marker present in `body`. Blocking markers win over
    /// suspicious ones; within a severity, registration order decides.
    pub fn detect(&self, body: &str) -> Option<BlockMarker> {
        let mut suspicious = None;
        for signature in &self.signatures {
            if !signature.pattern.is_match(body) {
                continue;
            }
            match signature.severity {
                MarkerSeverity::Blocking => return Some(signature.marker()),
                MarkerSeverity::Suspicious => {
                    suspicious.get_or_insert_with(|| signature.marker());
                }
            }
        }
        suspicious
    }

    pub fn is_blocked(&self, body: &str) -> bool {
        self.detect(body)
            .is_some_and(|marker| marker.severity == MarkerSeverity::Blocking)
    }
}

impl Default for BlockDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn build_regex(pattern: &str) -> Regex {
    regex::RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .dot_matches_new_line(true)
        .build()
        .unwrap_or_else(|err| panic!("invalid block marker regex `{}`: {}", pattern, err))
}
