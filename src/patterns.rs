//! Candidate address generation.
//!
//! [`PatternGenerator`] produces an ordered, deterministic list of guessed
//! addresses for a contact. The order is part of the contract: the scheduler
//! tries candidates front to back, and the Catch-All fallback picks index 2,
//! which is always the first-name-only pattern (`jane@acme.com`) when both
//! names are present.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::contact::Contact;

/// Loose syntactic check for generated addresses.
static CANDIDATE_REGEX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^[a-z0-9][a-z0-9._'\-]*@[a-z0-9](?:[a-z0-9\-]*[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9\-]*[a-z0-9])?)+$",
    )
    .ok()
});

/// Produces the ordered candidate list for one contact.
///
/// Implementations must be pure and deterministic: the same contact always
/// yields the same list in the same order.
pub trait CandidateGenerator: Send + Sync {
    /// Returns candidate addresses, most likely first.
    fn generate(&self, contact: &Contact) -> Vec<String>;
}

/// Default generator covering the common corporate address conventions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternGenerator;

impl PatternGenerator {
    /// Creates the default generator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CandidateGenerator for PatternGenerator {
    fn generate(&self, contact: &Contact) -> Vec<String> {
        generate_patterns(&contact.first_name, &contact.last_name, &contact.domain)
    }
}

/// Generates candidate addresses for a name and domain.
///
/// With both names present the order is:
///
/// ```text
/// 0 first.last   1 flast       2 first       3 firstlast
/// 4 f.last       5 first_last  6 last        7 firstl
/// 8 last.first   9 lastfirst  10 first-last 11 lastf
/// ```
///
/// Duplicates keep their first position. With only one name, the single
/// bare-name address is returned. Returns an empty list for an unusable
/// domain or when no name survives sanitization.
#[must_use]
pub fn generate_patterns(first_name: &str, last_name: &str, domain: &str) -> Vec<String> {
    let first = sanitize_name_part(first_name);
    let last = sanitize_name_part(last_name);
    let domain = domain.trim().to_lowercase();

    if domain.is_empty()
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        warn!(domain = %domain, "cannot generate patterns: invalid domain");
        return Vec::new();
    }

    let local_parts: Vec<String> = match (first.chars().next(), last.chars().next()) {
        (Some(f), Some(l)) => vec![
            format!("{first}.{last}"),
            format!("{f}{last}"),
            first.clone(),
            format!("{first}{last}"),
            format!("{f}.{last}"),
            format!("{first}_{last}"),
            last.clone(),
            format!("{first}{l}"),
            format!("{last}.{first}"),
            format!("{last}{first}"),
            format!("{first}-{last}"),
            format!("{last}{f}"),
        ],
        (Some(_), None) => vec![first.clone()],
        (None, Some(_)) => vec![last.clone()],
        (None, None) => {
            warn!(
                first_name,
                last_name, "cannot generate patterns: name parts empty after sanitization"
            );
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let candidates: Vec<String> = local_parts
        .into_iter()
        .map(|local| format!("{local}@{domain}"))
        .filter(|candidate| seen.insert(candidate.clone()))
        .collect();

    // Dropping a single entry would shift the positions callers rely on.
    if let Some(invalid) = candidates.iter().find(|c| !is_valid_candidate(c)) {
        warn!(candidate = %invalid, "cannot generate patterns: candidate failed validation");
        return Vec::new();
    }

    debug!(
        count = candidates.len(),
        domain = %domain,
        "generated candidate patterns"
    );
    candidates
}

fn is_valid_candidate(candidate: &str) -> bool {
    CANDIDATE_REGEX
        .as_ref()
        .is_some_and(|regex| regex.is_match(candidate))
}

/// Lowercases a name, folds common Latin diacritics, and drops everything
/// except ASCII alphanumerics, hyphens and apostrophes. Hyphens and
/// apostrophes are kept only between alphanumerics.
fn sanitize_name_part(part: &str) -> String {
    let kept: String = part
        .trim()
        .to_lowercase()
        .chars()
        .map(fold_diacritic)
        .filter(|c| c.is_ascii_alphanumeric() || *c == '\'' || *c == '-')
        .collect();
    kept.trim_matches(|c| c == '\'' || c == '-').to_string()
}

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}
