//! Text heuristics for the deliberation loop.
//!
//! Four concerns live here: checkable-claim detection, next-speaker
//! nomination scanning, synthesis-readiness phrasing, and fact-check
//! verdict parsing. Each is an explicit ordered matcher table; table
//! order is the single source of precedence truth. Matching is
//! best-effort keyword work, not NLU.

use colloquy_types::{PersonaKind, Verdict};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::profiles;

/// Most claim sentences forwarded to the fact-checker per response.
pub const CLAIM_CAP: usize = 3;

// ---------------------------------------------------------------------------
// Sentence splitting
// ---------------------------------------------------------------------------

/// Split a response into sentence-like units on terminal punctuation.
///
/// A `.`, `!`, or `?` ends a unit only when followed by whitespace or the
/// end of input, so decimals like "2.5 million" stay intact.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = match chars.peek() {
                Some((_, next)) => next.is_whitespace(),
                None => true,
            };
            if at_boundary {
                let unit = text[start..=i].trim();
                if !unit.is_empty() {
                    units.push(unit);
                }
                start = i + c.len_utf8();
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        units.push(tail);
    }
    units
}

// ---------------------------------------------------------------------------
// Claim detection
// ---------------------------------------------------------------------------

/// Checkable-claim pattern families. Any single match flags the sentence;
/// the family name is carried for logging only.
const CLAIM_FAMILIES: &[(&str, &str)] = &[
    (
        "percentage",
        r"(?i)\b\d+(?:\.\d+)?\s*(?:%|percent|percentage points?)",
    ),
    (
        "year_reference",
        r"(?i)\b(?:in|by|since|until|during|around)\s+(?:1[0-9]{3}|20[0-9]{2})\b|\b(?:1[0-9]{3}|20[0-9]{2})s\b",
    ),
    (
        "study_citation",
        r"(?i)\b(?:stud(?:y|ies)|research|surveys?|meta-analys(?:is|es)|evidence|data)\s+(?:show|shows|showed|suggests?|suggested|indicates?|indicated|finds?|found|demonstrates?|demonstrated)\b",
    ),
    (
        "attribution",
        r"(?i)\baccording to\b|\bas reported by\b",
    ),
    (
        "large_magnitude",
        r"(?i)\b\d+(?:\.\d+)?\s*(?:thousand|million|billion|trillion)\b|\b(?:hundreds|thousands|millions|billions|trillions)\s+of\b",
    ),
    (
        "definitive_fact",
        r"(?i)\b(?:is|are|was|were|remains?)\s+the\s+(?:first|last|only|largest|smallest|biggest|oldest|newest|fastest|highest|lowest|most|least)\b",
    ),
    (
        "historical_reference",
        r"(?i)\b(?:was|were)\s+(?:founded|established|invented|discovered|created|built|signed|launched|introduced)\b|\bdates?\s+back\s+to\b",
    ),
    (
        "economic_metric",
        r"(?i)\b(?:gdp|revenue|inflation|unemployment|market\s+(?:cap|share)|interest\s+rates?|per\s+capita|median\s+(?:income|price|wage)|valuation)\b",
    ),
];

static CLAIM_MATCHERS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    CLAIM_FAMILIES
        .iter()
        .map(|(family, pattern)| (*family, Regex::new(pattern).expect("valid claim pattern")))
        .collect()
});

/// Scan a completed response for heuristically checkable factual claims.
///
/// Returns up to [`CLAIM_CAP`] flagged sentences in document order. Claims
/// are only ever capped for volume, never filtered for correctness.
pub fn detect_claims(text: &str) -> Vec<String> {
    let mut claims = Vec::new();
    for sentence in split_sentences(text) {
        if CLAIM_MATCHERS.iter().any(|(_, re)| re.is_match(sentence)) {
            claims.push(sentence.to_string());
            if claims.len() == CLAIM_CAP {
                break;
            }
        }
    }
    claims
}

// ---------------------------------------------------------------------------
// Nomination scanning
// ---------------------------------------------------------------------------

/// Anchor phrases that turn a name mention into a nomination.
const NOMINATION_ANCHORS: &[&str] = &["hear from", "turn to", "thoughts from"];

static ANCHOR_MATCHERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    NOMINATION_ANCHORS
        .iter()
        .map(|anchor| {
            let pattern = format!(r"(?i)\b{}\b", anchor);
            Regex::new(&pattern).expect("valid anchor pattern")
        })
        .collect()
});

static NAME_MATCHERS: Lazy<Vec<(PersonaKind, Regex)>> = Lazy::new(|| {
    profiles::roster()
        .iter()
        .map(|p| {
            let pattern = format!(r"(?i)\b{}\b", p.name);
            (p.kind, Regex::new(&pattern).expect("valid name pattern"))
        })
        .collect()
});

/// Scan for nominated next speakers: a roster name appearing in the same
/// sentence as an anchor phrase. Nominees come back in order of appearance,
/// deduplicated. Eligibility filtering is the moderator's business.
pub fn detect_nominations(text: &str) -> Vec<PersonaKind> {
    let mut nominees = Vec::new();
    for sentence in split_sentences(text) {
        if !ANCHOR_MATCHERS.iter().any(|re| re.is_match(sentence)) {
            continue;
        }
        let mut found: Vec<(usize, PersonaKind)> = NAME_MATCHERS
            .iter()
            .filter_map(|(kind, re)| re.find(sentence).map(|m| (m.start(), *kind)))
            .collect();
        found.sort_by_key(|(pos, _)| *pos);
        for (_, kind) in found {
            if !nominees.contains(&kind) {
                nominees.push(kind);
            }
        }
    }
    nominees
}

// ---------------------------------------------------------------------------
// Synthesis readiness
// ---------------------------------------------------------------------------

const SYNTHESIS_READY_PHRASES: &[&str] = &[
    "ready to synthesize",
    "time to synthesize",
    "ready for synthesis",
    "move to synthesis",
    "proceed to synthesis",
];

/// True when a response explicitly signals the discussion is ready to close.
pub fn signals_synthesis_readiness(text: &str) -> bool {
    let lowered = text.to_lowercase();
    SYNTHESIS_READY_PHRASES.iter().any(|p| lowered.contains(p))
}

// ---------------------------------------------------------------------------
// Verdict parsing
// ---------------------------------------------------------------------------

/// Verdict keyword tiers, strongest first. The first tier with any match
/// wins regardless of where the keyword sits in the text.
const VERDICT_TIERS: &[(Verdict, &[&str])] = &[
    (Verdict::Verified, &["verified", "confirmed", "accurate"]),
    (Verdict::Partial, &["partially", "partial", "partly", "mixed"]),
    (Verdict::Disputed, &["disputed", "contested", "misleading"]),
    (
        Verdict::False,
        &["false", "incorrect", "inaccurate", "untrue", "fabricated"],
    ),
    (
        Verdict::Unverifiable,
        &[
            "unverifiable",
            "cannot determine",
            "insufficient evidence",
            "no reliable source",
        ],
    ),
];

static VERDICT_MATCHERS: Lazy<Vec<(Verdict, Regex)>> = Lazy::new(|| {
    VERDICT_TIERS
        .iter()
        .map(|(verdict, keywords)| {
            let pattern = format!(r"(?i)\b(?:{})\b", keywords.join("|"));
            (*verdict, Regex::new(&pattern).expect("valid verdict pattern"))
        })
        .collect()
});

/// Parse a fact-check response into a verdict via the ordered keyword
/// tiers. Falls back to [`Verdict::Unknown`] when nothing matches.
pub fn parse_verdict(text: &str) -> Verdict {
    VERDICT_MATCHERS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(verdict, _)| *verdict)
        .unwrap_or(Verdict::Unknown)
}
