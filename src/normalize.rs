//! Text canonicalization for trigger, command, and greeting detection.
//!
//! Contacts type with wildly inconsistent accents, casing, and spacing, so
//! every comparison against a known phrase goes through [`canonical`] first:
//! NFD-decompose, drop combining marks, lowercase, trim. "DÚVIDA", "dúvida"
//! and "Duvida" all land on "duvida".

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Canonical form used for phrase comparison: diacritics stripped,
/// lowercased, trimmed. Punctuation is preserved.
pub fn canonical(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Collapse internal whitespace runs to single spaces and trim the ends.
/// Idempotent; this is the non-LLM half of question normalization.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Derive the stable contact key from a channel jid
/// (`"351911222333@s.whatsapp.net"` → `"351911222333"`).
pub fn contact_key(jid: &str) -> String {
    jid.split('@').next().unwrap_or(jid).to_string()
}

/// First token of a profile name, for greeting the contact by name.
pub fn first_name(push_name: &str) -> Option<String> {
    push_name
        .split_whitespace()
        .next()
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}

/// Whether the text carries the end-of-question marker.
pub fn has_completion_marker(s: &str) -> bool {
    s.contains('?') || s.contains('？')
}

// ── Commands ────────────────────────────────────────────────────────

/// Recognized funnel commands. Parsed from the canonical form of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// "DÚVIDA" — enter the question-answering flow.
    Question,
    /// "GESTORA" — move to document collection with the advisor.
    Advisor,
    /// "FALAR COM RAFA" — hand the conversation to a human.
    HumanHandoff,
    /// "SIMULADOR" — start the loan simulator wizard.
    Simulator,
    /// "COMEÇAR" — skip ahead to the choice menu.
    Start,
}

impl Command {
    /// Parse a command from canonical text. Exact match only; a command
    /// embedded in a longer sentence is treated as free text.
    pub fn parse(canon: &str) -> Option<Self> {
        match canon {
            "duvida" | "duvidas" => Some(Self::Question),
            "gestora" => Some(Self::Advisor),
            "falar com rafa" => Some(Self::HumanHandoff),
            "simulador" => Some(Self::Simulator),
            "comecar" => Some(Self::Start),
            _ => None,
        }
    }
}

// ── Greetings ───────────────────────────────────────────────────────

/// Patterns matched against canonical text. A message that is only a
/// greeting gets a canned response instead of a semantic FAQ pass.
static GREETING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^ola+[\s!?.]*$",
        r"^oi+[\s!?.]*$",
        r"^hey+[\s!?.]*$",
        r"^hello[\s!?.]*$",
        r"^hi[\s!?.]*$",
        r"^bom dia[\s!?.]*$",
        r"^boa tarde[\s!?.]*$",
        r"^boa noite[\s!?.]*$",
        r"^tudo bem[\s!?.]*$",
        r"^tudo bom[\s!?.]*$",
        r"^como esta[s]?[\s!?.]*$",
        r"^como vai[\s!?.]*$",
        r"^(ola+|oi+)[,\s]+(tudo bem|tudo bom|bom dia|boa tarde|boa noite)[\s!?.]*$",
        r"^(bom dia|boa tarde|boa noite)[,\s]+tudo bem[\s!?.]*$",
        r"^esta( ai)?[\s!?.]*$",
        r"^alguem ai[\s!?.]*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("greeting pattern"))
    .collect()
});

/// Whether the canonical text is nothing but a greeting.
pub fn is_greeting(canon: &str) -> bool {
    GREETING_PATTERNS.iter().any(|re| re.is_match(canon))
}
