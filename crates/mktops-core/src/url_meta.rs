//! URL and UTM-parameter inspection used by the discrepancy detector and the
//! attribution linker.

use url::Url;

/// The five UTM attribution parameters extracted from a URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtmSet {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub content: Option<String>,
    pub term: Option<String>,
}

impl UtmSet {
    /// Number of UTM parameters present.
    #[must_use]
    pub fn len(&self) -> usize {
        [
            &self.source,
            &self.medium,
            &self.campaign,
            &self.content,
            &self.term,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse an absolute URL, returning `None` on anything unparseable.
#[must_use]
pub fn parse_url(raw: &str) -> Option<Url> {
    Url::parse(raw.trim()).ok()
}

/// Extract UTM parameters from an already-parsed URL.
#[must_use]
pub fn utm_params(url: &Url) -> UtmSet {
    let mut set = UtmSet::default();
    for (key, value) in url.query_pairs() {
        let value = value.into_owned();
        match key.as_ref() {
            "utm_source" => set.source = Some(value),
            "utm_medium" => set.medium = Some(value),
            "utm_campaign" => set.campaign = Some(value),
            "utm_content" => set.content = Some(value),
            "utm_term" => set.term = Some(value),
            _ => {}
        }
    }
    set
}

/// Normalized host for comparison: lowercase with a leading `www.` stripped.
#[must_use]
pub fn normalized_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Whether the string still carries unresolved `{{...}}` template
/// placeholders (ad platforms substitute these at serve time; seeing one in
/// a captured URL means the substitution never happened).
#[must_use]
pub fn has_unresolved_placeholders(value: &str) -> bool {
    match value.find("{{") {
        Some(open) => value[open..].contains("}}"),
        None => false,
    }
}

/// Case-insensitive equality for UTM values.
#[must_use]
pub fn utm_values_match(expected: &str, captured: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(captured.trim())
}
