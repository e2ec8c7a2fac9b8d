//! UTM/URL discrepancy detector and alert lifecycle.
//!
//! Each detector run evaluates every active creative against its expected
//! landing URL (own value, falling back to the campaign's), produces the
//! current violation set, opens alerts for new violations, and resolves open
//! alerts whose violation no longer reproduces. Resolved alerts are history;
//! a reappearing violation opens a fresh row.

use std::collections::HashSet;

use sqlx::PgPool;

use mktops_core::url_meta::{
    has_unresolved_placeholders, normalized_domain, parse_url, utm_params, utm_values_match,
};

use crate::PipelineError;

/// Destination domains owned by the ad platforms themselves. Creatives that
/// point at these are engagement ads and exempt from URL validation.
const ENGAGEMENT_DOMAINS: &[&str] = &[
    "facebook.com",
    "fb.me",
    "instagram.com",
    "wa.me",
    "api.whatsapp.com",
    "m.me",
];

/// Discrepancy categories. The wire codes are part of the dashboard contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    MissingCapturedUrl,
    UnresolvedPlaceholders,
    DivergentLandingPage,
    DivergentUtmSource,
    DivergentUtmMedium,
    DivergentUtmCampaign,
    DivergentUtmContent,
    MissingUtms,
}

impl AlertKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::MissingCapturedUrl => "SEM_URL_CAPTURADA",
            AlertKind::UnresolvedPlaceholders => "PLACEHOLDERS_NAO_RESOLVIDOS",
            AlertKind::DivergentLandingPage => "LANDING_PAGE_DIVERGENTE",
            AlertKind::DivergentUtmSource => "UTM_SOURCE_DIVERGENTE",
            AlertKind::DivergentUtmMedium => "UTM_MEDIUM_DIVERGENTE",
            AlertKind::DivergentUtmCampaign => "UTM_CAMPAIGN_DIVERGENTE",
            AlertKind::DivergentUtmContent => "UTM_CONTENT_DIVERGENTE",
            AlertKind::MissingUtms => "SEM_UTMS_NA_URL",
        }
    }
}

/// One detected discrepancy for one creative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: AlertKind,
    pub message: String,
}

fn violation(kind: AlertKind, message: impl Into<String>) -> Violation {
    Violation {
        kind,
        message: message.into(),
    }
}

/// Evaluates one creative's captured URL against its expected URL.
///
/// Returns no violations when no expected URL is configured, when the
/// expected URL itself is unparseable (nothing to compare against), or when
/// the captured destination is a platform-owned engagement domain.
#[must_use]
pub fn evaluate_creative(expected_url: Option<&str>, captured_url: Option<&str>) -> Vec<Violation> {
    let Some(expected_raw) = expected_url else {
        return Vec::new();
    };
    let Some(expected) = parse_url(expected_raw) else {
        return Vec::new();
    };

    let Some(captured_raw) = captured_url.filter(|c| !c.trim().is_empty()) else {
        return vec![violation(
            AlertKind::MissingCapturedUrl,
            "criativo ativo sem URL final capturada",
        )];
    };

    let mut violations = Vec::new();
    let captured_has_placeholders = has_unresolved_placeholders(captured_raw);
    if captured_has_placeholders {
        violations.push(violation(
            AlertKind::UnresolvedPlaceholders,
            format!("URL capturada contém placeholders não resolvidos: {captured_raw}"),
        ));
    }

    let Some(captured) = parse_url(captured_raw) else {
        violations.push(violation(
            AlertKind::MissingCapturedUrl,
            format!("URL capturada inválida: {captured_raw}"),
        ));
        return violations;
    };

    let captured_domain = normalized_domain(&captured);
    if let Some(domain) = &captured_domain {
        if ENGAGEMENT_DOMAINS.contains(&domain.as_str()) {
            // Engagement ad: the destination is the platform itself.
            return Vec::new();
        }
    }

    let expected_domain = normalized_domain(&expected);
    if let (Some(exp), Some(cap)) = (&expected_domain, &captured_domain) {
        if exp != cap {
            violations.push(violation(
                AlertKind::DivergentLandingPage,
                format!("landing page divergente: esperado {exp}, capturado {cap}"),
            ));
        }
    }

    let expected_utm = utm_params(&expected);
    let captured_utm = utm_params(&captured);

    if captured_utm.is_empty() && !expected_utm.is_empty() {
        violations.push(violation(
            AlertKind::MissingUtms,
            "URL capturada sem nenhum parâmetro UTM",
        ));
        return violations;
    }

    let pairs = [
        (
            AlertKind::DivergentUtmSource,
            "utm_source",
            &expected_utm.source,
            &captured_utm.source,
        ),
        (
            AlertKind::DivergentUtmMedium,
            "utm_medium",
            &expected_utm.medium,
            &captured_utm.medium,
        ),
        (
            AlertKind::DivergentUtmCampaign,
            "utm_campaign",
            &expected_utm.campaign,
            &captured_utm.campaign,
        ),
    ];
    for (kind, name, expected_value, captured_value) in pairs {
        if let (Some(exp), Some(cap)) = (expected_value, captured_value) {
            if !utm_values_match(exp, cap) {
                violations.push(violation(
                    kind,
                    format!("{name} divergente: esperado '{exp}', capturado '{cap}'"),
                ));
            }
        }
    }

    // utm_content is skipped while placeholders are unresolved so one root
    // cause does not produce two alerts.
    if !captured_has_placeholders {
        if let (Some(exp), Some(cap)) = (&expected_utm.content, &captured_utm.content) {
            if !utm_values_match(exp, cap) {
                violations.push(violation(
                    AlertKind::DivergentUtmContent,
                    format!("utm_content divergente: esperado '{exp}', capturado '{cap}'"),
                ));
            }
        }
    }

    violations
}

/// Runs the detector for one company: evaluates every active creative, opens
/// alerts for new violations, resolves alerts whose violation disappeared.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if a read or write fails.
pub async fn run_detector(
    pool: &PgPool,
    company_id: i64,
) -> Result<serde_json::Value, PipelineError> {
    let creatives = mktops_db::list_active_creatives_for_company(pool, company_id).await?;

    let mut current: HashSet<(i64, &'static str)> = HashSet::new();
    let mut opened = 0usize;
    let mut evaluated = 0usize;
    for (creative, campaign_expected_url) in &creatives {
        let expected = creative
            .expected_url
            .as_deref()
            .or(campaign_expected_url.as_deref());
        let violations = evaluate_creative(expected, creative.captured_url.as_deref());
        evaluated += 1;
        for v in violations {
            current.insert((creative.id, v.kind.as_str()));
            if mktops_db::open_alert(pool, creative.id, v.kind.as_str(), &v.message).await? {
                opened += 1;
            }
        }
    }

    let mut resolved = 0usize;
    for alert in mktops_db::list_open_alerts(pool, company_id).await? {
        if !current.contains(&(alert.creative_id, alert.alert_type.as_str())) {
            if mktops_db::resolve_alert(pool, alert.creative_id, &alert.alert_type).await? {
                resolved += 1;
            }
        }
    }

    Ok(serde_json::json!({
        "criativos_avaliados": evaluated,
        "alertas_abertos": opened,
        "alertas_resolvidos": resolved,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(violations: &[Violation]) -> Vec<AlertKind> {
        violations.iter().map(|v| v.kind).collect()
    }

    #[test]
    fn no_expected_url_means_no_rules() {
        assert!(evaluate_creative(None, None).is_empty());
        assert!(evaluate_creative(None, Some("https://anywhere.com")).is_empty());
    }

    #[test]
    fn missing_captured_url_is_flagged() {
        let v = evaluate_creative(Some("https://lp.exemplo.com.br/?utm_source=fb"), None);
        assert_eq!(kinds(&v), vec![AlertKind::MissingCapturedUrl]);
    }

    #[test]
    fn engagement_domain_is_exempt_from_everything() {
        let v = evaluate_creative(
            Some("https://lp.exemplo.com.br/?utm_source=fb&utm_medium=cpc"),
            Some("https://www.facebook.com/minhapagina"),
        );
        assert!(v.is_empty(), "engagement ads never alert: {v:?}");
    }

    #[test]
    fn divergent_domain_is_flagged() {
        let v = evaluate_creative(
            Some("https://lp.exemplo.com.br/captacao"),
            Some("https://www.outrosite.com.br/captacao"),
        );
        assert_eq!(kinds(&v), vec![AlertKind::DivergentLandingPage]);
    }

    #[test]
    fn www_and_case_do_not_diverge() {
        let v = evaluate_creative(
            Some("https://WWW.Exemplo.com.br/lp"),
            Some("https://exemplo.com.br/lp"),
        );
        assert!(v.is_empty());
    }

    #[test]
    fn captured_without_utms_is_one_alert_not_five() {
        let v = evaluate_creative(
            Some("https://lp.exemplo.com.br/?utm_source=fb&utm_medium=cpc&utm_campaign=ago"),
            Some("https://lp.exemplo.com.br/"),
        );
        assert_eq!(kinds(&v), vec![AlertKind::MissingUtms]);
    }

    #[test]
    fn each_divergent_utm_is_its_own_alert() {
        let v = evaluate_creative(
            Some("https://lp.exemplo.com.br/?utm_source=facebook&utm_medium=cpc"),
            Some("https://lp.exemplo.com.br/?utm_source=instagram&utm_medium=organic"),
        );
        assert_eq!(
            kinds(&v),
            vec![AlertKind::DivergentUtmSource, AlertKind::DivergentUtmMedium]
        );
    }

    #[test]
    fn utm_comparison_is_case_insensitive() {
        let v = evaluate_creative(
            Some("https://lp.exemplo.com.br/?utm_source=Facebook"),
            Some("https://lp.exemplo.com.br/?utm_source=facebook"),
        );
        assert!(v.is_empty());
    }

    #[test]
    fn placeholders_suppress_utm_content_check() {
        let v = evaluate_creative(
            Some("https://lp.exemplo.com.br/?utm_source=fb&utm_content=ad-1"),
            Some("https://lp.exemplo.com.br/?utm_source=fb&utm_content={{ad.id}}"),
        );
        assert_eq!(kinds(&v), vec![AlertKind::UnresolvedPlaceholders]);
    }

    #[test]
    fn missing_utm_on_one_side_is_not_a_divergence() {
        // Expected has utm_term, captured doesn't; both present values match.
        let v = evaluate_creative(
            Some("https://lp.exemplo.com.br/?utm_source=fb&utm_term=investir"),
            Some("https://lp.exemplo.com.br/?utm_source=fb"),
        );
        assert!(v.is_empty());
    }
}
