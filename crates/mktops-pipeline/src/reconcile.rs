//! Reconciliation: write normalized vendor records into the lead store and
//! cross-link entities.
//!
//! Matching never guesses: attribution links require an exact creative
//! external-id match, and enrichment walks a fixed priority ladder
//! (email, then GA client id, then `_fbp`) and skips a record entirely when
//! no tier matches. Unmatched records are counted, not invented.

use std::collections::HashMap;

use sqlx::PgPool;

use mktops_connectors::types::{AutomationContact, CrmLead, InvestorRecord, TrackedVisitor};
use mktops_core::phone::normalize_phone;
use mktops_db::leads::NewLead;

use crate::PipelineError;

/// Lifecycle flags derived from a CRM stage name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeadFlags {
    pub is_mql: bool,
    pub raised_hand: bool,
    pub meeting_scheduled: bool,
    pub meeting_done: bool,
    pub sale_done: bool,
}

/// Ordered stage-name rule table. The first matching keyword decides the
/// furthest lifecycle step; earlier steps are implied (a done meeting was
/// necessarily scheduled).
const STAGE_RULES: &[(&str, LeadFlags)] = &[
    (
        "venda",
        LeadFlags {
            is_mql: true,
            raised_hand: true,
            meeting_scheduled: true,
            meeting_done: true,
            sale_done: true,
        },
    ),
    (
        "ganho",
        LeadFlags {
            is_mql: true,
            raised_hand: true,
            meeting_scheduled: true,
            meeting_done: true,
            sale_done: true,
        },
    ),
    (
        "realizada",
        LeadFlags {
            is_mql: true,
            raised_hand: true,
            meeting_scheduled: true,
            meeting_done: true,
            sale_done: false,
        },
    ),
    (
        "agendada",
        LeadFlags {
            is_mql: true,
            raised_hand: true,
            meeting_scheduled: true,
            meeting_done: false,
            sale_done: false,
        },
    ),
    (
        "levantada",
        LeadFlags {
            is_mql: true,
            raised_hand: true,
            meeting_scheduled: false,
            meeting_done: false,
            sale_done: false,
        },
    ),
    (
        "mql",
        LeadFlags {
            is_mql: true,
            raised_hand: false,
            meeting_scheduled: false,
            meeting_done: false,
            sale_done: false,
        },
    ),
    (
        "qualificado",
        LeadFlags {
            is_mql: true,
            raised_hand: false,
            meeting_scheduled: false,
            meeting_done: false,
            sale_done: false,
        },
    ),
];

/// Maps a CRM stage name (plus the deal's won status) to lifecycle flags.
/// Unknown stages yield no flags; the monotonic upsert keeps whatever an
/// earlier snapshot already set.
#[must_use]
pub fn stage_flags(stage: Option<&str>, won: bool) -> LeadFlags {
    let mut flags = LeadFlags::default();
    if let Some(stage) = stage {
        let lowered = stage.to_lowercase();
        for (keyword, rule) in STAGE_RULES {
            if lowered.contains(keyword) {
                flags = *rule;
                break;
            }
        }
    }
    if won {
        flags = LeadFlags {
            is_mql: true,
            raised_hand: true,
            meeting_scheduled: true,
            meeting_done: true,
            sale_done: true,
        };
    }
    flags
}

/// Upserts a batch of CRM deals as leads for one company.
///
/// Phones are normalized before the write; unresolvable numbers are stored
/// as absent rather than guessed.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if a write fails.
pub async fn sync_crm_leads(
    pool: &PgPool,
    company_id: i64,
    deals: &[CrmLead],
) -> Result<serde_json::Value, PipelineError> {
    let mut processed = 0usize;
    let mut phones_rejected = 0usize;
    for deal in deals {
        let phone = deal.phone_raw.as_deref().and_then(normalize_phone);
        if deal.phone_raw.is_some() && phone.is_none() {
            phones_rejected += 1;
        }
        let flags = stage_flags(deal.stage.as_deref(), deal.won);
        let new = NewLead {
            external_id: deal.external_id.clone(),
            name: deal.name.clone(),
            email: deal.email.clone(),
            phone,
            entered_at: deal.entered_at,
            utm_source: deal.utm_source.clone(),
            utm_medium: deal.utm_medium.clone(),
            utm_campaign: deal.utm_campaign.clone(),
            utm_content: deal.utm_content.clone(),
            utm_term: deal.utm_term.clone(),
            is_mql: flags.is_mql,
            raised_hand: flags.raised_hand,
            meeting_scheduled: flags.meeting_scheduled,
            meeting_done: flags.meeting_done,
            sale_done: flags.sale_done,
            sale_value: if flags.sale_done { deal.value } else { None },
            crm_stage: deal.stage.clone(),
            crm_value: deal.value,
        };
        mktops_db::upsert_lead(pool, company_id, &new).await?;
        processed += 1;
    }

    Ok(serde_json::json!({
        "leads": processed,
        "telefones_rejeitados": phones_rejected,
    }))
}

/// Links unlinked leads to creatives by exact `utm_content` match against
/// active creative external ids. Ambiguous external ids were already dropped
/// from the lookup map; leads with no match stay unlinked.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if a read or write fails.
pub async fn link_leads_to_creatives(
    pool: &PgPool,
    company_id: i64,
) -> Result<serde_json::Value, PipelineError> {
    let creative_ids = mktops_db::creative_ids_by_external_id(pool, company_id).await?;
    let unlinked = mktops_db::unlinked_leads_with_utm_content(pool, company_id).await?;

    let mut linked = 0usize;
    let mut unmatched = 0usize;
    for (lead_id, utm_content) in unlinked {
        match creative_ids.get(utm_content.trim()) {
            Some(creative_id) => {
                mktops_db::link_lead_creative(pool, lead_id, *creative_id).await?;
                linked += 1;
            }
            None => unmatched += 1,
        }
    }

    Ok(serde_json::json!({
        "vinculados": linked,
        "sem_correspondencia": unmatched,
    }))
}

/// Merges marketing-automation contacts into existing leads by exact email
/// match. Contacts with no matching lead are skipped, never created.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if a read or write fails.
pub async fn enrich_from_automation(
    pool: &PgPool,
    company_id: i64,
    contacts: &[AutomationContact],
) -> Result<serde_json::Value, PipelineError> {
    let emails: Vec<String> = contacts.iter().map(|c| c.email.clone()).collect();
    let leads = mktops_db::leads_by_emails(pool, company_id, &emails).await?;
    let by_email = index_by_email(&leads);

    let mut enriched = 0usize;
    let mut unmatched = 0usize;
    for contact in contacts {
        let Some(lead_id) = by_email.get(&contact.email.to_lowercase()) else {
            unmatched += 1;
            continue;
        };
        let tags = serde_json::to_value(&contact.tags).unwrap_or(serde_json::Value::Null);
        let tags = (!contact.tags.is_empty()).then_some(&tags);
        mktops_db::set_lead_automation(pool, *lead_id, contact.score, tags).await?;
        enriched += 1;
    }

    Ok(serde_json::json!({
        "enriquecidos": enriched,
        "sem_correspondencia": unmatched,
    }))
}

/// Flags leads as investors by exact email match against the investment
/// platform's investor list.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if a read or write fails.
pub async fn enrich_from_investors(
    pool: &PgPool,
    company_id: i64,
    investors: &[InvestorRecord],
) -> Result<serde_json::Value, PipelineError> {
    let emails: Vec<String> = investors.iter().map(|i| i.email.clone()).collect();
    let leads = mktops_db::leads_by_emails(pool, company_id, &emails).await?;
    let by_email = index_by_email(&leads);

    let mut enriched = 0usize;
    let mut unmatched = 0usize;
    for investor in investors {
        let Some(lead_id) = by_email.get(&investor.email.to_lowercase()) else {
            unmatched += 1;
            continue;
        };
        mktops_db::set_lead_investor(pool, *lead_id, true, investor.invested_amount).await?;
        enriched += 1;
    }

    Ok(serde_json::json!({
        "investidores": enriched,
        "sem_correspondencia": unmatched,
    }))
}

/// Merges server-side-tracking visitors into leads, trying identifiers in
/// decreasing confidence: email, then GA client id, then `_fbp`. A visitor
/// matching no tier is skipped.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if a read or write fails.
pub async fn enrich_from_tracking(
    pool: &PgPool,
    company_id: i64,
    visitors: &[TrackedVisitor],
) -> Result<serde_json::Value, PipelineError> {
    let emails: Vec<String> = visitors.iter().filter_map(|v| v.email.clone()).collect();
    let leads = mktops_db::leads_by_emails(pool, company_id, &emails).await?;
    let by_email = index_by_email(&leads);

    let mut enriched = 0usize;
    let mut unmatched = 0usize;
    for visitor in visitors {
        let lead_id = resolve_visitor(pool, company_id, visitor, &by_email).await?;
        let Some(lead_id) = lead_id else {
            unmatched += 1;
            continue;
        };
        let visits = serde_json::to_value(&visitor.pages).unwrap_or(serde_json::Value::Null);
        let visits = (!visitor.pages.is_empty()).then_some(&visits);
        mktops_db::set_lead_tracking(
            pool,
            lead_id,
            visitor.client_id.as_deref(),
            visitor.fbp.as_deref(),
            visits,
        )
        .await?;
        enriched += 1;
    }

    Ok(serde_json::json!({
        "enriquecidos": enriched,
        "sem_correspondencia": unmatched,
    }))
}

async fn resolve_visitor(
    pool: &PgPool,
    company_id: i64,
    visitor: &TrackedVisitor,
    by_email: &HashMap<String, i64>,
) -> Result<Option<i64>, PipelineError> {
    if let Some(email) = &visitor.email {
        if let Some(id) = by_email.get(&email.to_lowercase()) {
            return Ok(Some(*id));
        }
    }
    if let Some(client_id) = &visitor.client_id {
        if let Some(lead) = mktops_db::find_lead_by_client_id(pool, company_id, client_id).await? {
            return Ok(Some(lead.id));
        }
    }
    if let Some(fbp) = &visitor.fbp {
        if let Some(lead) = mktops_db::find_lead_by_fbp(pool, company_id, fbp).await? {
            return Ok(Some(lead.id));
        }
    }
    Ok(None)
}

fn index_by_email(leads: &[mktops_db::LeadRow]) -> HashMap<String, i64> {
    leads
        .iter()
        .filter_map(|l| l.email.as_ref().map(|e| (e.to_lowercase(), l.id)))
        .collect()
}
