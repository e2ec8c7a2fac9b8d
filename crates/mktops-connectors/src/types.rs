//! Normalized record shapes handed from the connectors to the pipeline.
//!
//! Vendor JSON is parsed into typed envelopes inside each client module and
//! converted to these shapes immediately; nothing loosely-typed crosses the
//! connector boundary.

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Creative format tag, normalized across platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreativeKind {
    Image,
    Video,
    Carousel,
    Other,
}

impl CreativeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CreativeKind::Image => "image",
            CreativeKind::Video => "video",
            CreativeKind::Carousel => "carousel",
            CreativeKind::Other => "other",
        }
    }
}

/// Latest vendor snapshot of a campaign's metadata.
#[derive(Debug, Clone)]
pub struct CampaignSnapshot {
    pub external_id: String,
    pub name: String,
    pub objective: Option<String>,
    pub is_active: bool,
}

/// Latest vendor snapshot of a creative, including the observed final URL.
#[derive(Debug, Clone)]
pub struct CreativeSnapshot {
    pub campaign_external_id: String,
    pub external_id: String,
    pub name: Option<String>,
    pub kind: CreativeKind,
    pub is_active: bool,
    pub final_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// One day of delivery metrics for one campaign.
#[derive(Debug, Clone)]
pub struct DailyInsight {
    pub campaign_external_id: String,
    pub date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: Decimal,
    pub conversions: i64,
}

/// One day of delivery metrics for one creative (ad).
#[derive(Debug, Clone)]
pub struct CreativeDailyInsight {
    pub creative_external_id: String,
    pub date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: Decimal,
    pub conversions: i64,
}

/// A CRM deal/person record normalized from Pipedrive.
#[derive(Debug, Clone)]
pub struct CrmLead {
    pub external_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_raw: Option<String>,
    pub entered_at: NaiveDate,
    pub stage: Option<String>,
    pub value: Option<Decimal>,
    pub won: bool,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub utm_term: Option<String>,
}

/// A marketing-automation contact normalized from Mautic.
#[derive(Debug, Clone)]
pub struct AutomationContact {
    pub email: String,
    pub score: Option<i32>,
    pub tags: Vec<String>,
}

/// An investment-platform investor record normalized from Tokeniza.
#[derive(Debug, Clone)]
pub struct InvestorRecord {
    pub email: String,
    pub invested_amount: Option<Decimal>,
}

/// A server-side-tracking visitor session normalized from Stape.
#[derive(Debug, Clone)]
pub struct TrackedVisitor {
    pub email: Option<String>,
    pub client_id: Option<String>,
    pub fbp: Option<String>,
    pub pages: Vec<String>,
}

/// One GA4 report row: sessions and conversions attributed to a campaign.
#[derive(Debug, Clone)]
pub struct Ga4CampaignRow {
    pub campaign_name: String,
    pub date: NaiveDate,
    pub sessions: i64,
    pub conversions: i64,
}

/// One Metricool per-day stat row for a social/ads campaign.
#[derive(Debug, Clone)]
pub struct MetricoolDailyStat {
    pub campaign_external_id: String,
    pub date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: Decimal,
}

/// An inclusive ingestion date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// Formats as the `YYYY-MM-DD` pair most vendor APIs expect.
    #[must_use]
    pub fn as_strings(&self) -> (String, String) {
        (
            self.from.format("%Y-%m-%d").to_string(),
            self.to.format("%Y-%m-%d").to_string(),
        )
    }
}
