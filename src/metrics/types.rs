use serde::Serialize;

use crate::model::LeadStatus;

/// Lead counts over the caller's filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadCounts {
    pub total_leads: u64,
    /// Leads with at least one conversation on record.
    pub engaged_leads: u64,
    /// `engaged / total × 100`, two decimals.
    pub conversation_rate: f64,
    /// Leads with a follow-up date already in the past.
    pub overdue_tasks: u64,
}

/// One `leadsByCategory` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

/// Per-campaign reach and conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignPerformance {
    pub campaign_id: String,
    pub title: String,
    pub target_leads: u64,
    pub converted_leads: u64,
    pub conversion_rate: f64,
}

/// A campaign row as read from the store, before ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignStats {
    pub campaign_id: String,
    pub title: String,
    pub target_leads: u64,
    pub converted_leads: u64,
    pub delivered: u64,
    pub opened: u64,
}

/// Campaign with the best open rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopCampaign {
    pub title: String,
    pub open_rate: f64,
}

impl Default for TopCampaign {
    fn default() -> Self {
        Self {
            title: "N/A".to_string(),
            open_rate: 0.0,
        }
    }
}

/// One worker's row in the team leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub worker_id: String,
    pub name: String,
    pub email: String,
    pub assigned_leads: u64,
    /// Assigned leads with a profitable conversation by this worker.
    pub converted_leads: u64,
    pub converted_percentage: f64,
}

/// Mean contact delay over leads with a last contact.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTimes {
    /// Hours from creation to last contact, `"0"` when no samples.
    pub average_lead_response_time: String,
    /// Same delta in days.
    pub average_sales_cycle_duration: String,
}

/// One `leadPipeline` stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStage {
    pub status: LeadStatus,
    pub count: u64,
}
