use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::date_util::{self, ts_serde};
use crate::error::Error;

/// Who is asking. Supplied by the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Worker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::Worker => "worker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manager" => Ok(Role::Manager),
            "worker" => Ok(Role::Worker),
            other => Err(Error::Other(format!("unknown role: {other}"))),
        }
    }
}

/// Authenticated identity of the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub id: String,
    pub role: Role,
}

impl Caller {
    pub fn manager(id: impl Into<String>) -> Self {
        Self { id: id.into(), role: Role::Manager }
    }

    pub fn worker(id: impl Into<String>) -> Self {
        Self { id: id.into(), role: Role::Worker }
    }
}

/// Pipeline stage of a lead. Declaration order is funnel order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeadStatus {
    #[default]
    New,
    InProgress,
    FollowUp,
    Closed,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 4] = [
        LeadStatus::New,
        LeadStatus::InProgress,
        LeadStatus::FollowUp,
        LeadStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::InProgress => "in-progress",
            LeadStatus::FollowUp => "follow-up",
            LeadStatus::Closed => "closed",
        }
    }
}

impl FromStr for LeadStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LeadStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| {
                Error::Other(format!(
                    "invalid status {s:?}; must be one of: new, in-progress, follow-up, closed"
                ))
            })
    }
}

/// Priority set on the lead itself.
///
/// Assignments use a different scale ([`AssignmentPriority`]); the two are
/// kept apart until the business rule tying them together is settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl LeadPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadPriority::High => "high",
            LeadPriority::Medium => "medium",
            LeadPriority::Low => "low",
        }
    }
}

impl FromStr for LeadPriority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(LeadPriority::High),
            "medium" => Ok(LeadPriority::Medium),
            "low" => Ok(LeadPriority::Low),
            other => Err(Error::Other(format!(
                "invalid priority {other:?}; must be one of: high, medium, low"
            ))),
        }
    }
}

/// Priority recorded when a manager assigns leads to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl AssignmentPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentPriority::Low => "low",
            AssignmentPriority::Medium => "medium",
            AssignmentPriority::High => "high",
            AssignmentPriority::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    #[default]
    Active,
    Completed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Active => "active",
            AssignmentStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignType {
    Mail,
    Sms,
}

impl CampaignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignType::Mail => "mail",
            CampaignType::Sms => "sms",
        }
    }
}

// ── Records ─────────────────────────────────────────────────────────
//
// Shapes of the rows the CRM exports. Timestamps accept any ISO form and are
// normalized to the storage format on the way in.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manager {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default = "date_util::now", with = "ts_serde")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default = "date_util::now", with = "ts_serde")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "date_util::now", with = "ts_serde")]
    pub created_at: NaiveDateTime,
}

fn default_color() -> String {
    "#000000".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Category id.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub lead_source: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Manager id.
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub priority: LeadPriority,
    #[serde(default, with = "ts_serde::option")]
    pub last_contact: Option<NaiveDateTime>,
    #[serde(default, with = "ts_serde::vec")]
    pub follow_up_dates: Vec<NaiveDateTime>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default = "date_util::now", with = "ts_serde")]
    pub created_at: NaiveDateTime,
}

/// A manager handing one or more leads to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// Manager id.
    pub created_by: String,
    /// Worker id.
    pub assigned_to: String,
    pub leads: Vec<String>,
    pub priority: AssignmentPriority,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, with = "ts_serde::option")]
    pub due_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub status: AssignmentStatus,
    #[serde(default = "date_util::now", with = "ts_serde")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    /// Lead id.
    pub lead: String,
    /// Worker or manager id.
    pub added_by: String,
    #[serde(with = "ts_serde")]
    pub date: NaiveDateTime,
    pub conclusion: String,
    #[serde(default)]
    pub is_profitable: Option<bool>,
    #[serde(default, with = "ts_serde::option")]
    pub follow_up_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_by: Option<String>,
    #[serde(default = "date_util::now", with = "ts_serde")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub campaign_type: CampaignType,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Recipient lead ids.
    #[serde(default)]
    pub sent_to: Vec<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub delivered: u64,
    #[serde(default)]
    pub opened: u64,
    #[serde(default = "date_util::now", with = "ts_serde")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient: String,
    pub recipient_type: Role,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    #[serde(default)]
    pub related_entity: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default = "date_util::now", with = "ts_serde")]
    pub created_at: NaiveDateTime,
}
