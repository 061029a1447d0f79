//! Record builders shared by the store-backed tests.

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::date_util::parse_timestamp;
use crate::error::Result;
use crate::model::{
    Assignment, AssignmentPriority, AssignmentStatus, Campaign, CampaignType, Category,
    Conversation, Lead, LeadPriority, LeadStatus, Manager, Notification, Role, Worker,
};
use crate::storage::Database;

pub fn ts(s: &str) -> NaiveDateTime {
    parse_timestamp(s).unwrap()
}

pub fn manager(id: &str, name: &str) -> Manager {
    Manager {
        id: id.to_string(),
        name: name.to_string(),
        email: format!("{id}@example.com"),
        created_at: ts("2024-12-01"),
    }
}

pub fn worker(id: &str, name: &str) -> Worker {
    Worker {
        id: id.to_string(),
        name: name.to_string(),
        email: format!("{id}@example.com"),
        created_at: ts("2024-12-01"),
    }
}

pub fn category(id: &str, title: &str) -> Category {
    Category {
        id: id.to_string(),
        title: title.to_string(),
        description: None,
        color: "#000000".to_string(),
        created_at: ts("2024-12-01"),
    }
}

pub fn lead(id: &str, created_at: &str) -> Lead {
    Lead {
        id: id.to_string(),
        name: format!("Lead {id}"),
        email: Some(format!("{id}@leads.example.com")),
        phone_number: None,
        category: None,
        position: None,
        lead_source: None,
        notes: None,
        created_by: Some("m1".to_string()),
        status: LeadStatus::New,
        priority: LeadPriority::Medium,
        last_contact: None,
        follow_up_dates: Vec::new(),
        is_deleted: false,
        created_at: ts(created_at),
    }
}

pub fn assignment(worker_id: &str, leads: &[&str], created_at: &str) -> Assignment {
    Assignment {
        created_by: "m1".to_string(),
        assigned_to: worker_id.to_string(),
        leads: leads.iter().map(|s| s.to_string()).collect(),
        priority: AssignmentPriority::Medium,
        notes: None,
        due_date: None,
        status: AssignmentStatus::Active,
        created_at: ts(created_at),
    }
}

pub fn conversation(
    id: &str,
    lead_id: &str,
    added_by: &str,
    is_profitable: Option<bool>,
    created_at: &str,
) -> Conversation {
    Conversation {
        id: id.to_string(),
        lead: lead_id.to_string(),
        added_by: added_by.to_string(),
        date: ts(created_at),
        conclusion: "Spoke with the lead".to_string(),
        is_profitable,
        follow_up_date: None,
        is_deleted: false,
        deleted_by: None,
        created_at: ts(created_at),
    }
}

pub fn campaign(id: &str, title: &str, sent_to: &[&str], delivered: u64, opened: u64) -> Campaign {
    Campaign {
        id: id.to_string(),
        title: title.to_string(),
        campaign_type: CampaignType::Mail,
        subject: None,
        description: None,
        sent_to: sent_to.iter().map(|s| s.to_string()).collect(),
        created_by: Some("m1".to_string()),
        delivered,
        opened,
        created_at: ts("2025-01-10"),
    }
}

pub fn notification(id: &str, recipient: &str, role: Role, created_at: &str) -> Notification {
    Notification {
        id: id.to_string(),
        recipient: recipient.to_string(),
        recipient_type: role,
        title: format!("Notice {id}"),
        message: "Something happened".to_string(),
        notification_type: "assignment".to_string(),
        related_entity: None,
        is_read: false,
        created_at: ts(created_at),
    }
}

/// Run writes against the store, panicking on failure.
pub async fn seed<F>(db: &Database, f: F)
where
    F: FnOnce(&Connection) -> Result<()> + Send + 'static,
{
    db.writer().call(move |conn| f(conn)).await.unwrap();
}
