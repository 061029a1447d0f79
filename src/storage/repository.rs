use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::date_util::format_ts;
use crate::error::{Error, Result};
use crate::model::{
    Assignment, Caller, Campaign, Category, Conversation, Lead, LeadStatus, Manager,
    Notification, Role, Worker,
};

// ── People ─────────────────────────────────────────────────────────

pub fn upsert_manager(conn: &Connection, manager: &Manager) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO dim_managers (manager_id, name, email, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(manager_id) DO UPDATE SET
            name=excluded.name, email=excluded.email",
        params![
            manager.id,
            manager.name,
            manager.email.to_lowercase(),
            format_ts(manager.created_at)
        ],
    )?;
    Ok(())
}

pub fn upsert_worker(conn: &Connection, worker: &Worker) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO dim_workers (worker_id, name, email, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(worker_id) DO UPDATE SET
            name=excluded.name, email=excluded.email",
        params![
            worker.id,
            worker.name,
            worker.email.to_lowercase(),
            format_ts(worker.created_at)
        ],
    )?;
    Ok(())
}

/// Resolve an id or email to an authenticated caller.
///
/// Managers are checked before workers; the table a person lives in is
/// their role.
pub fn resolve_caller(
    conn: &Connection,
    identifier: &str,
) -> Result<Option<Caller>, rusqlite::Error> {
    let email = identifier.to_lowercase();
    let manager: Option<String> = conn
        .query_row(
            "SELECT manager_id FROM dim_managers WHERE manager_id = ?1 OR email = ?2",
            params![identifier, email],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = manager {
        return Ok(Some(Caller::manager(id)));
    }
    let worker: Option<String> = conn
        .query_row(
            "SELECT worker_id FROM dim_workers WHERE worker_id = ?1 OR email = ?2",
            params![identifier, email],
            |row| row.get(0),
        )
        .optional()?;
    Ok(worker.map(Caller::worker))
}

// ── Categories ─────────────────────────────────────────────────────

pub fn upsert_category(conn: &Connection, category: &Category) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO dim_categories (category_id, title, description, color, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(category_id) DO UPDATE SET
            title=excluded.title, description=excluded.description, color=excluded.color",
        params![
            category.id,
            category.title.trim(),
            category.description.as_deref().map(str::trim),
            category.color,
            format_ts(category.created_at),
        ],
    )?;
    Ok(())
}

// ── Atomic writes ──────────────────────────────────────────────────

/// Run `write` under a named savepoint: released on success, rolled back on
/// error. Savepoints nest, so this also works inside an open transaction.
fn atomically<T, E>(
    conn: &Connection,
    name: &str,
    write: impl FnOnce() -> Result<T, E>,
) -> Result<T, E>
where
    E: From<rusqlite::Error> + std::fmt::Display,
{
    conn.execute_batch(&format!("SAVEPOINT {name}"))?;
    match write() {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {name}"))?;
            Ok(value)
        }
        Err(e) => {
            log::debug!("Rolling back {name}: {e}");
            if let Err(rb) = conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}")) {
                log::warn!("Rollback of {name} failed: {rb}");
            }
            Err(e)
        }
    }
}

// ── Leads ──────────────────────────────────────────────────────────

/// Insert or update a lead. Follow-up dates are merged into the lead's
/// follow-up list; dates already recorded are left alone and none are removed.
/// Last contact only moves forward.
pub fn upsert_lead(conn: &Connection, lead: &Lead) -> Result<(), rusqlite::Error> {
    atomically(conn, "upsert_lead", || -> Result<(), rusqlite::Error> {
        write_lead(conn, lead)?;
        for at in &lead.follow_up_dates {
            append_follow_up(conn, &lead.id, *at, lead.created_at)?;
        }
        Ok(())
    })
}

fn write_lead(conn: &Connection, lead: &Lead) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO fact_leads (
            lead_id, name, email, phone_number, category_id, position, lead_source,
            notes, created_by, status, priority, last_contact, is_deleted, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT(lead_id) DO UPDATE SET
            name=excluded.name, email=excluded.email, phone_number=excluded.phone_number,
            category_id=excluded.category_id, position=excluded.position,
            lead_source=excluded.lead_source, notes=excluded.notes,
            created_by=excluded.created_by, status=excluded.status,
            priority=excluded.priority,
            last_contact=CASE
                WHEN fact_leads.last_contact IS NULL
                  OR fact_leads.last_contact < excluded.last_contact
                THEN excluded.last_contact ELSE fact_leads.last_contact
            END,
            is_deleted=excluded.is_deleted, created_at=excluded.created_at",
        params![
            lead.id,
            lead.name.trim(),
            lead.email.as_deref().map(str::to_lowercase),
            lead.phone_number,
            lead.category,
            lead.position,
            lead.lead_source.as_deref().map(str::trim),
            lead.notes,
            lead.created_by,
            lead.status.as_str(),
            lead.priority.as_str(),
            lead.last_contact.map(format_ts),
            lead.is_deleted as i32,
            format_ts(lead.created_at),
        ],
    )?;
    Ok(())
}

/// Append a follow-up date to a lead's list. A date the lead already has is
/// not recorded twice. Returns whether a row was added.
pub fn append_follow_up(
    conn: &Connection,
    lead_id: &str,
    follow_up_at: NaiveDateTime,
    recorded_at: NaiveDateTime,
) -> Result<bool, rusqlite::Error> {
    let inserted = conn.execute(
        "INSERT INTO fact_lead_follow_ups (lead_id, follow_up_at, recorded_at)
         SELECT ?1, ?2, ?3
         WHERE NOT EXISTS (
            SELECT 1 FROM fact_lead_follow_ups WHERE lead_id = ?1 AND follow_up_at = ?2
         )",
        params![lead_id, format_ts(follow_up_at), format_ts(recorded_at)],
    )?;
    Ok(inserted > 0)
}

pub fn lead_follow_ups(conn: &Connection, lead_id: &str) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT follow_up_at FROM fact_lead_follow_ups WHERE lead_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![lead_id], |row| row.get(0))?;
    rows.collect()
}

/// Fails with `NotFound` unless the lead exists and is not soft-deleted.
fn ensure_active_lead(conn: &Connection, lead_id: &str) -> Result<()> {
    let active: Option<bool> = conn
        .query_row(
            "SELECT is_deleted = 0 FROM fact_leads WHERE lead_id = ?1",
            params![lead_id],
            |row| row.get(0),
        )
        .optional()?;
    match active {
        Some(true) => Ok(()),
        _ => Err(Error::NotFound(format!("lead {lead_id}"))),
    }
}

/// Move `last_contact` forward to `at`; never moves it backwards.
fn touch_last_contact(conn: &Connection, lead_id: &str, at: NaiveDateTime) -> Result<()> {
    conn.execute(
        "UPDATE fact_leads
         SET last_contact = CASE
             WHEN last_contact IS NULL OR last_contact < ?2 THEN ?2
             ELSE last_contact
         END
         WHERE lead_id = ?1",
        params![lead_id, format_ts(at)],
    )?;
    Ok(())
}

// ── Assignments ────────────────────────────────────────────────────

/// One row of a lead's assignment history, derived from assignment records.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadAssignee {
    pub assignment_id: i64,
    pub worker_id: String,
    pub name: String,
    pub email: String,
    pub assigned_at: String,
    pub due_date: Option<String>,
}

/// Record an assign action.
///
/// Every lead must exist and be active, the worker must exist, and no lead
/// may already be assigned to that worker. A due date joins each lead's
/// follow-up list. Returns the new assignment id.
pub fn assign_leads(conn: &Connection, assignment: &Assignment) -> Result<i64> {
    if assignment.leads.is_empty() {
        return Err(Error::Other("an assignment needs at least one lead".into()));
    }

    let worker_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM dim_workers WHERE worker_id = ?1)",
        params![assignment.assigned_to],
        |row| row.get(0),
    )?;
    if !worker_exists {
        return Err(Error::NotFound(format!("worker {}", assignment.assigned_to)));
    }

    // A lead listed twice is assigned once
    let mut leads: Vec<&str> = Vec::with_capacity(assignment.leads.len());
    for lead_id in &assignment.leads {
        if !leads.contains(&lead_id.as_str()) {
            leads.push(lead_id);
        }
    }

    for lead_id in &leads {
        ensure_active_lead(conn, lead_id)?;
        let already: bool = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM bridge_assignment_leads bal
                JOIN fact_assignments a ON a.assignment_id = bal.assignment_id
                WHERE bal.lead_id = ?1 AND a.assigned_to = ?2
            )",
            params![lead_id, assignment.assigned_to],
            |row| row.get(0),
        )?;
        if already {
            return Err(Error::Conflict(format!(
                "lead {lead_id} is already assigned to worker {}",
                assignment.assigned_to
            )));
        }
    }

    let assignment_id = atomically(conn, "assign_leads", || -> Result<i64> {
        let created_at = format_ts(assignment.created_at);
        conn.execute(
            "INSERT INTO fact_assignments (
                created_by, assigned_to, priority, notes, due_date, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                assignment.created_by,
                assignment.assigned_to,
                assignment.priority.as_str(),
                assignment.notes,
                assignment.due_date.map(format_ts),
                assignment.status.as_str(),
                created_at,
            ],
        )?;
        let assignment_id = conn.last_insert_rowid();

        for lead_id in &leads {
            conn.execute(
                "INSERT INTO bridge_assignment_leads (assignment_id, lead_id) VALUES (?1, ?2)",
                params![assignment_id, lead_id],
            )?;
            if let Some(due) = assignment.due_date {
                append_follow_up(conn, lead_id, due, assignment.created_at)?;
            }
        }
        Ok(assignment_id)
    })?;

    log::debug!(
        "Assignment {assignment_id}: {} lead(s) to worker {}",
        leads.len(),
        assignment.assigned_to
    );
    Ok(assignment_id)
}

/// A lead's assignment history, oldest first.
pub fn lead_assignees(
    conn: &Connection,
    lead_id: &str,
) -> Result<Vec<LeadAssignee>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT a.assignment_id, w.worker_id, w.name, w.email, a.created_at, a.due_date
         FROM bridge_assignment_leads bal
         JOIN fact_assignments a ON a.assignment_id = bal.assignment_id
         JOIN dim_workers w ON w.worker_id = a.assigned_to
         WHERE bal.lead_id = ?1
         ORDER BY a.created_at, a.assignment_id",
    )?;
    let rows = stmt.query_map(params![lead_id], |row| {
        Ok(LeadAssignee {
            assignment_id: row.get(0)?,
            worker_id: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            assigned_at: row.get(4)?,
            due_date: row.get(5)?,
        })
    })?;
    rows.collect()
}

// ── Conversations ──────────────────────────────────────────────────

/// Record a conversation against a lead.
///
/// The lead's last contact moves to the conversation's creation time and a
/// follow-up date, if any, is appended to the lead's list.
pub fn record_conversation(conn: &Connection, conversation: &Conversation) -> Result<()> {
    ensure_active_lead(conn, &conversation.lead)?;
    atomically(conn, "record_conversation", || -> Result<()> {
        insert_conversation(conn, conversation)?;
        touch_last_contact(conn, &conversation.lead, conversation.created_at)?;
        if let Some(at) = conversation.follow_up_date {
            append_follow_up(conn, &conversation.lead, at, conversation.created_at)?;
        }
        Ok(())
    })
}

fn insert_conversation(
    conn: &Connection,
    conversation: &Conversation,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO fact_conversations (
            conversation_id, lead_id, added_by, date, conclusion, is_profitable,
            follow_up_date, is_deleted, deleted_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            conversation.id,
            conversation.lead,
            conversation.added_by,
            format_ts(conversation.date),
            conversation.conclusion.trim(),
            conversation.is_profitable,
            conversation.follow_up_date.map(format_ts),
            conversation.is_deleted as i32,
            conversation.deleted_by,
            format_ts(conversation.created_at),
        ],
    )?;
    Ok(())
}

/// Schedule a follow-up on a lead.
///
/// Stores a conversation dated at the follow-up, moves the lead to
/// `follow-up`, stamps last contact with `now` and appends the date.
/// The follow-up must be strictly after `now`. Returns the conversation id.
pub fn add_follow_up(
    conn: &Connection,
    lead_id: &str,
    added_by: &str,
    follow_up_at: NaiveDateTime,
    conclusion: &str,
    now: NaiveDateTime,
) -> Result<String> {
    if conclusion.trim().is_empty() {
        return Err(Error::Other("follow-up notes are required".into()));
    }
    if follow_up_at <= now {
        return Err(Error::InvalidDate(format!(
            "follow-up date {} must be in the future",
            format_ts(follow_up_at)
        )));
    }
    ensure_active_lead(conn, lead_id)?;

    let conversation_id: String =
        conn.query_row("SELECT 'fu-' || lower(hex(randomblob(12)))", [], |row| {
            row.get(0)
        })?;
    let conversation = Conversation {
        id: conversation_id.clone(),
        lead: lead_id.to_string(),
        added_by: added_by.to_string(),
        date: follow_up_at,
        conclusion: conclusion.to_string(),
        is_profitable: None,
        follow_up_date: Some(follow_up_at),
        is_deleted: false,
        deleted_by: None,
        created_at: now,
    };
    atomically(conn, "add_follow_up", || -> Result<()> {
        record_conversation(conn, &conversation)?;
        conn.execute(
            "UPDATE fact_leads SET status = ?2 WHERE lead_id = ?1",
            params![lead_id, LeadStatus::FollowUp.as_str()],
        )?;
        Ok(())
    })?;
    Ok(conversation_id)
}

pub fn conversation_exists(
    conn: &Connection,
    conversation_id: &str,
) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM fact_conversations WHERE conversation_id = ?1)",
        params![conversation_id],
        |row| row.get(0),
    )
}

/// Soft-delete a conversation. The lead keeps its reference to it.
pub fn soft_delete_conversation(
    conn: &Connection,
    conversation_id: &str,
    deleted_by: &str,
) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "UPDATE fact_conversations SET is_deleted = 1, deleted_by = ?2
         WHERE conversation_id = ?1 AND is_deleted = 0",
        params![conversation_id, deleted_by],
    )?;
    Ok(count > 0)
}

// ── Campaigns ──────────────────────────────────────────────────────

/// Insert or update a campaign and replace its recipient set.
pub fn upsert_campaign(conn: &Connection, campaign: &Campaign) -> Result<(), rusqlite::Error> {
    atomically(conn, "upsert_campaign", || write_campaign(conn, campaign))
}

fn write_campaign(conn: &Connection, campaign: &Campaign) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO fact_campaigns (
            campaign_id, title, type, subject, description, created_by,
            delivered, opened, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(campaign_id) DO UPDATE SET
            title=excluded.title, type=excluded.type, subject=excluded.subject,
            description=excluded.description, created_by=excluded.created_by,
            delivered=excluded.delivered, opened=excluded.opened,
            created_at=excluded.created_at",
        params![
            campaign.id,
            campaign.title,
            campaign.campaign_type.as_str(),
            campaign.subject,
            campaign.description,
            campaign.created_by,
            campaign.delivered as i64,
            campaign.opened as i64,
            format_ts(campaign.created_at),
        ],
    )?;

    conn.execute(
        "DELETE FROM bridge_campaign_recipients WHERE campaign_id = ?1",
        params![campaign.id],
    )?;
    for lead_id in &campaign.sent_to {
        conn.execute(
            "INSERT OR IGNORE INTO bridge_campaign_recipients (campaign_id, lead_id)
             VALUES (?1, ?2)",
            params![campaign.id, lead_id],
        )?;
    }
    Ok(())
}

// ── Notifications ──────────────────────────────────────────────────

pub fn upsert_notification(
    conn: &Connection,
    notification: &Notification,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO fact_notifications (
            notification_id, recipient_id, recipient_type, title, message, type,
            related_entity, is_read, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            notification.id,
            notification.recipient,
            notification.recipient_type.as_str(),
            notification.title,
            notification.message,
            notification.notification_type,
            notification.related_entity,
            notification.is_read as i32,
            format_ts(notification.created_at),
        ],
    )?;
    Ok(())
}

/// Recipient type a caller's notifications are filed under.
pub fn recipient_type_for(role: Role) -> &'static str {
    match role {
        Role::Manager => "manager",
        Role::Worker => "worker",
    }
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Status ─────────────────────────────────────────────────────────

/// Row counts shown by `leaddesk status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreCounts {
    pub managers: u64,
    pub workers: u64,
    pub categories: u64,
    pub leads: u64,
    pub deleted_leads: u64,
    pub assignments: u64,
    pub conversations: u64,
    pub campaigns: u64,
    pub notifications: u64,
}

pub fn store_counts(conn: &Connection) -> Result<StoreCounts, rusqlite::Error> {
    let count = |sql: &str| -> Result<u64, rusqlite::Error> {
        conn.query_row(sql, [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
    };
    Ok(StoreCounts {
        managers: count("SELECT COUNT(*) FROM dim_managers")?,
        workers: count("SELECT COUNT(*) FROM dim_workers")?,
        categories: count("SELECT COUNT(*) FROM dim_categories")?,
        leads: count("SELECT COUNT(*) FROM fact_leads WHERE is_deleted = 0")?,
        deleted_leads: count("SELECT COUNT(*) FROM fact_leads WHERE is_deleted = 1")?,
        assignments: count("SELECT COUNT(*) FROM fact_assignments")?,
        conversations: count("SELECT COUNT(*) FROM fact_conversations")?,
        campaigns: count("SELECT COUNT(*) FROM fact_campaigns")?,
        notifications: count("SELECT COUNT(*) FROM fact_notifications")?,
    })
}
