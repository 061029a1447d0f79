use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::date_util::format_ts;
use crate::error::{Error, Result};
use crate::metrics::status_from_sql;
use crate::model::{Caller, LeadStatus};
use crate::query::{LeadFilter, SqlParams};
use crate::storage::repository::recipient_type_for;
use crate::storage::Database;

/// A lead in the `recentLeads` feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentLead {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub status: LeadStatus,
    pub priority: String,
    pub category: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentNotification {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub related_entity: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

/// A follow-up falling due soon.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingDeadline {
    pub lead_id: String,
    pub lead_name: String,
    pub follow_up_date: String,
    pub status: LeadStatus,
}

/// Newest leads matching the filter.
pub async fn recent_leads(
    db: &Database,
    filter: &LeadFilter,
    limit: u32,
) -> Result<Vec<RecentLead>> {
    let filter = filter.clone();
    db.reader()
        .call(move |conn| {
            let mut params = SqlParams::new();
            let pred = filter.predicate("l", &mut params);
            let limit = params.push(limit);
            let sql = format!(
                "SELECT l.lead_id, l.name, l.email, l.status, l.priority, c.title, l.created_at
                 FROM fact_leads l
                 LEFT JOIN dim_categories c ON c.category_id = l.category_id
                 WHERE {pred}
                 ORDER BY l.created_at DESC, l.lead_id
                 LIMIT {limit}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params.as_refs().as_slice(), |row| {
                Ok(RecentLead {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    status: status_from_sql(3, row.get(3)?)?,
                    priority: row.get(4)?,
                    category: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, rusqlite::Error>>()
        })
        .await
        .map_err(Error::from)
}

/// Leads matching the filter created in the `days` before `now`.
pub async fn recent_leads_count(
    db: &Database,
    filter: &LeadFilter,
    now: NaiveDateTime,
    days: u16,
) -> Result<u64> {
    let filter = filter.clone();
    db.reader()
        .call(move |conn| {
            let mut params = SqlParams::new();
            let pred = filter.predicate("l", &mut params);
            let from = params.push(format_ts(now - Duration::days(days.into())));
            let to = params.push(format_ts(now));
            let sql = format!(
                "SELECT COUNT(*) FROM fact_leads l
                 WHERE {pred} AND l.created_at >= {from} AND l.created_at <= {to}"
            );
            let n: i64 = conn.query_row(&sql, params.as_refs().as_slice(), |row| row.get(0))?;
            Ok::<u64, rusqlite::Error>(n as u64)
        })
        .await
        .map_err(Error::from)
}

/// Newest notifications addressed to the caller.
pub async fn recent_notifications(
    db: &Database,
    caller: &Caller,
    limit: u32,
) -> Result<Vec<RecentNotification>> {
    let recipient = caller.id.clone();
    let recipient_type = recipient_type_for(caller.role);
    db.reader()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT notification_id, title, message, type, related_entity, is_read, created_at
                 FROM fact_notifications
                 WHERE recipient_id = ?1 AND recipient_type = ?2
                 ORDER BY created_at DESC, notification_id
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(rusqlite::params![recipient, recipient_type, limit], |row| {
                Ok(RecentNotification {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    message: row.get(2)?,
                    notification_type: row.get(3)?,
                    related_entity: row.get(4)?,
                    is_read: row.get::<_, i32>(5)? != 0,
                    created_at: row.get(6)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, rusqlite::Error>>()
        })
        .await
        .map_err(Error::from)
}

/// Follow-ups on matching leads due in `[now, now + days]`, soonest first.
pub async fn upcoming_deadlines(
    db: &Database,
    filter: &LeadFilter,
    now: NaiveDateTime,
    days: u16,
    limit: u32,
) -> Result<Vec<UpcomingDeadline>> {
    let filter = filter.clone();
    db.reader()
        .call(move |conn| {
            let mut params = SqlParams::new();
            let pred = filter.predicate("l", &mut params);
            let from = params.push(format_ts(now));
            let to = params.push(format_ts(now + Duration::days(days.into())));
            let limit = params.push(limit);
            let sql = format!(
                "SELECT l.lead_id, l.name, f.follow_up_at, l.status
                 FROM fact_lead_follow_ups f
                 JOIN fact_leads l ON l.lead_id = f.lead_id
                 WHERE {pred} AND f.follow_up_at >= {from} AND f.follow_up_at <= {to}
                 ORDER BY f.follow_up_at ASC, l.lead_id
                 LIMIT {limit}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params.as_refs().as_slice(), |row| {
                Ok(UpcomingDeadline {
                    lead_id: row.get(0)?,
                    lead_name: row.get(1)?,
                    follow_up_date: row.get(2)?,
                    status: status_from_sql(3, row.get(3)?)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, rusqlite::Error>>()
        })
        .await
        .map_err(Error::from)
}
