pub mod types;

pub use types::*;

use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;

use crate::date_util::{format_mean, format_ts, percent_change, percentage, round2};
use crate::error::{Error, Result};
use crate::model::{LeadStatus, Role};
use crate::query::{LeadFilter, SqlParams};
use crate::storage::Database;

/// Total, engaged and overdue lead counts with the conversation rate.
pub async fn lead_counts(
    db: &Database,
    filter: &LeadFilter,
    now: NaiveDateTime,
) -> Result<LeadCounts> {
    let filter = filter.clone();
    db.reader()
        .call(move |conn| {
            let total_leads = total_leads_sql(conn, &filter)?;
            let engaged_leads = engaged_leads_sql(conn, &filter)?;
            let overdue_tasks = overdue_tasks_sql(conn, &filter, now)?;
            Ok::<LeadCounts, rusqlite::Error>(LeadCounts {
                total_leads,
                engaged_leads,
                conversation_rate: percentage(engaged_leads, total_leads),
                overdue_tasks,
            })
        })
        .await
        .map_err(Error::from)
}

/// Week-over-week change in new leads, formatted with two decimals.
///
/// Compares `[now-7d, now]` against `[now-14d, now-7d)`. The caller's scope
/// applies; any request date window does not.
pub async fn lead_velocity(
    db: &Database,
    filter: &LeadFilter,
    now: NaiveDateTime,
) -> Result<String> {
    let filter = filter.scope_only();
    db.reader()
        .call(move |conn| {
            let week_ago = now - Duration::days(7);
            let two_weeks_ago = now - Duration::days(14);
            let current = created_between_sql(conn, &filter, week_ago, now, true)?;
            let previous = created_between_sql(conn, &filter, two_weeks_ago, week_ago, false)?;
            log::debug!("Lead velocity: {current} this week, {previous} last week");
            Ok::<String, rusqlite::Error>(format_velocity(current, previous))
        })
        .await
        .map_err(Error::from)
}

/// Leads per category, most populated first. Uncategorized leads are skipped.
pub async fn leads_by_category(db: &Database, filter: &LeadFilter) -> Result<Vec<CategoryCount>> {
    let filter = filter.clone();
    db.reader()
        .call(move |conn| leads_by_category_sql(conn, &filter))
        .await
        .map_err(Error::from)
}

/// Campaigns visible to the caller with their reach and counters.
///
/// Managers see every campaign created in the window. Workers see campaigns
/// that target at least one of their leads, counted over those leads only.
pub async fn campaign_stats(db: &Database, filter: &LeadFilter) -> Result<Vec<CampaignStats>> {
    let filter = filter.clone();
    db.reader()
        .call(move |conn| campaign_stats_sql(conn, &filter))
        .await
        .map_err(Error::from)
}

/// Per-worker assigned vs converted leads, best converters first.
pub async fn team_leaderboard(
    db: &Database,
    filter: &LeadFilter,
) -> Result<Vec<LeaderboardEntry>> {
    let filter = filter.clone();
    db.reader()
        .call(move |conn| leaderboard_sql(conn, &filter))
        .await
        .map(rank_leaderboard)
        .map_err(Error::from)
}

/// Most common lead source, or `"N/A"`.
pub async fn top_lead_source(db: &Database, filter: &LeadFilter) -> Result<String> {
    let filter = filter.clone();
    db.reader()
        .call(move |conn| top_lead_source_sql(conn, &filter))
        .await
        .map(|source| source.unwrap_or_else(|| "N/A".to_string()))
        .map_err(Error::from)
}

/// Average creation-to-last-contact delay in hours and in days.
pub async fn response_times(db: &Database, filter: &LeadFilter) -> Result<ResponseTimes> {
    let filter = filter.clone();
    db.reader()
        .call(move |conn| contact_delays_sql(conn, &filter))
        .await
        .map(|days| {
            let hours: Vec<f64> = days.iter().map(|d| d * 24.0).collect();
            ResponseTimes {
                average_lead_response_time: format_mean(&hours),
                average_sales_cycle_duration: format_mean(&days),
            }
        })
        .map_err(Error::from)
}

/// Lead counts per status, one entry per status in pipeline order.
pub async fn lead_pipeline(db: &Database, filter: &LeadFilter) -> Result<Vec<PipelineStage>> {
    let filter = filter.clone();
    db.reader()
        .call(move |conn| status_counts_sql(conn, &filter))
        .await
        .map(|raw| normalize_pipeline(&raw))
        .map_err(Error::from)
}

// ── Derivations ────────────────────────────────────────────────────

pub fn format_velocity(current: u64, previous: u64) -> String {
    format!("{:.2}", percent_change(current, previous))
}

/// Fill in every pipeline status, keeping the fixed status order.
pub fn normalize_pipeline(raw: &[(LeadStatus, u64)]) -> Vec<PipelineStage> {
    LeadStatus::ALL
        .iter()
        .map(|status| PipelineStage {
            status: *status,
            count: raw
                .iter()
                .filter(|(s, _)| s == status)
                .map(|(_, n)| n)
                .sum(),
        })
        .collect()
}

pub fn highest_performing_category(categories: &[CategoryCount]) -> Option<CategoryCount> {
    // Input is sorted by count, so the first maximum wins ties
    categories
        .iter()
        .fold(None::<&CategoryCount>, |best, c| match best {
            Some(b) if b.count >= c.count => Some(b),
            _ => Some(c),
        })
        .cloned()
}

pub fn campaign_performance(stats: &[CampaignStats]) -> Vec<CampaignPerformance> {
    stats
        .iter()
        .map(|s| CampaignPerformance {
            campaign_id: s.campaign_id.clone(),
            title: s.title.clone(),
            target_leads: s.target_leads,
            converted_leads: s.converted_leads,
            conversion_rate: percentage(s.converted_leads, s.target_leads),
        })
        .collect()
}

/// Highest open rate among campaigns that delivered anything.
pub fn top_converting_campaign(stats: &[CampaignStats]) -> TopCampaign {
    let mut best: Option<TopCampaign> = None;
    for s in stats.iter().filter(|s| s.delivered > 0) {
        let open_rate = round2(s.opened as f64 / s.delivered as f64 * 100.0);
        match &best {
            Some(b) if b.open_rate >= open_rate => {}
            _ => {
                best = Some(TopCampaign {
                    title: s.title.clone(),
                    open_rate,
                })
            }
        }
    }
    best.unwrap_or_default()
}

/// Sort by converted percentage descending, then by name.
pub fn rank_leaderboard(mut entries: Vec<LeaderboardEntry>) -> Vec<LeaderboardEntry> {
    entries.sort_by(|a, b| {
        b.converted_percentage
            .total_cmp(&a.converted_percentage)
            .then_with(|| a.name.cmp(&b.name))
    });
    entries
}

// ── Internal SQL helpers ───────────────────────────────────────────

fn count_sql(conn: &Connection, sql: &str, params: &SqlParams) -> Result<u64, rusqlite::Error> {
    let n: i64 = conn.query_row(sql, params.as_refs().as_slice(), |row| row.get(0))?;
    Ok(n as u64)
}

fn total_leads_sql(conn: &Connection, filter: &LeadFilter) -> Result<u64, rusqlite::Error> {
    let mut params = SqlParams::new();
    let pred = filter.predicate("l", &mut params);
    count_sql(
        conn,
        &format!("SELECT COUNT(*) FROM fact_leads l WHERE {pred}"),
        &params,
    )
}

fn engaged_leads_sql(conn: &Connection, filter: &LeadFilter) -> Result<u64, rusqlite::Error> {
    let mut params = SqlParams::new();
    let pred = filter.predicate("l", &mut params);
    // Soft-deleted conversations still count as contact
    count_sql(
        conn,
        &format!(
            "SELECT COUNT(*) FROM fact_leads l
             WHERE {pred}
               AND EXISTS (SELECT 1 FROM fact_conversations c WHERE c.lead_id = l.lead_id)"
        ),
        &params,
    )
}

fn overdue_tasks_sql(
    conn: &Connection,
    filter: &LeadFilter,
    now: NaiveDateTime,
) -> Result<u64, rusqlite::Error> {
    let mut params = SqlParams::new();
    let pred = filter.predicate("l", &mut params);
    let now = params.push(format_ts(now));
    count_sql(
        conn,
        &format!(
            "SELECT COUNT(*) FROM fact_leads l
             WHERE {pred}
               AND EXISTS (
                 SELECT 1 FROM fact_lead_follow_ups f
                 WHERE f.lead_id = l.lead_id AND f.follow_up_at < {now}
               )"
        ),
        &params,
    )
}

fn created_between_sql(
    conn: &Connection,
    filter: &LeadFilter,
    from: NaiveDateTime,
    to: NaiveDateTime,
    inclusive_end: bool,
) -> Result<u64, rusqlite::Error> {
    let mut params = SqlParams::new();
    let pred = filter.predicate("l", &mut params);
    let from = params.push(format_ts(from));
    let to = params.push(format_ts(to));
    let op = if inclusive_end { "<=" } else { "<" };
    count_sql(
        conn,
        &format!(
            "SELECT COUNT(*) FROM fact_leads l
             WHERE {pred} AND l.created_at >= {from} AND l.created_at {op} {to}"
        ),
        &params,
    )
}

fn leads_by_category_sql(
    conn: &Connection,
    filter: &LeadFilter,
) -> Result<Vec<CategoryCount>, rusqlite::Error> {
    let mut params = SqlParams::new();
    let pred = filter.predicate("l", &mut params);
    let sql = format!(
        "SELECT c.title, COUNT(*) AS n
         FROM fact_leads l
         JOIN dim_categories c ON c.category_id = l.category_id
         WHERE {pred}
         GROUP BY c.category_id, c.title
         ORDER BY n DESC, c.title ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_refs().as_slice(), |row| {
        Ok(CategoryCount {
            category: row.get(0)?,
            count: row.get::<_, i64>(1)? as u64,
        })
    })?;
    rows.collect()
}

fn campaign_stats_sql(
    conn: &Connection,
    filter: &LeadFilter,
) -> Result<Vec<CampaignStats>, rusqlite::Error> {
    let mut params = SqlParams::new();
    let lead_scope = filter
        .scope_clause("l", &mut params)
        .map(|s| format!(" AND {s}"))
        .unwrap_or_default();
    let window = filter
        .date_window()
        .map(|w| format!("WHERE {}", w.clause("cp.created_at", &mut params)))
        .unwrap_or_default();
    let having = match filter.caller().role {
        Role::Manager => "",
        Role::Worker => "HAVING COUNT(DISTINCT l.lead_id) > 0",
    };

    let sql = format!(
        "SELECT cp.campaign_id, cp.title,
            COUNT(DISTINCT l.lead_id),
            COUNT(DISTINCT CASE WHEN EXISTS (
                SELECT 1 FROM fact_conversations c WHERE c.lead_id = l.lead_id
            ) THEN l.lead_id END),
            cp.delivered, cp.opened
         FROM fact_campaigns cp
         LEFT JOIN bridge_campaign_recipients r ON r.campaign_id = cp.campaign_id
         LEFT JOIN fact_leads l ON l.lead_id = r.lead_id AND l.is_deleted = 0{lead_scope}
         {window}
         GROUP BY cp.campaign_id, cp.title, cp.delivered, cp.opened, cp.created_at
         {having}
         ORDER BY cp.created_at DESC, cp.campaign_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_refs().as_slice(), |row| {
        Ok(CampaignStats {
            campaign_id: row.get(0)?,
            title: row.get(1)?,
            target_leads: row.get::<_, i64>(2)? as u64,
            converted_leads: row.get::<_, i64>(3)? as u64,
            delivered: row.get::<_, i64>(4)? as u64,
            opened: row.get::<_, i64>(5)? as u64,
        })
    })?;
    rows.collect()
}

fn leaderboard_sql(
    conn: &Connection,
    filter: &LeadFilter,
) -> Result<Vec<LeaderboardEntry>, rusqlite::Error> {
    let mut params = SqlParams::new();
    let window = filter
        .date_window()
        .map(|w| format!(" AND {}", w.clause("l.created_at", &mut params)))
        .unwrap_or_default();
    let worker_scope = match filter.caller().role {
        Role::Manager => String::new(),
        Role::Worker => format!("WHERE w.worker_id = {}", params.push(filter.caller().id.clone())),
    };

    let sql = format!(
        "SELECT w.worker_id, w.name, w.email,
            COUNT(DISTINCT l.lead_id),
            COUNT(DISTINCT CASE WHEN EXISTS (
                SELECT 1 FROM fact_conversations c
                WHERE c.lead_id = l.lead_id AND c.added_by = w.worker_id
                  AND c.is_profitable = 1 AND c.is_deleted = 0
            ) THEN l.lead_id END)
         FROM dim_workers w
         LEFT JOIN fact_assignments a ON a.assigned_to = w.worker_id
         LEFT JOIN bridge_assignment_leads bal ON bal.assignment_id = a.assignment_id
         LEFT JOIN fact_leads l ON l.lead_id = bal.lead_id AND l.is_deleted = 0{window}
         {worker_scope}
         GROUP BY w.worker_id, w.name, w.email"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_refs().as_slice(), |row| {
        let assigned_leads = row.get::<_, i64>(3)? as u64;
        let converted_leads = row.get::<_, i64>(4)? as u64;
        Ok(LeaderboardEntry {
            worker_id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            assigned_leads,
            converted_leads,
            converted_percentage: percentage(converted_leads, assigned_leads),
        })
    })?;
    rows.collect()
}

fn top_lead_source_sql(
    conn: &Connection,
    filter: &LeadFilter,
) -> Result<Option<String>, rusqlite::Error> {
    use rusqlite::OptionalExtension;

    let mut params = SqlParams::new();
    let pred = filter.predicate("l", &mut params);
    let sql = format!(
        "SELECT l.lead_source, COUNT(*) AS n
         FROM fact_leads l
         WHERE {pred} AND l.lead_source IS NOT NULL AND TRIM(l.lead_source) <> ''
         GROUP BY l.lead_source
         ORDER BY n DESC, l.lead_source ASC
         LIMIT 1"
    );
    conn.query_row(&sql, params.as_refs().as_slice(), |row| row.get(0))
        .optional()
}

/// Creation-to-last-contact deltas in fractional days.
fn contact_delays_sql(conn: &Connection, filter: &LeadFilter) -> Result<Vec<f64>, rusqlite::Error> {
    let mut params = SqlParams::new();
    let pred = filter.predicate("l", &mut params);
    let sql = format!(
        "SELECT julianday(l.last_contact) - julianday(l.created_at)
         FROM fact_leads l
         WHERE {pred} AND l.last_contact IS NOT NULL"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_refs().as_slice(), |row| row.get::<_, f64>(0))?;
    rows.collect()
}

fn status_counts_sql(
    conn: &Connection,
    filter: &LeadFilter,
) -> Result<Vec<(LeadStatus, u64)>, rusqlite::Error> {
    let mut params = SqlParams::new();
    let pred = filter.predicate("l", &mut params);
    let sql = format!("SELECT l.status, COUNT(*) FROM fact_leads l WHERE {pred} GROUP BY l.status");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_refs().as_slice(), |row| {
        let status = status_from_sql(0, row.get(0)?)?;
        Ok((status, row.get::<_, i64>(1)? as u64))
    })?;
    rows.collect()
}

pub(crate) fn status_from_sql(idx: usize, raw: String) -> Result<LeadStatus, rusqlite::Error> {
    raw.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
