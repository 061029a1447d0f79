pub mod feed;

pub use feed::{RecentLead, RecentNotification, UpcomingDeadline};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::date_util;
use crate::error::{Error, Result};
use crate::metrics::{
    self, CampaignPerformance, CategoryCount, LeaderboardEntry, PipelineStage, TopCampaign,
};
use crate::model::Caller;
use crate::query::{DateWindow, LeadFilter};
use crate::storage::{repository, Database};

pub const RECENT_LIMIT_KEY: &str = "dashboard.recent_limit";
pub const DEADLINE_DAYS_KEY: &str = "dashboard.deadline_days";

/// Longest trailing or upcoming window a setting may ask for.
pub const MAX_WINDOW_DAYS: u16 = 3650;

/// Who is asking, and over which creation window.
#[derive(Debug, Clone)]
pub struct DashboardQuery {
    pub caller: Caller,
    pub window: Option<DateWindow>,
    /// Reference time for trailing windows; the store clock when unset.
    pub as_of: Option<NaiveDateTime>,
}

impl DashboardQuery {
    pub fn new(caller: Caller) -> Self {
        Self {
            caller,
            window: None,
            as_of: None,
        }
    }

    pub fn window(mut self, window: Option<DateWindow>) -> Self {
        self.window = window;
        self
    }

    pub fn as_of(mut self, now: NaiveDateTime) -> Self {
        self.as_of = Some(now);
        self
    }
}

/// Sizes of the feed sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardOptions {
    pub recent_limit: u32,
    pub recent_days: u16,
    pub deadline_days: u16,
    pub deadline_limit: u32,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            recent_limit: 5,
            recent_days: 7,
            deadline_days: 7,
            deadline_limit: 10,
        }
    }
}

impl DashboardOptions {
    /// Defaults with any overrides stored in `app_config`.
    pub async fn load(db: &Database) -> Result<Self> {
        let (recent_limit, deadline_days) = db
            .reader()
            .call(|conn| {
                Ok::<_, rusqlite::Error>((
                    repository::get_config(conn, RECENT_LIMIT_KEY)?,
                    repository::get_config(conn, DEADLINE_DAYS_KEY)?,
                ))
            })
            .await?;

        let mut options = Self::default();
        if let Some(raw) = recent_limit {
            options.recent_limit = parse_setting(RECENT_LIMIT_KEY, &raw)?;
        }
        if let Some(raw) = deadline_days {
            options.deadline_days = parse_days(DEADLINE_DAYS_KEY, &raw)?;
        }
        Ok(options)
    }
}

fn parse_setting<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got '{raw}'")))
}

fn parse_days(key: &str, raw: &str) -> Result<u16> {
    let days: u16 = parse_setting(key, raw)?;
    if days > MAX_WINDOW_DAYS {
        return Err(Error::Config(format!(
            "{key} must be at most {MAX_WINDOW_DAYS} days, got {days}"
        )));
    }
    Ok(days)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessInsights {
    pub lead_velocity_rate: String,
    pub average_lead_response_time: String,
    pub top_converting_campaign: TopCampaign,
    pub most_engaged_worker: Option<LeaderboardEntry>,
    pub top_lead_source: String,
    pub average_sales_cycle_duration: String,
    pub highest_performing_category: Option<CategoryCount>,
}

/// The full dashboard payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub total_leads: u64,
    pub engaged_leads: u64,
    pub conversation_rate: f64,
    pub overdue_tasks: u64,
    pub recent_leads_count: u64,
    pub recent_leads: Vec<RecentLead>,
    pub recent_notifications: Vec<RecentNotification>,
    pub leads_by_category: Vec<CategoryCount>,
    pub campaign_performance: Vec<CampaignPerformance>,
    pub upcoming_deadlines: Vec<UpcomingDeadline>,
    pub team_leaderboard: Vec<LeaderboardEntry>,
    pub business_insights: BusinessInsights,
    pub lead_pipeline: Vec<PipelineStage>,
}

/// Compute every dashboard section for one request.
///
/// All sub-queries run concurrently against the reader connection; the
/// first failure aborts the whole computation.
pub async fn compute_dashboard(
    db: &Database,
    query: &DashboardQuery,
    options: &DashboardOptions,
) -> Result<DashboardResponse> {
    let now = query.as_of.unwrap_or_else(date_util::now);
    let filter = LeadFilter::new(query.caller.clone()).window(query.window);
    log::info!(
        "Computing dashboard for {} {} as of {}",
        query.caller.role,
        query.caller.id,
        date_util::format_ts(now)
    );

    let (
        counts,
        lead_velocity_rate,
        leads_by_category,
        campaigns,
        team_leaderboard,
        top_lead_source,
        response_times,
        lead_pipeline,
        recent_leads,
        recent_leads_count,
        recent_notifications,
        upcoming_deadlines,
    ) = tokio::try_join!(
        metrics::lead_counts(db, &filter, now),
        metrics::lead_velocity(db, &filter, now),
        metrics::leads_by_category(db, &filter),
        metrics::campaign_stats(db, &filter),
        metrics::team_leaderboard(db, &filter),
        metrics::top_lead_source(db, &filter),
        metrics::response_times(db, &filter),
        metrics::lead_pipeline(db, &filter),
        feed::recent_leads(db, &filter, options.recent_limit),
        feed::recent_leads_count(db, &filter, now, options.recent_days),
        feed::recent_notifications(db, &query.caller, options.recent_limit),
        feed::upcoming_deadlines(
            db,
            &filter,
            now,
            options.deadline_days,
            options.deadline_limit
        )
    )?;

    let business_insights = BusinessInsights {
        lead_velocity_rate,
        average_lead_response_time: response_times.average_lead_response_time,
        top_converting_campaign: metrics::top_converting_campaign(&campaigns),
        most_engaged_worker: team_leaderboard.first().cloned(),
        top_lead_source,
        average_sales_cycle_duration: response_times.average_sales_cycle_duration,
        highest_performing_category: metrics::highest_performing_category(&leads_by_category),
    };

    log::debug!(
        "Dashboard: {} leads, {} engaged, {} campaigns, {} workers ranked",
        counts.total_leads,
        counts.engaged_leads,
        campaigns.len(),
        team_leaderboard.len()
    );

    Ok(DashboardResponse {
        total_leads: counts.total_leads,
        engaged_leads: counts.engaged_leads,
        conversation_rate: counts.conversation_rate,
        overdue_tasks: counts.overdue_tasks,
        recent_leads_count,
        recent_leads,
        recent_notifications,
        leads_by_category,
        campaign_performance: metrics::campaign_performance(&campaigns),
        upcoming_deadlines,
        team_leaderboard,
        business_insights,
        lead_pipeline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::model::{LeadStatus, Role};

    async fn seeded() -> Database {
        let db = Database::open_memory().await.unwrap();
        seed(&db, |conn| {
            repository::upsert_manager(conn, &manager("m1", "Maya"))?;
            repository::upsert_worker(conn, &worker("w1", "Wes"))?;
            repository::upsert_worker(conn, &worker("w2", "Ana"))?;
            repository::upsert_category(conn, &category("ca", "Retail"))?;
            repository::upsert_category(conn, &category("cb", "Wholesale"))?;

            for (id, created, cat, source) in [
                ("a", "2025-01-02", "ca", "web"),
                ("b", "2025-01-08", "ca", "web"),
                ("c", "2025-01-12", "cb", "referral"),
                ("d", "2025-01-13", "ca", ""),
            ] {
                let mut l = lead(id, created);
                l.category = Some(cat.to_string());
                l.lead_source = Some(source.to_string());
                repository::upsert_lead(conn, &l)?;
            }

            repository::assign_leads(conn, &assignment("w1", &["a", "b"], "2025-01-09"))?;
            repository::assign_leads(conn, &assignment("w2", &["c"], "2025-01-12"))?;

            let mut talk = conversation("c1", "a", "w1", Some(true), "2025-01-10T09:00:00");
            talk.follow_up_date = Some(ts("2025-01-16T10:00:00"));
            repository::record_conversation(conn, &talk)?;
            let convo = conversation("c2", "c", "w2", Some(false), "2025-01-13");
            repository::record_conversation(conn, &convo)?;
            repository::append_follow_up(conn, "b", ts("2025-01-05"), ts("2025-01-08"))?;

            repository::upsert_campaign(conn, &campaign("k1", "Launch", &["a", "b"], 10, 4))?;
            repository::upsert_campaign(conn, &campaign("k2", "Draft", &["c"], 0, 0))?;

            let n = notification("n1", "m1", Role::Manager, "2025-01-12");
            repository::upsert_notification(conn, &n)?;
            let n = notification("n2", "w1", Role::Worker, "2025-01-12");
            repository::upsert_notification(conn, &n)?;
            Ok(())
        })
        .await;
        db
    }

    #[tokio::test]
    async fn test_manager_dashboard() {
        let db = seeded().await;
        let query = DashboardQuery::new(Caller::manager("m1")).as_of(ts("2025-01-14T12:00:00"));
        let dash = compute_dashboard(&db, &query, &DashboardOptions::default())
            .await
            .unwrap();

        assert_eq!(dash.total_leads, 4);
        assert_eq!(dash.engaged_leads, 2);
        assert_eq!(dash.conversation_rate, 50.0);
        assert_eq!(dash.overdue_tasks, 1);
        assert_eq!(dash.recent_leads_count, 3);
        assert_eq!(dash.recent_leads.len(), 4);
        assert_eq!(dash.recent_notifications.len(), 1);
        assert_eq!(dash.recent_notifications[0].id, "n1");

        assert_eq!(dash.leads_by_category[0].category, "Retail");
        assert_eq!(dash.leads_by_category[0].count, 3);
        assert_eq!(dash.campaign_performance.len(), 2);
        assert_eq!(dash.upcoming_deadlines.len(), 1);
        assert_eq!(dash.upcoming_deadlines[0].lead_id, "a");

        assert_eq!(dash.team_leaderboard.len(), 2);
        assert_eq!(dash.team_leaderboard[0].worker_id, "w1");
        assert_eq!(dash.team_leaderboard[0].converted_percentage, 50.0);

        let pipeline_total: u64 = dash.lead_pipeline.iter().map(|s| s.count).sum();
        assert_eq!(dash.lead_pipeline.len(), 4);
        assert!(pipeline_total <= dash.total_leads);

        let insights = &dash.business_insights;
        // 3 leads in the last 7 days vs 1 the week before
        assert_eq!(insights.lead_velocity_rate, "200.00");
        assert_eq!(insights.top_converting_campaign.title, "Launch");
        assert_eq!(insights.top_converting_campaign.open_rate, 40.0);
        assert_eq!(
            insights.most_engaged_worker.as_ref().map(|w| w.name.as_str()),
            Some("Wes")
        );
        assert_eq!(insights.top_lead_source, "web");
        assert_eq!(
            insights.highest_performing_category.as_ref().map(|c| c.count),
            Some(3)
        );
    }

    #[tokio::test]
    async fn test_worker_dashboard_is_scoped() {
        let db = seeded().await;
        let query = DashboardQuery::new(Caller::worker("w2")).as_of(ts("2025-01-14T12:00:00"));
        let dash = compute_dashboard(&db, &query, &DashboardOptions::default())
            .await
            .unwrap();

        assert_eq!(dash.total_leads, 1);
        assert!(dash.recent_leads.iter().all(|l| l.id == "c"));
        assert_eq!(dash.team_leaderboard.len(), 1);
        assert_eq!(dash.team_leaderboard[0].worker_id, "w2");
        assert!(dash.recent_notifications.is_empty());
        assert_eq!(dash.campaign_performance.len(), 1);
        // The only visible campaign never delivered
        assert_eq!(dash.business_insights.top_converting_campaign, TopCampaign::default());
        assert_eq!(dash.business_insights.top_lead_source, "referral");
    }

    #[tokio::test]
    async fn test_window_narrows_metrics() {
        let db = seeded().await;
        let window = DateWindow::from_inputs(Some("2025-01-12"), Some("2025-01-13")).unwrap();
        let query = DashboardQuery::new(Caller::manager("m1"))
            .window(window)
            .as_of(ts("2025-01-14T12:00:00"));
        let dash = compute_dashboard(&db, &query, &DashboardOptions::default())
            .await
            .unwrap();

        assert_eq!(dash.total_leads, 2);
        let new_count = dash
            .lead_pipeline
            .iter()
            .find(|s| s.status == LeadStatus::New)
            .map(|s| s.count);
        assert_eq!(new_count, Some(2));
        // Velocity ignores the request window
        assert_eq!(dash.business_insights.lead_velocity_rate, "200.00");
    }

    #[tokio::test]
    async fn test_serialized_field_names() {
        let db = Database::open_memory().await.unwrap();
        let query = DashboardQuery::new(Caller::manager("m1")).as_of(ts("2025-01-14"));
        let dash = compute_dashboard(&db, &query, &DashboardOptions::default())
            .await
            .unwrap();
        let json = serde_json::to_value(&dash).unwrap();

        for key in [
            "totalLeads",
            "engagedLeads",
            "conversationRate",
            "overdueTasks",
            "recentLeadsCount",
            "recentLeads",
            "recentNotifications",
            "leadsByCategory",
            "campaignPerformance",
            "upcomingDeadlines",
            "teamLeaderboard",
            "businessInsights",
            "leadPipeline",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        let insights = &json["businessInsights"];
        assert_eq!(insights["mostEngagedWorker"], serde_json::Value::Null);
        assert_eq!(insights["highestPerformingCategory"], serde_json::Value::Null);
        assert_eq!(insights["topConvertingCampaign"]["title"], "N/A");
        assert_eq!(insights["averageLeadResponseTime"], "0");
        assert_eq!(json["leadPipeline"][1]["status"], "in-progress");
    }

    #[tokio::test]
    async fn test_options_from_config() {
        let db = Database::open_memory().await.unwrap();
        assert_eq!(DashboardOptions::load(&db).await.unwrap(), DashboardOptions::default());

        seed(&db, |conn| {
            repository::set_config(conn, RECENT_LIMIT_KEY, "3")?;
            repository::set_config(conn, DEADLINE_DAYS_KEY, "14")?;
            Ok(())
        })
        .await;
        let options = DashboardOptions::load(&db).await.unwrap();
        assert_eq!(options.recent_limit, 3);
        assert_eq!(options.deadline_days, 14);

        seed(&db, |conn| {
            repository::set_config(conn, RECENT_LIMIT_KEY, "lots")?;
            Ok(())
        })
        .await;
        assert!(matches!(DashboardOptions::load(&db).await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_deadline_days_bounded() {
        let db = Database::open_memory().await.unwrap();

        for raw in ["-1", "1000000000", "3651"] {
            let raw = raw.to_string();
            seed(&db, move |conn| {
                repository::set_config(conn, DEADLINE_DAYS_KEY, &raw)?;
                Ok(())
            })
            .await;
            assert!(
                matches!(DashboardOptions::load(&db).await, Err(Error::Config(_))),
                "accepted out-of-range deadline window"
            );
        }

        seed(&db, |conn| {
            repository::set_config(conn, DEADLINE_DAYS_KEY, "3650")?;
            Ok(())
        })
        .await;
        let options = DashboardOptions::load(&db).await.unwrap();
        assert_eq!(options.deadline_days, MAX_WINDOW_DAYS);

        // The widest window still computes on the shared reader
        let query = DashboardQuery::new(Caller::manager("m1")).as_of(ts("2025-01-14"));
        compute_dashboard(&db, &query, &options).await.unwrap();
        compute_dashboard(&db, &query, &options).await.unwrap();
    }
}
