use clap::{Parser, Subcommand};

use leaddesk::{
    Caller, DashboardRequest, DashboardResponse, Database, ImportReport, ImportStatus, LeadDesk,
};

#[derive(Parser)]
#[command(name = "leaddesk", about = "Lead management dashboard CLI")]
struct Cli {
    /// Database path (default: ~/.leaddesk/leaddesk.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the dashboard for a manager or worker
    Dashboard {
        /// Caller id or email
        #[arg(long = "as")]
        caller: String,
        /// Window start (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        start: Option<String>,
        /// Window end (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        end: Option<String>,
        /// Print the JSON response envelope
        #[arg(long)]
        json: bool,
    },
    /// Import a JSON snapshot of CRM records
    Import {
        /// Path to the snapshot file
        path: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show record counts
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => Database::open_at(path).await?,
        None => Database::open().await?,
    };
    let desk = LeadDesk::new(db);

    match cli.command {
        Commands::Dashboard {
            caller,
            start,
            end,
            json,
        } => {
            let caller = desk.resolve_caller(&caller).await?;
            let request = DashboardRequest {
                start_date: start,
                end_date: end,
            };
            if json {
                let resp = desk.dashboard_response(&caller, &request).await;
                println!("{}", serde_json::to_string_pretty(&resp.body)?);
                if resp.status != 200 {
                    anyhow::bail!("dashboard request failed with status {}", resp.status);
                }
            } else {
                let dashboard = desk.dashboard(&caller, &request).await?;
                print_dashboard(&caller, &dashboard);
            }
        }
        Commands::Import { path } => {
            let reports = desk.import(&path).await?;
            print_import_reports(&reports);
        }
        Commands::Config { action } => {
            handle_config(&desk, action).await?;
        }
        Commands::Status => {
            print_status(&desk).await?;
        }
    }

    Ok(())
}

fn print_dashboard(caller: &Caller, d: &DashboardResponse) {
    println!("Dashboard for {} ({})", caller.id, caller.role);
    println!("  Total leads:       {}", d.total_leads);
    println!("  Engaged leads:     {}", d.engaged_leads);
    println!("  Conversation rate: {:.2}%", d.conversation_rate);
    println!("  Overdue tasks:     {}", d.overdue_tasks);
    println!("  New this week:     {}", d.recent_leads_count);

    if !d.lead_pipeline.is_empty() {
        println!();
        println!("Pipeline");
        for stage in &d.lead_pipeline {
            println!("  {:<12} {}", stage.status.as_str(), stage.count);
        }
    }

    if !d.leads_by_category.is_empty() {
        println!();
        println!("Leads by category");
        for c in &d.leads_by_category {
            println!("  {:<24} {}", c.category, c.count);
        }
    }

    if !d.campaign_performance.is_empty() {
        println!();
        println!("Campaigns");
        for c in &d.campaign_performance {
            println!(
                "  {:<24} {}/{} converted ({:.2}%)",
                c.title, c.converted_leads, c.target_leads, c.conversion_rate
            );
        }
    }

    if !d.team_leaderboard.is_empty() {
        println!();
        println!("Leaderboard");
        for (i, w) in d.team_leaderboard.iter().enumerate() {
            println!(
                "  {}. {:<20} {}/{} ({:.2}%)",
                i + 1,
                w.name,
                w.converted_leads,
                w.assigned_leads,
                w.converted_percentage
            );
        }
    }

    if !d.upcoming_deadlines.is_empty() {
        println!();
        println!("Upcoming follow-ups");
        for f in &d.upcoming_deadlines {
            println!("  {}  {} [{}]", f.follow_up_date, f.lead_name, f.status.as_str());
        }
    }

    let bi = &d.business_insights;
    println!();
    println!("Insights");
    println!("  Lead velocity:        {}%", bi.lead_velocity_rate);
    println!("  Avg response time:    {} h", bi.average_lead_response_time);
    println!("  Avg sales cycle:      {} d", bi.average_sales_cycle_duration);
    println!("  Top lead source:      {}", bi.top_lead_source);
    println!(
        "  Top campaign:         {} ({}%)",
        bi.top_converting_campaign.title, bi.top_converting_campaign.open_rate
    );
    if let Some(w) = &bi.most_engaged_worker {
        println!("  Most engaged worker:  {}", w.name);
    }
    if let Some(c) = &bi.highest_performing_category {
        println!("  Top category:         {} ({})", c.category, c.count);
    }
}

fn print_import_reports(reports: &[ImportReport]) {
    for r in reports {
        let status = match r.status {
            ImportStatus::Success => "ok",
            ImportStatus::PartialFailure => "partial",
            ImportStatus::Failed => "FAILED",
        };
        println!(
            "  {:<14} {:<8} imported {}, skipped {}, failed {}",
            r.entity, status, r.imported, r.skipped, r.failed
        );
        for e in &r.errors {
            println!("    - {e}");
        }
    }
    let failed: u64 = reports.iter().map(|r| r.failed).sum();
    if failed > 0 {
        eprintln!("{failed} record(s) failed to import");
    }
}

async fn print_status(desk: &LeadDesk) -> anyhow::Result<()> {
    let c = desk.status().await?;
    println!("Store Status");
    println!("  Managers:      {}", c.managers);
    println!("  Workers:       {}", c.workers);
    println!("  Categories:    {}", c.categories);
    println!("  Leads:         {} ({} deleted)", c.leads, c.deleted_leads);
    println!("  Assignments:   {}", c.assignments);
    println!("  Conversations: {}", c.conversations);
    println!("  Campaigns:     {}", c.campaigns);
    println!("  Notifications: {}", c.notifications);
    Ok(())
}

async fn handle_config(desk: &LeadDesk, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match desk.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            desk.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = desk.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}
