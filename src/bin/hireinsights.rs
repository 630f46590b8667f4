use clap::{Parser, Subcommand};

use hireinsights::{HireInsights, InsightPayload, InsightRequest, InsightRole, RequestedRange};

#[derive(Parser)]
#[command(name = "hireinsights", about = "Period-over-period hiring insights")]
struct Cli {
    /// Database path (default: ~/.hireinsights/hireinsights.db)
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
    /// Show a dashboard compared against its baseline period
    Insights {
        #[command(subcommand)]
        target: InsightsTarget,
    },
    /// Load a JSON snapshot of platform records
    Import {
        /// Snapshot file
        file: std::path::PathBuf,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show record counts
    Status,
}

#[derive(clap::Args)]
struct PeriodArgs {
    /// Period shorthand: 2024-01, 2024-01-01..2024-01-15, 30d, mtd, ytd
    #[arg(long, conflicts_with_all = ["start", "end", "year", "month"])]
    period: Option<String>,
    /// Range start (YYYY-MM-DD)
    #[arg(long, requires = "end")]
    start: Option<String>,
    /// Range end (YYYY-MM-DD)
    #[arg(long, requires = "start")]
    end: Option<String>,
    /// Calendar year
    #[arg(long, requires = "month")]
    year: Option<i32>,
    /// Calendar month (1-12)
    #[arg(long, requires = "year")]
    month: Option<u32>,
    /// Comparison mode: previous, same_last_year
    #[arg(long)]
    compare: Option<String>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum InsightsTarget {
    /// Platform-wide dashboard
    Admin {
        #[command(flatten)]
        period: PeriodArgs,
    },
    /// Dashboard for one company
    Employer {
        /// Company ID
        company_id: String,
        #[command(flatten)]
        period: PeriodArgs,
    },
    /// Dashboard for one candidate
    Seeker {
        /// Candidate ID
        candidate_id: String,
        #[command(flatten)]
        period: PeriodArgs,
    },
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
        Some(path) => hireinsights::Database::open_at(path).await?,
        None => hireinsights::Database::open().await?,
    };
    let engine = HireInsights::new(db);

    match cli.command {
        Commands::Insights { target } => handle_insights(&engine, target).await?,
        Commands::Import { file } => {
            let n = engine.import_file(&file).await?;
            println!("Imported {n} records from {}", file.display());
        }
        Commands::Config { action } => handle_config(&engine, action).await?,
        Commands::Status => print_status(&engine).await?,
    }

    Ok(())
}

async fn handle_insights(engine: &HireInsights, target: InsightsTarget) -> anyhow::Result<()> {
    let (role, args) = match target {
        InsightsTarget::Admin { period } => (InsightRole::Admin, period),
        InsightsTarget::Employer { company_id, period } => {
            (InsightRole::Employer { company_id }, period)
        }
        InsightsTarget::Seeker { candidate_id, period } => {
            (InsightRole::JobSeeker { candidate_id }, period)
        }
    };

    let today = chrono::Local::now().date_naive();
    let mut request = match &args.period {
        Some(p) => InsightRequest::for_range(RequestedRange::parse(p, today)?),
        None => InsightRequest {
            range_start: args.start,
            range_end: args.end,
            year: args.year,
            month: args.month,
            comparison_mode: None,
        },
    };
    request.comparison_mode = args.compare;

    let payload = engine.insights(&role, &request, today).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_payload(&role, &payload);
    }
    Ok(())
}

fn print_payload(role: &InsightRole, payload: &InsightPayload) {
    println!("Insights: {role}");
    println!("  Current:  {}", payload.period.current);
    println!("  Previous: {}", payload.period.previous);
    println!();
    let width = payload.metrics.keys().map(|k| k.len()).max().unwrap_or(0);
    for (name, m) in &payload.metrics {
        println!(
            "  {name:<width$}  {:>6}  vs {:>6}  ({:+.1}%)",
            m.current, m.previous, m.percent
        );
    }
    for (name, points) in &payload.series {
        let peak = points.iter().max_by_key(|p| p.count);
        match peak {
            Some(p) if p.count > 0 => {
                println!("  {name}: {} days, peak {} on {}", points.len(), p.count, p.date)
            }
            _ => println!("  {name}: {} days, no activity", points.len()),
        }
    }
}

async fn print_status(engine: &HireInsights) -> anyhow::Result<()> {
    let counts = engine.status().await?;
    println!("Dataset Status");
    for (entity, n) in counts {
        println!("  {:<13} {n}", format!("{entity}:"));
    }
    let config = hireinsights::InsightConfig::load(engine.db()).await?;
    println!("  Aggregate timeout: {:?}", config.aggregate_timeout);
    println!("  Query timeout:     {:?}", config.query_timeout);
    println!("  Bucket strategy:   {}", config.bucket_strategy);
    println!("  Max range:         {} days", config.max_range_days);
    Ok(())
}

async fn handle_config(engine: &HireInsights, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match engine.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            engine.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = engine.config_list().await?;
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
