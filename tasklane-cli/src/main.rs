//! tasklane CLI - create, claim and inspect tasks from the shell.
//!
//! # Commands
//!
//! - `tasklane create --topic T --param k=v` - Enqueue a task
//! - `tasklane acquire --topic T` - Claim the oldest pending task
//! - `tasklane update --topic T --tid ID --record k=v` - Heartbeat and record progress
//! - `tasklane release --topic T --tid ID` - Give a task back
//! - `tasklane status --topic T` - Pending and working tasks with heartbeat ages
//! - `tasklane show --topic T --tid ID` - Parameters and metrics of one task
//!
//! Connection settings come from `--redis-url` or the `REDIS_*` environment
//! variables.

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tasklane_queue::{RedisStore, TaskId, TaskQueue};
use tasklane_redis::RedisConfig;

mod commands;
mod error;
mod output;

use commands::{acquire, create, parse_pair, release, show, status, update};
use error::CliResult;
use output::Output;

/// tasklane - coordinator-free task queue over Redis
#[derive(Parser)]
#[command(name = "tasklane")]
#[command(version)]
#[command(about = "Create, claim and inspect tasklane tasks")]
#[command(propagate_version = true)]
#[command(after_help = format!(
    "{}\n  {} tasklane create -t thumbnails -p path=/img/cat.png\n  {} tasklane acquire -t thumbnails --json\n  {} tasklane status -t thumbnails",
    "Examples:".bright_cyan().bold(),
    "$".dimmed(),
    "$".dimmed(),
    "$".dimmed(),
))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Redis URL (overrides REDIS_HOST / REDIS_PORT)
    #[arg(long, global = true, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Seconds to wait for the Redis connection
    #[arg(long, global = true, default_value = "5")]
    timeout: u64,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a task
    #[command(alias = "c")]
    Create(CreateArgs),

    /// Claim the oldest pending task
    #[command(alias = "a")]
    Acquire(TopicArgs),

    /// Refresh a task's heartbeat and record progress
    #[command(alias = "u")]
    Update(UpdateArgs),

    /// Release a task from the working set
    #[command(alias = "r")]
    Release(TaskArgs),

    /// Show pending and working tasks
    #[command(alias = "s", visible_alias = "stats")]
    Status(TopicArgs),

    /// Show parameters and metrics of one task
    Show(TaskArgs),
}

#[derive(Args)]
struct TopicArgs {
    /// Queue topic
    #[arg(short, long, env = "TASKLANE_TOPIC")]
    topic: String,
}

#[derive(Args)]
struct TaskArgs {
    #[command(flatten)]
    topic: TopicArgs,

    /// Task id
    #[arg(long)]
    tid: TaskId,
}

#[derive(Args)]
struct CreateArgs {
    #[command(flatten)]
    topic: TopicArgs,

    /// Task parameter, repeatable
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_pair)]
    params: Vec<(String, String)>,
}

#[derive(Args)]
struct UpdateArgs {
    #[command(flatten)]
    task: TaskArgs,

    /// Metrics record, repeatable
    #[arg(short, long = "record", value_name = "KEY=VALUE", value_parser = parse_pair)]
    records: Vec<(String, String)>,
}

impl Cli {
    fn topic(&self) -> &str {
        match &self.command {
            Commands::Create(args) => &args.topic.topic,
            Commands::Acquire(args) | Commands::Status(args) => &args.topic,
            Commands::Update(args) => &args.task.topic.topic,
            Commands::Release(args) | Commands::Show(args) => &args.topic.topic,
        }
    }

    fn redis_config(&self) -> RedisConfig {
        let mut builder = RedisConfig::from_env();
        if let Some(url) = &self.redis_url {
            builder = builder.url(url.clone());
        }
        builder
            .pool_size(2)
            .min_idle(0)
            .connection_timeout(Duration::from_secs(self.timeout.max(1)))
            .build()
    }
}

fn init_logging(verbose: bool) {
    tasklane_log::init();
    if verbose {
        tasklane_log::set_debug(true);
    } else if std::env::var_os("TASKLANE_LOG_LEVEL").is_none()
        && std::env::var_os("TASKLANE_DEBUG").is_none()
    {
        tasklane_log::set_level(tasklane_log::Level::Warn);
    }
    tasklane_log::install_log_bridge();
    let _ = tracing::subscriber::set_global_default(tasklane_log::tracing_compat::subscriber());
}

async fn execute(cli: Cli) -> CliResult<()> {
    let out = Output { json: cli.json };
    let store = RedisStore::connect(cli.redis_config()).await?;
    let queue = TaskQueue::new(Arc::new(store), cli.topic());

    match cli.command {
        Commands::Create(args) => create::run(&queue, args.params, out).await,
        Commands::Acquire(_) => acquire::run(&queue, out).await,
        Commands::Update(args) => update::run(&queue, &args.task.tid, args.records, out).await,
        Commands::Release(args) => release::run(&queue, &args.tid, out).await,
        Commands::Status(_) => status::run(&queue, out).await,
        Commands::Show(args) => show::run(&queue, &args.tid, out).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    init_logging(cli.verbose);

    if let Err(e) = execute(cli).await {
        eprintln!("\n  {} {}\n", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
