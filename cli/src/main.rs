mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_clear, cmd_diary, cmd_entry_delete, cmd_entry_update, cmd_food_add, cmd_food_delete,
    cmd_food_list, cmd_food_rename, cmd_food_show, cmd_goal_list, cmd_goal_set, cmd_goal_show,
    cmd_log, cmd_sample, helpers::json_error,
};
use crate::config::Config;
use fittrack_core::{Database, FitnessViewModel, WorkerPool};

#[derive(Parser)]
#[command(
    name = "fittrack",
    version,
    about = "Food diary and nutrition goal tracker"
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage stored foods
    Food {
        #[command(subcommand)]
        command: FoodCommands,
    },
    /// Log servings of a stored food to the diary
    Log {
        /// Food ID
        #[arg(allow_negative_numbers = true)]
        food_id: i64,
        /// Number of servings
        #[arg(short, long, default_value = "1")]
        servings: f64,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Time of day (HH:MM, default: now)
        #[arg(long)]
        time: Option<String>,
    },
    /// Show the meals logged on a day, with totals and goal progress
    Diary {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Show every logged meal instead of a single day
        #[arg(long, conflicts_with = "date")]
        all: bool,
    },
    /// Edit or remove a diary entry
    Entry {
        #[command(subcommand)]
        command: EntryCommands,
    },
    /// Manage daily nutrition goals
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// Log random sample meals (a new food plus one serving of it)
    Sample {
        /// How many meals to create
        #[arg(short, long, default_value = "1")]
        count: u32,
    },
    /// Delete every food, diary entry and goal
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum FoodCommands {
    /// Add a food
    Add {
        /// Food name
        name: String,
        /// Serving unit (e.g. grams, cups, oz)
        #[arg(short, long)]
        unit: String,
        /// Serving size in `unit`
        #[arg(short, long, default_value = "1")]
        size: f64,
        /// Nutrition per serving, repeatable (e.g. --set calories=95 --set protein=1)
        #[arg(long = "set", value_name = "NUTRIENT=AMOUNT")]
        nutrients: Vec<String>,
    },
    /// List foods, optionally filtered
    List {
        /// Only foods whose name contains this text
        #[arg(short, long, conflicts_with = "pattern")]
        search: Option<String>,
        /// SQL LIKE pattern matched against the name (% and _ are wildcards)
        #[arg(short, long)]
        pattern: Option<String>,
    },
    /// Show one food with its full nutrition facts
    Show {
        /// Food ID
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },
    /// Rename a food
    Rename {
        /// Food ID
        #[arg(allow_negative_numbers = true)]
        id: i64,
        /// New name
        name: String,
    },
    /// Delete a food and every diary entry that uses it
    Delete {
        /// Food ID
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },
}

#[derive(Subcommand)]
enum EntryCommands {
    /// Change servings or time of a diary entry
    Update {
        /// Entry ID
        #[arg(allow_negative_numbers = true)]
        id: i64,
        /// New number of servings
        #[arg(short, long)]
        servings: Option<f64>,
        /// New date (YYYY-MM-DD or today/yesterday/tomorrow)
        #[arg(long)]
        date: Option<String>,
        /// New time of day (HH:MM)
        #[arg(long)]
        time: Option<String>,
    },
    /// Delete a diary entry
    Delete {
        /// Entry ID
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },
}

#[derive(Subcommand)]
enum GoalCommands {
    /// Set the daily goal for a nutrient
    Set {
        /// Nutrient (e.g. calories, protein, vitamin_d)
        nutrient: String,
        /// Daily amount, in the nutrient's unit
        amount: i32,
    },
    /// Show the goal for one nutrient
    Show {
        /// Nutrient (e.g. calories, protein, vitamin_d)
        nutrient: String,
    },
    /// List every goal
    List,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli).await {
        if json {
            println!("{}", json_error(&format!("{e:#}")));
        } else {
            eprintln!("Error: {e:#}");
        }
        process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fittrack=info,fittrack_core=info"));
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    debug!(db = %config.db_path.display(), workers = config.workers, "loaded config");
    let db = Arc::new(Database::open(&config.db_path)?);
    let pool = WorkerPool::new(config.workers)?;
    let vm = FitnessViewModel::new(db, pool);
    let json = cli.json;

    match cli.command {
        Commands::Food { command } => match command {
            FoodCommands::Add {
                name,
                unit,
                size,
                nutrients,
            } => cmd_food_add(&vm, &name, &unit, size, &nutrients, json).await,
            FoodCommands::List { search, pattern } => {
                cmd_food_list(&vm, search, pattern, json).await
            }
            FoodCommands::Show { id } => cmd_food_show(&vm, id, json).await,
            FoodCommands::Rename { id, name } => cmd_food_rename(&vm, id, &name, json).await,
            FoodCommands::Delete { id } => cmd_food_delete(&vm, id, json).await,
        },
        Commands::Log {
            food_id,
            servings,
            date,
            time,
        } => cmd_log(&vm, food_id, servings, date, time, json).await,
        Commands::Diary { date, all } => cmd_diary(&vm, date, all, json).await,
        Commands::Entry { command } => match command {
            EntryCommands::Update {
                id,
                servings,
                date,
                time,
            } => cmd_entry_update(&vm, id, servings, date, time, json).await,
            EntryCommands::Delete { id } => cmd_entry_delete(&vm, id, json).await,
        },
        Commands::Goal { command } => match command {
            GoalCommands::Set { nutrient, amount } => {
                cmd_goal_set(&vm, &nutrient, amount, json).await
            }
            GoalCommands::Show { nutrient } => cmd_goal_show(&vm, &nutrient, json).await,
            GoalCommands::List => cmd_goal_list(&vm, json).await,
        },
        Commands::Sample { count } => cmd_sample(&vm, count, json).await,
        Commands::Clear { yes } => cmd_clear(&vm, yes, json).await,
    }
}
