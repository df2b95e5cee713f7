use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ut", about = "Tagged task store shared between clients", version)]
pub struct Cli {
    /// Path to the YAML config file [default: ~/.utask/config.yaml]
    #[arg(long, env = "UTASK_CONFIG", global = true)]
    pub config: Option<String>,

    /// Path to the shared SQLite database [default: ~/.utask/utask.db]
    #[arg(long, env = "UTASK_DB", global = true)]
    pub db: Option<String>,

    /// Namespace to operate in [default: default]
    #[arg(long, env = "UTASK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a task (idempotent for identical content)
    Create {
        /// Task text; the first line is the title
        #[arg(short, long)]
        title: String,
        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Priority (0 = unset)
        #[arg(long, default_value_t = 0)]
        priority: i64,
        /// Estimate in minutes (0 = unset)
        #[arg(long = "estimate-min", default_value_t = 0)]
        estimate_minutes: i64,
        /// Print the task as JSON
        #[arg(long)]
        json: bool,
    },

    /// List tasks
    List {
        /// Only tasks carrying this tag
        #[arg(long)]
        tag: Option<String>,
        /// Tasks carrying any of these tags (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Tasks carrying all of these tags (comma-separated)
        #[arg(long = "all-tags", value_delimiter = ',')]
        all_tags: Vec<String>,
        /// Filter by status (open, closed)
        #[arg(long)]
        status: Option<String>,
        /// Maximum number of results for tag queries (0 = unbounded)
        #[arg(long, default_value_t = 0)]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a task as JSON
    Get {
        /// Task id or unique prefix
        id: String,
    },

    /// Show a task in human-readable form
    Show {
        /// Task id or unique prefix
        id: String,
    },

    /// Change fields of a task
    Update {
        /// Task id or unique prefix
        id: String,
        /// New text
        #[arg(long, alias = "title")]
        text: Option<String>,
        /// Replacement tag (repeatable)
        #[arg(long = "tag")]
        tag: Vec<String>,
        /// Replacement tags (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Set completion state (true, false)
        #[arg(long)]
        done: Option<bool>,
        /// New priority
        #[arg(long)]
        priority: Option<i64>,
        /// New estimate in minutes
        #[arg(long = "estimate-min")]
        estimate_minutes: Option<i64>,
        /// Print the task as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mark a task done
    Close {
        /// Task id or unique prefix
        id: String,
    },

    /// Reopen a closed task
    Reopen {
        /// Task id or unique prefix
        id: String,
    },

    /// Remove a task
    #[command(visible_alias = "rm")]
    Delete {
        /// Task id or unique prefix
        id: String,
    },

    /// List tags with the number of indexed tasks
    Tags,

    /// Recompute the tag index from the stored tasks
    RebuildIndex,

    /// Report tasks with malformed lines in their trailer block
    Check {
        /// Only tasks carrying this tag
        #[arg(long)]
        tag: Option<String>,
        /// Filter by status (open, closed)
        #[arg(long)]
        status: Option<String>,
    },
}
