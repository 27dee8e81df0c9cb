use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ripple",
    version,
    about = "Dependency & impact analysis engine",
    after_help = r#"Examples:
  ripple analyze --project . --language python --target src/core.py --change-type modify
  ripple analyze --project . --language go --target pkg/server.go --change-type delete \
      --dialect postgres --ddl schema.sql
  ripple graph --project . --language typescript --matrix
  ripple cycles --project . --language python --max-depth 25
  ripple score --project . --language rust --target src/parser.rs --change-type refactor
  ripple schema --dialect mysql --ddl migrations/schema.sql
"#
)]
pub struct Args {
    /// YAML config file overriding engine constants (weights, thresholds,
    /// worker cap, timeouts).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the full analysis and print the impact report as JSON.
    Analyze {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        #[arg(long)]
        language: String,
        /// Target file of the proposed change; repeatable.
        #[arg(long = "target", required = true)]
        targets: Vec<String>,
        /// One of modify|add|delete|refactor.
        #[arg(long, default_value = "modify")]
        change_type: String,
        /// Free-form description carried into the report verbatim.
        #[arg(long, default_value = "")]
        description: String,
        /// Recursion-path bound for cycle detection.
        #[arg(long)]
        max_depth: Option<usize>,
        /// Include files ignored by .gitignore.
        #[arg(long)]
        no_ignore: bool,
        /// Database dialect for the optional schema impact section.
        #[arg(long)]
        dialect: Option<String>,
        /// Path to a DDL file for static schema analysis.
        #[arg(long)]
        ddl: Option<PathBuf>,
        /// Live connection handle (sqlite database path).
        #[arg(long)]
        connection: Option<String>,
    },
    /// Build the dependency graph and print it (or the module matrix).
    Graph {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        #[arg(long)]
        language: String,
        /// Filter the displayed matrix to edges touching this class/module.
        #[arg(long)]
        scope: Option<String>,
        /// Print the module-level dependency matrix as text.
        #[arg(long)]
        matrix: bool,
        /// Include files ignored by .gitignore.
        #[arg(long)]
        no_ignore: bool,
    },
    /// Detect circular dependencies.
    Cycles {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        #[arg(long)]
        language: String,
        #[arg(long)]
        max_depth: Option<usize>,
        /// Include files ignored by .gitignore.
        #[arg(long)]
        no_ignore: bool,
    },
    /// Compute the weighted impact score for a change.
    Score {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        #[arg(long)]
        language: String,
        #[arg(long = "target", required = true)]
        targets: Vec<String>,
        #[arg(long, default_value = "modify")]
        change_type: String,
        /// Include files ignored by .gitignore.
        #[arg(long)]
        no_ignore: bool,
    },
    /// Parse a schema and print the table graph.
    Schema {
        #[arg(long)]
        dialect: String,
        /// Path to a DDL file.
        #[arg(long)]
        ddl: Option<PathBuf>,
        /// Live connection handle (sqlite database path).
        #[arg(long)]
        connection: Option<String>,
    },
}
