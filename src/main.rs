use anyhow::{Result, bail};
use clap::Parser;
use ripple::builder::{BuildOptions, CancelToken, GraphBuilder};
use ripple::config::Config;
use ripple::engine::{AnalysisRequest, DatabaseRequest};
use ripple::schema::SchemaSource;
use ripple::score::{ChangeType, ImpactScorer};
use ripple::{builder, cli, cycles, engine, schema, util};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();
    if let Some(path) = &args.config {
        Config::install(Config::from_yaml_file(path)?);
    }
    match args.command {
        cli::Command::Analyze {
            project,
            language,
            targets,
            change_type,
            description,
            max_depth,
            no_ignore,
            dialect,
            ddl,
            connection,
        } => {
            let database = database_request(dialect, ddl, connection)?;
            let request = AnalysisRequest {
                project_path: project,
                language,
                target_files: targets,
                change_type: ChangeType::parse(&change_type)?,
                change_description: description,
                max_depth,
                no_ignore,
                database,
            };
            let report = engine::analyze(&request, CancelToken::new())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        cli::Command::Graph {
            project,
            language,
            scope,
            matrix,
            no_ignore,
        } => {
            let graph = build_graph(project, &language, no_ignore)?;
            if matrix {
                let rows = builder::module_matrix(&graph, scope.as_deref());
                print!("{}", builder::render_matrix_text(&rows));
            } else {
                println!("{}", serde_json::to_string_pretty(&graph)?);
            }
            Ok(())
        }
        cli::Command::Cycles {
            project,
            language,
            max_depth,
            no_ignore,
        } => {
            let graph = build_graph(project, &language, no_ignore)?;
            let depth = max_depth.unwrap_or(Config::get().max_depth);
            let search = cycles::detect(&graph, depth);
            println!("{}", serde_json::to_string_pretty(&search)?);
            Ok(())
        }
        cli::Command::Score {
            project,
            language,
            targets,
            change_type,
            no_ignore,
        } => {
            let graph = build_graph(project, &language, no_ignore)?;
            let change = ChangeType::parse(&change_type)?;
            let score = ImpactScorer::new(&graph, Config::get()).score(&targets, change)?;
            println!("{}", serde_json::to_string_pretty(&score)?);
            Ok(())
        }
        cli::Command::Schema {
            dialect,
            ddl,
            connection,
        } => {
            let source = schema_source(ddl, connection)?;
            let timeout = Duration::from_secs(Config::get().schema_timeout_secs);
            let graph = schema::extract(&source, &dialect, timeout)?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
            Ok(())
        }
    }
}

fn build_graph(
    project: PathBuf,
    language: &str,
    no_ignore: bool,
) -> Result<ripple::model::DependencyGraph> {
    GraphBuilder::new(BuildOptions { no_ignore }, CancelToken::new()).build(&project, language)
}

fn schema_source(ddl: Option<PathBuf>, connection: Option<String>) -> Result<SchemaSource> {
    match (ddl, connection) {
        (Some(path), None) => Ok(SchemaSource::Ddl(util::read_to_string(&path)?)),
        (None, Some(handle)) => Ok(SchemaSource::Connection(handle)),
        (Some(_), Some(_)) => bail!("pass either --ddl or --connection, not both"),
        (None, None) => bail!("schema analysis needs --ddl or --connection"),
    }
}

fn database_request(
    dialect: Option<String>,
    ddl: Option<PathBuf>,
    connection: Option<String>,
) -> Result<Option<DatabaseRequest>> {
    match dialect {
        Some(dialect) => {
            let source = schema_source(ddl, connection)?;
            Ok(Some(DatabaseRequest { dialect, source }))
        }
        None => {
            if ddl.is_some() || connection.is_some() {
                bail!("--ddl/--connection require --dialect");
            }
            Ok(None)
        }
    }
}
