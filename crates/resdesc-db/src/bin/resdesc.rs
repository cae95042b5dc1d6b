//! resdesc: Command-line tool for the research_description table.
//!
//! Provisions the table and runs single-record operations against it.
//! Records are printed to stdout as JSON; logs go to stderr.

use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resdesc_db::{
    parse_structured, validate, Database, ListOrder, NewResearchDescription, PoolConfig,
    ResearchDescriptionPatch, ResearchDescriptionRepository, SchemaName, ValidationPolicy,
};

#[derive(Parser)]
#[command(name = "resdesc")]
#[command(author, version, about = "Manage research descriptions")]
#[command(propagate_version = true)]
struct Cli {
    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    /// PostgreSQL schema holding the research tables
    #[arg(long, env = "RESDESC_SCHEMA", default_value = "public", global = true)]
    schema: String,

    #[command(flatten)]
    policy: PolicyArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PolicyArgs {
    /// Check polygon and point geometry and require text on every known type
    #[arg(long, global = true)]
    strict_geometry: bool,

    /// Accept descriptions with neither polygon_data nor text
    #[arg(long, global = true)]
    allow_empty: bool,
}

impl PolicyArgs {
    fn policy(&self) -> ValidationPolicy {
        ValidationPolicy::default()
            .strict_geometry(self.strict_geometry)
            .require_content(!self.allow_empty)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the research_description table, or verify its shape
    Migrate,

    /// Create a description
    Create {
        /// Parent research id
        #[arg(short, long)]
        research_id: i32,

        /// Description type (at most 10 characters)
        #[arg(short = 't', long = "type")]
        kind: String,

        /// Structured document as JSON
        #[arg(short, long)]
        polygon_data: Option<String>,

        /// Free text
        #[arg(long)]
        text: Option<String>,
    },

    /// Show a description
    Get {
        id: i32,
    },

    /// List the descriptions of a research
    List {
        research_id: i32,

        /// Order by id: asc or desc
        #[arg(short, long)]
        order: Option<ListOrder>,
    },

    /// Replace fields of a description
    Update {
        id: i32,

        /// New description type
        #[arg(short = 't', long = "type")]
        kind: Option<String>,

        /// New structured document as JSON
        #[arg(short, long, conflicts_with = "clear_polygon_data")]
        polygon_data: Option<String>,

        /// Set polygon_data to NULL
        #[arg(long)]
        clear_polygon_data: bool,

        /// New free text
        #[arg(long, conflicts_with = "clear_text")]
        text: Option<String>,

        /// Set text to NULL
        #[arg(long)]
        clear_text: bool,
    },

    /// Delete a description (succeeds if it is already gone)
    Delete {
        id: i32,
    },

    /// Validate a description without touching the database
    Validate {
        #[arg(short = 't', long = "type")]
        kind: String,

        #[arg(short, long)]
        polygon_data: Option<String>,

        #[arg(long)]
        text: Option<String>,
    },
}

fn init_logging() {
    // LOG_FORMAT - "json" or "text" (default: "text")
    // RUST_LOG   - standard env filter (default: "resdesc=info,resdesc_db=info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "resdesc=info,resdesc_db=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn parse_document(raw: Option<String>) -> anyhow::Result<Option<serde_json::Value>> {
    raw.map(|raw| parse_structured(&raw).map_err(|v| anyhow::anyhow!("--polygon-data: {}", v)))
        .transpose()
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn connect(cli: &Cli) -> anyhow::Result<Database> {
    let Some(url) = cli.database_url.as_deref() else {
        bail!("DATABASE_URL is not set (use --database-url or the environment)");
    };
    let schema = SchemaName::parse(&cli.schema)?;
    let config = PoolConfig::from_env()?;
    let pool = resdesc_db::create_pool_with_config(url, config)
        .await
        .context("connecting to PostgreSQL")?;
    Ok(Database::with_options(pool, schema, cli.policy.policy()))
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Commands::Validate {
        kind,
        polygon_data,
        text,
    } = &cli.command
    {
        let record = NewResearchDescription {
            research_id: 0,
            kind: kind.clone(),
            polygon_data: parse_document(polygon_data.clone())?,
            text: text.clone(),
        };
        let report = validate(&record, &cli.policy.policy());
        if report.is_valid() {
            println!("valid");
            return Ok(ExitCode::SUCCESS);
        }
        for violation in report.violations() {
            eprintln!("{}", violation);
        }
        return Ok(ExitCode::FAILURE);
    }

    let db = connect(&cli).await?;
    let repo = &db.descriptions;

    match cli.command {
        Commands::Migrate => {
            let status = db.ensure_schema().await?;
            info!(db_schema = %cli.schema, ?status, "Schema ready");
            print_json(&status)?;
        }
        Commands::Create {
            research_id,
            kind,
            polygon_data,
            text,
        } => {
            let created = repo
                .create(NewResearchDescription {
                    research_id,
                    kind,
                    polygon_data: parse_document(polygon_data)?,
                    text,
                })
                .await?;
            print_json(&created)?;
        }
        Commands::Get { id } => print_json(&repo.get(id).await?)?,
        Commands::List { research_id, order } => {
            print_json(&repo.collect_by_research(research_id, order).await?)?;
        }
        Commands::Update {
            id,
            kind,
            polygon_data,
            clear_polygon_data,
            text,
            clear_text,
        } => {
            let mut patch = ResearchDescriptionPatch {
                kind,
                ..Default::default()
            };
            if clear_polygon_data {
                patch.polygon_data = Some(None);
            } else if let Some(document) = parse_document(polygon_data)? {
                patch.polygon_data = Some(Some(document));
            }
            if clear_text {
                patch.text = Some(None);
            } else if let Some(text) = text {
                patch.text = Some(Some(text));
            }
            print_json(&repo.update(id, patch).await?)?;
        }
        Commands::Delete { id } => {
            let removed = repo.delete(id).await?;
            print_json(&serde_json::json!({ "id": id, "removed": removed }))?;
        }
        Commands::Validate { .. } => unreachable!("handled before connecting"),
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_logging();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_update_clear_flags() {
        let cli = Cli::try_parse_from(["resdesc", "update", "3", "--clear-text", "-t", "point"])
            .unwrap();
        match cli.command {
            Commands::Update {
                id,
                kind,
                clear_text,
                clear_polygon_data,
                ..
            } => {
                assert_eq!(id, 3);
                assert_eq!(kind.as_deref(), Some("point"));
                assert!(clear_text);
                assert!(!clear_polygon_data);
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn test_update_rejects_text_and_clear_text() {
        let result = Cli::try_parse_from(["resdesc", "update", "3", "--text", "x", "--clear-text"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_list_order_parses() {
        let cli = Cli::try_parse_from(["resdesc", "list", "42", "--order", "desc"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::List {
                research_id: 42,
                order: Some(ListOrder::IdDescending)
            }
        ));
    }

    #[test]
    fn test_policy_flags() {
        let cli =
            Cli::try_parse_from(["resdesc", "--strict-geometry", "--allow-empty", "migrate"])
                .unwrap();
        let policy = cli.policy.policy();
        assert!(policy.strict_geometry);
        assert!(!policy.require_content);
    }

    #[test]
    fn test_parse_document_rejects_scalar() {
        assert!(parse_document(Some("5".to_string())).is_err());
        assert!(parse_document(None).unwrap().is_none());
        assert_eq!(
            parse_document(Some(r#"{"coordinates": []}"#.to_string())).unwrap(),
            Some(serde_json::json!({"coordinates": []}))
        );
    }
}
