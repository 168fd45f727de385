use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::debug;
use tabled::builder::Builder;
use tabled::settings::Style;

use batfish::answer::Answer;
use batfish::question::QuestionTemplate;
use batfish::session::Session;
use batfish::transport::CoordinatorConfig;

#[derive(Parser)]
#[command(author, version, about = "Client for the Batfish analysis service", long_about = None)]
struct Cli {
    /// Coordinator host
    #[arg(long, default_value = "localhost")]
    host: String,
    /// API key for the coordinator
    #[arg(long)]
    api_key: Option<String>,
    /// Network to operate on
    #[arg(long, short)]
    network: Option<String>,
    /// Snapshot to operate on
    #[arg(long, short)]
    snapshot: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Network management
    Networks {
        #[command(subcommand)]
        command: NetworkCommands,
    },
    /// Snapshot management
    Snapshots {
        #[command(subcommand)]
        command: SnapshotCommands,
    },
    /// List the backend's question templates
    Questions {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Answer a question from a template file
    Ask {
        /// Path to the question template JSON
        template: PathBuf,
        /// Parameter values as name=value pairs (values parse as JSON,
        /// falling back to plain strings)
        #[arg(short, long)]
        param: Vec<String>,
        /// Reference snapshot for differential questions
        #[arg(long)]
        reference_snapshot: Option<String>,
        /// Submit in the background and print the work id
        #[arg(long)]
        background: bool,
        /// Output the raw answer JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Check the status of a background work item
    Status {
        /// Work item id returned by ask --background
        work_id: String,
    },
}

#[derive(Subcommand)]
enum NetworkCommands {
    /// List networks on the coordinator
    List,
    /// Delete a network
    Delete { name: String },
}

#[derive(Subcommand)]
enum SnapshotCommands {
    /// List snapshots in the current network
    List,
    /// Upload and parse a snapshot directory or zip archive
    Init {
        path: PathBuf,
        /// Snapshot name (auto-generated if omitted)
        #[arg(long)]
        name: Option<String>,
        /// Replace an existing snapshot of the same name
        #[arg(long)]
        overwrite: bool,
    },
    /// Fork an existing snapshot under a new name
    Fork {
        base: String,
        name: String,
        /// Replace an existing snapshot of the same name
        #[arg(long)]
        overwrite: bool,
    },
    /// Delete a snapshot
    Delete { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = CoordinatorConfig {
        host: cli.host.clone(),
        ..CoordinatorConfig::default()
    };
    if let Some(api_key) = &cli.api_key {
        config.api_key = api_key.clone();
    }
    let mut session = Session::connect(&config).await?;
    if let Some(network) = &cli.network {
        session.set_network(network).await?;
    }
    if let Some(snapshot) = &cli.snapshot {
        session.set_snapshot(snapshot).await?;
    }

    match cli.command {
        Commands::Networks { command } => match command {
            NetworkCommands::List => {
                for name in session.list_networks().await? {
                    println!("{}", name);
                }
            }
            NetworkCommands::Delete { name } => {
                session.delete_network(&name).await?;
                println!("deleted network {}", name);
            }
        },
        Commands::Snapshots { command } => match command {
            SnapshotCommands::List => {
                for name in session.list_snapshots().await? {
                    println!("{}", name);
                }
            }
            SnapshotCommands::Init {
                path,
                name,
                overwrite,
            } => {
                let snapshot = session
                    .init_snapshot(&path, name.as_deref(), overwrite)
                    .await?;
                println!("initialized snapshot {}", snapshot);
            }
            SnapshotCommands::Fork {
                base,
                name,
                overwrite,
            } => {
                let snapshot = session.fork_snapshot(&base, &name, overwrite).await?;
                println!("forked snapshot {} from {}", snapshot, base);
            }
            SnapshotCommands::Delete { name } => {
                session.delete_snapshot(&name).await?;
                println!("deleted snapshot {}", name);
            }
        },
        Commands::Questions { json } => {
            let templates = session.questions().await?;
            if json {
                let names: Vec<&String> = templates.keys().collect();
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else {
                print_question_table(&templates);
            }
        }
        Commands::Ask {
            template,
            param,
            reference_snapshot,
            background,
            json,
        } => {
            let raw = std::fs::read_to_string(&template)
                .with_context(|| format!("could not read template {}", template.display()))?;
            let template = QuestionTemplate::from_dict(&serde_json::from_str(&raw)?)?;
            let question = template.instantiate(None, parse_params(&param)?)?;
            debug!("asking question {}", question.instance_name);
            if background {
                let work_id = session
                    .answer_background(&question, None, reference_snapshot.as_deref())
                    .await?;
                println!("{}", work_id);
            } else {
                let answer = session
                    .answer_with(&question, None, reference_snapshot.as_deref())
                    .await?;
                render_answer(&answer, json)?;
            }
        }
        Commands::Status { work_id } => {
            let (status, task) = session.work_status(&work_id).await?;
            println!("{}", status);
            for batch in task.batches {
                println!("  {}: {}/{}", batch.description, batch.completed, batch.size);
            }
        }
    }
    Ok(())
}

/// Parses `name=value` parameters; values parse as JSON with a plain-string
/// fallback so `nodes=border-.*` works without quoting.
fn parse_params(params: &[String]) -> Result<HashMap<String, serde_json::Value>> {
    let mut args = HashMap::new();
    for param in params {
        let (name, raw) = param
            .split_once('=')
            .ok_or_else(|| anyhow!("parameter {:?} is not in name=value form", param))?;
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        args.insert(name.to_string(), value);
    }
    Ok(args)
}

fn print_question_table(templates: &HashMap<String, QuestionTemplate>) {
    let mut names: Vec<&String> = templates.keys().collect();
    names.sort();

    let mut builder = Builder::default();
    builder.push_record(["NAME", "DESCRIPTION"]);
    for name in names {
        let description = templates[name].description.clone().unwrap_or_default();
        builder.push_record([name.as_str(), description.as_str()]);
    }
    let mut table = builder.build();
    table.with(Style::sharp());
    println!("{}", table);
}

fn render_answer(answer: &Answer, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(answer.raw())?);
        return Ok(());
    }
    match answer.as_table() {
        Some(table) => {
            let mut builder = Builder::default();
            builder.push_record(table.column_names());
            for record in table.records() {
                builder.push_record(record.iter().map(|cell| cell.to_string()));
            }
            let mut rendered = builder.build();
            rendered.with(Style::sharp());
            println!("{}", rendered);
            if let Some(count) = answer.num_results() {
                println!("{} results", count);
            }
        }
        None => println!("{}", serde_json::to_string_pretty(answer.raw())?),
    }
    Ok(())
}
