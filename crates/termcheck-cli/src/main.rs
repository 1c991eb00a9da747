use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use termcheck_core::{ComponentIdentifier, IssueQuery, ResultId, RuleId, ValidateRequest};
use termcheck_runner::Runner;

#[derive(Parser)]
#[command(name = "termcheck", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize termcheck in the current repo (creates .termcheck/, config, catalog, db)
    Init,

    /// List catalog rules and print the catalog fingerprint
    Rules,

    /// Run validation rules against a resource and reconcile the stored issues
    Validate {
        /// Result id to reconcile into; a fresh one is generated when omitted
        #[arg(long)]
        result: Option<String>,
        #[arg(long)]
        resource: String,
        /// Rule id to run (repeatable); all catalog rules when omitted
        #[arg(long = "rule")]
        rules: Vec<String>,
        /// Run parameter as key=value; the value is parsed as JSON, else taken as a string
        #[arg(long = "param")]
        params: Vec<String>,
    },

    /// Print stored issues as JSON lines
    Issues {
        #[arg(long)]
        result: Option<String>,
        #[arg(long = "rule")]
        rules: Vec<String>,
        #[arg(long)]
        whitelisted: Option<bool>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Delete every stored issue of a result
    Purge {
        #[arg(long)]
        result: String,
    },

    /// Manage whitelist entries
    Whitelist {
        #[command(subcommand)]
        cmd: WhitelistCommand,
    },
}

#[derive(Subcommand)]
enum WhitelistCommand {
    Add {
        #[arg(long)]
        rule: String,
        #[arg(long = "type", default_value = "concept")]
        component_type: String,
        #[arg(long = "id")]
        component_id: String,
        #[arg(long, default_value = "cli")]
        reporter: String,
    },
    Remove {
        ids: Vec<String>,
    },
    List,
}

fn parse_param(raw: &str) -> Result<(String, serde_json::Value)> {
    let (key, value) = raw.split_once('=').ok_or_else(|| anyhow!("expected key=value, got {raw:?}"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => {
            Runner::init_repo(&repo_root)?;
            println!("Initialized termcheck in {}", repo_root.display());
        }
        Command::Rules => {
            let r = Runner::open(repo_root)?;
            let rules = r.rules()?;
            for rule in &rules {
                let check_type = rule.check_type.map(|c| c.as_str()).unwrap_or("-");
                println!("{} [{}] {} {}", rule.id, check_type, rule.evaluator_type, rule.message);
            }
            println!("{} rules, fingerprint {}", rules.len(), r.fingerprint());
        }
        Command::Validate {
            result,
            resource,
            rules,
            params,
        } => {
            let r = Runner::open(repo_root)?;
            let result_id = result.map(ResultId::from_str).unwrap_or_default();
            let mut request = ValidateRequest::new(result_id, resource).with_rules(rules);
            for raw in &params {
                let (key, value) = parse_param(raw)?;
                request = request.with_parameter(key, value);
            }
            let descriptor = r.validate(request)?;
            info!(result_id = %descriptor.result_id, "validation complete");
            println!("{}", serde_json::to_string(&descriptor)?);
        }
        Command::Issues {
            result,
            rules,
            whitelisted,
            limit,
        } => {
            let r = Runner::open(repo_root)?;
            let query = IssueQuery {
                result_id: result.map(ResultId::from_str),
                rule_ids: rules.into_iter().map(RuleId::from_str).collect(),
                whitelisted,
                limit,
                ..IssueQuery::default()
            };
            for issue in r.issues(&query)? {
                println!("{}", serde_json::to_string(&issue)?);
            }
        }
        Command::Purge { result } => {
            let r = Runner::open(repo_root)?;
            r.purge(&ResultId::from_str(result.clone()))?;
            println!("Purged issues of {}", result);
        }
        Command::Whitelist { cmd } => {
            let r = Runner::open(repo_root)?;
            match cmd {
                WhitelistCommand::Add {
                    rule,
                    component_type,
                    component_id,
                    reporter,
                } => {
                    let id = r.whitelist_add(&rule, ComponentIdentifier::new(component_type, component_id), &reporter)?;
                    println!("Added whitelist entry {}", id);
                }
                WhitelistCommand::Remove { ids } => {
                    let removed = r.whitelist_remove(&ids)?;
                    println!("Removed {} whitelist entries", removed);
                }
                WhitelistCommand::List => {
                    for entry in r.whitelist()? {
                        println!("{}", serde_json::to_string(&entry)?);
                    }
                }
            }
        }
    }

    Ok(())
}
