use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use graphprobe::commands::{self, AuditRunner, ListSelector, Selection};
use graphprobe::config::{parse_header, ConfigOverrides};
use graphprobe::fingerprint::EngineFingerprinter;
use graphprobe::introspection::IntrospectionAuditor;
use graphprobe::logging::init_logging;
use graphprobe::network::{DiscoveryEngine, DiscoveryMode, EndpointProber};
use graphprobe::output::JsonFileWriter;
use graphprobe::schema::{OperationGenerator, Schema};
use graphprobe::subscription::SubscriptionClient;
use graphprobe::{Config, Deadline, GraphQLClient, DEFAULT_CONFIG_FILE, VERSION};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version = VERSION)]
struct Cli {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Append logs to this file as well
    #[arg(long, global = true)]
    log_file: Option<String>,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Disable coloured log output
    #[arg(long, global = true)]
    no_color: bool,

    /// Extra request header, e.g. 'Authorization: Bearer xyz' (repeatable)
    #[arg(short = 'H', long = "header", global = true)]
    headers: Vec<String>,

    /// Deadline for the whole run, in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check targets for exposed introspection and save every schema found
    Audit {
        /// Target URL (endpoint, or base URL with --detect)
        #[arg(long)]
        base: Option<String>,

        /// Discover GraphQL endpoints under the base URL first
        #[arg(long)]
        detect: bool,

        /// Output file for introspection results
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Discover GraphQL endpoints under a base URL
    Detect {
        #[arg(long)]
        base: Option<String>,

        /// Stop at the first endpoint found
        #[arg(long)]
        first: bool,
    },

    /// Identify the GraphQL engine behind an endpoint
    Fingerprint {
        #[arg(long)]
        url: Option<String>,
    },

    /// List or generate operations from an introspection result file
    Schema {
        #[arg(short, long)]
        file: Option<String>,

        /// List operations: queries, mutations, subscriptions or all
        #[arg(long)]
        list: Option<String>,

        /// Comma-separated query names to generate
        #[arg(long)]
        query: Option<String>,

        /// Comma-separated mutation names to generate
        #[arg(long)]
        mutation: Option<String>,

        /// Comma-separated subscription names to generate
        #[arg(long)]
        subscription: Option<String>,

        #[arg(long)]
        all_queries: bool,

        #[arg(long)]
        all_mutations: bool,

        /// Depth budget for generated selection sets
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Send one query or mutation and print the response
    Execute {
        #[arg(long)]
        url: Option<String>,

        #[arg(long, conflicts_with = "query_file")]
        query_string: Option<String>,

        #[arg(long)]
        query_file: Option<PathBuf>,

        /// Variables as a JSON object
        #[arg(long, conflicts_with = "vars_file")]
        vars: Option<String>,

        #[arg(long)]
        vars_file: Option<PathBuf>,
    },

    /// Execute every operation of every *.graphql file in a directory
    Batch {
        #[arg(long)]
        dir: PathBuf,

        #[arg(long)]
        url: Option<String>,
    },

    /// Open a subscription and print incoming messages
    Subscribe {
        #[arg(long)]
        ws_url: Option<String>,

        /// Subscription document (read from stdin when omitted)
        #[arg(long)]
        query: Option<String>,
    },
}

impl Cli {
    fn overrides(&self) -> Result<ConfigOverrides> {
        let mut headers = HashMap::new();
        for raw in &self.headers {
            let (name, value) = parse_header(raw)?;
            headers.insert(name, value);
        }

        let mut overrides = ConfigOverrides {
            timeout_seconds: self.timeout,
            headers,
            log_level: self.log_level.clone(),
            log_format: self.log_format.clone(),
            log_file: self.log_file.clone(),
            no_color: self.no_color,
            ..Default::default()
        };

        match &self.command {
            Command::Audit { base, detect, output } => {
                overrides.base_url = base.clone();
                overrides.detect = *detect;
                overrides.output = output.clone();
            }
            Command::Detect { base, .. } => overrides.base_url = base.clone(),
            Command::Fingerprint { url }
            | Command::Execute { url, .. }
            | Command::Batch { url, .. } => overrides.base_url = url.clone(),
            Command::Schema { file, max_depth, .. } => {
                overrides.schema_file = file.clone();
                overrides.max_depth = *max_depth;
            }
            Command::Subscribe { ws_url, .. } => overrides.ws_url = ws_url.clone(),
        }

        Ok(overrides)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    });
    let config = Config::load(config_path.as_deref(), &cli.overrides()?)?;

    init_logging(&config.logging)?;
    if let Some(path) = &config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let result = run(cli.command, &config).await;
    if let Err(e) = &result {
        error!("{}", e);
    }
    result
}

fn require<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str> {
    value.ok_or_else(|| anyhow!("{} is required", what))
}

/// Root deadline for the run; Ctrl-C cancels it
fn root_deadline(deadline: Deadline) -> Deadline {
    let interrupt = deadline.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt signal, shutting down...");
            interrupt.cancel();
        }
    });
    deadline
}

async fn run(command: Command, config: &Config) -> Result<()> {
    let headers = config.request_headers();
    let base_url = config.target.base_url.as_deref();

    match command {
        Command::Audit { .. } => {
            let base_url = require(base_url, "--base")?;
            let deadline = root_deadline(Deadline::after(config.run_timeout()));
            let client = GraphQLClient::new(config.request_timeout())?;
            let engine = DiscoveryEngine::new(EndpointProber::new(client.clone(), headers.clone()))
                .with_extra_paths(&config.target.paths);

            let targets =
                commands::resolve_targets(&engine, base_url, config.target.detect, &deadline).await?;
            let runner = AuditRunner::new(
                IntrospectionAuditor::new(client),
                Arc::new(JsonFileWriter),
                config.output.file.clone(),
            );
            let summary = runner.run(&targets, &headers, &deadline).await;
            summary.log();
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Detect { first, .. } => {
            let base_url = require(base_url, "--base")?;
            let deadline = root_deadline(Deadline::after(config.run_timeout()));
            let client = GraphQLClient::new(config.request_timeout())?;
            let engine = DiscoveryEngine::new(EndpointProber::new(client, headers))
                .with_extra_paths(&config.target.paths);
            let mode = if first {
                DiscoveryMode::StopOnFirst
            } else {
                DiscoveryMode::CollectAll
            };

            for endpoint in engine.discover(base_url, mode, &deadline).await? {
                println!("{}", endpoint);
            }
        }

        Command::Fingerprint { .. } => {
            let url = require(base_url, "--url")?;
            let deadline = root_deadline(Deadline::after(config.run_timeout()));
            let client = GraphQLClient::new(config.request_timeout())?;
            let engine = EngineFingerprinter::new(client)
                .fingerprint(url, &headers, &deadline)
                .await?;
            println!("{}", engine);
        }

        Command::Schema {
            list,
            query,
            mutation,
            subscription,
            all_queries,
            all_mutations,
            ..
        } => {
            let file = require(config.schema.file.as_deref(), "--file")?;
            let schema = Schema::load_from_file(file)?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();

            if let Some(list) = list {
                let selector: ListSelector = list.parse()?;
                commands::list_operations(&schema, selector, &mut out)?;
                return Ok(());
            }

            let selection = Selection {
                queries: Selection::split_names(query.as_deref()),
                mutations: Selection::split_names(mutation.as_deref()),
                subscriptions: Selection::split_names(subscription.as_deref()),
                all_queries,
                all_mutations,
            };
            let generator = OperationGenerator::new(&schema)
                .with_max_depth(config.schema.max_depth)
                .with_repeat_visit_limit(config.schema.repeat_visit_limit);
            let operations = selection.resolve(&schema);
            let printed = commands::print_operations(&generator, &operations, &mut out)?;
            if printed < operations.len() {
                warn!(
                    "{} of {} operations could not be generated",
                    operations.len() - printed,
                    operations.len()
                );
            }
        }

        Command::Execute {
            query_string,
            query_file,
            vars,
            vars_file,
            ..
        } => {
            let url = require(base_url, "--url")?;
            let query = commands::load_query(query_string.as_deref(), query_file.as_deref())?;
            let variables = commands::load_variables(vars.as_deref(), vars_file.as_deref())?;
            let deadline = root_deadline(Deadline::after(config.run_timeout()));
            let client = GraphQLClient::new(config.request_timeout())?;

            let response =
                commands::execute(&client, url, &query, variables, &headers, &deadline).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Command::Batch { dir, .. } => {
            let url = require(base_url, "--url")?;
            let deadline = root_deadline(Deadline::after(config.run_timeout()));
            let client = GraphQLClient::new(config.request_timeout())?;

            let results = commands::run_batch(&client, url, &dir, &headers, &deadline).await?;
            for result in results {
                if let Ok(response) = result.response {
                    println!(
                        "Result for {} (from {}):\n{}",
                        result.operation,
                        result.file,
                        serde_json::to_string_pretty(&response)?
                    );
                }
            }
        }

        Command::Subscribe { query, .. } => {
            let ws_url = require(config.subscription.ws_url.as_deref(), "--ws-url")?;
            let query = match query {
                Some(query) => query,
                None => read_query_from_stdin().await?,
            };
            let deadline = root_deadline(Deadline::unbounded());
            let client = SubscriptionClient::new(ws_url)
                .with_headers(headers)
                .with_handshake_timeout(config.handshake_timeout())
                .with_subprotocol_negotiation(config.subscription.negotiate_subprotocol);

            let mut session = client.subscribe(&query, &deadline).await?;
            info!("Subscription established. Listening for updates...");
            session
                .listen(&deadline, |message| match serde_json::to_string(&message) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("Failed to render message: {}", e),
                })
                .await?;
        }
    }

    Ok(())
}

async fn read_query_from_stdin() -> Result<String> {
    eprintln!("Subscription mode enabled. Please enter your subscription query:");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let line = lines
        .next_line()
        .await?
        .ok_or_else(|| anyhow!("No subscription query provided on stdin"))?;
    let query = line.trim().to_string();
    if query.is_empty() {
        return Err(anyhow!("No subscription query provided on stdin"));
    }
    Ok(query)
}
