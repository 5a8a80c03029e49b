//! dumplings CLI binary entry point.

use std::sync::Arc;

use clap::Parser;
use dumplings::agent::{stdout_sink, Agent, AgentDirectory, TurnOutcome};
use dumplings::cli::{AgentsArgs, Cli, Commands, RunArgs};
use dumplings::config::{AgentSpec, MeshConfig};
use dumplings::tools::{FnTool, ToolAccess, ToolParameters, ToolRegistry};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    dumplings::logging::init_logging(&cli.log_level);

    let result = match cli.command {
        Commands::Run(args) => handle_run(args).await,
        Commands::Agents(args) => handle_agents(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn handle_agents(args: AgentsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = MeshConfig::load(&args.config)?;
    for spec in &config.agents {
        let model = spec
            .model
            .as_deref()
            .or(config.defaults.model.as_deref())
            .unwrap_or("-");
        match &spec.uuid {
            Some(uuid) => println!("{} ({uuid}) model={model}", spec.name),
            None => println!("{} model={model}", spec.name),
        }
    }
    for server in &config.mcp_servers {
        println!("mcp server {} -> {} {}", server.name, server.command, server.args.join(" "));
    }
    Ok(())
}

async fn handle_run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => MeshConfig::load(path)?,
        None => MeshConfig::from_env(),
    };
    if config.agents.is_empty() {
        config.agents.push(AgentSpec {
            uuid: None,
            name: args.agent.clone(),
            prompt: "You are a helpful assistant.".into(),
            endpoint: None,
            model: None,
            api_key_env: None,
            stream: None,
            native_tools: None,
        });
    }

    let registry = Arc::new(ToolRegistry::new());
    registry.register(
        Arc::new(FnTool::new(
            "get_time",
            "Get the current time",
            ToolParameters::empty(),
            |_input, _ctx| async { Ok(serde_json::json!("11:03")) },
        )),
        if args.get_time_agents.is_empty() {
            ToolAccess::Unrestricted
        } else {
            ToolAccess::only(args.get_time_agents.iter().cloned())
        },
    )?;

    #[cfg(feature = "mcp")]
    for server in &config.mcp_servers {
        let provider = Arc::new(dumplings::mcp::provider_from_spec(server));
        provider.spawn_idle_sweep(std::time::Duration::from_secs((server.max_idle_secs / 2).max(1)));
        provider
            .register_with(&registry, ToolAccess::from_list(server.allowed_agents.clone()))
            .await?;
    }

    let directory = AgentDirectory::new();
    for settings in config.resolve_agents()? {
        let agent = Agent::builder(settings)
            .with_registry(Arc::clone(&registry))
            .with_sink(stdout_sink())
            .with_limits(config.limits)
            .connect()
            .await?;
        directory.insert(agent)?;
    }

    let handle = directory.resolve(&args.agent)?;
    let outcome = {
        let mut agent = handle.lock().await;
        if args.images.is_empty() {
            agent.converse(args.message).await?
        } else {
            agent.converse_with_images(args.message, &args.images).await?
        }
    };

    match outcome {
        TurnOutcome::Answer(text) => println!("\n{text}"),
        TurnOutcome::Completed { report } if report.is_empty() => println!("\nTask complete."),
        TurnOutcome::Completed { report } => println!("\nTask complete: {report}"),
    }
    let usage = handle.lock().await.usage();
    eprintln!("usage: {usage}");
    Ok(())
}
