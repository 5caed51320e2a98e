use clap::{command, Parser};
use std::{path::PathBuf, sync::Arc};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use trackhub::{
    config::Configuration, dispatcher::DispatchEngine, event::SimpleEvent, trackers::LogTracker,
    Error, InternalResult, Value,
};

/// Dispatches a single event to log trackers. Useful for checking a
/// configuration file and the resulting merged parameters.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Event name
    #[arg(short, long)]
    event: String,

    /// Event parameter as key=value; values are parsed as JSON when possible
    #[arg(short, long = "param", value_parser = parse_parameter)]
    params: Vec<(String, Value)>,

    /// Tracker ids to register and target
    #[arg(short, long = "tracker", default_value = "log")]
    trackers: Vec<String>,

    /// Enable debug mode
    #[arg(short, long)]
    verbose: bool,
}

fn parse_parameter(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{}`", raw))?;
    if key.is_empty() {
        return Err(format!("empty key in `{}`", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

async fn run(cli: Cli) -> InternalResult<()> {
    let config = match &cli.config {
        Some(path) => Configuration::from_file(path)?,
        None => Configuration::default(),
    };
    info!("config loaded.");
    debug!("config: {:?}", config);

    let engine = DispatchEngine::new(config)?;
    for id in &cli.trackers {
        engine.add_tracker(Arc::new(LogTracker::new(id.as_str())));
    }

    let event = SimpleEvent::builder()
        .name(&cli.event)
        .parameters(cli.params.into_iter().collect())
        .trackers(cli.trackers.iter().map(String::as_str))
        .build()?;
    engine.dispatch(&event);
    engine.flush().await;

    info!("dispatched {} event(s)", engine.dispatched_count());
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        let code = match e {
            Error::InvalidConfiguration(_) | Error::Parse(_) | Error::Io(_) => 2,
            _ => 1,
        };
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parameter() {
        assert_eq!(
            parse_parameter("count=3").unwrap(),
            ("count".to_string(), Value::from(3))
        );
        assert_eq!(
            parse_parameter("user=alice").unwrap(),
            ("user".to_string(), Value::from("alice"))
        );
        assert!(parse_parameter("novalue").is_err());
        assert!(parse_parameter("=x").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "trackhub", "--event", "login", "-p", "user=a", "-t", "firebase", "-t", "facebook",
        ])
        .unwrap();
        assert_eq!(cli.event, "login");
        assert_eq!(cli.params.len(), 1);
        assert_eq!(cli.trackers, vec!["firebase", "facebook"]);
    }
}
