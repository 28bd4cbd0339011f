//! # `osapi`
//!
//! Drives the handler registry from the command line against the in-memory
//! `people` directory.
//!
//! ```bash
//! osapi routes
//! osapi rest GET /people/john/@self
//! osapi --viewer john rpc '[{"method": "people.get", "id": 1, "params": {"userId": "@me"}}]'
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use osapi_core::{BasicToken, JsonConverter, ParamMap, RequestContext, SecurityToken};
use osapi_server::sample::{PeopleService, Person};
use osapi_server::{DispatchRequest, HandlerRegistry, RegistryConfig, RegistryService};
use tower::ServiceExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "osapi", version, about = "Dispatch REST and RPC calls through the handler registry")]
struct CliArgs {
    /// Page size used when a request omits `count`.
    #[arg(long, env = "OSAPI_COUNT_DEFAULT", default_value_t = 20)]
    count_default: u32,

    /// Upper bound for `count`; zero disables the clamp.
    #[arg(long, env = "OSAPI_MAX_COUNT", default_value_t = 0)]
    max_count: u32,

    /// Do not register the `system` service.
    #[arg(long)]
    no_system: bool,

    /// Viewer id carried by the request token. Anonymous when omitted.
    #[arg(long, env = "OSAPI_VIEWER")]
    viewer: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every registered REST route and RPC method.
    Routes,
    /// Dispatch one REST call.
    Rest {
        verb: String,
        path: String,
        /// Query parameter as `name=value`; repeatable.
        #[arg(long = "param", value_parser = parse_pair)]
        params: Vec<(String, String)>,
        /// Request body text.
        #[arg(long)]
        body: Option<String>,
    },
    /// Dispatch an RPC request object, array, or keyed batch.
    Rpc {
        envelope: String,
        /// Binary part attached as `name=path`; repeatable.
        #[arg(long = "part", value_parser = parse_part)]
        parts: Vec<(String, PathBuf)>,
    },
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got `{raw}`"))
}

fn parse_part(raw: &str) -> Result<(String, PathBuf), String> {
    parse_pair(raw).map(|(k, v)| (k, PathBuf::from(v)))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn directory() -> Arc<PeopleService> {
    Arc::new(PeopleService::with_people([
        Person::new("john", "John Doe"),
        Person::new("jane", "Jane Doe"),
        Person::new("george", "George Doe"),
    ]))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::try_parse()?;
    init_tracing();

    let config = RegistryConfig {
        default_count: args.count_default,
        max_count: args.max_count,
        expose_system_service: !args.no_system,
        ..RegistryConfig::default()
    };
    let registry = HandlerRegistry::builder(config)
        .register(directory().bundle())?
        .build()?;
    info!(
        routes = registry.supported_rest_services().len(),
        methods = registry.supported_rpc_services().len(),
        "registry ready"
    );

    let token: Arc<dyn SecurityToken> = Arc::new(BasicToken {
        owner: args.viewer.clone(),
        viewer: args.viewer,
        app: None,
        container: None,
    });
    let mut ctx = RequestContext::new(token, Arc::new(JsonConverter));

    let request = match args.command {
        Command::Routes => {
            for route in registry.supported_rest_services() {
                println!("{route}");
            }
            for method in registry.supported_rpc_services() {
                println!("{method}");
            }
            return Ok(());
        }
        Command::Rest {
            verb,
            path,
            params,
            body,
        } => {
            let mut query = ParamMap::new();
            for (name, value) in params {
                query.entry(name).or_default().push(value);
            }
            DispatchRequest::Rest {
                path,
                verb,
                params: query,
                body,
                ctx,
            }
        }
        Command::Rpc { envelope, parts } => {
            for (name, path) in parts {
                let data = std::fs::read(&path)
                    .with_context(|| format!("reading part {name} from {}", path.display()))?;
                ctx = ctx.with_form_part(name, Bytes::from(data));
            }
            let envelope = serde_json::from_str(&envelope).context("parsing RPC envelope")?;
            DispatchRequest::Batch { envelope, ctx }
        }
    };

    match RegistryService::new(Arc::new(registry)).oneshot(request).await {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(err) => {
            let wire = err.to_wire();
            println!("{}", serde_json::to_string_pretty(&wire.wire_body())?);
            anyhow::bail!("request failed with {}", wire.code());
        }
    }
    Ok(())
}
