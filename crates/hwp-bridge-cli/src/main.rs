//! hwpb - drive the HWP automation bridge from the command line

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use hwp_bridge::{
    locate_host, BridgeConfig, Hwp, Kwargs, SecurityModuleRegistrar, Value,
};
use hwp_bridge_protocol::{Request, Response};
use std::io::{self, BufRead, BufReader, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hwpb")]
#[command(author, version, about = "Drive the HWP word processor through the bridge helper")]
struct Cli {
    #[command(flatten)]
    bridge: BridgeArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct BridgeArgs {
    /// Helper executable (default: $HWP_BRIDGE_HOST, then next to hwpb)
    #[arg(long, global = true)]
    host_exe: Option<PathBuf>,

    /// Program to start the helper with, e.g. `wine`
    #[arg(long, global = true)]
    launcher: Option<PathBuf>,

    /// WINEPREFIX for the launcher
    #[arg(long, global = true)]
    wine_prefix: Option<PathBuf>,

    /// Connect to a helper that is already listening instead of spawning one
    #[arg(long, global = true)]
    attach: Option<SocketAddr>,

    /// Use the in-memory test document instead of the word processor
    #[arg(long, global = true)]
    memo: bool,

    /// Keep the word processor window hidden
    #[arg(long, global = true)]
    hidden: bool,

    /// How long to wait for the helper, in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the helper executable that would be started
    Locate,

    /// Register the file path checker security module
    Register {
        /// Module DLL (default: search next to hwpb and the helper)
        module: Option<PathBuf>,
    },

    /// Call one method and print its result as JSON
    Call {
        /// Method or property name, e.g. `insert_text`
        method: String,

        /// Positional arguments; JSON literals, anything else is passed as a string
        args: Vec<String>,

        /// Keyword argument as NAME=JSON (repeatable)
        #[arg(short, long = "kwarg", value_name = "NAME=VALUE")]
        kwargs: Vec<String>,
    },

    /// Run requests from a file (one JSON request per line, `-` for stdin)
    Script {
        /// Request file
        input: PathBuf,

        /// Stop at the first failing request
        #[arg(long)]
        fail_fast: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.bridge.to_config();

    match cli.command {
        Commands::Locate => {
            let exe = locate_host(&config).context("Helper executable not found")?;
            println!("{}", exe.display());
            Ok(())
        }
        Commands::Register { module } => register(&config, module),
        Commands::Call {
            method,
            args,
            kwargs,
        } => {
            let args: Vec<Value> = args.iter().map(|a| parse_value(a)).collect();
            let kwargs = kwargs
                .iter()
                .map(|kv| parse_kwarg(kv))
                .collect::<Result<Kwargs>>()?;

            let hwp = connect(&cli.bridge, config)?;
            let outcome = hwp.call_with(&method, args, kwargs);
            hwp.shutdown();

            let value = outcome.with_context(|| format!("{method} failed"))?;
            println!("{}", serde_json::to_string(&value)?);
            Ok(())
        }
        Commands::Script { input, fail_fast } => {
            let reader: Box<dyn BufRead> = if input.as_os_str() == "-" {
                Box::new(BufReader::new(io::stdin()))
            } else {
                let file = std::fs::File::open(&input)
                    .with_context(|| format!("Failed to open '{}'", input.display()))?;
                Box::new(BufReader::new(file))
            };
            let requests = read_script(reader)?;

            let hwp = connect(&cli.bridge, config)?;
            let outcome = run_script(&hwp, &requests, fail_fast, &mut io::stdout().lock());
            hwp.shutdown();
            outcome
        }
    }
}

impl BridgeArgs {
    fn to_config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::from_env();
        if let Some(exe) = &self.host_exe {
            config.host_exe = Some(exe.clone());
        }
        if let Some(launcher) = &self.launcher {
            config.launcher = Some(launcher.clone());
        }
        if let Some(prefix) = &self.wine_prefix {
            config.wine_prefix = Some(prefix.clone());
        }
        if let Some(ms) = self.timeout_ms {
            config.connect_timeout = Duration::from_millis(ms);
        }
        config.visible = !self.hidden;
        if self.memo {
            config = config.with_memo_target();
        }
        config
    }
}

fn connect(args: &BridgeArgs, config: BridgeConfig) -> Result<Hwp> {
    match args.attach {
        Some(addr) => {
            let create_args = vec![Value::Bool(config.visible), Value::Bool(config.new_instance)];
            let hwp = Hwp::attach(addr, config)
                .with_context(|| format!("Failed to attach to {addr}"))?;
            hwp.create(create_args, Kwargs::new())
                .context("Failed to create the automation object")?;
            Ok(hwp)
        }
        None => Hwp::start(config).context("Failed to start the bridge"),
    }
}

fn register(config: &BridgeConfig, module: Option<PathBuf>) -> Result<()> {
    let mut registrar = SecurityModuleRegistrar::for_platform(config);
    let registered = match module {
        Some(path) => registrar
            .register_path(&path)
            .with_context(|| format!("Failed to register '{}'", path.display()))?,
        None => registrar.ensure_registered(),
    };

    match registrar.registered_path() {
        Some(path) if registered => {
            println!("{} = {}", registrar.key(), path.display());
            Ok(())
        }
        _ => bail!("No security module registered under {}", registrar.key()),
    }
}

/// A JSON literal, or the raw text as a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_kwarg(raw: &str) -> Result<(String, Value)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), parse_value(value)))
        }
        _ => bail!("Invalid keyword argument '{raw}', expected NAME=VALUE"),
    }
}

/// Parse one request per line; blank lines and `#` comments are skipped.
fn read_script(reader: impl BufRead) -> Result<Vec<Request>> {
    let mut requests = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read script")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let request: Request = serde_json::from_str(line)
            .with_context(|| format!("Line {}: not a request", number + 1))?;
        requests.push(request);
    }
    Ok(requests)
}

/// Run each request and write one response line per request.
fn run_script(hwp: &Hwp, requests: &[Request], fail_fast: bool, out: &mut impl Write) -> Result<()> {
    let mut failures = 0usize;
    for request in requests {
        let response = match hwp.call_with(&request.method, request.args.clone(), request.kwargs.clone())
        {
            Ok(value) => Response::ok(value),
            Err(e) => {
                failures += 1;
                Response::error(e.remote_message().map(str::to_string).unwrap_or_else(|| e.to_string()))
            }
        };
        writeln!(out, "{}", serde_json::to_string(&response)?)?;

        if fail_fast && !response.is_ok() {
            break;
        }
    }
    out.flush()?;

    if failures > 0 {
        bail!("{failures} request(s) failed");
    }
    Ok(())
}
