//! keyrelay CLI - pair with a key-holding device and relay signing requests

mod render;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use keyrelay_core::poll::wait_for_any_resolution;
use keyrelay_core::{
    create_pairing_payload, parse_pairing_payload, ClientConfig, DeviceRegistration,
    EndpointState, HttpPushNotifier, HttpRelay, ImportAccountRequest, PairingRequest,
    RelayClient, RequestType, SharedSecret, SignMessageRequest, SignPersonalMessageRequest,
    SignTransactionRequest, SignTypedDataRequest, SubmitOptions, Submitted,
};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Pair with a key-holding device and relay signing requests through a room
#[derive(Parser)]
#[command(name = "keyrelay")]
#[command(about = "Encrypted pairing and request relay for signing endpoints", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pairing state file (defaults to the platform data dir)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, join or drop a pairing
    #[command(subcommand)]
    Pair(PairCommand),

    /// Manage the push registration of the key-holding device
    #[command(subcommand)]
    Device(DeviceCommand),

    /// Submit, inspect and answer requests in the paired room
    #[command(subcommand)]
    Request(RequestCommand),
}

#[derive(Subcommand)]
enum PairCommand {
    /// Generate a new shared secret and print its pairing string
    New {
        /// Correlation id echoed back by the other endpoint
        #[arg(long)]
        correlation_id: Option<String>,

        /// Replace an existing pairing
        #[arg(long)]
        force: bool,
    },

    /// Join a pairing from a `keyrelay://pair/...` string
    Join {
        transport: String,

        /// Replace an existing pairing
        #[arg(long)]
        force: bool,
    },

    /// Show the current pairing
    Show,

    /// Forget the current pairing
    Forget,
}

#[derive(Subcommand)]
enum DeviceCommand {
    /// Publish this device's push registration to the room
    Register {
        #[arg(long)]
        push_token: String,

        #[arg(long)]
        name: String,
    },

    /// Show the room's push registration
    Show,

    /// Remove the room's push registration
    Remove,
}

#[derive(Subcommand)]
enum RequestCommand {
    /// Submit a new pending request
    Submit {
        #[arg(value_parser = parse_request_type)]
        request_type: RequestType,

        /// Signing account address
        #[arg(long)]
        from: Option<String>,

        /// Message for signPersonalMessage (text) or signMessage (hex)
        #[arg(long)]
        message: Option<String>,

        /// Transaction JSON for signTransaction
        #[arg(long)]
        transaction: Option<String>,

        /// Typed data JSON for signTypedData
        #[arg(long)]
        typed_data: Option<String>,

        /// Wake the key-holding device through its push token
        #[arg(long)]
        notify: bool,
    },

    /// List requests in the room
    List,

    /// Show one request
    Get {
        id: String,

        #[arg(long = "type", value_parser = parse_request_type)]
        request_type: RequestType,
    },

    /// Delete a request
    Delete { id: String },

    /// Approve a pending request with a signature
    Approve {
        id: String,

        #[arg(long = "type", value_parser = parse_request_type)]
        request_type: RequestType,

        #[arg(long)]
        signature: Option<String>,

        /// Account address, for importAccount
        #[arg(long)]
        address: Option<String>,
    },

    /// Reject a pending request
    Reject {
        id: String,

        #[arg(long = "type", value_parser = parse_request_type)]
        request_type: RequestType,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Wait until a request leaves `pending`
    Wait {
        id: String,

        #[arg(long = "type", value_parser = parse_request_type)]
        request_type: RequestType,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Milliseconds between reads
        #[arg(long)]
        interval: Option<u64>,
    },
}

fn parse_request_type(s: &str) -> std::result::Result<RequestType, String> {
    RequestType::parse(s).ok_or_else(|| {
        let known: Vec<&str> = RequestType::ALL.iter().map(|t| t.as_str()).collect();
        format!("unknown request type {:?} (expected one of {})", s, known.join(", "))
    })
}

struct Session {
    config: ClientConfig,
    state_path: PathBuf,
}

impl Session {
    fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
        let config = ClientConfig::load_or_default(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?;
        let state_path = cli.state.clone().unwrap_or_else(EndpointState::default_path);
        Ok(Self { config, state_path })
    }

    fn state(&self) -> Result<EndpointState> {
        EndpointState::load(&self.state_path)?
            .ok_or_else(|| anyhow!("Not paired. Run `keyrelay pair new` or `keyrelay pair join` first."))
    }

    fn ensure_unpaired(&self, force: bool) -> Result<()> {
        if !force && EndpointState::load(&self.state_path)?.is_some() {
            bail!(
                "Already paired ({}). Pass --force to replace the pairing.",
                self.state_path.display()
            );
        }
        Ok(())
    }

    fn client(&self, state: &EndpointState) -> Result<RelayClient> {
        let relay = HttpRelay::new(&self.config.relay_url, self.config.http_timeout())?;
        let mut client = RelayClient::new(Arc::new(relay), state.shared_secret.clone());
        if let Some(push_url) = &self.config.push_url {
            let notifier = HttpPushNotifier::new(push_url, self.config.http_timeout())?;
            client = client.with_notifier(Arc::new(notifier));
        }
        if let Some(token) = &state.push_token {
            client = client.with_push_token(token.clone());
        }
        Ok(client)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let ctx = Session::load(&cli)?;
    match cli.command {
        Commands::Pair(cmd) => run_pair(&ctx, cmd),
        Commands::Device(cmd) => run_device(&ctx, cmd).await,
        Commands::Request(cmd) => run_request(&ctx, cmd).await,
    }
}

fn run_pair(ctx: &Session, cmd: PairCommand) -> Result<()> {
    match cmd {
        PairCommand::New {
            correlation_id,
            force,
        } => {
            ctx.ensure_unpaired(force)?;
            let secret = SharedSecret::generate()?;
            let transport = create_pairing_payload(&secret, correlation_id.as_deref())?;
            let state = EndpointState::new(secret);
            state.save(&ctx.state_path)?;
            info!("Saved pairing to {}", ctx.state_path.display());

            println!("{}", transport);
            println!("room: {}", state.shared_secret.room_id());
        }
        PairCommand::Join { transport, force } => {
            ctx.ensure_unpaired(force)?;
            let payload = parse_pairing_payload(&transport)?;
            let state = EndpointState::new(payload.shared_secret);
            state.save(&ctx.state_path)?;
            info!("Saved pairing to {}", ctx.state_path.display());

            println!("room: {}", state.shared_secret.room_id());
            if let Some(correlation_id) = payload.correlation_id {
                println!("correlation id: {}", correlation_id);
            }
        }
        PairCommand::Show => {
            let state = ctx.state()?;
            println!("room: {}", state.shared_secret.room_id());
            println!("paired at: {}", render::format_millis(state.paired_at));
            println!("relay: {}", ctx.config.relay_url);
            if let Some(token) = &state.push_token {
                println!("push token: {}", token);
            }
        }
        PairCommand::Forget => {
            EndpointState::remove(&ctx.state_path)?;
            println!("Pairing forgotten");
        }
    }
    Ok(())
}

async fn run_device(ctx: &Session, cmd: DeviceCommand) -> Result<()> {
    let mut state = ctx.state()?;
    let client = ctx.client(&state)?;

    match cmd {
        DeviceCommand::Register { push_token, name } => {
            let registration = DeviceRegistration {
                push_token: push_token.clone(),
                device_name: name,
            };
            client.submit_device(&registration).await?;
            state.push_token = Some(push_token);
            state.save(&ctx.state_path)?;
            println!("Registered device for room {}", client.room_id());
        }
        DeviceCommand::Show => match client.get_device().await? {
            Some(registration) => {
                println!("{}", serde_json::to_string_pretty(&render::device_json(&registration)?)?)
            }
            None => println!("No device registered for room {}", client.room_id()),
        },
        DeviceCommand::Remove => {
            client.delete_device().await?;
            state.push_token = None;
            state.save(&ctx.state_path)?;
            println!("Removed device registration");
        }
    }
    Ok(())
}

async fn run_request(ctx: &Session, cmd: RequestCommand) -> Result<()> {
    let state = ctx.state()?;
    let client = ctx.client(&state)?;

    match cmd {
        RequestCommand::Submit {
            request_type,
            from,
            message,
            transaction,
            typed_data,
            notify,
        } => {
            let options = SubmitOptions { notify };
            let submitted = submit(
                &client,
                request_type,
                SubmitArgs {
                    from,
                    message,
                    transaction,
                    typed_data,
                },
                options,
            )
            .await?;
            println!("{}", submitted.id);
            if notify && !submitted.push.is_delivered() {
                eprintln!("warning: push notification not delivered: {:?}", submitted.push);
            }
        }
        RequestCommand::List => {
            let requests = client.get_requests().await?;
            if requests.is_empty() {
                println!("No requests in room {}", client.room_id());
            }
            for request in &requests {
                println!("{}", render::request_line(request));
            }
        }
        RequestCommand::Get { id, request_type } => {
            let request = client.get_any_request(&id, request_type).await?;
            println!("{}", serde_json::to_string_pretty(&render::request_json(&request)?)?);
        }
        RequestCommand::Delete { id } => {
            client.delete_request(&id).await?;
            println!("Deleted {}", id);
        }
        RequestCommand::Approve {
            id,
            request_type,
            signature,
            address,
        } => {
            let changes = approval_changes(request_type, signature, address)?;
            let request = client.update_any_request(&id, request_type, changes).await?;
            println!("{}", serde_json::to_string_pretty(&render::request_json(&request)?)?);
        }
        RequestCommand::Reject {
            id,
            request_type,
            reason,
        } => {
            let mut changes = Map::new();
            changes.insert("status".to_string(), json!("rejected"));
            if let Some(reason) = reason {
                changes.insert("error".to_string(), Value::String(reason));
            }
            let request = client.update_any_request(&id, request_type, changes).await?;
            println!("{}", serde_json::to_string_pretty(&render::request_json(&request)?)?);
        }
        RequestCommand::Wait {
            id,
            request_type,
            timeout,
            interval,
        } => {
            let mut options = ctx.config.poll_options();
            if let Some(secs) = timeout {
                options.timeout = std::time::Duration::from_secs(secs);
            }
            if let Some(ms) = interval {
                options.interval = std::time::Duration::from_millis(ms);
            }

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let request =
                wait_for_any_resolution(&client, &id, request_type, options, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&render::request_json(&request)?)?);
        }
    }
    Ok(())
}

struct SubmitArgs {
    from: Option<String>,
    message: Option<String>,
    transaction: Option<String>,
    typed_data: Option<String>,
}

impl SubmitArgs {
    fn require_from(&self) -> Result<String> {
        self.from.clone().context("--from is required for signing requests")
    }

    fn require_message(&self) -> Result<String> {
        self.message.clone().context("--message is required")
    }
}

async fn submit(
    client: &RelayClient,
    request_type: RequestType,
    args: SubmitArgs,
    options: SubmitOptions,
) -> Result<Submitted> {
    let submitted = match request_type {
        RequestType::Pairing => client.submit_request(&PairingRequest::pending(), options).await?,
        RequestType::ImportAccount => {
            client
                .submit_request(&ImportAccountRequest::pending(), options)
                .await?
        }
        RequestType::SignPersonalMessage => {
            let payload = SignPersonalMessageRequest::new(args.require_from()?, args.require_message()?);
            client.submit_request(&payload, options).await?
        }
        RequestType::SignMessage => {
            let payload = SignMessageRequest::new(args.require_from()?, args.require_message()?);
            client.submit_request(&payload, options).await?
        }
        RequestType::SignTransaction => {
            let raw = args.transaction.as_deref().context("--transaction is required")?;
            let transaction =
                serde_json::from_str(raw).context("--transaction is not a valid transaction")?;
            let payload = SignTransactionRequest::new(args.require_from()?, transaction);
            client.submit_request(&payload, options).await?
        }
        RequestType::SignTypedData => {
            let raw = args.typed_data.as_deref().context("--typed-data is required")?;
            let typed_data = serde_json::from_str(raw).context("--typed-data is not valid typed data")?;
            let payload = SignTypedDataRequest::new(args.require_from()?, typed_data);
            client.submit_request(&payload, options).await?
        }
    };
    Ok(submitted)
}

/// Fields written when approving a request of the given type.
fn approval_changes(
    request_type: RequestType,
    signature: Option<String>,
    address: Option<String>,
) -> Result<Map<String, Value>> {
    let mut changes = Map::new();
    changes.insert("status".to_string(), json!("approved"));
    match request_type {
        RequestType::Pairing => {}
        RequestType::ImportAccount => {
            let address = address.context("--address is required to approve importAccount")?;
            changes.insert("address".to_string(), Value::String(address));
        }
        _ => {
            let signature = signature.context("--signature is required to approve a signing request")?;
            changes.insert("signature".to_string(), Value::String(signature));
        }
    }
    Ok(changes)
}
