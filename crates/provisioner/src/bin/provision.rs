//! Provision CLI - create Azure virtual machines for CTO Platform.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cto_provisioner::{
    ArmClient, CreationRequest, ErrorKind, ImageReference, NetworkPlacement, ProvisionError,
    Provisioner, ProvisionerConfig, ResourceId,
};

/// Provision CLI - Azure VM provisioning for CTO Platform.
#[derive(Parser)]
#[command(name = "provision")]
#[command(about = "Create Azure virtual machines and wait for them to be ready")]
struct Cli {
    /// Azure subscription ID (or set `AZURE_SUBSCRIPTION_ID` env var).
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
    subscription_id: Option<String>,

    /// ARM bearer token (or set `AZURE_ACCESS_TOKEN` env var).
    #[arg(long, env = "AZURE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// ARM endpoint.
    #[arg(long, env = "ARM_ENDPOINT", default_value = cto_provisioner::arm::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Seconds between long-running operation polls.
    #[arg(long, env = "ARM_POLL_INTERVAL_SECS", default_value_t = cto_provisioner::config::DEFAULT_POLL_INTERVAL_SECS)]
    poll_interval: u64,

    /// Give up on one long-running operation after this many seconds.
    #[arg(long, env = "ARM_POLL_TIMEOUT_SECS")]
    poll_timeout: Option<u64>,

    /// Retries for a transient poll failure.
    #[arg(long, env = "ARM_POLL_MAX_RETRIES", default_value_t = cto_provisioner::config::DEFAULT_POLL_MAX_RETRIES)]
    poll_max_retries: u32,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "ARM_REQUEST_TIMEOUT_SECS", default_value_t = cto_provisioner::config::DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout: u64,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a virtual machine and wait for it.
    Create {
        /// JSON request file; flags below override its fields.
        #[arg(long)]
        request: Option<PathBuf>,

        #[command(flatten)]
        fields: RequestFields,

        /// Cancel the wait after this many seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Validate a request without calling Azure.
    Validate {
        /// JSON request file.
        #[arg(long)]
        request: Option<PathBuf>,

        #[command(flatten)]
        fields: RequestFields,
    },

    /// Parse an ARM resource ID.
    ParseId {
        /// Resource ID or bare name.
        id: String,

        /// Required resource type (e.g. networkInterfaces).
        #[arg(long)]
        expected_type: Option<String>,
    },
}

/// Request fields settable from the command line.
#[derive(clap::Args)]
struct RequestFields {
    /// Resource group.
    #[arg(long)]
    resource_group: Option<String>,

    /// VM name.
    #[arg(long)]
    name: Option<String>,

    /// Region (e.g., eastus).
    #[arg(long)]
    location: Option<String>,

    /// VM size (e.g., `Standard_B1s`).
    #[arg(long)]
    size: Option<String>,

    /// Admin username.
    #[arg(long)]
    admin_username: Option<String>,

    /// Admin password (or set `AZURE_VM_ADMIN_PASSWORD` env var).
    #[arg(long, env = "AZURE_VM_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,

    /// Existing network interface ID.
    #[arg(long)]
    nic_id: Option<String>,

    /// Virtual network for a new network interface.
    #[arg(long)]
    vnet: Option<String>,

    /// Subnet for a new network interface.
    #[arg(long)]
    subnet: Option<String>,

    /// Public IP name, created if it does not exist.
    #[arg(long)]
    public_ip: Option<String>,

    /// OS disk type (`Standard_LRS`, `StandardSSD_LRS`, `Premium_LRS`).
    #[arg(long)]
    os_disk_type: Option<String>,

    /// Cloud-init file.
    #[arg(long)]
    custom_data_file: Option<PathBuf>,

    /// Image alias (ubuntu-20.04, ubuntu-22.04, ubuntu-24.04, debian-12,
    /// windows-2022) or publisher:offer:sku:version.
    #[arg(long)]
    image: Option<ImageReference>,

    /// Tags as key=value (comma-separated).
    #[arg(long, value_delimiter = ',')]
    tag: Vec<String>,
}

impl RequestFields {
    /// Load the request file, if any, and apply flag overrides.
    fn into_request(self, file: Option<&PathBuf>) -> Result<CreationRequest> {
        let mut request = match file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read request file {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse request file {}", path.display()))?
            }
            None => CreationRequest::default(),
        };

        macro_rules! set {
            ($field:ident, $value:expr) => {
                if let Some(value) = $value {
                    request.$field = value;
                }
            };
        }
        set!(resource_group, self.resource_group);
        set!(name, self.name);
        set!(location, self.location);
        set!(size, self.size);
        set!(admin_username, self.admin_username);
        set!(admin_password, self.admin_password);
        set!(image, self.image);

        if self.nic_id.is_some() {
            request.network_interface_id = self.nic_id;
        }
        if self.vnet.is_some() {
            request.virtual_network_name = self.vnet;
        }
        if self.subnet.is_some() {
            request.subnet_name = self.subnet;
        }
        if self.public_ip.is_some() {
            request.public_ip_name = self.public_ip;
        }
        if self.os_disk_type.is_some() {
            request.os_disk_type = self.os_disk_type;
        }
        if let Some(path) = self.custom_data_file {
            let data = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read custom data {}", path.display()))?;
            request.custom_data = Some(data);
        }
        for tag in self.tag {
            let (key, value) = tag
                .split_once('=')
                .with_context(|| format!("Invalid tag {tag:?}, expected key=value"))?;
            request.tags.insert(key.to_string(), value.to_string());
        }

        Ok(request)
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Cancel `cancel` on Ctrl-C or after `timeout` seconds.
fn spawn_cancel_watcher(cancel: CancellationToken, timeout: Option<u64>) {
    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
            () = deadline => {
                warn!(timeout_secs = timeout.unwrap_or_default(), "Timeout reached, cancelling");
                cancel.cancel();
            }
            () = cancel.cancelled() => {}
        }
    });
}

/// Log `message` and exit with the code for `kind`.
fn exit_with(kind: ErrorKind, message: impl fmt::Display) -> ! {
    error!(kind = %kind, "{message}");
    eprintln!("Error ({kind}): {message}");
    std::process::exit(kind.exit_code())
}

/// Load a request, exiting with the validation code if it cannot be read.
fn load_request(fields: RequestFields, file: Option<&PathBuf>) -> CreationRequest {
    fields
        .into_request(file)
        .unwrap_or_else(|e| exit_with(ErrorKind::Validation, format!("{e:#}")))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Create {
            request,
            fields,
            timeout,
        } => {
            let request = load_request(fields, request.as_ref());

            let subscription_id = cli
                .subscription_id
                .context("AZURE_SUBSCRIPTION_ID or --subscription-id is required")?;
            let access_token = cli
                .access_token
                .context("AZURE_ACCESS_TOKEN or --access-token is required")?;

            let mut config = ProvisionerConfig::new(subscription_id, access_token)
                .with_endpoint(&cli.endpoint)?;
            config.poll_interval = Duration::from_secs(cli.poll_interval);
            config.poll_timeout = cli.poll_timeout.map(Duration::from_secs);
            config.poll_max_retries = cli.poll_max_retries;
            config.request_timeout = Duration::from_secs(cli.request_timeout);

            let client =
                ArmClient::from_config(&config).context("Failed to create ARM client")?;
            info!(correlation_id = %client.correlation_id(), "ARM client ready");
            let provisioner = Provisioner::new(Arc::new(client));

            let cancel = CancellationToken::new();
            spawn_cancel_watcher(cancel.clone(), timeout);

            let outcome = provisioner.create_vm(&request, &cancel).await;
            cancel.cancel();

            match outcome {
                Ok(result) => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                Err(e) => exit_with(e.kind(), e),
            }
        }

        Commands::Validate { request, fields } => {
            let request = load_request(fields, request.as_ref());
            match request.validate() {
                Ok(placement) => {
                    println!("\nRequest is valid:");
                    println!("  VM:        {}/{}", request.resource_group, request.name);
                    println!("  Size:      {}", request.size);
                    println!("  Image:     {}", request.image);
                    let disk = request
                        .os_disk_type()
                        .unwrap_or_else(|e| exit_with(e.kind(), e));
                    println!("  OS disk:   {disk}");
                    match placement {
                        NetworkPlacement::ExistingInterface(id) => {
                            println!("  NIC:       {id}");
                        }
                        NetworkPlacement::NewInterface {
                            virtual_network,
                            subnet,
                            public_ip,
                        } => {
                            println!("  Subnet:    {virtual_network}/{subnet}");
                            println!(
                                "  Public IP: {}",
                                public_ip.as_deref().unwrap_or("(none)")
                            );
                        }
                    }
                }
                Err(e) => exit_with(e.kind(), e),
            }
        }

        Commands::ParseId { id, expected_type } => {
            let parsed = ResourceId::parse(&id, expected_type.as_deref())
                .map_err(ProvisionError::from)
                .unwrap_or_else(|e| exit_with(e.kind(), e));
            println!("\nResource ID:");
            println!("  Subscription:   {}", parsed.subscription_id.unwrap_or_default());
            println!("  Resource group: {}", parsed.resource_group.unwrap_or_default());
            println!("  Provider:       {}", parsed.provider.unwrap_or_default());
            println!("  Type:           {}", parsed.resource_type.unwrap_or_default());
            println!("  Name:           {}", parsed.name);
        }
    }

    Ok(())
}
