use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use clap::{Parser, Subcommand};
use dex_auth_operator::{
    backend,
    config::{self, CharmConfig},
    controller::{self, Ctx},
    dex_config::{self, CompileInputs},
    event::{self, Event, EventKind},
    issuer::{self, IssuerInputs},
    local::{LocalModel, LocalWorkload},
    relations::oidc_client::ClientRegistration,
    state::IdentityState,
    APP_NAME,
};
use serde::de::DeserializeOwned;
use snafu::{ResultExt, Snafu};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "DEX_AUTH_OPERATOR_LOG";

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
    pub const TARGET_PLATFORM: Option<&str> = option_env!("TARGET");
}

#[derive(Snafu, Debug)]
enum Error {
    #[snafu(display("failed to read {path:?}"))]
    ReadFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse {path:?}"))]
    ParseFile {
        source: serde_yaml::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to render the configuration schema"))]
    Schema { source: config::Error },

    #[snafu(display("invalid configuration"))]
    InvalidConfig { source: config::Error },

    #[snafu(display("failed to compile the Dex configuration"))]
    Compile { source: dex_config::Error },

    #[snafu(display("invalid event arguments"))]
    BuildEvent { source: event::Error },

    #[snafu(display("failed to open the model directory"))]
    OpenModel { source: backend::Error },

    #[snafu(display("reconciliation failed"))]
    Reconcile { source: controller::Error },
}

#[derive(Parser)]
#[clap(about, author, version)]
struct Opts {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the recognised configuration options and their defaults.
    ConfigSchema,

    /// Print the Dex configuration compiled from a configuration file.
    ///
    /// Identity material is generated for this run only.
    Render {
        #[clap(long)]
        config: PathBuf,

        /// YAML list of static client registrations.
        #[clap(long)]
        oidc_clients: Option<PathBuf>,

        #[clap(long)]
        ingress_url: Option<String>,

        #[clap(long, default_value = APP_NAME)]
        app_name: String,

        #[clap(long, env = "KUBERNETES_POD_NAMESPACE")]
        namespace: String,
    },

    /// Reconcile a filesystem-backed model and workload for one event.
    Dispatch {
        #[clap(long, value_parser = EventKind::from_str)]
        event: EventKind,

        #[clap(long)]
        model_dir: PathBuf,

        #[clap(long)]
        workload_root: PathBuf,

        #[clap(long)]
        relation_id: Option<u32>,

        #[clap(long)]
        redirect_uri: Option<String>,

        /// Shell command run whenever Dex is restarted.
        #[clap(long)]
        restart_command: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let opts = Opts::parse();
    match opts.cmd {
        Command::ConfigSchema => {
            print!("{}", config::schema().context(SchemaSnafu)?);
        }
        Command::Render {
            config,
            oidc_clients,
            ingress_url,
            app_name,
            namespace,
        } => {
            initialize_logging();
            let config: CharmConfig = read_yaml(&config).await?;
            let oidc_clients: Vec<ClientRegistration> = match oidc_clients {
                Some(path) => read_yaml(&path).await?,
                None => Vec::new(),
            };
            let connectors = config.connectors().context(InvalidConfigSnafu)?;
            let issuer_url = issuer::resolve(IssuerInputs {
                issuer_url: config.issuer_url(),
                public_url: config.public_url(),
                ingress_url: ingress_url.as_deref(),
                app_name: &app_name,
                namespace: &namespace,
                port: config.port,
            });
            let identity = IdentityState::generate();
            let dex_config = dex_config::compile(CompileInputs {
                identity: &identity,
                oidc_clients: &oidc_clients,
                oauth_static_client: None,
                connectors: connectors.as_ref(),
                port: config.port,
                issuer_url: &issuer_url,
                enable_password_db: config.enable_password_db,
                static_username: config.static_username(),
                static_password: config.static_password(),
                log_level: config.log_level,
            })
            .context(CompileSnafu)?;
            let yaml = dex_config.to_yaml().context(CompileSnafu)?;
            print!("{}", String::from_utf8_lossy(&yaml));
        }
        Command::Dispatch {
            event,
            model_dir,
            workload_root,
            relation_id,
            redirect_uri,
            restart_command,
        } => {
            initialize_logging();
            print_startup_string();

            let event = Event::from_kind(event, relation_id, redirect_uri).context(BuildEventSnafu)?;
            let model = LocalModel::open(model_dir).await.context(OpenModelSnafu)?;
            let ctx = Ctx {
                unit: model.unit,
                secrets: model.secrets,
                relations: model.relations,
                workload: LocalWorkload::new(workload_root, restart_command),
                config: model.config,
            };
            let status = controller::reconcile(&ctx, &event)
                .await
                .context(ReconcileSnafu)?;
            println!("{status}");
        }
    };

    Ok(())
}

fn initialize_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_startup_string() {
    tracing::info!(
        version = built_info::PKG_VERSION,
        git_version = built_info::GIT_VERSION.unwrap_or("unknown"),
        target = built_info::TARGET_PLATFORM.unwrap_or("unknown target"),
        built = built_info::BUILT_TIME_UTC,
        rustc = built_info::RUSTC_VERSION,
        "Starting {}",
        built_info::PKG_DESCRIPTION,
    );
}

async fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let content = tokio::fs::read(path)
        .await
        .context(ReadFileSnafu { path })?;
    serde_yaml::from_slice(&content).context(ParseFileSnafu { path })
}
