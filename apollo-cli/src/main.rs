use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use apollo_client::{Client, ClientBuilder};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "apollo")]
#[command(version)]
#[command(about = "Read and watch Apollo configuration namespaces", long_about = None)]
struct Args {
    /// JSON or TOML options file; flags below override its values
    #[arg(short = 'c', long = "conf", global = true)]
    conf: Option<PathBuf>,

    /// Config service address
    #[arg(long = "addr", env = "APOLLO_ADDR", global = true)]
    addr: Option<String>,

    #[arg(long = "app-id", env = "APOLLO_APP_ID", global = true)]
    app_id: Option<String>,

    #[arg(long = "cluster", global = true)]
    cluster: Option<String>,

    /// Comma separated namespace list
    #[arg(long = "namespaces", global = true)]
    namespaces: Option<String>,

    #[arg(long = "backup-dir", global = true)]
    backup_dir: Option<PathBuf>,

    /// Initialize from backup files only
    #[arg(long = "quick", global = true)]
    quick: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one value
    Get {
        #[arg(short = 'n', long = "namespace", default_value = "application")]
        namespace: String,

        key: String,
    },
    /// Print the whole cache as JSON
    Dump,
    /// Print every change event until interrupted
    Watch,
}

impl Args {
    fn builder(&self) -> ClientBuilder {
        let mut builder = apollo_client::builder();
        if let Some(conf) = &self.conf {
            builder = builder.conf_file(conf);
        }
        if let Some(addr) = &self.addr {
            builder = builder.addr(addr);
        }
        if let Some(app_id) = &self.app_id {
            builder = builder.app_id(app_id);
        }
        if let Some(cluster) = &self.cluster {
            builder = builder.cluster(cluster);
        }
        if let Some(namespaces) = &self.namespaces {
            builder = builder.namespaces(namespaces);
        }
        if let Some(dir) = &self.backup_dir {
            builder = builder.backup_dir(dir);
        }
        if self.quick {
            builder = builder.quick_init();
        }
        builder
    }
}

async fn init_client(args: &Args) -> Arc<Client> {
    let client = match args.builder().build() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };
    if let Err(e) = client.init().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
    Arc::new(client)
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Error: {}", e),
    }
}

async fn watch(client: Arc<Client>) {
    client.on_change(|event| {
        print_json(event);
        Ok(())
    });

    let shutdown = CancellationToken::new();
    let Some(handle) = client.start(shutdown.clone()) else {
        eprintln!("Error: client could not be started");
        process::exit(1);
    };
    info!(namespaces = ?client.namespaces(), "watching for changes, press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Error: listen for Ctrl-C: {}", e);
    }
    shutdown.cancel();
    if let Err(e) = handle.await {
        eprintln!("Error: sync loop: {}", e);
        process::exit(1);
    }
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let client = init_client(&args).await;

    match &args.cmd {
        Command::Get { namespace, key } => match client.reader(namespace).get_string(key) {
            Ok(value) => println!("{}", value),
            Err(fallback) => {
                eprintln!("Error: {}", fallback.error);
                process::exit(1);
            }
        },
        Command::Dump => {
            let map: std::collections::BTreeMap<_, _> = client.cache_map().into_iter().collect();
            print_json(&map);
        }
        Command::Watch => watch(client).await,
    }
}
