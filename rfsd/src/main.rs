use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "rfsd",
    about = "File server daemon for the rfs tools. Accepts client connections over TCP and \
executes their file operations against the local file system."
)]
struct Args {
    /// TCP port to listen on (overrides the serverport15440 environment variable)
    #[arg(long)]
    port: Option<u16>,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode, don't report errors
    #[arg(short, long)]
    quiet: bool,
}

fn init_tracing(quiet: bool, verbose: u8) {
    let level = if quiet {
        "off"
    } else {
        match verbose {
            0 => "error",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let port = args.port.unwrap_or_else(proto::config::server_port);
    let addr = std::net::SocketAddr::from((std::net::Ipv4Addr::UNSPECIFIED, port));
    let server = rfsd::Server::bind(addr)?;
    tracing::info!("listening on {}", server.local_addr()?);
    server.serve().await
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.quiet, args.verbose);
    if let Err(err) = run(args).await {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}
