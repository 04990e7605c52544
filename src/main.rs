use chord::config::Config;
use std::path::PathBuf;
use std::process;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "chord",
    about = "Ring maintenance and lookup node of a Chord distributed hash table"
)]
struct Opt {
    /// Port to listen on
    port: u16,

    /// Host of a bootstrap peer; given together with its port, this node
    /// joins that peer's ring instead of creating a new one
    bootstrap_host: Option<String>,

    /// Port of the bootstrap peer
    bootstrap_port: Option<u16>,

    /// Address under which other peers reach this node
    #[structopt(short = "a", long = "address", default_value = "127.0.0.1")]
    address: String,

    /// Path to a custom config file
    #[structopt(short = "c", parse(from_os_str))]
    config: Option<PathBuf>,

    /// Silence all output
    #[structopt(short = "q", long = "quiet")]
    quiet: bool,

    /// Level of verbosity (v, vv, vvv)
    #[structopt(short = "v", parse(from_occurrences))]
    verbose: usize,

    /// Timestamp (sec, ms, ns, none)
    #[structopt(short = "t")]
    timestamp: Option<stderrlog::Timestamp>,
}

fn main() {
    let opt = Opt::from_args();

    // init logger with verbosity flag
    stderrlog::new()
        .module(module_path!())
        .quiet(opt.quiet)
        .verbosity(opt.verbose)
        .timestamp(opt.timestamp.unwrap_or(stderrlog::Timestamp::Off))
        .init()
        .expect("Failed to initialize logger");

    let config = match &opt.config {
        Some(path) => Config::load_from_file(path).unwrap_or_else(|err| {
            log::error!("Error while loading config file: {}", err);
            process::exit(2);
        }),
        None => Config::default(),
    };

    let bootstrap = match (opt.bootstrap_host, opt.bootstrap_port) {
        (Some(host), Some(port)) => Some((host, port)),
        (None, None) => None,
        _ => {
            log::error!("A bootstrap host must be given together with its port");
            process::exit(2);
        }
    };

    if let Err(e) = chord::run(config, &opt.address, opt.port, bootstrap) {
        log::error!("Fatal application error: {}", e);
        process::exit(1);
    }
}
