use clap::Parser;
use random_networks::RandomNetwork;
use rewin_core::library::Library;
use serde_json::json;
use std::{fs, time::Instant};

mod random_networks;

/// CMD Arguments
#[derive(Parser, Debug)]
#[command(
    version = "0.1",
    about = "
        Generates random technology-mapped netlists over a genlib library,
        for stress-testing the window-based resynthesis engine.
    "
)]
struct Args {
    /// Cell library in genlib format.
    #[arg(short, long)]
    library: String,
    /// Number of primary inputs.
    #[arg(short, long, default_value_t = 8)]
    inputs: usize,
    /// Number of internal nodes.
    #[arg(short, long)]
    n_nodes: usize,
    /// Seed of the generator.
    #[arg(short, long, default_value_t = 1)]
    seed: u64,
    /// Output netlist file.
    #[arg(short, long)]
    output: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();
    let lib_text = fs::read_to_string(&args.library).expect("unable to read the library file");
    let lib = Library::from_genlib(&lib_text).expect("unusable library");

    let time_start = Instant::now();
    let rnd = RandomNetwork::new_random(&lib, args.inputs, args.n_nodes, args.seed);
    rnd.ntk.check_consistency(&lib);
    fs::write(&args.output, &rnd.text).expect("unable to write the netlist");
    let duration = time_start.elapsed();
    println!(
        "{}",
        json!({
            "output": args.output,
            "inputs": rnd.ntk.pi_num(),
            "outputs": rnd.ntk.po_num(),
            "nodes": rnd.ntk.node_num(),
            "levels": rnd.ntk.max_level(),
            "seed": args.seed,
            "duration": format!("{:?}", duration),
        })
    );
}
