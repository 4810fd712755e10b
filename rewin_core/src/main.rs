use clap::Parser;
use rewin_core::driver::{OptParams, Optimizer};
use rewin_core::faults::write_fault_list;
use rewin_core::library::Library;
use rewin_core::netlist::{read_netlist, write_netlist};
use rewin_core::timing::{flt2int, int2flt, PathTiming, Timing};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    version = "0.1",
    about = "
        Rewin optimizes technology-mapped combinational networks with
        SAT-computed observability don't-cares: per node it cuts a window,
        enumerates admissible replacement functions over a few divisors,
        and commits the ones that shrink area or shorten the critical path.
    "
)]
struct Arguments {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Parser, Clone, Debug)]
enum Command {
    #[clap(about = "Outputs size, depth, area and delay figures of a mapped netlist.")]
    Info(InfoCommand),
    #[clap(about = "Runs the window-based resynthesis pass and writes the optimized netlist.")]
    Optimize(OptimizeCommand),
    #[clap(about = "Writes the fault list of a mapped netlist (stuck-at or full cell faults).")]
    Faults(FaultsCommand),
}

#[derive(Parser, Debug, Clone)]
struct InfoCommand {
    /// Cell library in genlib format.
    #[arg(short, long, required = true)]
    library: String,
    /// Input netlist in BENCH-style mapped format.
    #[arg(short, long, required = true)]
    input: String,
}

#[derive(Parser, Debug, Clone)]
struct OptimizeCommand {
    /// Cell library in genlib format.
    #[arg(short, long, required = true)]
    library: String,
    /// Input netlist in BENCH-style mapped format.
    #[arg(short, long, required = true)]
    input: String,
    /// Output netlist file.
    #[arg(short, long, required = true)]
    output: String,
    /// Optimize for area (default optimizes for delay).
    #[arg(long, default_value_t = false)]
    area: bool,
    /// Area mode: walk from the outputs toward the inputs.
    #[arg(long, default_value_t = false)]
    reverse: bool,
    /// Area mode: run the fanin-removal resubstitution pass first.
    #[arg(long, default_value_t = false)]
    resub: bool,
    /// Accept zero-gain replacements in area mode.
    #[arg(long, default_value_t = false)]
    zero_cost: bool,
    /// Retry failed windows forcing each MFFC-input divisor.
    #[arg(long, default_value_t = false)]
    more_effort: bool,
    /// Detect multi-input AND/OR gates from joint implications.
    #[arg(long, default_value_t = false)]
    and_or: bool,
    /// Seed pattern sets from 64-pattern random simulation.
    #[arg(long, default_value_t = false)]
    sim: bool,
    /// Delay mode: use the load-aware timing model.
    #[arg(long, default_value_t = false)]
    load_aware: bool,
    /// Conflict budget per SAT call (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    bt_limit: u64,
    /// Window size cap (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    win_max: usize,
    /// Stop after this many changed nodes (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    nodes_max: usize,
    /// Largest replacement support (2..=6).
    #[arg(long, default_value_t = 6)]
    var_max: usize,
    /// Decompositions tried per window (1..=4).
    #[arg(long, default_value_t = 1)]
    dec_max: usize,
    /// Critical delta in nanoseconds (0 = derived from the inverter).
    #[arg(long, default_value_t = 0.0)]
    delta_crit: f64,
    /// Timing window in percent of the clock period.
    #[arg(long, default_value_t = 1)]
    time_win: usize,
    /// Print the statistics breakdown to stderr.
    #[arg(long, default_value_t = false)]
    verb: bool,
}

#[derive(Parser, Debug, Clone)]
struct FaultsCommand {
    /// Cell library in genlib format.
    #[arg(short, long, required = true)]
    library: String,
    /// Input netlist in BENCH-style mapped format.
    #[arg(short, long, required = true)]
    input: String,
    /// Output fault list file.
    #[arg(short, long, required = true)]
    output: String,
    /// Restrict the list to the SA0/SA1/NEG core faults.
    #[arg(long, default_value_t = false)]
    stuck_at: bool,
}

fn load(library: &str, input: &str) -> (Library, rewin_core::MappedNetwork) {
    let lib_text = fs::read_to_string(library).expect("unable to read the library file");
    let lib = Library::from_genlib(&lib_text).expect("unusable library");
    let ntk_text = fs::read_to_string(input).expect("unable to read the netlist file");
    let ntk = read_netlist(&ntk_text, &lib).expect("unreadable netlist");
    (lib, ntk)
}

fn total_area(lib: &Library, ntk: &rewin_core::MappedNetwork) -> f64 {
    ntk.topo_order()
        .map(|id| lib.gate(ntk.obj(id).gate.unwrap()).area)
        .sum()
}

fn info(command: InfoCommand) {
    let (lib, ntk) = load(&command.library, &command.input);
    let model = Path::new(&command.input).file_name().unwrap();
    let tim = PathTiming::new(&lib, &ntk, 1);
    println!(
        "{}",
        json!({
            "model": model.to_str(),
            "inputs": ntk.pi_num(),
            "outputs": ntk.po_num(),
            "nodes": ntk.node_num(),
            "edges": ntk.edge_num(),
            "levels": ntk.max_level(),
            "area": total_area(&lib, &ntk),
            "delay": int2flt(tim.ntk_delay()),
        })
    );
}

fn optimize(command: OptimizeCommand) {
    let (lib, ntk) = load(&command.library, &command.input);
    let model = Path::new(&command.input).file_name().unwrap();
    let area_before = total_area(&lib, &ntk);
    let pars = OptParams {
        area: command.area,
        area_rev: command.reverse,
        resub_first: command.resub,
        zero_cost: command.zero_cost,
        more_effort: command.more_effort,
        use_and_or: command.and_or,
        use_sim: command.sim,
        load_aware: command.load_aware,
        bt_limit: command.bt_limit,
        win_size_max: command.win_max,
        nodes_max: command.nodes_max,
        var_max: command.var_max,
        dec_max: command.dec_max,
        delta_crit: flt2int(command.delta_crit),
        time_win: command.time_win,
        verbose: command.verb,
        ..OptParams::default()
    };
    let time_start = Instant::now();
    let mut opt = Optimizer::new(&lib, ntk, pars);
    let changed = opt.run();
    let stats = opt.stats;
    let mut ntk = opt.ntk;
    ntk.check_consistency(&lib);
    ntk.compress();
    let duration = time_start.elapsed();
    fs::write(&command.output, write_netlist(&ntk, &lib)).expect("unable to write the netlist");
    let delay = PathTiming::new(&lib, &ntk, 1).ntk_delay();
    println!(
        "{}",
        json!({
            "model": model.to_str(),
            "mode": if command.area { "area" } else { "delay" },
            "changed": changed,
            "area": { "before": area_before, "after": total_area(&lib, &ntk) },
            "delay": int2flt(delay),
            "stats": stats.summary(),
            "duration": format!("{:?}", duration),
        })
    );
}

fn faults(command: FaultsCommand) {
    let (lib, ntk) = load(&command.library, &command.input);
    let model = Path::new(&command.input).file_name().unwrap();
    let text = write_fault_list(&ntk, &lib, command.stuck_at);
    let count = text.lines().count();
    fs::write(&command.output, text).expect("unable to write the fault list");
    println!(
        "{}",
        json!({
            "model": model.to_str(),
            "nodes": ntk.node_num(),
            "faults": count,
            "stuck_at": command.stuck_at,
        })
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let arguments = Arguments::parse();
    match arguments.command {
        Command::Info(command) => info(command),
        Command::Optimize(command) => optimize(command),
        Command::Faults(command) => faults(command),
    }
}
