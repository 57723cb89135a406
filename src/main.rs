use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, EnvFilter};

use gridmdp::config::MdpConfig;
use gridmdp::solver::{self, Control, Snapshot, Solver, UpdateMode};
use gridmdp::world::{Action, Position};
use gridmdp::{report, Result};


/// Command line argument parser.
#[derive(Parser, Debug)]
#[command(about = "Solve grid world Markov decision processes", long_about = None)]
pub struct Args {
    /// Path to gridmdp configuration TOML file.
    config_path: PathBuf,

    /// Log every sweep.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}


#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the grid.
    Map,
    /// Print where an action from a cell can end up.
    Outcomes { x: usize, y: usize, action: Action },
    /// Solve for utilities, Q-values and the greedy policy.
    Solve {
        #[arg(long, value_enum, default_value_t = Algorithm::Value)]
        algorithm: Algorithm,
        #[arg(long, value_enum, default_value_t = Mode::Standard)]
        mode: Mode,
        /// Write per-cell results to a CSV file.
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Cancel after this many sweeps.
        #[arg(long)]
        max_sweeps: Option<usize>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Algorithm {
    Value,
    Policy,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Standard,
    Parallel,
    Turbo,
}

impl From<Mode> for UpdateMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Standard => UpdateMode::Standard,
            Mode::Parallel => UpdateMode::Parallel,
            Mode::Turbo => UpdateMode::Turbo,
        }
    }
}


fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}


fn init_logging(verbose: bool) {
    let default = if verbose { "gridmdp=debug" } else { "gridmdp=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}


fn run(args: &Args) -> Result<()> {
    let config = MdpConfig::from_path(&args.config_path)?;
    let world = config.world()?;

    match &args.command {
        Commands::Map => {
            println!("{}", world.grid());
        }
        Commands::Outcomes { x, y, action } => {
            let pos = Position::new(*x, *y);
            let next = world.transition(pos, *action)?;
            println!("{} from {} moves to {}", action, pos, next);
            for outcome in world.outcomes(pos, *action) {
                println!("    {}", outcome);
            }
        }
        Commands::Solve { algorithm, mode, csv, max_sweeps } => {
            let mut solver = Solver::new(&world, config.limits()?);
            let mut observer = solver::from_fn(|snapshot: &Snapshot<'_>, is_final: bool| {
                if !is_final {
                    debug!(
                        iteration = snapshot.iterations,
                        max_norm = snapshot.max_norm,
                        elapsed = snapshot.elapsed.as_secs_f64(),
                        "sweep complete"
                    );
                }
                match max_sweeps {
                    Some(max) if snapshot.iterations >= *max => Control::Stop,
                    _ => Control::Continue,
                }
            });
            let summary = match algorithm {
                Algorithm::Value => solver.value_iteration((*mode).into(), &mut observer),
                Algorithm::Policy => solver.policy_iteration((*mode).into(), &mut observer),
            };

            println!("Result: {}", summary);
            println!("\n=== Utilities ===");
            println!("{}", report::utilities_table(solver.utilities()));
            println!("\n=== Q-Values ===");
            println!("{}", report::q_values_table(&world, solver.utilities()));
            println!("\n=== Policy ===");
            match solver.policy() {
                Some(policy) => println!("{}", policy),
                None => println!("{}", report::policy_table(&world, solver.utilities())),
            }

            if let Some(path) = csv {
                report::write_csv_file(path, &world, solver.utilities())?;
                info!(path = %path.display(), "wrote results");
            }
        }
    }
    Ok(())
}
