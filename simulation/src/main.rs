//! Ripple - flood suppression simulator
//!
//! Runs probabilistic flooding over synthetic meshes and reports how many
//! transmissions each setting costs and what coverage it reaches.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ripple_flood::FloodSettings;
use ripple_logging::{FileConfig, LogConfig, RippleSubscriberBuilder, WorkerGuard};

use ripple_simulation::{
    Mesh, MeshBuilder, SimConfig, SimulationIdentity, format_sweep, run_flood,
    run_grid_comparison, sweep_counts,
};

#[derive(Parser)]
#[command(
    name = "ripple-sim",
    about = "Probabilistic flood suppression simulator",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines instead of human-readable text
    #[arg(long, global = true)]
    json_logs: bool,

    /// Also write JSONL logs to rotated files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flood once from one origin and print the report
    Flood {
        #[command(flatten)]
        topology: TopologyArgs,

        #[command(flatten)]
        flood: FloodArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Flood the same mesh once per COUNT value
    Sweep {
        #[command(flatten)]
        topology: TopologyArgs,

        #[command(flatten)]
        flood: FloodArgs,

        /// COUNT values to try
        #[arg(long, value_delimiter = ',', default_values_t = vec![0, 1, 2, 3, 4])]
        counts: Vec<u32>,
    },

    /// Compare the setting presets on a lossy 5x5 grid
    Compare {
        /// Seed for link loss and jitter
        #[arg(long, default_value = "1")]
        seed: u64,
    },

    /// Create and visualize a topology
    Topology {
        #[command(flatten)]
        topology: TopologyArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Shape {
    Line,
    Ring,
    Star,
    Full,
    Grid,
    Random,
}

#[derive(Args)]
struct TopologyArgs {
    /// Shape of the mesh
    #[arg(short, long, value_enum, default_value = "grid")]
    topology: Shape,

    /// Number of nodes (max 25)
    #[arg(short, long, default_value = "16")]
    nodes: usize,

    /// Delivery probability of every link
    #[arg(short, long, default_value = "0.9")]
    link_prob: f64,

    /// Grid width
    #[arg(long, default_value = "4")]
    width: usize,

    /// Connection probability for random topology
    #[arg(long, default_value = "0.3")]
    connection_prob: f64,

    /// Seed for the random topology
    #[arg(long, default_value = "1")]
    topology_seed: u64,
}

impl TopologyArgs {
    fn build(&self) -> anyhow::Result<Mesh> {
        let builder = MeshBuilder::new(self.nodes)?.link_probability(self.link_prob)?;
        let mesh = match self.topology {
            Shape::Line => builder.line()?,
            Shape::Ring => builder.ring()?,
            Shape::Star => builder.star()?,
            Shape::Full => builder.full_mesh()?,
            Shape::Grid => builder.grid(self.width)?,
            Shape::Random => builder.random(self.connection_prob, self.topology_seed)?,
        };
        Ok(mesh)
    }
}

#[derive(Args)]
struct FloodArgs {
    /// Suppression threshold (0 always forwards)
    #[arg(short, long, default_value = "2")]
    count: u32,

    /// Originating node
    #[arg(short, long, default_value = "A")]
    origin: char,

    /// Seed for link loss and jitter
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Time a frame spends on a link (ms)
    #[arg(long, default_value = "1")]
    propagation_ms: u64,

    /// JSON file with flood settings
    #[arg(long)]
    config: Option<PathBuf>,
}

impl FloodArgs {
    fn sim_config(&self) -> anyhow::Result<SimConfig> {
        let settings = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str::<FloodSettings>(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => FloodSettings::default(),
        };
        Ok(SimConfig {
            count: self.count,
            settings,
            propagation_delay_ms: self.propagation_ms,
            seed: self.seed,
            ..SimConfig::default()
        })
    }

    fn origin(&self, mesh: &Mesh) -> anyhow::Result<SimulationIdentity> {
        let origin = self.origin.to_ascii_uppercase();
        match SimulationIdentity::new(origin) {
            Some(id) if mesh.contains(id) => Ok(id),
            _ => bail!("origin {} is not a node of the mesh", self.origin),
        }
    }
}

fn log_config(cli: &Cli) -> LogConfig {
    let mut config = if cli.verbose {
        LogConfig::development()
    } else {
        let mut config = LogConfig::default();
        config.default_level = "warn".to_string();
        config.console.pretty = true;
        config
    };
    if cli.json_logs {
        config.console.pretty = false;
    }
    if let Some(directory) = &cli.log_dir {
        config.file = Some(FileConfig {
            directory: directory.clone(),
            ..FileConfig::default()
        });
    }
    config
}

fn init_logging(cli: &Cli) -> anyhow::Result<Option<WorkerGuard>> {
    let guard = RippleSubscriberBuilder::new()
        .with_config(log_config(cli))
        .init()?;
    Ok(guard)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(&cli)?;

    match &cli.command {
        Commands::Flood {
            topology,
            flood,
            json,
        } => {
            let mesh = topology.build()?;
            let origin = flood.origin(&mesh)?;
            let report = run_flood(mesh, flood.sim_config()?, origin)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report);
            }
        }
        Commands::Sweep {
            topology,
            flood,
            counts,
        } => {
            let mesh = topology.build()?;
            let origin = flood.origin(&mesh)?;
            let rows = sweep_counts(&mesh, &flood.sim_config()?, origin, counts)?;
            print!("{}", format_sweep(&rows));
        }
        Commands::Compare { seed } => {
            run_grid_comparison(*seed)?;
        }
        Commands::Topology { topology } => {
            println!("{}", topology.build()?.visualize());
        }
    }

    Ok(())
}
