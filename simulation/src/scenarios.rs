//! Pre-defined simulation scenarios
//!
//! Single floods, COUNT sweeps, and a comparison of forwarding settings on a
//! dense grid.

use bytes::Bytes;
use ripple_core::SimulationIdentity;
use ripple_flood::FloodSettings;
use tracing::info;

use crate::error::SimResult;
use crate::simulation::{SimConfig, SimReport, Simulation};
use crate::topology::{Mesh, MeshBuilder};

/// Run one flood from `origin` to completion
pub fn run_flood(mesh: Mesh, config: SimConfig, origin: SimulationIdentity) -> SimResult<SimReport> {
    let mut sim = Simulation::new(mesh, config)?;
    sim.originate(origin, Bytes::from_static(b"ripple"))?;
    Ok(sim.run())
}

/// One row of a COUNT sweep
#[derive(Debug, Clone)]
pub struct SweepRow {
    pub count: u32,
    pub report: SimReport,
}

/// Flood the same mesh with the same seed for each COUNT value
pub fn sweep_counts(
    mesh: &Mesh,
    config: &SimConfig,
    origin: SimulationIdentity,
    counts: &[u32],
) -> SimResult<Vec<SweepRow>> {
    counts
        .iter()
        .map(|&count| {
            info!(count, "Sweep run");
            let config = SimConfig {
                count,
                ..config.clone()
            };
            let report = run_flood(mesh.clone(), config, origin)?;
            Ok(SweepRow { count, report })
        })
        .collect()
}

/// Render sweep rows as a table
pub fn format_sweep(rows: &[SweepRow]) -> String {
    let mut output = String::from("COUNT  tx    rx    lost  suppressed  coverage\n");
    for row in rows {
        let r = &row.report;
        output.push_str(&format!(
            "{:<6} {:<5} {:<5} {:<5} {:<11} {:.1}%\n",
            row.count,
            r.transmissions,
            r.receptions,
            r.losses,
            r.suppressions,
            r.coverage() * 100.0
        ));
    }
    output
}

/// Compare plain, slotted and quiet settings on a lossy 5x5 grid
pub fn run_grid_comparison(seed: u64) -> SimResult<Vec<(&'static str, SimReport)>> {
    let mesh = MeshBuilder::new(25)?.link_probability(0.8)?.grid(5)?;
    let origin = SimulationIdentity('A');

    let presets: [(&'static str, FloodSettings); 3] = [
        ("default", FloodSettings::default()),
        ("slotted", FloodSettings::slotted()),
        ("quiet", FloodSettings::quiet()),
    ];

    println!("{}", mesh.visualize());
    presets
        .into_iter()
        .map(|(name, settings)| {
            let config = SimConfig {
                count: 2,
                settings,
                seed,
                ..SimConfig::default()
            };
            let report = run_flood(mesh.clone(), config, origin)?;
            println!(
                "{:<8} tx {:<4} suppressed {:<4} coverage {:.1}%",
                name,
                report.transmissions,
                report.suppressions,
                report.coverage() * 100.0
            );
            Ok((name, report))
        })
        .collect()
}
