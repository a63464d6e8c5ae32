use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use freehand_volume::{
    BinFilling, HoleFilling, Processor, ReconstructionConfig, StackLoader, reconstruct,
    write_meta_image,
};
use log::{error, info};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Method {
    Nearest,
    Gaussian,
    Adaptive,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Holes {
    None,
    Fixed,
    Growing,
}

/// Reconstruct a volume from a directory of tracked DICOM frames.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Directory containing the .dcm frames
    input: PathBuf,
    /// Output path; `.mhd` and `.raw` files are written next to it
    output: PathBuf,
    #[arg(long, value_enum, default_value_t = Method::Nearest)]
    method: Method,
    #[arg(long, value_enum, default_value_t = Holes::Growing)]
    holes: Holes,
    /// Neighbourhood radius (fixed) or maximum radius (growing) in voxels
    #[arg(long, default_value_t = 3)]
    radius: usize,
    /// Voxel edge as a multiple of the pixel spacing
    #[arg(long, default_value_t = 1.0)]
    resolution: f64,
    /// Voxel edge along z before the resolution multiplier; defaults to the
    /// row spacing
    #[arg(long)]
    elevation_scale: Option<f64>,
    /// Kernel variance for the fixed Gaussian method
    #[arg(long, default_value_t = 1.0)]
    variance: f64,
    #[arg(long, default_value_t = 4.0)]
    max_variance: f64,
    #[arg(long, default_value_t = 0.25)]
    step: f64,
    /// Bin into a single accumulator instead of per-thread partial volumes
    #[arg(long)]
    sequential: bool,
}

impl Args {
    fn config(&self) -> ReconstructionConfig {
        let bin_filling = match self.method {
            Method::Nearest => BinFilling::NearestNeighbor,
            Method::Gaussian => BinFilling::FixedGaussian {
                variance: self.variance,
            },
            Method::Adaptive => BinFilling::AdaptiveGaussian,
        };
        let hole_filling = match self.holes {
            Holes::None => HoleFilling::None,
            Holes::Fixed => HoleFilling::FixedRegion {
                radius: self.radius,
            },
            Holes::Growing => HoleFilling::GrowingRegion {
                max_radius: self.radius,
            },
        };
        let processor = if self.sequential {
            Processor::Sequential
        } else {
            Processor::Parallel
        };
        ReconstructionConfig::default()
            .with_resolution(self.resolution)
            .with_bin_filling(bin_filling)
            .with_hole_filling(hole_filling)
            .with_gaussian(self.max_variance, self.step)
            .with_processor(processor)
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut stack = StackLoader::load_from_directory(&args.input)?;
    if let Some(scale) = args.elevation_scale {
        stack = stack.with_elevation_scale(scale)?;
    }
    let reconstruction = reconstruct(&stack, &args.config())?;
    let (header, raw) = write_meta_image(&reconstruction.volume, &args.output)?;
    info!("Wrote {} and {}", header.display(), raw.display());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
