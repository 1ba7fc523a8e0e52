//! Command-line interface for the spectral pipeline.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::PathBuf;
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::core::loaders::{self, Orientation};
use crate::core::writers;
use crate::processors::quantify::{self, Calibration, Cell, QuantTable};
use crate::processors::{integrate, normalize, scale, transform, IntegrationSession};

#[derive(Parser)]
#[command(name = "nmr-pipeline")]
#[command(about = "NMR spectral matrix processing pipeline", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform, normalize, and scale a spectral matrix
    Process {
        /// Input CSV/TXT file
        input: PathBuf,
        /// Output file (defaults to <input>_processed.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Input table layout: axis-major or sample-major
        #[arg(long, default_value = "axis-major")]
        orientation: Orientation,
        /// Transform method: none, log, glog, sqrt
        #[arg(short, long)]
        transform: Option<String>,
        /// Normalization method: none, total_area, pqn, vector, internal_standard
        #[arg(short, long)]
        normalize: Option<String>,
        /// Scaling method: none, auto, pareto, range, center
        #[arg(short, long)]
        scale: Option<String>,
        /// Stabilization offset for log/sqrt shifting
        #[arg(long)]
        epsilon: Option<f64>,
        /// Logarithm base: e, 2, 10
        #[arg(long)]
        log_base: Option<String>,
        /// Lambda parameter of the generalized logarithm
        #[arg(long)]
        glog_lambda: Option<f64>,
        /// Target row sum for total-area normalization
        #[arg(long)]
        scale_to: Option<f64>,
        /// Internal-standard reference region lower bound (ppm)
        #[arg(long)]
        ppm_min: Option<f64>,
        /// Internal-standard reference region upper bound (ppm)
        #[arg(long)]
        ppm_max: Option<f64>,
        /// Range-scaling target minimum
        #[arg(long)]
        range_min: Option<f64>,
        /// Range-scaling target maximum
        #[arg(long)]
        range_max: Option<f64>,
    },

    /// Integrate spectral regions and export the integral tables
    Integrate {
        /// Input CSV/TXT file
        input: PathBuf,
        /// Region as two axis values "start:end"; repeatable
        #[arg(short, long = "region", required = true)]
        regions: Vec<String>,
        /// Output for absolute integrals (defaults to <input>_integrals.<ext>)
        #[arg(long)]
        absolute_out: Option<PathBuf>,
        /// Also write relative integrals (integral / sample total) here
        #[arg(long)]
        relative_out: Option<PathBuf>,
        /// Print per-sample total intensities
        #[arg(long)]
        totals: bool,
    },

    /// Convert region integrals to concentrations via a calibration factor
    Quantify {
        /// Input CSV/TXT file
        input: PathBuf,
        /// Region as two axis values "start:end"; repeatable
        #[arg(short, long = "region", required = true)]
        regions: Vec<String>,
        /// Proton counts per region, comma-separated; non-numeric entries
        /// fall back to the configured default
        #[arg(long)]
        protons: Option<String>,
        /// Output file (defaults to <input>_concentrations.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// External standard: reference spectrum file
        #[arg(long)]
        reference: Option<PathBuf>,
        /// External standard: reference region "start:end"
        #[arg(long)]
        ref_region: Option<String>,
        /// External standard: proton count of the reference peak
        #[arg(long)]
        ref_protons: Option<f64>,
        /// External standard: known concentration of the reference
        #[arg(long)]
        ref_concentration: Option<f64>,
        /// Internal standard: region "start:end" of the standard peak
        #[arg(long)]
        standard_region: Option<String>,
        /// Internal standard: proton count of the standard peak
        #[arg(long)]
        standard_protons: Option<f64>,
        /// Internal standard: known concentration of the standard
        #[arg(long)]
        standard_concentration: Option<f64>,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.len() > 39 {
            format!("{}...", &value[..36])
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}, using defaults",
                    path.display(),
                    e
                );
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Process {
            input,
            output,
            orientation,
            transform,
            normalize,
            scale,
            epsilon,
            log_base,
            glog_lambda,
            scale_to,
            ppm_min,
            ppm_max,
            range_min,
            range_max,
        } => {
            let mut cfg = config;
            if let Some(m) = transform {
                cfg.transform.method = m;
            }
            if let Some(v) = epsilon {
                cfg.transform.epsilon = v;
            }
            if let Some(b) = log_base {
                cfg.transform.base = b;
            }
            if let Some(v) = glog_lambda {
                cfg.transform.glog_lambda = v;
            }
            if let Some(m) = normalize {
                cfg.normalize.method = m;
            }
            if let Some(v) = scale_to {
                cfg.normalize.scale_to = v;
            }
            if let Some(v) = ppm_min {
                cfg.normalize.ppm_min = v;
            }
            if let Some(v) = ppm_max {
                cfg.normalize.ppm_max = v;
            }
            if let Some(m) = scale {
                cfg.scale.method = m;
            }
            if let Some(v) = range_min {
                cfg.scale.range_min = v;
            }
            if let Some(v) = range_max {
                cfg.scale.range_max = v;
            }
            cmd_process(&input, output, orientation, &cfg);
        }
        Commands::Integrate {
            input,
            regions,
            absolute_out,
            relative_out,
            totals,
        } => {
            cmd_integrate(&input, &regions, absolute_out, relative_out, totals);
        }
        Commands::Quantify {
            input,
            regions,
            protons,
            output,
            reference,
            ref_region,
            ref_protons,
            ref_concentration,
            standard_region,
            standard_protons,
            standard_concentration,
        } => {
            let external = reference.map(|path| ExternalArgs {
                path,
                region: ref_region,
                protons: ref_protons,
                concentration: ref_concentration,
            });
            let internal = standard_region.map(|region| InternalArgs {
                region,
                protons: standard_protons,
                concentration: standard_concentration,
            });
            cmd_quantify(&input, &regions, protons, output, external, internal, &config);
        }
    }
}

fn cmd_process(
    input: &PathBuf,
    output: Option<PathBuf>,
    orientation: Orientation,
    cfg: &PipelineConfig,
) {
    let start = Instant::now();
    let spinner = create_spinner("Processing spectra...");

    match run_process(input, output, orientation, cfg) {
        Ok(outcome) => {
            spinner.finish_and_clear();

            print_summary(
                "Processing Complete",
                &[
                    ("Input file", input.display().to_string()),
                    ("Samples", outcome.n_samples.to_string()),
                    ("Points", outcome.n_points.to_string()),
                    ("Transform", cfg.transform.method.clone()),
                    ("Normalize", cfg.normalize.method.clone()),
                    ("Scale", cfg.scale.method.clone()),
                    ("NaN replaced", outcome.nan_count.to_string()),
                    ("Output file", outcome.output.display().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Processing failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

struct ProcessOutcome {
    n_samples: usize,
    n_points: usize,
    nan_count: usize,
    output: PathBuf,
}

fn run_process(
    input: &PathBuf,
    output: Option<PathBuf>,
    orientation: Orientation,
    cfg: &PipelineConfig,
) -> Result<ProcessOutcome> {
    let set = loaders::load_spectra(input, orientation)?;
    loaders::validate(&set)?;

    let mut data = set.intensities;

    // Clean NaN cells before any stage sees them
    let nan_count = data.iter().flatten().filter(|v| v.is_nan()).count();
    if nan_count > 0 {
        warn!("found {} NaN value(s) in the data; replaced with 0", nan_count);
        for row in &mut data {
            for v in row {
                if v.is_nan() {
                    *v = 0.0;
                }
            }
        }
    }

    if cfg.transform.method != "none" {
        data = transform::transform(&data, &cfg.transform.method, &cfg.transform)?;
    }
    if cfg.normalize.method != "none" {
        data = normalize::normalize(
            &data,
            &cfg.normalize.method,
            Some(&set.axis),
            &cfg.normalize,
        )?;
    }
    if cfg.scale.method != "none" {
        data = scale::scale(&data, &cfg.scale.method, &cfg.scale)?;
    }

    let output = output.unwrap_or_else(|| writers::output_filename(input, "_processed"));
    writers::write_processed_csv(&output, &set.axis, &data, &set.sample_names)?;
    info!("Processed data saved to: {}", output.display());

    Ok(ProcessOutcome {
        n_samples: data.len(),
        n_points: data.first().map_or(0, |row| row.len()),
        nan_count,
        output,
    })
}

fn cmd_integrate(
    input: &PathBuf,
    regions: &[String],
    absolute_out: Option<PathBuf>,
    relative_out: Option<PathBuf>,
    totals: bool,
) {
    let start = Instant::now();
    let spinner = create_spinner("Integrating regions...");

    match run_integrate(input, regions, absolute_out, relative_out) {
        Ok(outcome) => {
            spinner.finish_and_clear();

            if totals {
                println!("Total integral per sample:");
                for (name, total) in &outcome.totals {
                    println!("  {}: {}", name, total);
                }
            }

            let mut items = vec![
                ("Input file", input.display().to_string()),
                ("Samples", outcome.n_samples.to_string()),
                ("Regions", regions.len().to_string()),
                ("Absolute output", outcome.absolute_out.display().to_string()),
            ];
            if let Some(path) = &outcome.relative_out {
                items.push(("Relative output", path.display().to_string()));
            }
            items.push(("Duration", format!("{:.2?}", start.elapsed())));
            print_summary("Integration Complete", &items);
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Integration failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

struct IntegrateOutcome {
    n_samples: usize,
    totals: Vec<(String, f64)>,
    absolute_out: PathBuf,
    relative_out: Option<PathBuf>,
}

fn run_integrate(
    input: &PathBuf,
    regions: &[String],
    absolute_out: Option<PathBuf>,
    relative_out: Option<PathBuf>,
) -> Result<IntegrateOutcome> {
    let mut session = IntegrationSession::new();
    session.load_file(input)?;

    let index_pairs = resolve_regions(&session, regions)?;
    for (i1, i2) in index_pairs {
        session.calculate_integral(i1, i2)?;
    }

    let names: Vec<String> = session
        .sample_names()
        .ok_or_else(|| anyhow!("no dataset is loaded"))?
        .to_vec();

    let absolute_out =
        absolute_out.unwrap_or_else(|| writers::output_filename(input, "_integrals"));
    integrate::write_integral_table(&absolute_out, session.integrals(), &names, Some(4))?;
    info!("Absolute integrals saved to: {}", absolute_out.display());

    if let Some(path) = &relative_out {
        let relative = session.relative_integrals();
        integrate::write_integral_table(path, &relative, &names, None)?;
        info!("Relative integrals saved to: {}", path.display());
    }

    Ok(IntegrateOutcome {
        n_samples: names.len(),
        totals: session.totals().unwrap_or_default(),
        absolute_out,
        relative_out,
    })
}

struct ExternalArgs {
    path: PathBuf,
    region: Option<String>,
    protons: Option<f64>,
    concentration: Option<f64>,
}

struct InternalArgs {
    region: String,
    protons: Option<f64>,
    concentration: Option<f64>,
}

fn cmd_quantify(
    input: &PathBuf,
    regions: &[String],
    protons: Option<String>,
    output: Option<PathBuf>,
    external: Option<ExternalArgs>,
    internal: Option<InternalArgs>,
    cfg: &PipelineConfig,
) {
    let start = Instant::now();
    let spinner = create_spinner("Calculating concentrations...");

    match run_quantify(input, regions, protons, output, external, internal, cfg) {
        Ok(outcome) => {
            spinner.finish_and_clear();

            print_summary(
                "Quantification Complete",
                &[
                    ("Input file", input.display().to_string()),
                    ("Regions", regions.len().to_string()),
                    ("Calibration", outcome.mode.to_string()),
                    ("Output file", outcome.output.display().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Quantification failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

struct QuantifyOutcome {
    mode: &'static str,
    output: PathBuf,
}

fn run_quantify(
    input: &PathBuf,
    regions: &[String],
    protons: Option<String>,
    output: Option<PathBuf>,
    external: Option<ExternalArgs>,
    internal: Option<InternalArgs>,
    cfg: &PipelineConfig,
) -> Result<QuantifyOutcome> {
    let mut session = IntegrationSession::new();
    session.load_file(input)?;

    let index_pairs = resolve_regions(&session, regions)?;
    for (i1, i2) in index_pairs {
        session.calculate_integral(i1, i2)?;
    }

    let names: Vec<String> = session
        .sample_names()
        .ok_or_else(|| anyhow!("no dataset is loaded"))?
        .to_vec();
    let mut table = QuantTable::from_integrals(session.integrals(), &names);

    let proton_cells: Vec<Cell> = match &protons {
        Some(list) => list.split(',').map(Cell::parse).collect(),
        None => Vec::new(),
    };
    quantify::divide_by_protons(&mut table, &proton_cells, cfg.quantify.default_protons);

    // External calibration takes precedence when both are configured
    if external.is_some() && internal.is_some() {
        info!("both calibration modes given; using the external standard");
    }
    let (calibration, mode) = if let Some(ext) = external {
        let region = ext
            .region
            .ok_or_else(|| anyhow!("--ref-region is required with --reference"))?;
        let (start, end) = parse_region(&region)?;
        let ref_protons = ext
            .protons
            .ok_or_else(|| anyhow!("--ref-protons is required with --reference"))?;
        let concentration = ext
            .concentration
            .ok_or_else(|| anyhow!("--ref-concentration is required with --reference"))?;

        let reference = loaders::load_spectra(&ext.path, Orientation::SampleMajor)
            .with_context(|| format!("failed to load reference {}", ext.path.display()))?;
        loaders::validate(&reference)?;

        let k = quantify::external_standard_factor(
            &reference,
            start,
            end,
            ref_protons,
            concentration,
        )?;
        info!("External standard factor K = {:.6}", k);
        (Calibration::External(k), "external")
    } else if let Some(int) = internal {
        let (start, end) = parse_region(&int.region)?;
        let std_protons = int
            .protons
            .ok_or_else(|| anyhow!("--standard-protons is required with --standard-region"))?;
        let concentration = int.concentration.ok_or_else(|| {
            anyhow!("--standard-concentration is required with --standard-region")
        })?;

        let set = session
            .dataset()
            .ok_or_else(|| anyhow!("no dataset is loaded"))?;
        let factors =
            quantify::internal_standard_factors(set, start, end, std_protons, concentration)?;
        info!("Internal standard factors computed for {} sample(s)", factors.len());
        (Calibration::Internal(factors), "internal")
    } else {
        (Calibration::None, "none")
    };

    calibration.apply(&mut table)?;

    let output = output.unwrap_or_else(|| writers::output_filename(input, "_concentrations"));
    quantify::write_quant_table(&output, &table)?;
    info!("Concentrations saved to: {}", output.display());

    Ok(QuantifyOutcome { mode, output })
}

/// Parse "start:end" region strings and map them to the nearest column
/// indices of the loaded axis.
fn resolve_regions(
    session: &IntegrationSession,
    regions: &[String],
) -> Result<Vec<(usize, usize)>> {
    let set = session
        .dataset()
        .ok_or_else(|| anyhow!("no dataset is loaded"))?;

    let mut pairs = Vec::with_capacity(regions.len());
    for region in regions {
        let (start, end) = parse_region(region)?;
        let i1 = set
            .nearest_index(start)
            .ok_or_else(|| anyhow!("the loaded axis is empty"))?;
        let i2 = set
            .nearest_index(end)
            .ok_or_else(|| anyhow!("the loaded axis is empty"))?;
        pairs.push((i1, i2));
    }
    Ok(pairs)
}

fn parse_region(region: &str) -> Result<(f64, f64)> {
    let (start, end) = region
        .split_once(':')
        .ok_or_else(|| anyhow!("invalid region '{}': expected 'start:end'", region))?;
    let start: f64 = start
        .trim()
        .parse()
        .with_context(|| format!("invalid region bound '{}'", start))?;
    let end: f64 = end
        .trim()
        .parse()
        .with_context(|| format!("invalid region bound '{}'", end))?;
    if start == end {
        bail!("invalid region '{}': bounds are equal", region);
    }
    Ok((start, end))
}
