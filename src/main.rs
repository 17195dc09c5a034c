use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use cellscope::batch::{self, ImageReport};
use cellscope::calibration::ocr::OcrScaleReader;
use cellscope::optimizer::{AutoFitOptimizer, MatchingPolicy, OptimizerConfig};
use cellscope::{CellDetector, DetectionAlgorithm, DetectionContext, DetectionParams, ScaleCalibrator};

#[derive(Parser)]
#[command(name = "cellscope")]
#[command(about = "Detect and measure cells in microscope images")]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect cells in one or more images
    Detect {
        /// Input image files
        #[arg(value_name = "IMAGES", required = true)]
        images: Vec<PathBuf>,

        /// Detection algorithm (overrides the parameter file)
        #[arg(long, value_enum)]
        algorithm: Option<AlgorithmArg>,

        /// JSON parameter file; missing fields take their defaults
        #[arg(long, value_name = "FILE")]
        params: Option<PathBuf>,

        /// Neural network model (.rten) for the neural-network algorithm
        #[arg(long, value_name = "FILE")]
        model: Option<PathBuf>,

        /// Read the scale bar and report physical diameters
        #[arg(long)]
        calibrate: bool,

        /// Read the scale label with OCR instead of the blob heuristic
        #[arg(long)]
        ocr_scale: bool,

        /// Save intermediate masks to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,
    },

    /// Locate the scale bar of an image and print the calibration factor
    Calibrate {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Read the scale label with OCR instead of the blob heuristic
        #[arg(long)]
        ocr_scale: bool,
    },

    /// Fit Hough parameters to marked cell centres
    Autofit {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Marked cell centre as X,Y (repeatable)
        #[arg(long = "point", value_name = "X,Y", value_parser = parse_point)]
        points: Vec<(f64, f64)>,

        /// Starting parameter file
        #[arg(long, value_name = "FILE")]
        params: Option<PathBuf>,

        /// Search time budget in seconds
        #[arg(long, default_value_t = 60)]
        budget_secs: u64,

        /// Match points greedily in input order instead of optimally
        #[arg(long)]
        greedy: bool,
    },

    /// List the available detection algorithms
    Algorithms,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    Hough,
    Contour,
    Watershed,
    Morphology,
    Adaptive,
    Blob,
    Neural,
}

impl From<AlgorithmArg> for DetectionAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Hough => DetectionAlgorithm::HoughCircles,
            AlgorithmArg::Contour => DetectionAlgorithm::ContourBased,
            AlgorithmArg::Watershed => DetectionAlgorithm::Watershed,
            AlgorithmArg::Morphology => DetectionAlgorithm::Morphology,
            AlgorithmArg::Adaptive => DetectionAlgorithm::AdaptiveThreshold,
            AlgorithmArg::Blob => DetectionAlgorithm::BlobDetection,
            AlgorithmArg::Neural => DetectionAlgorithm::NeuralNetwork,
        }
    }
}

fn parse_point(s: &str) -> Result<(f64, f64), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got '{}'", s))?;
    let x = x.trim().parse::<f64>().map_err(|e| format!("bad X in '{}': {}", s, e))?;
    let y = y.trim().parse::<f64>().map_err(|e| format!("bad Y in '{}': {}", s, e))?;
    Ok((x, y))
}

fn load_params(path: Option<&PathBuf>) -> anyhow::Result<DetectionParams> {
    match path {
        Some(path) => DetectionParams::from_json_file(path),
        None => Ok(DetectionParams::default()),
    }
}

fn make_calibrator(ocr_scale: bool) -> anyhow::Result<ScaleCalibrator> {
    if ocr_scale {
        Ok(ScaleCalibrator::with_source(Box::new(OcrScaleReader::from_default_models()?)))
    } else {
        Ok(ScaleCalibrator::new())
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match args.command {
        Commands::Detect {
            images,
            algorithm,
            params,
            model,
            calibrate,
            ocr_scale,
            debug_out,
        } => {
            let mut params = load_params(params.as_ref())?;
            if let Some(algorithm) = algorithm {
                params.algorithm = algorithm.into();
            }

            let mut ctx = DetectionContext::new();
            if let Some(debug_dir) = debug_out {
                ctx = ctx.with_debug(debug_dir)?;
            }

            let mut detector = CellDetector::new();
            let model_path = model.or_else(|| {
                (!params.neural.model_path.is_empty()).then(|| PathBuf::from(&params.neural.model_path))
            });
            if let Some(model_path) = model_path {
                detector.load_model(&model_path, params.neural.use_gpu)?;
            }

            let calibrator = if calibrate { Some(make_calibrator(ocr_scale)?) } else { None };

            let reports = batch::process_images(&images, &params, &detector, calibrator.as_ref(), &ctx);
            for report in &reports {
                print_report(report);
            }
            if reports.len() < images.len() {
                println!("\n{} of {} images could not be read", images.len() - reports.len(), images.len());
            }
        }

        Commands::Calibrate { image, ocr_scale } => {
            let img = batch::load_image(&image)?;
            let calibrator = make_calibrator(ocr_scale)?;

            match calibrator.measure(&img, &DetectionContext::new()) {
                Some(bar) => {
                    println!("\n=== Scale Bar ===");
                    println!(
                        "Line: ({:.0}, {:.0}) - ({:.0}, {:.0}), length {:.1}px",
                        bar.line.x1,
                        bar.line.y1,
                        bar.line.x2,
                        bar.line.y2,
                        bar.line.length()
                    );
                    let origin = if bar.value_recognized { "recognized" } else { "fallback" };
                    println!("Label value: {} ({})", bar.value, origin);
                    println!("Calibration factor: {:.6} units/px", bar.factor);
                }
                None => println!("No scale bar found; calibration factor 0"),
            }
        }

        Commands::Autofit {
            image,
            points,
            params,
            budget_secs,
            greedy,
        } => {
            let img = batch::load_image(&image)?;
            let current = load_params(params.as_ref())?;
            let optimizer = AutoFitOptimizer::new(OptimizerConfig {
                time_budget: Duration::from_secs(budget_secs),
                matching: if greedy { MatchingPolicy::Greedy } else { MatchingPolicy::Optimal },
            });

            let result = optimizer.fit(&img, &points, &current);
            println!("\n=== Auto-Fit Result ===");
            println!(
                "Outcome: {:?}, score {:.3} after {} trials in {:.1}s",
                result.outcome,
                result.score,
                result.trials,
                result.elapsed.as_secs_f64()
            );
            println!("{}", result.params.to_json()?);
        }

        Commands::Algorithms => {
            for algorithm in DetectionAlgorithm::ALL {
                let name = serde_json::to_value(algorithm)?;
                println!("  {:<20} {}", name.as_str().unwrap_or_default(), algorithm.description());
            }
        }
    }

    Ok(())
}

fn print_report(report: &ImageReport) {
    println!("\n=== {} ({}x{}) ===", report.path.display(), report.width, report.height);
    println!("Total cells detected: {}", report.cells.len());
    if report.calibration_factor > 0.0 {
        println!("Calibration factor: {:.6} units/px", report.calibration_factor);
    }

    for (i, cell) in report.cells.iter().enumerate() {
        let class = if cell.class_name.is_empty() {
            String::new()
        } else {
            format!(" [{}]", cell.class_name)
        };
        if cell.is_calibrated() {
            println!(
                "  Cell {} at ({:.1}, {:.1}) - diameter {:.1}px / {:.3} units{}",
                i + 1,
                cell.center_x,
                cell.center_y,
                cell.diameter_px,
                cell.diameter_unit,
                class
            );
        } else {
            println!(
                "  Cell {} at ({:.1}, {:.1}) - diameter {:.1}px{}",
                i + 1,
                cell.center_x,
                cell.center_y,
                cell.diameter_px,
                class
            );
        }
    }
}
