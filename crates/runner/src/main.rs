use std::process::ExitCode;
use std::sync::Arc;
use vigil_clock::SystemClock;
use vigil_runner::{AnalysisReport, RegimeBacktest, StreamAnalyzer, VigilConfig, generate_stream};

const USAGE: &str = "\
Usage: vigil [OPTIONS]

Generate a synthetic stream, analyze it and print the report.

Options:
  --config PATH   JSON config file (defaults for anything missing)
  --points N      Number of points to generate
  --seed S        Seed for the stream and the reconstruction model
  --regimes       Backtest the regime classifier on a regime-switching path
  --json          Print the report as JSON
  -h, --help      Print this help";

#[derive(Debug, Default)]
struct Args {
    config: Option<String>,
    points: Option<usize>,
    seed: Option<u64>,
    regimes: bool,
    json: bool,
    help: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => parsed.config = Some(value_of(&arg, args.next())?),
            "--points" => {
                let v = value_of(&arg, args.next())?;
                parsed.points = Some(v.parse().map_err(|_| format!("Invalid --points: {}", v))?);
            }
            "--seed" => {
                let v = value_of(&arg, args.next())?;
                parsed.seed = Some(v.parse().map_err(|_| format!("Invalid --seed: {}", v))?);
            }
            "--regimes" => parsed.regimes = true,
            "--json" => parsed.json = true,
            "-h" | "--help" => parsed.help = true,
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }
    Ok(parsed)
}

fn value_of(flag: &str, value: Option<String>) -> Result<String, String> {
    value.ok_or_else(|| format!("{} needs a value", flag))
}

fn run(args: Args) -> Result<(), String> {
    let mut config = match &args.config {
        Some(path) => VigilConfig::from_file(path).map_err(|e| e.to_string())?,
        None => VigilConfig::default(),
    };
    if let Some(points) = args.points {
        config.synthetic.n_points = points;
    }
    if let Some(seed) = args.seed {
        config.synthetic.seed = Some(seed);
        config.reconstruction.seed = Some(seed);
    }

    if args.regimes {
        let backtest =
            RegimeBacktest::run(&config.regime, config.synthetic.n_points, config.synthetic.seed);
        if args.json {
            println!("{}", backtest.to_json().map_err(|e| e.to_string())?);
        } else {
            print!("{}", backtest);
        }
        return Ok(());
    }

    let stream = generate_stream(&config.synthetic);
    log::info!(
        "Generated {} points with {} injected anomalies",
        stream.observations.len(),
        stream.injected_count()
    );

    let mut analyzer = StreamAnalyzer::new(&config, Arc::new(SystemClock::new()));
    analyzer
        .prepare(&stream.observations)
        .map_err(|e| e.to_string())?;
    let result = analyzer
        .analyze(&stream.observations)
        .map_err(|e| e.to_string())?;
    analyzer.raise_alerts(&result);

    let report = AnalysisReport::new(&result, analyzer.alerts());
    if args.json {
        println!("{}", report.to_json().map_err(|e| e.to_string())?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };
    if args.help {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
