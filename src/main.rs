//! Main entry point for the dedupack CLI app.

use std::time::Instant;

use dedupack::cli::{self, SeverityLevel};
use dedupack::{pack, unpack, verify};
use tracing::info;

fn main() -> std::process::ExitCode {
    if let Err(e) = run_app() {
        eprintln!("Error: {e}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

fn run_app() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::run();

    // The verification verdict is reported at info level; keep it visible
    // when -t is requested.
    let mut severity = args.severity_level;
    if args.test_unpack && severity > SeverityLevel::Info {
        severity = SeverityLevel::Info;
    }
    tracing_subscriber::fmt()
        .with_max_level(severity.filter())
        .with_target(false)
        .init();

    if !args.input.exists() {
        return Err(format!(
            "you specified a nonexisting folder/file '{}'",
            args.input.display()
        )
        .into());
    }

    let started = Instant::now();

    if args.input.is_dir() {
        pack::pack_folder(&args.input, &args.output, args.compression_level)?;
    } else if args.input.is_file() {
        unpack::unpack_file(&args.input, &args.output)?;
    } else {
        return Err(format!(
            "you specified an unsupported kind of filesystem item: '{}'",
            args.input.display()
        )
        .into());
    }

    info!("executing time: {} ms", started.elapsed().as_millis());

    if args.input.is_dir() && args.test_unpack {
        if !verify::test_unpack(&args.input, &args.output) {
            return Err("fail, the unpacked directory does not match the source one".into());
        }
        info!("OK, unpacked and source directories are identical");
    }

    Ok(())
}
