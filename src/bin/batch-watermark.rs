use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};

use batch_watermark_removal::config::{
    DEFAULT_COLOR, DEFAULT_MASK_THRESHOLD, DEFAULT_MATCH_THRESHOLD, DEFAULT_REFINE_COUNT,
};
use batch_watermark_removal::{
    default_output_dir, list_images, Config, ProcessResult, Roi, WatermarkEngine,
};

#[derive(Parser)]
#[command(
    name = "batch-watermark",
    about = "Remove a repeated semi-transparent watermark from a batch of same-sized photos",
    version,
    after_help = "Workflow:\n  \
                  1. batch-watermark <alpha> -i <dir> --preview mean.png\n  \
                  2. Open mean.png, note the rectangle X,Y,W,H around one watermark\n  \
                  3. batch-watermark <alpha> -i <dir> --roi X,Y,W,H -o <out_dir>\n\n\
                  ROI coordinates are in preview pixels and are divided by --display-scale."
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Alpha of the watermark (0-255)
    alpha: u8,

    /// Directory of watermarked photos
    #[arg(short, long)]
    input_dir: PathBuf,

    /// Directory to write cleaned photos to (default: {input_dir}_cleaned)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Seed rectangle X,Y,W,H around one watermark, in preview coordinates
    #[arg(long, value_parser = parse_roi)]
    roi: Option<[u32; 4]>,

    /// Write the averaged batch, scaled by --display-scale, to this file and exit
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Scale of the preview the ROI was picked on
    #[arg(long, default_value = "0.5")]
    display_scale: f32,

    /// Gray level the watermark was rendered in (0-255)
    #[arg(long, default_value_t = DEFAULT_COLOR)]
    color: u8,

    /// Minimum normalized correlation to accept a match (0.0-1.0)
    #[arg(long, default_value_t = DEFAULT_MATCH_THRESHOLD)]
    match_threshold: f32,

    /// Minimum estimate value counted as watermark (0-255)
    #[arg(long, default_value_t = DEFAULT_MASK_THRESHOLD)]
    mask_threshold: u8,

    /// Number of watermark estimates (seed plus refinements)
    #[arg(long, default_value_t = DEFAULT_REFINE_COUNT)]
    refine_count: u32,

    /// Stop refining if the number of located instances changes between passes
    #[arg(long)]
    stable_count: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn parse_roi(s: &str) -> Result<[u32; 4], String> {
    let parts: Vec<u32> = s
        .split(',')
        .map(|p| p.trim().parse::<u32>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<Result<_, _>>()?;
    <[u32; 4]>::try_from(parts).map_err(|v| format!("expected X,Y,W,H, got {} value(s)", v.len()))
}

fn init_logging(verbose: bool, quiet: bool) -> Option<LoggerHandle> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    match Logger::try_with_env_or_str(level).and_then(|l| l.log_to_stderr().start()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Warning: failed to initialize logging: {e}");
            None
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let _logger = init_logging(cli.verbose, cli.quiet);

    let config = Config {
        alpha: cli.alpha,
        color: cli.color,
        match_threshold: cli.match_threshold,
        mask_threshold: cli.mask_threshold,
        refine_count: cli.refine_count,
        require_stable_count: cli.stable_count,
    };

    let engine = match WatermarkEngine::new(config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if !cli.input_dir.is_dir() {
        eprintln!(
            "Error: Input directory does not exist: {}",
            cli.input_dir.display()
        );
        process::exit(1);
    }

    if let Some(preview_path) = &cli.preview {
        write_preview(&engine, &cli, preview_path);
        return;
    }

    let Some(rect) = cli.roi else {
        eprintln!("Error: --roi is required (use --preview to pick one)");
        process::exit(1);
    };
    let seed = match Roi::from_display(rect, cli.display_scale) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| default_output_dir(&cli.input_dir));

    let results = match engine.process_directory(&cli.input_dir, &output_dir, seed) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Fatal: {e}");
            process::exit(1);
        }
    };

    let mut success_count = 0u32;
    let mut skip_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, &cli);
        if r.skipped {
            skip_count += 1;
        } else if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if !cli.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {success_count}");
        if skip_count > 0 {
            eprint!(", Unmodified: {skip_count}");
        }
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn write_preview(engine: &WatermarkEngine, cli: &Cli, path: &Path) {
    let gray = list_images(&cli.input_dir).and_then(|paths| {
        paths
            .iter()
            .map(|p| -> batch_watermark_removal::Result<_> { Ok(image::open(p)?.to_luma8()) })
            .collect::<batch_watermark_removal::Result<Vec<_>>>()
    });
    let preview = gray.and_then(|g| engine.preview(&g, cli.display_scale));
    match preview.map(|img| img.save(path)) {
        Ok(Ok(())) => {
            if !cli.quiet {
                eprintln!("Wrote averaged preview to {}", path.display());
            }
        }
        Ok(Err(e)) => {
            eprintln!("Error: failed to save preview: {e}");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn print_result(result: &ProcessResult, cli: &Cli) {
    if cli.quiet && result.success {
        return;
    }
    for line in report_lines(result, cli.verbose) {
        eprintln!("{line}");
    }
}

fn report_lines(result: &ProcessResult, verbose: bool) -> Vec<String> {
    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if result.skipped {
        vec![format!("[SKIP] {filename}: {}", result.message)]
    } else if result.success {
        let mut lines = vec![format!("[OK] {filename} ({} instance(s))", result.instances)];
        if verbose && !result.message.is_empty() {
            lines.push(format!("  -> {}", result.message));
        }
        lines
    } else {
        vec![format!("[FAIL] {filename}: {}", result.message)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(success: bool, skipped: bool, message: &str) -> ProcessResult {
        ProcessResult {
            path: PathBuf::from("batch/photo.jpg"),
            success,
            skipped,
            instances: usize::from(success && !skipped) * 2,
            message: message.to_string(),
        }
    }

    #[test]
    fn parse_roi_accepts_four_values() {
        assert_eq!(parse_roi("1, 2,3,4"), Ok([1, 2, 3, 4]));
        assert!(parse_roi("1,2,3").is_err());
        assert!(parse_roi("1,2,x,4").is_err());
    }

    #[test]
    fn verbose_report_states_each_message_once() {
        let skipped = report_lines(&result(true, true, "no watermark located"), true);
        assert_eq!(skipped, vec!["[SKIP] photo.jpg: no watermark located"]);

        let failed = report_lines(&result(false, false, "Failed to load: bad"), true);
        assert_eq!(failed, vec!["[FAIL] photo.jpg: Failed to load: bad"]);

        let cleaned = report_lines(&result(true, false, "cleaned 2 instance(s)"), true);
        assert_eq!(
            cleaned,
            vec!["[OK] photo.jpg (2 instance(s))", "  -> cleaned 2 instance(s)"]
        );
        assert_eq!(report_lines(&result(true, false, "cleaned"), false).len(), 1);
    }
}
