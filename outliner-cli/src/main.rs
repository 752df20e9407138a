use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use outliner_core::{
    layout::model::{
        LayoutModelConfig, ORTConfig, ORTLayoutParser, OrtExecutionProvider, LAYOUT_MODEL_FILE,
    },
    ocr::crnn::{CrnnConfig, CrnnRecognizer, RECOGNITION_DICT_FILE, RECOGNITION_MODEL_FILE},
    pdf::pdfium::PdfiumBackend,
    save_document_record, DocumentOutcome, ExtractConfig, InputDocument, OutlineExtractor,
    WorkerModels,
};
use std::{
    fmt::Write,
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::Instrument;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Outliner - extract titles and heading outlines from PDFs",
    long_about = "Outliner renders every page of every PDF in a directory, detects titles and section headers with a layout model, and writes one JSON outline per document."
)]
struct Args {
    /// Directory scanned for `.pdf` files (not recursive)
    #[arg(env = "OUTLINER_INPUT_DIR", default_value = "input")]
    input_dir: PathBuf,

    /// One `<name>.json` per processed document is written here
    #[arg(long, short, env = "OUTLINER_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Directory holding the default model files
    #[arg(long, env = "OUTLINER_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "OUTLINER_LAYOUT_MODEL_PATH",
        help = "Path to the DocLayNet layout model (defaults to <model-dir>/yolov11n-doclaynet.onnx)"
    )]
    layout_model_path: Option<PathBuf>,

    #[arg(
        long,
        env = "OUTLINER_OCR_MODEL_PATH",
        help = "Path to the text recognition model"
    )]
    ocr_model_path: Option<PathBuf>,

    #[arg(
        long,
        env = "OUTLINER_OCR_DICT_PATH",
        help = "Path to the character dictionary of the recognition model"
    )]
    ocr_dict_path: Option<PathBuf>,

    /// Directory containing the pdfium shared library. Uses the system
    /// library when unset.
    #[arg(long, env = "OUTLINER_PDFIUM_DIR")]
    pdfium_dir: Option<PathBuf>,

    /// Number of page workers, each loading its own models
    #[arg(long, short, env = "OUTLINER_WORKERS")]
    workers: Option<usize>,

    #[arg(
        long,
        env = "OUTLINER_TIMEOUT",
        default_value_t = ExtractConfig::RESULT_TIMEOUT.as_secs(),
        help = "Seconds to wait for the next page result before giving up"
    )]
    timeout: u64,

    #[arg(
        long,
        default_value_t = 3,
        value_parser = clap::value_parser!(u8).range(1..=6),
        help = "Maximum number of heading levels"
    )]
    heading_levels: u8,

    #[arg(
        long,
        default_value_t = cfg!(target_os = "macos"),
        help = "Enable or disable the use of CoreML for inference"
    )]
    coreml: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "Only use the Apple Neural Engine (only applies when CoreML is enabled)"
    )]
    use_ane: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "Enable or disable the use of TensorRT for inference"
    )]
    trt: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "Enable or disable the use of CUDA for inference"
    )]
    cuda: bool,

    /// CUDA device ID to use for GPU acceleration (e.g. 0 for first GPU)
    #[arg(long, default_value_t = 0)]
    device_id: i32,

    /// Threads used within one operation, per worker session
    #[arg(long, default_value_t = ORTConfig::ORT_INTRATHREAD)]
    intra_threads: usize,

    /// Threads used to run operations in parallel, per worker session
    #[arg(long, default_value_t = ORTConfig::ORT_INTERTHREAD)]
    inter_threads: usize,

    #[arg(long, short = 'O', help = "Ort graph optimization level (0-3)")]
    graph_opt_level: Option<u8>,

    /// Writes annotated page images to this directory
    #[arg(long, env = "OUTLINER_DEBUG_DIR")]
    debug_dir: Option<PathBuf>,

    /// Append-only operational log
    #[arg(long, env = "OUTLINER_LOG_FILE", default_value = "processing.log")]
    log_file: PathBuf,
}

fn init_tracing(log_file: &Path) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_env("LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new("outliner_core=info,outliner=info"));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_writer(Arc::new(file));

    // Keep the terminal for the progress bar, only surface problems
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;
    Ok(())
}

fn parse_ep_args(args: &Args) -> Vec<OrtExecutionProvider> {
    let mut providers = Vec::new();
    if args.trt {
        providers.push(OrtExecutionProvider::Trt(args.device_id));
    }
    if args.cuda {
        providers.push(OrtExecutionProvider::CUDA(args.device_id));
    }

    if args.coreml {
        providers.push(OrtExecutionProvider::CoreML {
            ane_only: args.use_ane,
        });
    }
    providers.push(OrtExecutionProvider::CPU);
    providers
}

fn default_model_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("outliner")
        .join("models")
}

/// Non-recursive, case-insensitive `.pdf` scan, sorted by file name.
async fn scan_input_dir(input_dir: &Path) -> anyhow::Result<Vec<InputDocument>> {
    let mut entries = tokio::fs::read_dir(input_dir).await.map_err(|e| {
        anyhow::anyhow!("can't read input directory {}: {e}", input_dir.display())
    })?;
    let mut documents = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pdf"));
        if !is_pdf || !entry.file_type().await?.is_file() {
            continue;
        }
        let doc_id = entry.file_name().to_string_lossy().into_owned();
        documents.push(InputDocument::new(doc_id, path));
    }
    documents.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
    Ok(documents)
}

fn setup_progress_bar(documents: usize) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(documents as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .with_key("eta", |state: &ProgressState, w: &mut dyn Write| {
            let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
        })
        .progress_chars("#>-"),
    );
    Ok(pb)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_file)?;

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("run", %run_id);
    run(args).instrument(span).await
}

async fn run(args: Args) -> anyhow::Result<()> {
    let model_dir = args.model_dir.clone().unwrap_or_else(default_model_dir);
    let ort_config = ORTConfig {
        execution_providers: parse_ep_args(&args),
        intra_threads: args.intra_threads,
        inter_threads: args.inter_threads,
        opt_level: args.graph_opt_level,
    };
    let layout_config = LayoutModelConfig::new(
        args.layout_model_path
            .clone()
            .unwrap_or_else(|| model_dir.join(LAYOUT_MODEL_FILE)),
        ort_config.clone(),
    );
    let crnn_config = CrnnConfig::new(
        args.ocr_model_path
            .clone()
            .unwrap_or_else(|| model_dir.join(RECOGNITION_MODEL_FILE)),
        args.ocr_dict_path
            .clone()
            .unwrap_or_else(|| model_dir.join(RECOGNITION_DICT_FILE)),
        ort_config,
    );

    println!("Scanning input directory...");
    tracing::info!("scanning {}", args.input_dir.display());
    let documents = scan_input_dir(&args.input_dir).await?;
    if documents.is_empty() {
        tracing::error!("no PDF files found in {}", args.input_dir.display());
        println!(
            "{} No PDF files found in {}",
            "✗".red().bold(),
            args.input_dir.display()
        );
        return Ok(());
    }
    tokio::fs::create_dir_all(&args.output_dir).await?;
    if let Some(debug_dir) = &args.debug_dir {
        tokio::fs::create_dir_all(debug_dir).await?;
    }

    let workers = args.workers.unwrap_or_else(ExtractConfig::default_workers);
    let config = ExtractConfig {
        workers,
        result_timeout: Duration::from_secs(args.timeout),
        task_capacity: workers * 2,
        result_capacity: workers * 2,
        heading_levels: args.heading_levels as usize,
        debug_dir: args.debug_dir.clone(),
        ..Default::default()
    };

    let backend = Arc::new(PdfiumBackend::new(args.pdfium_dir.as_deref())?);
    println!("Starting {workers} workers...");
    let extractor = OutlineExtractor::start(backend, config, move |id| {
        tracing::info!("worker {id} loading models");
        Ok(WorkerModels {
            detector: Box::new(ORTLayoutParser::new(&layout_config)?),
            recognizer: Box::new(CrnnRecognizer::new(&crnn_config)?),
        })
    })
    .await?;
    println!(
        "{} {} workers ready",
        "✓".green().bold(),
        extractor.healthy_workers()
    );

    let pb = setup_progress_bar(documents.len())?;
    let output_dir = args.output_dir.clone();
    let report = extractor
        .run(documents, |outcome| {
            match outcome {
                DocumentOutcome::Completed(done) => {
                    match save_document_record(&done.record, &output_dir, &done.doc_id) {
                        Ok(path) => {
                            tracing::info!("saved outline of {} to {}", done.doc_id, path.display());
                            pb.set_message(done.doc_id.clone());
                        }
                        Err(e) => {
                            tracing::error!("can't save outline of {}: {e:#}", done.doc_id);
                            pb.println(format!(
                                "{} {}: can't save outline: {e:#}",
                                "✗".red().bold(),
                                done.doc_id
                            ));
                        }
                    }
                }
                DocumentOutcome::Failed(failure) => {
                    pb.println(format!("{} {failure}", "✗".red().bold()));
                }
            }
            pb.inc(1);
        })
        .await;
    pb.finish_and_clear();

    println!(
        "{} {} documents processed in {:.2}s",
        "✓".green().bold(),
        report.completed.len(),
        report.elapsed.as_secs_f64()
    );
    if !report.failed.is_empty() {
        println!(
            "{} {} documents failed",
            "✗".red().bold(),
            report.failed.len()
        );
    }
    if let Some(reason) = &report.aborted {
        println!("{} run stopped early: {reason}", "ℹ".yellow().bold());
    }
    println!(
        "{} Results saved in: {}",
        "✓".green().bold(),
        args.output_dir.display().to_string().cyan().underline()
    );
    Ok(())
}
