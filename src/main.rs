use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use facewatch::cli::Args;
use facewatch::config::Settings;
use facewatch::detect::{self, BrightSpotDetector, SimilarityAligner};
use facewatch::notify::{NotificationSink, SlackNotifier};
use facewatch::recognize::HttpRecognizer;
use facewatch::startup::StartupError;
use facewatch::{logging, pipeline, source};

fn main() {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    let args = Args::parse_args();
    if let Err(e) = run(args) {
        // The subscriber may be writing to a file, so the failure goes
        // to stderr as well.
        eprintln!("{e}");
        error!("{e}");
        process::exit(e.exit_code());
    }
}

fn run(args: Args) -> Result<(), StartupError> {
    logging::init(args.log_file.as_deref())?;

    let mut settings = Settings::load(args.config.as_deref())?;
    settings.apply_cli(&args);

    let source = source::open(&settings.video)?;
    detect::check_resources(&settings.detector)?;

    let url = settings
        .recognition
        .url
        .clone()
        .ok_or(StartupError::NoEndpoint)?;
    let backend = Box::new(HttpRecognizer::new(url, settings.recognition.timeout));

    let sink: Option<Box<dyn NotificationSink>> = settings
        .notify
        .as_ref()
        .map(|notify| -> Box<dyn NotificationSink> {
            Box::new(SlackNotifier::new(
                notify.channel_id.clone(),
                notify.token.clone(),
            ))
        });
    if sink.is_none() {
        info!("notifications disabled, no channel configured");
    }

    let running = Arc::new(AtomicBool::new(true));
    let stop = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        stop.store(false, Ordering::SeqCst);
    }) {
        error!("could not install shutdown handler: {e}");
    }

    let handles = pipeline::start(
        source,
        Box::new(BrightSpotDetector::default()),
        Box::new(SimilarityAligner::new()),
        backend,
        sink,
        &settings,
        running,
    );
    handles.join();
    info!("shutdown complete");
    Ok(())
}
