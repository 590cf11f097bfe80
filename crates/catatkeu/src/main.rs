use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use clap::{Parser, Subcommand};
use log::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use catatkeu::config::{load_config, Config};
use catatkeu::db::Profile;
use catatkeu::error::ConfigError;
use catatkeu::reconcile::{PreloadCache, Reconciler, RESERVED_ADMIN_USER_ID};
use catatkeu::storage::Archiver;
use catatkeu::store::{RecordStore, SqliteStore};
use catatkeu::updater::{self, UpdaterOptions};
use catatkeu::worker::{list_image_files, watch, WorkerPool};
use catatkeu::{AmountExtractor, Result, TesseractEngine};

#[derive(Parser)]
#[command(
    name = "catatkeu",
    version,
    about = "Watch a receipt drop directory, OCR amounts and record catatan keuangan"
)]
struct Cli {
    /// Optional JSON config file; flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the drop directory, reconcile every file, optionally keep
    /// watching for new ones.
    Process {
        /// Directory to scan for receipt images.
        #[arg(long)]
        dir: Option<String>,

        /// Profile ID to assign uploads to (default: the admin profile).
        #[arg(long = "profile-id")]
        profile_id: Option<i64>,

        /// Skip all DB writes and archival; just list files.
        #[arg(long)]
        dry_run: bool,

        /// In dry-run: actually run OCR to show potential amounts.
        #[arg(long)]
        simulate_ocr: bool,

        /// Watch the directory for new files after the initial scan.
        #[arg(long)]
        watch: bool,

        /// Worker pool size (default: CPU count).
        #[arg(long)]
        workers: Option<usize>,

        /// Verbose per-file logging.
        #[arg(long)]
        verbose: bool,

        /// SQLite database path.
        #[arg(long)]
        database: Option<String>,
    },

    /// Re-run OCR over a directory and update matching record amounts.
    UpdateAmounts {
        /// Directory holding the files to re-OCR.
        #[arg(long)]
        dir: Option<String>,

        /// Only print proposed changes.
        #[arg(long)]
        dry: bool,

        /// Minimum confidence for accepting a re-OCR result.
        #[arg(long = "min-conf")]
        min_conf: Option<f64>,

        /// SQLite database path.
        #[arg(long)]
        database: Option<String>,
    },
}

fn init_logging() {
    // Bridge log:: macros from the library and third-party crates into
    // tracing.
    tracing_log::LogTracer::init().expect("failed to initialize log bridge");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default()
        .with(env_filter)
        .with(fmt::layer().with_target(true));

    // set_global_default instead of .init(): LogTracer::init() already ran.
    tracing::subscriber::set_global_default(subscriber)
        .expect("failed to set global default subscriber");
}

fn base_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => Ok(Config::default()),
    }
}

/// Finds the profile either by explicit id or via the admin user.
fn resolve_profile(
    store: &dyn RecordStore,
    profile_id: Option<i64>,
    admin_user_id: i64,
) -> Result<Profile> {
    if let Some(id) = profile_id {
        return store.profile_by_id(id)?.ok_or_else(|| {
            ConfigError::Validation {
                message: format!("profile id {id} not found"),
            }
            .into()
        });
    }
    store.profile_by_user(admin_user_id)?.ok_or_else(|| {
        ConfigError::Validation {
            message: "no --profile-id provided and admin profile not found".to_string(),
        }
        .into()
    })
}

/// The system principal. Read once at startup; falls back to the reserved id
/// when no admin row exists yet.
fn resolve_admin_user_id(store: &dyn RecordStore) -> Result<i64> {
    Ok(store
        .user_by_username("admin")?
        .map(|u| u.id)
        .unwrap_or(RESERVED_ADMIN_USER_ID))
}

fn run_process(
    config: Config,
    watch_mode: bool,
) -> Result<()> {
    let watch_dir = config.watch_path();

    if config.dry_run {
        info!(
            "Dry-run: scanning {} (no DB interaction)",
            watch_dir.display()
        );
        let files = list_image_files(&watch_dir);
        info!("Found {} candidate files", files.len());
        if config.simulate_ocr {
            let engine = TesseractEngine::new(&config.ocr_lang);
            for name in &files {
                match engine.extract(&watch_dir.join(name)) {
                    Ok(detection) if detection.amount > 0 => info!(
                        "OCR {} amount={} conf={:.2} found={}",
                        name, detection.amount, detection.confidence, detection.raw
                    ),
                    _ => {}
                }
            }
        }
        return Ok(());
    }

    let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open(&config.database_path)?);
    let admin_user_id = resolve_admin_user_id(store.as_ref())?;
    let profile = resolve_profile(store.as_ref(), config.profile_id, admin_user_id)?;

    let uploads = store.uploads_for_profile(profile.id)?;
    let records = store.records_for_user(profile.user_id)?;
    info!(
        "Preloaded: uploads={} catatan={}",
        uploads.len(),
        records.len()
    );
    let cache = PreloadCache::preload(uploads, records);

    let extractor: Arc<dyn AmountExtractor> = Arc::new(TesseractEngine::new(&config.ocr_lang));
    let archiver = Archiver::new(&config.root);
    let reconciler = Arc::new(Reconciler::new(
        store,
        extractor,
        archiver,
        cache,
        profile,
        admin_user_id,
        watch_dir.clone(),
        config.verbose,
    ));

    let workers = config.effective_workers();
    let files = list_image_files(&watch_dir);
    info!("Scanning {} files (workers={})", files.len(), workers);
    let pool = WorkerPool::new(reconciler, workers);

    if watch_mode {
        let sender = pool.sender();
        let shutdown = Arc::new(AtomicBool::new(false));
        let dir = watch_dir.clone();
        let watcher = thread::spawn(move || {
            if let Err(e) = watch(&dir, sender, shutdown) {
                error!("watch failed: {e}");
            }
        });
        for name in files {
            pool.submit(name)?;
        }
        // Watch mode runs until the process is interrupted.
        let _ = watcher.join();
    } else {
        for name in files {
            pool.submit(name)?;
        }
        pool.wait();
    }
    Ok(())
}

fn run_update_amounts(config: Config, dry: bool) -> Result<()> {
    let dir = config.watch_path();
    let store = SqliteStore::open(&config.database_path)?;
    let engine = TesseractEngine::new(&config.ocr_lang);
    let archiver = Archiver::new(&config.root);
    let options = UpdaterOptions {
        dry_run: dry,
        min_conf: config.min_conf,
    };
    updater::run(&dir, &store, &engine, &archiver, &options)
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = (|| -> Result<()> {
        let mut config = base_config(cli.config.as_ref())?;
        match cli.command {
            Command::Process {
                dir,
                profile_id,
                dry_run,
                simulate_ocr,
                watch,
                workers,
                verbose,
                database,
            } => {
                if let Some(dir) = dir {
                    config.watch_dir = dir;
                }
                if profile_id.is_some() {
                    config.profile_id = profile_id;
                }
                if let Some(workers) = workers {
                    config.workers = workers;
                }
                if let Some(database) = database {
                    config.database_path = database;
                }
                config.dry_run |= dry_run;
                config.simulate_ocr |= simulate_ocr;
                config.verbose |= verbose;
                run_process(config, watch)
            }
            Command::UpdateAmounts {
                dir,
                dry,
                min_conf,
                database,
            } => {
                if let Some(dir) = dir {
                    config.watch_dir = dir;
                }
                if let Some(min_conf) = min_conf {
                    config.min_conf = min_conf;
                }
                if let Some(database) = database {
                    config.database_path = database;
                }
                run_update_amounts(config, dry)
            }
        }
    })();

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}
