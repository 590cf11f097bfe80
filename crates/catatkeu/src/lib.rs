pub mod config;
pub mod db;
pub mod error;
pub mod ocr;
pub mod reconcile;
pub mod storage;
pub mod store;
pub mod updater;
pub mod worker;

pub use config::{load_config, Config};
pub use error::{CatatkeuError, ConfigError, OcrError, Result, StorageError, WorkerError};
pub use ocr::{AmountExtractor, CandidateSet, Detection, TesseractEngine};
pub use reconcile::{PreloadCache, Reconciler};
pub use storage::Archiver;
pub use store::{RecordStore, SqliteStore, StoreError};
pub use worker::{FileProcessor, WorkerPool};
