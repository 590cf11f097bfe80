pub mod pool;
pub mod scanner;
pub mod watcher;

pub use pool::{FileProcessor, WorkerPool};
pub use scanner::list_image_files;
pub use watcher::watch;
