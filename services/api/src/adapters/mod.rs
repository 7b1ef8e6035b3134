pub mod db;
pub mod images;
pub mod notify;
pub mod vision;

pub use db::DbAdapter;
pub use images::FsImageStore;
pub use notify::LogNotifier;
pub use vision::OpenAiVisionDetector;
