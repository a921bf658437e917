pub mod dir_store;
pub mod manager;
pub mod queue;
pub mod remote;
pub mod tcp;

pub use dir_store::DirStore;
pub use manager::{UploadConfig, UploadManager, CHUNK_SIZE};
pub use queue::{UploadQueue, UPLOAD_QUEUE_CAPACITY};
pub use remote::RemoteStore;
pub use tcp::TcpStore;
