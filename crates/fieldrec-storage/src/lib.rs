pub mod gateway;
pub mod session;
pub mod wav;
pub mod writer;

pub use gateway::StorageGateway;
pub use session::{highest_sequence, RecordingSession, StorageFile};
pub use writer::{FinishedRecordings, WriterThread};
