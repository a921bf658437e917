use fieldrec_foundation::UploadError;

/// Transport to the remote drop point.
///
/// One file is streamed at a time: `begin_file` under a temporary name,
/// any number of `write_chunk`s, `finish_file`, then `rename` to the final
/// name. The rename is what makes a file visible to consumers, so a
/// transfer that dies mid-stream leaves at most a `.temp` leftover, never a
/// half-written final file.
pub trait RemoteStore: Send {
    /// Opens the connection if it is not already up.
    fn ensure_connected(&mut self) -> Result<(), UploadError>;

    fn is_connected(&self) -> bool;

    /// Starts a streamed remote file, replacing any leftover with the same
    /// name from an earlier attempt.
    fn begin_file(&mut self, name: &str) -> Result<(), UploadError>;

    fn write_chunk(&mut self, data: &[u8]) -> Result<(), UploadError>;

    /// Completes the current streamed file.
    fn finish_file(&mut self) -> Result<(), UploadError>;

    /// Renames a completed remote file to its final, visible name.
    fn rename(&mut self, from: &str, to: &str) -> Result<(), UploadError>;

    /// Tears the connection down. Called after any failure so the next
    /// attempt starts from a clean connect.
    fn disconnect(&mut self);

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}
