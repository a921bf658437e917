use std::io::Seek;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fieldrec_storage::StorageGateway;
use tempfile::TempDir;

/// The medium lock is per-operation: a long-running upload holding chunk
/// reads must not delay a burst of frame writes by more than a chunk or
/// two. If the uploader held the lock for the whole transfer, the writer
/// below could only finish after the uploader's full run.
#[test]
fn writer_is_not_starved_by_a_running_upload() {
    let dir = TempDir::new().unwrap();
    let gateway = Arc::new(StorageGateway::mount(dir.path()).unwrap());

    // A finished recording the uploader keeps re-reading.
    let mut source = gateway.create("upload_source.wav").unwrap();
    gateway.write_frame(&mut source, &[0x55u8; 100_000]).unwrap();
    drop(source);

    let stop = Arc::new(AtomicBool::new(false));
    let uploader_gateway = gateway.clone();
    let uploader_stop = stop.clone();
    let uploader = thread::spawn(move || {
        let mut chunks = 0u64;
        let mut buf = [0u8; 2000];
        while !uploader_stop.load(Ordering::SeqCst) {
            let mut file = uploader_gateway.open_for_read("upload_source.wav").unwrap();
            loop {
                let n = uploader_gateway.read_chunk(&mut file, &mut buf).unwrap();
                if n == 0 || uploader_stop.load(Ordering::SeqCst) {
                    break;
                }
                chunks += 1;
            }
        }
        chunks
    });

    // Give the uploader a head start, then write a session's worth of
    // frames with no pauses.
    thread::sleep(Duration::from_millis(100));
    let mut recording = gateway.create("live_recording.wav").unwrap();
    let frame = [0xAAu8; 2048];
    let start = Instant::now();
    for _ in 0..100 {
        gateway.write_frame(&mut recording, &frame).unwrap();
    }
    let writer_elapsed = start.elapsed();

    thread::sleep(Duration::from_millis(100));
    stop.store(true, Ordering::SeqCst);
    let chunks = uploader.join().unwrap();

    assert!(
        writer_elapsed < Duration::from_millis(500),
        "writes took {:?} while an upload was running",
        writer_elapsed
    );
    assert!(chunks > 0, "uploader never got the lock");
    assert_eq!(recording.stream_position().unwrap(), 100 * 2048);
}
