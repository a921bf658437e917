use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use fieldrec_foundation::UploadError;
use fieldrec_upload::{RemoteStore, TcpStore};

type ServerFiles = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// Minimal collection server speaking the line protocol, one connection.
fn spawn_server() -> (String, ServerFiles, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let files: ServerFiles = Arc::new(Mutex::new(HashMap::new()));
    let server_files = files.clone();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        serve(stream, &server_files);
    });

    (addr, files, handle)
}

fn serve(stream: TcpStream, files: &ServerFiles) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;
    let mut open: Option<String> = None;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let line = line.trim_end().to_string();
        let reply = if let Some(name) = line.strip_prefix("STOR ") {
            files.lock().insert(name.to_string(), Vec::new());
            open = Some(name.to_string());
            "OK".to_string()
        } else if let Some(len) = line.strip_prefix("DATA ") {
            let len: usize = len.parse().unwrap();
            let mut chunk = vec![0u8; len];
            reader.read_exact(&mut chunk).unwrap();
            match &open {
                Some(name) => {
                    files.lock().get_mut(name).unwrap().extend_from_slice(&chunk);
                    "OK".to_string()
                }
                None => "ERR no open file".to_string(),
            }
        } else if line == "END" {
            open = None;
            "OK".to_string()
        } else if let Some(rest) = line.strip_prefix("REN ") {
            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(from), Some(to)) => {
                    let mut files = files.lock();
                    match files.remove(from) {
                        Some(content) => {
                            files.insert(to.to_string(), content);
                            "OK".to_string()
                        }
                        None => format!("ERR no such file {from}"),
                    }
                }
                _ => "ERR bad rename".to_string(),
            }
        } else {
            "ERR unknown command".to_string()
        };
        writer.write_all(reply.as_bytes()).unwrap();
        writer.write_all(b"\n").unwrap();
    }
}

#[test]
fn full_transfer_round_trip() {
    let (addr, files, server) = spawn_server();
    let mut store = TcpStore::new(addr);

    assert!(!store.is_connected());
    store.ensure_connected().unwrap();
    assert!(store.is_connected());

    store.begin_file("unit7_00000001.wav.temp").unwrap();
    store.write_chunk(&[0xAB; 2000]).unwrap();
    store.write_chunk(&[0xCD; 777]).unwrap();
    store.finish_file().unwrap();
    store
        .rename("unit7_00000001.wav.temp", "unit7_00000001.wav")
        .unwrap();

    {
        let files = files.lock();
        let content = files.get("unit7_00000001.wav").unwrap();
        assert_eq!(content.len(), 2777);
        assert_eq!(&content[..2000], &[0xAB; 2000][..]);
        assert_eq!(&content[2000..], &[0xCD; 777][..]);
        assert!(!files.contains_key("unit7_00000001.wav.temp"));
    }

    store.disconnect();
    server.join().unwrap();
}

#[test]
fn refused_command_carries_the_server_reply() {
    let (addr, _files, server) = spawn_server();
    let mut store = TcpStore::new(addr);
    store.ensure_connected().unwrap();

    let err = store.rename("missing.temp", "missing.wav").unwrap_err();
    match err {
        UploadError::Refused { command, reply } => {
            assert_eq!(command, "REN");
            assert!(reply.contains("no such file"));
        }
        other => panic!("expected Refused, got {other:?}"),
    }
    // A refusal poisons the connection; the caller reconnects.
    assert!(!store.is_connected());
    drop(store);
    server.join().unwrap();
}

#[test]
fn dead_server_surfaces_as_an_error_not_a_hang() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    // Answers exactly one command, then drops the connection.
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        writer.write_all(b"OK\n").unwrap();
    });

    let mut store = TcpStore::new(addr);
    store.ensure_connected().unwrap();
    store.begin_file("a.temp").unwrap();
    server.join().unwrap();

    let err = store.write_chunk(&[0u8; 100]).unwrap_err();
    assert!(matches!(err, UploadError::Io(_)));
    assert!(!store.is_connected());

    // Everything after the poison reports NotConnected until reconnect.
    let err = store.finish_file().unwrap_err();
    assert!(matches!(err, UploadError::NotConnected));
}

#[test]
fn connect_to_nothing_fails_fast() {
    // Bind-then-drop guarantees an unused port.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut store = TcpStore::new(format!("127.0.0.1:{port}"));
    let err = store.ensure_connected().unwrap_err();
    assert!(matches!(err, UploadError::ConnectFailed(_)));
}
