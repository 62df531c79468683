//! Test helpers: an in-process memcached server and gzip fixtures.
//!
//! The server speaks the ASCII commands the loader's client issues:
//! `version` (connection checks), `set`, `get` and `gets`.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Speaks enough of the memcached text protocol for `set` and `get`.
#[derive(Clone)]
pub struct FakeMemcached {
    pub addr: String,
    store: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    sets: Arc<AtomicUsize>,
}

impl FakeMemcached {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Self {
            addr: listener.local_addr().unwrap().to_string(),
            store: Arc::default(),
            sets: Arc::default(),
        };

        let handle = server.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handle = handle.clone();
                tokio::spawn(async move { handle.serve(socket).await });
            }
        });
        server
    }

    async fn serve(&self, socket: TcpStream) {
        let (read, mut write) = socket.into_split();
        let mut reader = BufReader::new(read);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            let parts: Vec<&str> = line.trim_end().split(' ').collect();
            let reply = match parts.as_slice() {
                ["set", key, _flags, _exptime, len, ..] => {
                    let len: usize = len.parse().unwrap();
                    let mut value = vec![0u8; len + 2];
                    if reader.read_exact(&mut value).await.is_err() {
                        return;
                    }
                    value.truncate(len);
                    self.store.lock().unwrap().insert(key.to_string(), value);
                    self.sets.fetch_add(1, Ordering::SeqCst);
                    b"STORED\r\n".to_vec()
                }
                ["version"] => b"VERSION 1.6.21\r\n".to_vec(),
                [cmd @ ("get" | "gets"), key] => match self.get(key) {
                    Some(value) => {
                        let cas = if *cmd == "gets" { " 1" } else { "" };
                        let mut reply =
                            format!("VALUE {} 0 {}{}\r\n", key, value.len(), cas).into_bytes();
                        reply.extend_from_slice(&value);
                        reply.extend_from_slice(b"\r\nEND\r\n");
                        reply
                    }
                    None => b"END\r\n".to_vec(),
                },
                _ => b"ERROR\r\n".to_vec(),
            };
            if write.write_all(&reply).await.is_err() {
                return;
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.store.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    /// Number of `set` commands received, including overwrites.
    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

/// Address with nothing listening on it.
pub async fn closed_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}

/// Write `lines` gzip-compressed to `dir/name`.
pub fn write_gz(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let mut encoder = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::fast());
    for line in lines {
        writeln!(encoder, "{line}").unwrap();
    }
    encoder.finish().unwrap();
    path
}
