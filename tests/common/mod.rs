//! In-process MycoKV stand-in for integration tests
//!
//! Speaks the line protocol over TCP with an in-memory map: encoded values
//! are stored verbatim, TTLs are honoured, wildcard reads are answered with
//! JSON trees and failures with E-coded lines.

#![allow(dead_code)]

use mycokv::key::{self, KeyContext, KeyKind};
use mycokv::protocol::{parse_command, Command};
use mycokv::{Client, ClientConfig};
use serde_json::{Map, Value as Json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
struct Stored {
    raw: String,
    expires_at: Option<Instant>,
}

impl Stored {
    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

type Store = Arc<Mutex<HashMap<String, Stored>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    /// Read commands but never answer them
    Silent,
}

pub struct MockServer {
    pub addr: String,
    pub port: u16,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        Self::start_with(Mode::Normal).await
    }

    pub async fn start_silent() -> Self {
        Self::start_with(Mode::Silent).await
    }

    async fn start_with(mode: Mode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();
        let store: Store = Arc::new(Mutex::new(HashMap::new()));

        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let _ = handle_client(stream, store, mode).await;
                });
            }
        });

        Self {
            addr: local.to_string(),
            port: local.port(),
            handle,
        }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            settle_delay: Duration::ZERO,
            ..ClientConfig::new("127.0.0.1", self.port)
        }
    }

    pub async fn client(&self) -> Client {
        Client::connect_with(self.config()).await.unwrap()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_client(mut stream: TcpStream, store: Store, mode: Mode) -> std::io::Result<()> {
    let (reader, mut writer) = stream.split();
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if buf_reader.read_line(&mut line).await? == 0 {
            break;
        }
        if mode == Mode::Silent {
            continue;
        }

        let response = process_command(&line, &store).await;
        writer.write_all(response.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

async fn process_command(line: &str, store: &Store) -> String {
    let command = match parse_command(line) {
        Ok(command) => command,
        Err(_) => return "E01 Unknown command".to_string(),
    };
    let mut data = store.lock().await;
    data.retain(|_, stored| stored.is_live());

    match command {
        Command::Get { key } => match key::validate(&key, KeyContext::Read) {
            Ok(KeyKind::Wildcard { depth }) => {
                let base = &key[..key.rfind(".*").unwrap()];
                wildcard_tree(&data, base, depth).to_string()
            }
            Ok(KeyKind::Single) => match data.get(&key) {
                Some(stored) => stored.raw.clone(),
                None => format!("E09 Key not found: {}", key),
            },
            Err(_) => format!("E03 Invalid key: {}", key),
        },
        Command::Put { key, value } => {
            data.insert(
                key,
                Stored {
                    raw: value.clone(),
                    expires_at: None,
                },
            );
            value
        }
        Command::Delete { key } => match data.remove(&key) {
            Some(stored) => stored.raw,
            None => format!("E09 Key not found: {}", key),
        },
        Command::Expire { key, ttl_ms } => match data.get_mut(&key) {
            Some(stored) => {
                stored.expires_at = Some(Instant::now() + Duration::from_millis(ttl_ms));
                "OK".to_string()
            }
            None => format!("E09 Key not found: {}", key),
        },
        Command::Purge => {
            data.clear();
            "OK".to_string()
        }
    }
}

fn wildcard_tree(data: &HashMap<String, Stored>, base: &str, depth: Option<u32>) -> Json {
    let prefix = format!("{}.", base);
    let mut tree = Map::new();

    let mut keys: Vec<&String> = data.keys().filter(|k| k.starts_with(&prefix)).collect();
    keys.sort();

    for key in keys {
        let path: Vec<&str> = key[prefix.len()..].split('.').collect();
        if depth.map_or(false, |d| path.len() > d as usize) {
            continue;
        }
        let raw = &data[key].raw;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Json::String(raw.clone()));
        insert_path(&mut tree, &path, value);
    }

    Json::Object(tree)
}

fn insert_path(tree: &mut Map<String, Json>, path: &[&str], value: Json) {
    let Some((head, tail)) = path.split_first() else {
        return;
    };

    if tail.is_empty() {
        match tree.get_mut(*head) {
            Some(Json::Object(children)) => {
                children.insert("_".to_string(), value);
            }
            _ => {
                tree.insert(head.to_string(), value);
            }
        }
        return;
    }

    let node = tree
        .entry(head.to_string())
        .or_insert_with(|| Json::Object(Map::new()));
    if !node.is_object() {
        let scalar = node.take();
        let mut children = Map::new();
        children.insert("_".to_string(), scalar);
        *node = Json::Object(children);
    }
    if let Json::Object(children) = node {
        insert_path(children, tail, value);
    }
}
