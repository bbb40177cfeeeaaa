//! Scripted sockets for the event stream tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use atmcp_firehose::{FeedConnection, FeedConnector, FeedFrame, StreamError, StreamResult};
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::Instant;
use url::Url;

/// What happens once the scripted frames run out
#[derive(Debug, Clone, Copy)]
pub enum End {
    /// Peer closes the socket
    Close,
    /// Socket stays open and silent
    Hang,
}

/// Outcome of one connect attempt
#[derive(Debug, Clone)]
pub enum Script {
    Fail,
    Open {
        frames: Vec<String>,
        end: End,
        answer_pings: bool,
    },
}

impl Script {
    /// Open socket that delivers `frames` then stays up, answering pings
    pub fn serve(frames: Vec<String>) -> Self {
        Self::Open {
            frames,
            end: End::Hang,
            answer_pings: true,
        }
    }

    /// Open socket that delivers `frames` then closes
    pub fn serve_then_close(frames: Vec<String>) -> Self {
        Self::Open {
            frames,
            end: End::Close,
            answer_pings: true,
        }
    }

    /// Open socket that never answers pings
    pub fn unresponsive() -> Self {
        Self::Open {
            frames: Vec::new(),
            end: End::Hang,
            answer_pings: false,
        }
    }
}

#[derive(Debug, Default)]
struct Log {
    connects: Vec<(Instant, Url)>,
    pings: usize,
    closes: usize,
}

/// Connector that plays back scripts in order; `Fail` once exhausted
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    log: Arc<Mutex<Log>>,
}

impl ScriptedConnector {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into_iter().collect())),
            log: Arc::default(),
        }
    }

    pub fn connect_count(&self) -> usize {
        self.log.lock().connects.len()
    }

    pub fn connect_urls(&self) -> Vec<Url> {
        self.log.lock().connects.iter().map(|(_, u)| u.clone()).collect()
    }

    /// Gaps between consecutive connect attempts
    pub fn connect_gaps(&self) -> Vec<std::time::Duration> {
        let log = self.log.lock();
        log.connects
            .windows(2)
            .map(|pair| pair[1].0 - pair[0].0)
            .collect()
    }

    pub fn ping_count(&self) -> usize {
        self.log.lock().pings
    }

    pub fn close_count(&self) -> usize {
        self.log.lock().closes
    }
}

#[async_trait]
impl FeedConnector for ScriptedConnector {
    async fn connect(&self, url: &Url) -> StreamResult<Box<dyn FeedConnection>> {
        self.log.lock().connects.push((Instant::now(), url.clone()));
        let script = self.scripts.lock().pop_front().unwrap_or(Script::Fail);
        match script {
            Script::Fail => Err(StreamError::Connect("connection refused".into())),
            Script::Open {
                frames,
                end,
                answer_pings,
            } => Ok(Box::new(ScriptedConnection {
                frames: frames.into(),
                end,
                answer_pings,
                pending_pongs: 0,
                log: Arc::clone(&self.log),
            })),
        }
    }
}

struct ScriptedConnection {
    frames: VecDeque<String>,
    end: End,
    answer_pings: bool,
    pending_pongs: usize,
    log: Arc<Mutex<Log>>,
}

#[async_trait]
impl FeedConnection for ScriptedConnection {
    async fn next_frame(&mut self) -> Option<StreamResult<FeedFrame>> {
        if self.pending_pongs > 0 {
            self.pending_pongs -= 1;
            return Some(Ok(FeedFrame::Pong));
        }
        if let Some(frame) = self.frames.pop_front() {
            return Some(Ok(FeedFrame::Text(frame)));
        }
        match self.end {
            End::Close => None,
            End::Hang => std::future::pending().await,
        }
    }

    async fn ping(&mut self) -> StreamResult<()> {
        self.log.lock().pings += 1;
        if self.answer_pings {
            self.pending_pongs += 1;
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.log.lock().closes += 1;
    }
}

/// Commit frame for `collection` at `sequence`
pub fn commit_frame(sequence: u64, collection: &str) -> String {
    json!({
        "did": "did:plc:author",
        "time_us": sequence,
        "kind": "commit",
        "commit": {
            "operation": "create",
            "collection": collection,
            "rkey": format!("rk{sequence}"),
            "record": {"$type": collection}
        }
    })
    .to_string()
}

/// Identity frame at `sequence`
pub fn identity_frame(sequence: u64) -> String {
    json!({
        "did": "did:plc:author",
        "time_us": sequence,
        "kind": "identity",
        "identity": {"handle": "author.test"}
    })
    .to_string()
}

pub fn endpoint() -> Url {
    Url::parse("wss://jetstream.test/subscribe").unwrap()
}
