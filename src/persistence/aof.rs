use crate::command;
use crate::connection::Session;
use crate::resp::{RespParser, RespValue, encode_request};
use crate::store::SharedStore;
use bytes::BytesMut;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsyncPolicy {
    /// Flush and sync inside every append.
    Always,
    /// Flush and sync once per second from the background task.
    Everysec,
    /// Flush once per second; the OS decides when data reaches disk.
    No,
}

impl FromStr for FsyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(FsyncPolicy::Always),
            "everysec" => Ok(FsyncPolicy::Everysec),
            "no" => Ok(FsyncPolicy::No),
            other => Err(format!("invalid appendfsync policy '{other}'")),
        }
    }
}

struct AofWriter {
    file: Option<BufWriter<File>>,
    policy: FsyncPolicy,
    /// Database of the last record written, so a SELECT is only emitted
    /// when the context changes.
    last_db: Option<usize>,
}

impl AofWriter {
    fn write_record<A: AsRef<[u8]>>(&mut self, db_index: usize, parts: &[A]) -> io::Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        if self.last_db != Some(db_index) {
            let index = db_index.to_string();
            file.write_all(&encode_request(&[b"SELECT".as_slice(), index.as_bytes()]))?;
            self.last_db = Some(db_index);
        }
        file.write_all(&encode_request(parts))?;
        if self.policy == FsyncPolicy::Always {
            file.flush()?;
            file.get_ref().sync_data()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        file.flush()?;
        if self.policy != FsyncPolicy::No {
            file.get_ref().sync_data()?;
        }
        Ok(())
    }
}

/// The append-only command log.
///
/// Holds its own lock, independent of the store's. Callers append only
/// after releasing every store guard, and nothing here touches the store
/// while the writer lock is held.
pub struct Aof {
    writer: Mutex<AofWriter>,
    /// Set for the duration of replay; appends are dropped while it is set.
    replaying: AtomicBool,
}

pub type SharedAof = Arc<Aof>;

impl Aof {
    /// A log that records nothing, used when `appendonly` is off.
    pub fn disabled() -> Self {
        Self::with_file(None, FsyncPolicy::No)
    }

    /// Open or create the log at `path` for appending.
    pub fn open(path: &Path, policy: FsyncPolicy) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::with_file(Some(BufWriter::new(file)), policy))
    }

    fn with_file(file: Option<BufWriter<File>>, policy: FsyncPolicy) -> Self {
        Aof {
            writer: Mutex::new(AofWriter {
                file,
                policy,
                last_db: None,
            }),
            replaying: AtomicBool::new(false),
        }
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying.load(Ordering::Acquire)
    }

    /// Append one command record made in database `db_index`.
    ///
    /// Write failures are logged and swallowed: the in-memory change has
    /// already happened and is not rolled back.
    pub async fn append<A: AsRef<[u8]>>(&self, db_index: usize, parts: &[A]) {
        if self.is_replaying() {
            return;
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.write_record(db_index, parts) {
            warn!("AOF append failed: {e}");
        }
    }

    /// Push buffered records to the file, syncing unless the policy is `no`.
    pub async fn flush_once(&self) -> io::Result<()> {
        self.writer.lock().await.flush()
    }

    fn begin_replay(&self) -> ReplayGuard<'_> {
        self.replaying.store(true, Ordering::Release);
        ReplayGuard { aof: self }
    }
}

struct ReplayGuard<'a> {
    aof: &'a Aof,
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.aof.replaying.store(false, Ordering::Release);
    }
}

/// Append a DEL record for every key the store removed by expiry since the
/// last call. Returns the number of keys logged.
pub async fn log_expired(store: &SharedStore, aof: &Aof) -> usize {
    let mut logged = 0;
    for (db_index, keys) in store.take_expired().await {
        logged += keys.len();
        let mut parts = Vec::with_capacity(keys.len() + 1);
        parts.push(b"DEL".to_vec());
        parts.extend(keys.into_iter().map(String::into_bytes));
        aof.append(db_index, parts.as_slice()).await;
    }
    logged
}

/// Rebuild `store` from the log at `path`, returning how many records were
/// executed.
///
/// Records go through the same command path as live traffic, with appends
/// suppressed. Replay stops quietly at end of file and stops with a warning
/// at the first malformed or incomplete record, which is what an unclean
/// shutdown leaves behind. A missing file is an empty log.
///
/// The store stays in loading mode while records run, so a TTL that has
/// passed since it was logged cannot change how later records apply. Keys
/// past their deadline are swept once replay is over.
pub async fn replay(path: &Path, store: &SharedStore, aof: &Aof) -> io::Result<usize> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut buf = BytesMut::from(&data[..]);
    let guard = aof.begin_replay();
    store.set_loading(true).await;
    let mut session = Session::new();
    let mut applied = 0usize;

    loop {
        match RespParser::parse(&mut buf) {
            Ok(Some(frame)) => {
                let reply = command::execute(&frame, store, &mut session, aof).await;
                if let RespValue::Error(e) = reply {
                    debug!("AOF record {} replied with error: {e}", applied + 1);
                }
                applied += 1;
            }
            Ok(None) => {
                if !buf.is_empty() {
                    warn!(
                        "AOF ends with an incomplete record ({} bytes), ignoring it",
                        buf.len()
                    );
                }
                break;
            }
            Err(e) => {
                warn!("AOF replay stopped at a malformed record after {applied} commands: {e}");
                break;
            }
        }
    }

    store.set_loading(false).await;
    drop(guard);
    let expired = store.sweep_once().await;
    if expired > 0 {
        debug!("{expired} keys expired while the server was down");
        log_expired(store, aof).await;
    }

    Ok(applied)
}
