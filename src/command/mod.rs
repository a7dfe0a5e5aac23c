pub mod hash;
pub mod key;
pub mod server_cmd;
pub mod sorted_set;
pub mod string;

use crate::connection::Session;
use crate::error::{EmberError, EmberResult};
use crate::persistence::aof::{self, Aof};
use crate::resp::RespValue;
use crate::store::SharedStore;
use bytes::Bytes;
use tracing::debug;

/// Static metadata for one command.
#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    /// Argument count including the command name. Negative means "at least".
    pub arity: i32,
    /// Successful executions are recorded in the append-only log.
    pub write: bool,
}

impl CommandSpec {
    const fn new(name: &'static str, arity: i32, write: bool) -> Self {
        CommandSpec { name, arity, write }
    }

    pub fn arity_ok(&self, argc: usize) -> bool {
        let argc = argc as i32;
        if self.arity >= 0 {
            argc == self.arity
        } else {
            argc >= -self.arity
        }
    }
}

static COMMAND_TABLE: &[CommandSpec] = &[
    // Strings
    CommandSpec::new("GET", 2, false),
    CommandSpec::new("SET", 3, true),
    CommandSpec::new("MGET", -2, false),
    CommandSpec::new("MSET", -3, true),
    CommandSpec::new("INCR", 2, true),
    CommandSpec::new("DECR", 2, true),
    // Keys
    CommandSpec::new("DEL", -2, true),
    CommandSpec::new("EXISTS", -2, false),
    CommandSpec::new("EXPIRE", -3, true),
    CommandSpec::new("EXPIREAT", -3, true),
    CommandSpec::new("PERSIST", 2, true),
    CommandSpec::new("TTL", 2, false),
    CommandSpec::new("TYPE", 2, false),
    // Hashes
    CommandSpec::new("HSET", -4, true),
    CommandSpec::new("HGET", 3, false),
    CommandSpec::new("HDEL", -3, true),
    CommandSpec::new("HGETALL", 2, false),
    CommandSpec::new("HEXISTS", 3, false),
    CommandSpec::new("HLEN", 2, false),
    // Sorted sets
    CommandSpec::new("ZADD", -4, true),
    CommandSpec::new("ZRANGE", -4, false),
    CommandSpec::new("ZRANGEBYSCORE", -4, false),
    CommandSpec::new("ZSCORE", 3, false),
    CommandSpec::new("ZREM", -3, true),
    CommandSpec::new("ZCARD", 2, false),
    // Server / connection
    CommandSpec::new("PING", -1, false),
    CommandSpec::new("ECHO", 2, false),
    CommandSpec::new("SELECT", 2, false),
    CommandSpec::new("DBSIZE", 1, false),
    CommandSpec::new("FLUSHALL", -1, true),
    CommandSpec::new("FLUSHDB", -1, true),
    CommandSpec::new("QUIT", -1, false),
    CommandSpec::new("EXIT", -1, false),
];

/// Look up a command by its upper-cased name.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMAND_TABLE.iter().find(|spec| spec.name == name)
}

/// What to append to the log after a command succeeds.
#[derive(Debug, PartialEq)]
pub enum LogRecord {
    Skip,
    /// The request frame exactly as received.
    Verbatim,
    /// A replacement frame that replays to the same state.
    Rewrite(Vec<Vec<u8>>),
}

/// Execute one request frame (`[name, args...]`) for a session.
///
/// Successful mutating commands are appended to `aof` after the store lock
/// has been released, preceded by DEL records for keys that expired. Handler errors become error replies; they never
/// mutate state and are never logged.
pub async fn execute(
    frame: &[Bytes],
    store: &SharedStore,
    session: &mut Session,
    aof: &Aof,
) -> RespValue {
    let Some((name, args)) = frame.split_first() else {
        return RespValue::error("ERR empty command");
    };
    let raw_name = String::from_utf8_lossy(name);
    let cmd_name = raw_name.to_uppercase();
    // SELECT changes the session's database; records belong to the one
    // that was selected when the command started.
    let db_index = session.db_index;

    let result = dispatch(&cmd_name, &raw_name, args, store, session).await;
    // Expirations this command triggered go first, so replay deletes those
    // keys before the command runs again.
    aof::log_expired(store, aof).await;

    let (reply, record) = match result {
        Ok(result) => result,
        Err(e) => {
            debug!(session = session.id, command = %cmd_name, "command failed: {e}");
            return RespValue::error(e.to_string());
        }
    };

    match record {
        LogRecord::Skip => {}
        LogRecord::Verbatim => aof.append(db_index, frame).await,
        LogRecord::Rewrite(parts) => aof.append(db_index, parts.as_slice()).await,
    }
    reply
}

async fn dispatch(
    cmd_name: &str,
    raw_name: &str,
    args: &[Bytes],
    store: &SharedStore,
    session: &mut Session,
) -> EmberResult<(RespValue, LogRecord)> {
    let spec = match lookup(cmd_name) {
        Some(spec) => spec,
        None => return Err(unknown_command(raw_name, args)),
    };
    if !spec.arity_ok(args.len() + 1) {
        return Err(EmberError::wrong_args(spec.name));
    }

    let reply = match spec.name {
        // Connection
        "PING" => server_cmd::cmd_ping(args)?,
        "ECHO" => server_cmd::cmd_echo(args),
        "SELECT" => server_cmd::cmd_select(args, session)?,
        "QUIT" | "EXIT" => server_cmd::cmd_quit(session),
        "DBSIZE" => server_cmd::cmd_dbsize(store, session).await,
        "FLUSHALL" | "FLUSHDB" => {
            return server_cmd::cmd_flush(spec.name, args, store, session).await;
        }

        // Strings
        "GET" => string::cmd_get(args, store, session).await?,
        "SET" => string::cmd_set(args, store, session).await,
        "MGET" => string::cmd_mget(args, store, session).await,
        "MSET" => string::cmd_mset(args, store, session).await?,
        "INCR" => string::cmd_incr(args, store, session).await?,
        "DECR" => string::cmd_decr(args, store, session).await?,

        // Keys
        "DEL" => key::cmd_del(args, store, session).await,
        "EXISTS" => key::cmd_exists(args, store, session).await,
        "EXPIRE" | "EXPIREAT" => {
            return key::cmd_expire(spec.name, args, store, session).await;
        }
        "PERSIST" => key::cmd_persist(args, store, session).await,
        "TTL" => key::cmd_ttl(args, store, session).await,
        "TYPE" => key::cmd_type(args, store, session).await,

        // Hashes
        "HSET" => hash::cmd_hset(args, store, session).await?,
        "HGET" => hash::cmd_hget(args, store, session).await?,
        "HDEL" => hash::cmd_hdel(args, store, session).await?,
        "HGETALL" => hash::cmd_hgetall(args, store, session).await?,
        "HEXISTS" => hash::cmd_hexists(args, store, session).await?,
        "HLEN" => hash::cmd_hlen(args, store, session).await?,

        // Sorted sets
        "ZADD" => sorted_set::cmd_zadd(args, store, session).await?,
        "ZRANGE" => sorted_set::cmd_zrange(args, store, session).await?,
        "ZRANGEBYSCORE" => sorted_set::cmd_zrangebyscore(args, store, session).await?,
        "ZSCORE" => sorted_set::cmd_zscore(args, store, session).await?,
        "ZREM" => sorted_set::cmd_zrem(args, store, session).await?,
        "ZCARD" => sorted_set::cmd_zcard(args, store, session).await?,

        _ => return Err(unknown_command(raw_name, args)),
    };

    let record = if spec.write {
        LogRecord::Verbatim
    } else {
        LogRecord::Skip
    };
    Ok((reply, record))
}

fn unknown_command(name: &str, args: &[Bytes]) -> EmberError {
    let args_preview: Vec<String> = args
        .iter()
        .take(3)
        .map(|a| format!("'{}'", String::from_utf8_lossy(a)))
        .collect();
    EmberError::UnknownCommand(name.to_string(), args_preview.join(" "))
}

// --- Argument helpers ---

pub fn arg_to_string(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).into_owned()
}

pub fn arg_to_i64(arg: &[u8]) -> EmberResult<i64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(EmberError::NotInteger)
}

/// Parse a score. Accepts `inf`, `+inf` and `-inf`; rejects NaN.
pub fn arg_to_f64(arg: &[u8]) -> EmberResult<f64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|f| !f.is_nan())
        .ok_or(EmberError::NotFloat)
}
