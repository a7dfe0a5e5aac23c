use crate::command::{LogRecord, arg_to_i64, arg_to_string};
use crate::connection::Session;
use crate::error::{EmberError, EmberResult};
use crate::resp::RespValue;
use crate::store::{Database, FlushTarget, NUM_DATABASES, SharedStore};
use bytes::Bytes;
use tracing::debug;

pub fn cmd_ping(args: &[Bytes]) -> EmberResult<RespValue> {
    match args {
        [] => Ok(RespValue::simple_string("PONG")),
        [msg] => Ok(RespValue::bulk_string(msg.to_vec())),
        _ => Err(EmberError::wrong_args("ping")),
    }
}

pub fn cmd_echo(args: &[Bytes]) -> RespValue {
    RespValue::bulk_string(args[0].to_vec())
}

pub fn cmd_quit(session: &mut Session) -> RespValue {
    session.should_close = true;
    RespValue::ok()
}

pub fn cmd_select(args: &[Bytes], session: &mut Session) -> EmberResult<RespValue> {
    let index = arg_to_i64(&args[0])?;
    if !(0..NUM_DATABASES as i64).contains(&index) {
        return Err(EmberError::DbIndexOutOfRange);
    }
    session.db_index = index as usize;
    Ok(RespValue::ok())
}

pub async fn cmd_dbsize(store: &SharedStore, session: &Session) -> RespValue {
    RespValue::integer(store.dbsize(session.db_index).await as i64)
}

/// FLUSHALL / FLUSHDB [SYNC|ASYNC].
///
/// Both modes swap in empty databases under the write lock before
/// replying. ASYNC only moves freeing the old contents onto a blocking
/// thread. The record never carries the mode, so replay always clears
/// synchronously.
pub async fn cmd_flush(
    cmd_name: &str,
    args: &[Bytes],
    store: &SharedStore,
    session: &Session,
) -> EmberResult<(RespValue, LogRecord)> {
    let asynchronous = match args {
        [] => false,
        [mode] => match arg_to_string(mode).to_uppercase().as_str() {
            "SYNC" => false,
            "ASYNC" => true,
            _ => return Err(EmberError::SyntaxError),
        },
        _ => return Err(EmberError::SyntaxError),
    };
    let target = if cmd_name == "FLUSHALL" {
        FlushTarget::All
    } else {
        FlushTarget::Db(session.db_index)
    };

    if asynchronous {
        let old = store.detach(target).await;
        tokio::task::spawn_blocking(move || {
            let freed: usize = old.iter().map(Database::len).sum();
            drop(old);
            debug!("freed {freed} keys after asynchronous flush");
        });
    } else {
        store.flush(target).await;
    }
    Ok((RespValue::ok(), LogRecord::Rewrite(vec![cmd_name.as_bytes().to_vec()])))
}
