use crate::command::arg_to_string;
use crate::connection::Session;
use crate::error::{EmberError, EmberResult};
use crate::resp::RespValue;
use crate::store::SharedStore;
use crate::store::entry::Entry;
use crate::types::Value;
use bytes::Bytes;

pub async fn cmd_get(args: &[Bytes], store: &SharedStore, session: &Session) -> EmberResult<RespValue> {
    let key = arg_to_string(&args[0]);
    store
        .view(session.db_index, &key, |entry| match entry {
            Some(entry) => entry
                .value
                .as_string_bytes()
                .map(RespValue::bulk_string)
                .ok_or(EmberError::WrongType),
            None => Ok(RespValue::null_bulk_string()),
        })
        .await
}

/// SET replaces whatever the key held, including its TTL.
pub async fn cmd_set(args: &[Bytes], store: &SharedStore, session: &Session) -> RespValue {
    let key = arg_to_string(&args[0]);
    let entry = Entry::new(Value::String(args[1].to_vec()));
    store.set(session.db_index, key, entry).await;
    RespValue::ok()
}

pub async fn cmd_mget(args: &[Bytes], store: &SharedStore, session: &Session) -> RespValue {
    let mut results = Vec::with_capacity(args.len());
    for arg in args {
        let key = arg_to_string(arg);
        let reply = store
            .view(session.db_index, &key, |entry| {
                entry
                    .and_then(|e| e.value.as_string_bytes())
                    .map(RespValue::bulk_string)
                    .unwrap_or_else(RespValue::null_bulk_string)
            })
            .await;
        results.push(reply);
    }
    RespValue::array(results)
}

pub async fn cmd_mset(args: &[Bytes], store: &SharedStore, session: &Session) -> EmberResult<RespValue> {
    if args.len() % 2 != 0 {
        return Err(EmberError::wrong_args("mset"));
    }
    store
        .update(session.db_index, |db| {
            for pair in args.chunks(2) {
                db.set(arg_to_string(&pair[0]), Entry::new(Value::String(pair[1].to_vec())));
            }
        })
        .await;
    Ok(RespValue::ok())
}

pub async fn cmd_incr(args: &[Bytes], store: &SharedStore, session: &Session) -> EmberResult<RespValue> {
    incr_by(args, store, session, 1).await
}

pub async fn cmd_decr(args: &[Bytes], store: &SharedStore, session: &Session) -> EmberResult<RespValue> {
    incr_by(args, store, session, -1).await
}

/// Add `delta` to the integer at `args[0]` under one write lock, storing the
/// result as an Integer and keeping any TTL.
async fn incr_by(
    args: &[Bytes],
    store: &SharedStore,
    session: &Session,
    delta: i64,
) -> EmberResult<RespValue> {
    let key = arg_to_string(&args[0]);
    store
        .update(session.db_index, |db| -> EmberResult<RespValue> {
            let (current, expire_at) = match db.get(&key) {
                Some(entry) => (entry.value.to_integer()?, entry.expire_at),
                None => (0, 0),
            };
            let next = current.checked_add(delta).ok_or(EmberError::Overflow)?;
            let mut entry = Entry::new(Value::Integer(next));
            entry.expire_at = expire_at;
            db.set(key, entry);
            Ok(RespValue::integer(next))
        })
        .await
}
