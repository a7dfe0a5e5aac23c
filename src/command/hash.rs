use crate::command::arg_to_string;
use crate::connection::Session;
use crate::error::{EmberError, EmberResult};
use crate::resp::RespValue;
use crate::store::SharedStore;
use crate::store::entry::Entry;
use crate::types::Value;
use crate::types::hash::HashValue;
use bytes::Bytes;

/// Run `f` against the hash stored at `key`, if any.
async fn with_hash<R>(
    store: &SharedStore,
    session: &Session,
    key: &str,
    f: impl FnOnce(Option<&HashValue>) -> R,
) -> EmberResult<R> {
    store
        .view(session.db_index, key, |entry| match entry {
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(f(Some(hash))),
            Some(_) => Err(EmberError::WrongType),
            None => Ok(f(None)),
        })
        .await
}

/// HSET key field value [field value ...]. Replies with the number of new
/// fields; an existing key keeps its TTL.
pub async fn cmd_hset(args: &[Bytes], store: &SharedStore, session: &Session) -> EmberResult<RespValue> {
    if args.len() % 2 != 1 {
        return Err(EmberError::wrong_args("hset"));
    }
    let key = arg_to_string(&args[0]);
    store
        .update(session.db_index, |db| {
            let entry = db.get_or_insert_with(key, || Value::Hash(HashValue::new()));
            let hash = match &mut entry.value {
                Value::Hash(hash) => hash,
                _ => return Err(EmberError::WrongType),
            };
            let added = args[1..]
                .chunks(2)
                .filter(|pair| hash.set(arg_to_string(&pair[0]), pair[1].to_vec()))
                .count();
            Ok(RespValue::integer(added as i64))
        })
        .await
}

pub async fn cmd_hget(args: &[Bytes], store: &SharedStore, session: &Session) -> EmberResult<RespValue> {
    let field = arg_to_string(&args[1]);
    with_hash(store, session, &arg_to_string(&args[0]), |hash| {
        match hash.and_then(|h| h.get(&field)) {
            Some(value) => RespValue::bulk_string(value.clone()),
            None => RespValue::null_bulk_string(),
        }
    })
    .await
}

/// HDEL key field [field ...]. Deleting the last field deletes the key.
pub async fn cmd_hdel(args: &[Bytes], store: &SharedStore, session: &Session) -> EmberResult<RespValue> {
    let key = arg_to_string(&args[0]);
    store
        .update(session.db_index, |db| {
            let (removed, now_empty) = match db.get_mut(&key) {
                Some(Entry {
                    value: Value::Hash(hash),
                    ..
                }) => {
                    let removed = args[1..]
                        .iter()
                        .filter(|field| hash.del(&arg_to_string(field)))
                        .count();
                    (removed, hash.is_empty())
                }
                Some(_) => return Err(EmberError::WrongType),
                None => (0, false),
            };
            if now_empty {
                db.del(&key);
            }
            Ok(RespValue::integer(removed as i64))
        })
        .await
}

/// Field/value pairs, ordered by field.
pub async fn cmd_hgetall(args: &[Bytes], store: &SharedStore, session: &Session) -> EmberResult<RespValue> {
    with_hash(store, session, &arg_to_string(&args[0]), |hash| {
        let mut pairs: Vec<(&String, &Vec<u8>)> = hash.map(|h| h.iter().collect()).unwrap_or_default();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        let items = pairs
            .into_iter()
            .flat_map(|(field, value)| {
                [
                    RespValue::bulk_string(field.as_bytes().to_vec()),
                    RespValue::bulk_string(value.clone()),
                ]
            })
            .collect();
        RespValue::array(items)
    })
    .await
}

pub async fn cmd_hexists(args: &[Bytes], store: &SharedStore, session: &Session) -> EmberResult<RespValue> {
    let field = arg_to_string(&args[1]);
    with_hash(store, session, &arg_to_string(&args[0]), |hash| {
        RespValue::integer(hash.is_some_and(|h| h.exists(&field)) as i64)
    })
    .await
}

pub async fn cmd_hlen(args: &[Bytes], store: &SharedStore, session: &Session) -> EmberResult<RespValue> {
    with_hash(store, session, &arg_to_string(&args[0]), |hash| {
        RespValue::integer(hash.map_or(0, |h| h.len()) as i64)
    })
    .await
}
