use crate::command::{LogRecord, arg_to_i64, arg_to_string};
use crate::connection::Session;
use crate::error::{EmberError, EmberResult};
use crate::resp::RespValue;
use crate::store::SharedStore;
use crate::store::entry::now_secs;
use bytes::Bytes;

pub async fn cmd_del(args: &[Bytes], store: &SharedStore, session: &Session) -> RespValue {
    let count = store
        .update(session.db_index, |db| {
            args.iter().filter(|arg| db.del(&arg_to_string(arg))).count()
        })
        .await;
    RespValue::integer(count as i64)
}

/// Keys named more than once are counted once per mention.
pub async fn cmd_exists(args: &[Bytes], store: &SharedStore, session: &Session) -> RespValue {
    let mut count = 0i64;
    for arg in args {
        if store.exists(session.db_index, &arg_to_string(arg)).await {
            count += 1;
        }
    }
    RespValue::integer(count)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ExpireCondition {
    Always,
    Nx,
    Xx,
    Gt,
    Lt,
}

impl ExpireCondition {
    fn parse(args: &[Bytes]) -> EmberResult<Self> {
        match args {
            [] => Ok(ExpireCondition::Always),
            [opt] => match arg_to_string(opt).to_uppercase().as_str() {
                "NX" => Ok(ExpireCondition::Nx),
                "XX" => Ok(ExpireCondition::Xx),
                "GT" => Ok(ExpireCondition::Gt),
                "LT" => Ok(ExpireCondition::Lt),
                _ => Err(EmberError::SyntaxError),
            },
            _ => Err(EmberError::SyntaxError),
        }
    }

    /// Whether a key whose current expiry is `current` (0 = none) may be
    /// given `new`. A key without a TTL satisfies GT and LT.
    fn allows(self, current: u64, new: u64) -> bool {
        match self {
            ExpireCondition::Always => true,
            ExpireCondition::Nx => current == 0,
            ExpireCondition::Xx => current != 0,
            ExpireCondition::Gt => current == 0 || new > current,
            ExpireCondition::Lt => current == 0 || new < current,
        }
    }
}

/// EXPIRE key seconds [NX|XX|GT|LT] and EXPIREAT key unix-seconds [NX|XX|GT|LT].
///
/// Logged as `EXPIREAT key <absolute>` so replay lands on the same deadline
/// no matter when it runs.
pub async fn cmd_expire(
    cmd_name: &str,
    args: &[Bytes],
    store: &SharedStore,
    session: &Session,
) -> EmberResult<(RespValue, LogRecord)> {
    let key = arg_to_string(&args[0]);
    let n = arg_to_i64(&args[1])?;
    let condition = ExpireCondition::parse(&args[2..])?;
    if n < 0 {
        return Err(EmberError::InvalidExpireTime(cmd_name.to_lowercase()));
    }
    let expire_at = if cmd_name == "EXPIREAT" {
        // 0 would read as "no expiry"
        (n as u64).max(1)
    } else {
        now_secs().saturating_add(n as u64)
    };

    let applied = if condition == ExpireCondition::Always {
        store.set_expire_at(session.db_index, &key, expire_at).await
    } else {
        store
            .update(session.db_index, |db| match db.get_mut(&key) {
                Some(entry) if condition.allows(entry.expire_at, expire_at) => {
                    entry.expire_at = expire_at;
                    true
                }
                _ => false,
            })
            .await
    };

    if !applied {
        return Ok((RespValue::integer(0), LogRecord::Skip));
    }
    let record = LogRecord::Rewrite(vec![
        b"EXPIREAT".to_vec(),
        key.into_bytes(),
        expire_at.to_string().into_bytes(),
    ]);
    Ok((RespValue::integer(1), record))
}

/// Replies 1 whenever the key exists, whether or not it had a TTL.
pub async fn cmd_persist(args: &[Bytes], store: &SharedStore, session: &Session) -> RespValue {
    let outcome = store.persist(session.db_index, &arg_to_string(&args[0])).await;
    RespValue::integer(outcome.key_existed() as i64)
}

pub async fn cmd_ttl(args: &[Bytes], store: &SharedStore, session: &Session) -> RespValue {
    let key = arg_to_string(&args[0]);
    let ttl = store
        .view(session.db_index, &key, |entry| {
            entry.map_or(-2, |e| e.ttl_seconds(now_secs()))
        })
        .await;
    RespValue::integer(ttl)
}

pub async fn cmd_type(args: &[Bytes], store: &SharedStore, session: &Session) -> RespValue {
    let key = arg_to_string(&args[0]);
    let name = store
        .view(session.db_index, &key, |entry| {
            entry.map_or("none", |e| e.value.type_name())
        })
        .await;
    RespValue::simple_string(name)
}
