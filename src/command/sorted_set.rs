use crate::command::{arg_to_f64, arg_to_i64, arg_to_string};
use crate::connection::Session;
use crate::error::{EmberError, EmberResult};
use crate::resp::RespValue;
use crate::store::SharedStore;
use crate::store::entry::Entry;
use crate::types::Value;
use crate::types::sorted_set::{SortedSet, format_score};
use bytes::Bytes;

/// Run `f` against the sorted set stored at `key`, if any.
async fn with_zset<R>(
    store: &SharedStore,
    session: &Session,
    key: &str,
    f: impl FnOnce(Option<&SortedSet>) -> R,
) -> EmberResult<R> {
    store
        .view(session.db_index, key, |entry| match entry {
            Some(Entry {
                value: Value::SortedSet(zset),
                ..
            }) => Ok(f(Some(zset))),
            Some(_) => Err(EmberError::WrongType),
            None => Ok(f(None)),
        })
        .await
}

/// Trailing WITHSCORES flag; anything else is a syntax error.
fn parse_withscores(args: &[Bytes]) -> EmberResult<bool> {
    match args {
        [] => Ok(false),
        [opt] if arg_to_string(opt).eq_ignore_ascii_case("WITHSCORES") => Ok(true),
        _ => Err(EmberError::SyntaxError),
    }
}

fn range_reply(items: Vec<(&[u8], f64)>, with_scores: bool) -> RespValue {
    let mut out = Vec::with_capacity(items.len() * if with_scores { 2 } else { 1 });
    for (member, score) in items {
        out.push(RespValue::bulk_string(member.to_vec()));
        if with_scores {
            out.push(RespValue::bulk_string(format_score(score).into_bytes()));
        }
    }
    RespValue::array(out)
}

/// ZADD key score member [score member ...]. Replies with the number of
/// members that were not already present; an existing key keeps its TTL.
pub async fn cmd_zadd(args: &[Bytes], store: &SharedStore, session: &Session) -> EmberResult<RespValue> {
    if args.len() % 2 != 1 {
        return Err(EmberError::wrong_args("zadd"));
    }
    let key = arg_to_string(&args[0]);
    // Parse every score before touching the store so a bad one changes nothing.
    let pairs = args[1..]
        .chunks(2)
        .map(|pair| Ok((arg_to_f64(&pair[0])?, pair[1].to_vec())))
        .collect::<EmberResult<Vec<(f64, Vec<u8>)>>>()?;

    store
        .update(session.db_index, |db| {
            let entry = db.get_or_insert_with(key, || Value::SortedSet(SortedSet::new()));
            let zset = match &mut entry.value {
                Value::SortedSet(zset) => zset,
                _ => return Err(EmberError::WrongType),
            };
            let added = pairs
                .into_iter()
                .filter(|(score, member)| zset.add(member.clone(), *score))
                .count();
            Ok(RespValue::integer(added as i64))
        })
        .await
}

/// ZRANGE key start stop [WITHSCORES]
pub async fn cmd_zrange(args: &[Bytes], store: &SharedStore, session: &Session) -> EmberResult<RespValue> {
    let start = arg_to_i64(&args[1])?;
    let stop = arg_to_i64(&args[2])?;
    let with_scores = parse_withscores(&args[3..])?;
    with_zset(store, session, &arg_to_string(&args[0]), |zset| match zset {
        Some(z) => range_reply(z.range(start, stop), with_scores),
        None => RespValue::array(vec![]),
    })
    .await
}

/// ZRANGEBYSCORE key min max [WITHSCORES], both bounds inclusive.
pub async fn cmd_zrangebyscore(
    args: &[Bytes],
    store: &SharedStore,
    session: &Session,
) -> EmberResult<RespValue> {
    let min = arg_to_f64(&args[1])?;
    let max = arg_to_f64(&args[2])?;
    let with_scores = parse_withscores(&args[3..])?;
    with_zset(store, session, &arg_to_string(&args[0]), |zset| match zset {
        Some(z) => range_reply(z.range_by_score(min, max), with_scores),
        None => RespValue::array(vec![]),
    })
    .await
}

pub async fn cmd_zscore(args: &[Bytes], store: &SharedStore, session: &Session) -> EmberResult<RespValue> {
    with_zset(store, session, &arg_to_string(&args[0]), |zset| {
        match zset.and_then(|z| z.score(&args[1])) {
            Some(score) => RespValue::bulk_string(format_score(score).into_bytes()),
            None => RespValue::null_bulk_string(),
        }
    })
    .await
}

/// ZREM key member [member ...]. Removing the last member deletes the key.
pub async fn cmd_zrem(args: &[Bytes], store: &SharedStore, session: &Session) -> EmberResult<RespValue> {
    let key = arg_to_string(&args[0]);
    store
        .update(session.db_index, |db| {
            let (removed, now_empty) = match db.get_mut(&key) {
                Some(Entry {
                    value: Value::SortedSet(zset),
                    ..
                }) => {
                    let removed = args[1..].iter().filter(|m| zset.remove(m)).count();
                    (removed, zset.is_empty())
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

pub async fn cmd_zcard(args: &[Bytes], store: &SharedStore, session: &Session) -> EmberResult<RespValue> {
    with_zset(store, session, &arg_to_string(&args[0]), |zset| {
        RespValue::integer(zset.map_or(0, |z| z.len()) as i64)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::store::entry::now_secs;
    use std::sync::Arc;

    fn args(items: &[&str]) -> Vec<Bytes> {
        items.iter().map(|s| Bytes::copy_from_slice(s.as_bytes())).collect()
    }

    fn bulks(items: &[&str]) -> RespValue {
        RespValue::array(
            items
                .iter()
                .map(|s| RespValue::bulk_string(s.as_bytes().to_vec()))
                .collect(),
        )
    }

    async fn seeded() -> (SharedStore, Session) {
        let store = Arc::new(Store::new());
        let session = Session::new();
        cmd_zadd(&args(&["z", "1", "a", "2", "b", "3", "c"]), &store, &session)
            .await
            .unwrap();
        (store, session)
    }

    #[tokio::test]
    async fn test_zadd_counts_new_members_and_keeps_ttl() {
        let (store, session) = seeded().await;
        let deadline = now_secs() + 100;
        store.set_expire_at(0, "z", deadline).await;
        assert_eq!(
            cmd_zadd(&args(&["z", "10", "a", "4", "d"]), &store, &session).await.unwrap(),
            RespValue::integer(1)
        );
        assert_eq!(store.get(0, "z").await.unwrap().expire_at, deadline);
        assert_eq!(
            cmd_zrange(&args(&["z", "0", "-1"]), &store, &session).await.unwrap(),
            bulks(&["b", "c", "d", "a"])
        );
    }

    #[tokio::test]
    async fn test_zadd_bad_score_changes_nothing() {
        let store = Arc::new(Store::new());
        let session = Session::new();
        assert!(matches!(
            cmd_zadd(&args(&["z", "1", "a", "x", "b"]), &store, &session).await,
            Err(EmberError::NotFloat)
        ));
        assert!(!store.exists(0, "z").await);
    }

    #[tokio::test]
    async fn test_zrange_withscores() {
        let (store, session) = seeded().await;
        assert_eq!(
            cmd_zrange(&args(&["z", "-2", "-1", "withscores"]), &store, &session)
                .await
                .unwrap(),
            bulks(&["b", "2", "c", "3"])
        );
        assert!(matches!(
            cmd_zrange(&args(&["z", "0", "1", "bogus"]), &store, &session).await,
            Err(EmberError::SyntaxError)
        ));
    }

    #[tokio::test]
    async fn test_zrangebyscore_infinite_bounds() {
        let (store, session) = seeded().await;
        assert_eq!(
            cmd_zrangebyscore(&args(&["z", "-inf", "2"]), &store, &session)
                .await
                .unwrap(),
            bulks(&["a", "b"])
        );
        assert_eq!(
            cmd_zrangebyscore(&args(&["z", "2", "+inf", "WITHSCORES"]), &store, &session)
                .await
                .unwrap(),
            bulks(&["b", "2", "c", "3"])
        );
    }

    #[tokio::test]
    async fn test_zscore_and_zcard() {
        let (store, session) = seeded().await;
        assert_eq!(
            cmd_zscore(&args(&["z", "b"]), &store, &session).await.unwrap(),
            RespValue::bulk_string(b"2".to_vec())
        );
        assert_eq!(
            cmd_zscore(&args(&["z", "nope"]), &store, &session).await.unwrap(),
            RespValue::null_bulk_string()
        );
        assert_eq!(
            cmd_zcard(&args(&["z"]), &store, &session).await.unwrap(),
            RespValue::integer(3)
        );
        assert_eq!(
            cmd_zcard(&args(&["missing"]), &store, &session).await.unwrap(),
            RespValue::integer(0)
        );
    }

    #[tokio::test]
    async fn test_zrem_last_member_removes_key() {
        let (store, session) = seeded().await;
        assert_eq!(
            cmd_zrem(&args(&["z", "a", "b", "x"]), &store, &session).await.unwrap(),
            RespValue::integer(2)
        );
        cmd_zrem(&args(&["z", "c"]), &store, &session).await.unwrap();
        assert!(!store.exists(0, "z").await);
    }
}
