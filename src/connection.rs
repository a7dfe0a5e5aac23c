use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Per-connection state, passed explicitly through every dispatch call.
#[derive(Debug)]
pub struct Session {
    pub id: u64,
    /// Currently selected database.
    pub db_index: usize,
    /// Set by QUIT; the connection closes after the reply is written.
    pub should_close: bool,
}

impl Session {
    pub fn new() -> Self {
        Session {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            db_index: 0,
            should_close: false,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_defaults() {
        let a = Session::new();
        let b = Session::new();
        assert_eq!(a.db_index, 0);
        assert!(!a.should_close);
        assert!(b.id > a.id);
    }
}
