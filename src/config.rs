use crate::persistence::aof::FsyncPolicy;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub loglevel: String,
    // Persistence
    pub dir: String,
    pub appendonly: bool,
    pub appendfilename: String,
    pub appendfsync: FsyncPolicy,
    pub fsync_interval: Duration,
    // Expiration
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1".to_string(),
            port: 6379,
            loglevel: "info".to_string(),
            dir: ".".to_string(),
            appendonly: true,
            appendfilename: "appendonly.aof".to_string(),
            appendfsync: FsyncPolicy::Everysec,
            fsync_interval: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Build a config from `--flag value` pairs. Unknown flags and values
    /// that fail to parse leave the default in place.
    pub fn from_args(args: &[String]) -> Self {
        let mut config = Config::default();
        let mut i = 0;
        while i < args.len() {
            let value = args.get(i + 1);
            match (args[i].as_str(), value) {
                ("--port", Some(v)) => {
                    if let Ok(p) = v.parse() {
                        config.port = p;
                    }
                    i += 1;
                }
                ("--bind", Some(v)) => {
                    config.bind = v.clone();
                    i += 1;
                }
                ("--dir", Some(v)) => {
                    config.dir = v.clone();
                    i += 1;
                }
                ("--appendonly", Some(v)) => {
                    config.appendonly = v.eq_ignore_ascii_case("yes");
                    i += 1;
                }
                ("--appendfilename", Some(v)) => {
                    config.appendfilename = v.clone();
                    i += 1;
                }
                ("--appendfsync", Some(v)) => {
                    if let Ok(policy) = v.parse() {
                        config.appendfsync = policy;
                    }
                    i += 1;
                }
                ("--sweep-interval", Some(v)) => {
                    if let Ok(secs) = v.parse::<u64>()
                        && secs > 0
                    {
                        config.sweep_interval = Duration::from_secs(secs);
                    }
                    i += 1;
                }
                ("--loglevel", Some(v)) => {
                    config.loglevel = v.clone();
                    i += 1;
                }
                _ => {}
            }
            i += 1;
        }
        config
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn aof_path(&self) -> PathBuf {
        PathBuf::from(&self.dir).join(&self.appendfilename)
    }
}
