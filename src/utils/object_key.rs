use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;

/// Issues object keys of the form `{prefix}{unix_millis}-{5 digits}-{name}`.
///
/// One generator lives per batch; it remembers what it handed out and redraws
/// the random suffix on collision.
#[derive(Debug, Default)]
pub struct KeyGenerator {
    prefix: String,
    issued: HashSet<String>,
}

impl KeyGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            issued: HashSet::new(),
        }
    }

    pub fn next_key(&mut self, name: &str) -> String {
        let millis = Utc::now().timestamp_millis();
        self.next_key_at(millis, name)
    }

    pub fn next_key_at(&mut self, millis: i64, name: &str) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let suffix: u32 = rng.gen_range(0..100_000);
            let key = format!("{}{}-{:05}-{}", self.prefix, millis, suffix, name);
            if self.issued.insert(key.clone()) {
                return key;
            }
            tracing::debug!("Object key collision on {}, redrawing", key);
        }
    }

    pub fn issued(&self) -> usize {
        self.issued.len()
    }
}
