//! Keyspace layout for the storage engine (spec §4.1). Bit-exact paths so
//! two processes pointed at the same bucket agree on where everything lives.

use uuid::Uuid;

pub const SHARD_COUNT: usize = 256;

/// Lowercase first two hex characters of a uuid — its shard id.
pub fn shard_of(id: &Uuid) -> String {
    id.simple().to_string()[..2].to_string()
}

pub fn shard_index(id: &Uuid) -> usize {
    let s = shard_of(id);
    usize::from_str_radix(&s, 16).expect("shard_of always yields two hex chars")
}

pub fn all_shard_prefixes() -> Vec<String> {
    (0..SHARD_COUNT).map(|i| format!("{i:02x}")).collect()
}

pub fn noun_vector_key(id: &Uuid) -> String {
    format!("entities/nouns/vectors/{}/{id}.json", shard_of(id))
}

pub fn noun_metadata_key(id: &Uuid) -> String {
    format!("entities/nouns/metadata/{}/{id}.json", shard_of(id))
}

pub fn verb_vector_key(id: &Uuid) -> String {
    format!("entities/verbs/vectors/{}/{id}.json", shard_of(id))
}

pub fn verb_metadata_key(id: &Uuid) -> String {
    format!("entities/verbs/metadata/{}/{id}.json", shard_of(id))
}

pub const STATISTICS_KEY: &str = "_system/statistics.json";
pub const COUNTS_KEY: &str = "_system/counts.json";

pub fn noun_metadata_prefix_for_shard(shard: &str) -> String {
    format!("entities/nouns/metadata/{shard}/")
}

pub fn verb_metadata_prefix_for_shard(shard: &str) -> String {
    format!("entities/verbs/metadata/{shard}/")
}

pub fn noun_vector_prefix_for_shard(shard: &str) -> String {
    format!("entities/nouns/vectors/{shard}/")
}

/// Recovers the uuid a vector/metadata key was written under — the last path
/// segment minus its `.json` extension.
pub fn id_from_key(key: &str) -> Option<Uuid> {
    let file_name = key.rsplit('/').next()?;
    let stem = file_name.strip_suffix(".json")?;
    Uuid::parse_str(stem).ok()
}

/// Opaque pagination cursor for `list_nouns`/`list_verbs`: `(shard_index,
/// backend_continuation_token)`, so a full scan is a deterministic
/// left-to-right sweep across shards `00` -> `ff` (spec §4.1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListCursor {
    pub shard_index: usize,
    pub backend_token: Option<String>,
}

impl ListCursor {
    pub fn start() -> Self {
        Self {
            shard_index: 0,
            backend_token: None,
        }
    }

    pub fn next_shard(shard_index: usize) -> Self {
        Self {
            shard_index: shard_index + 1,
            backend_token: None,
        }
    }

    /// Encodes as `{shard_index}:{backend_token}` for opaque external use.
    pub fn encode(&self) -> String {
        match &self.backend_token {
            Some(t) => format!("{}:{}", self.shard_index, t),
            None => format!("{}:", self.shard_index),
        }
    }

    pub fn decode(s: &str) -> Option<Self> {
        let (idx, token) = s.split_once(':')?;
        let shard_index = idx.parse().ok()?;
        let backend_token = if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        };
        Some(Self {
            shard_index,
            backend_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_of_is_lowercase_first_two_hex_chars() {
        let id = Uuid::parse_str("AB34f6e0-0000-0000-0000-000000000000").unwrap();
        assert_eq!(shard_of(&id), "ab");
        assert_eq!(shard_index(&id), 0xab);
    }

    #[test]
    fn all_shard_prefixes_covers_00_to_ff() {
        let prefixes = all_shard_prefixes();
        assert_eq!(prefixes.len(), 256);
        assert_eq!(prefixes[0], "00");
        assert_eq!(prefixes[255], "ff");
    }

    #[test]
    fn cursor_round_trips_through_encode_decode() {
        let cursor = ListCursor {
            shard_index: 17,
            backend_token: Some("tok123".to_string()),
        };
        let encoded = cursor.encode();
        assert_eq!(ListCursor::decode(&encoded), Some(cursor));
    }

    #[test]
    fn cursor_with_no_token_round_trips() {
        let cursor = ListCursor::start();
        assert_eq!(ListCursor::decode(&cursor.encode()), Some(cursor));
    }

    #[test]
    fn keys_are_bit_exact_per_spec() {
        let id = Uuid::parse_str("0123abcd-0000-0000-0000-000000000000").unwrap();
        assert_eq!(noun_vector_key(&id), format!("entities/nouns/vectors/01/{id}.json"));
        assert_eq!(noun_metadata_key(&id), format!("entities/nouns/metadata/01/{id}.json"));
        assert_eq!(verb_vector_key(&id), format!("entities/verbs/vectors/01/{id}.json"));
        assert_eq!(verb_metadata_key(&id), format!("entities/verbs/metadata/01/{id}.json"));
    }

    #[test]
    fn id_from_key_recovers_the_uuid() {
        let id = Uuid::parse_str("0123abcd-0000-0000-0000-000000000000").unwrap();
        assert_eq!(id_from_key(&noun_vector_key(&id)), Some(id));
        assert_eq!(id_from_key("_system/counts.json"), None);
    }
}
