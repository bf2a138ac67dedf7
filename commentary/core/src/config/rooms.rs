//! Broadcaster to commentary-room mapping

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Static table from broadcaster display name to commentary room id
///
/// Loaded once from the `[rooms]` table of the config file. Broadcasters
/// without an entry simply have no commentary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BroadcasterMap(BTreeMap<String, String>);

impl BroadcasterMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Room id for a broadcaster, if one is configured
    ///
    /// Surrounding whitespace in the display name is ignored.
    #[must_use]
    pub fn room_for(&self, broadcaster: &str) -> Option<&str> {
        self.0
            .get(broadcaster.trim())
            .map(String::as_str)
            .filter(|room| !room.is_empty())
    }

    /// Number of configured broadcasters
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no broadcaster is configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(broadcaster, room)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for BroadcasterMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let map: BroadcasterMap = [("NHK総合", "jk1"), ("Eテレ", "jk2"), ("空", "")]
            .into_iter()
            .collect();

        assert_eq!(map.room_for("NHK総合"), Some("jk1"));
        assert_eq!(map.room_for(" Eテレ "), Some("jk2"));
        assert_eq!(map.room_for("unknown"), None);
        // An empty room id counts as unmapped
        assert_eq!(map.room_for("空"), None);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_deserialize_from_toml_table() {
        #[derive(Deserialize)]
        struct Wrapper {
            rooms: BroadcasterMap,
        }

        let parsed: Wrapper = toml::from_str("[rooms]\n\"TBS\" = \"jk6\"\n").unwrap();
        assert_eq!(parsed.rooms.room_for("TBS"), Some("jk6"));
    }
}
