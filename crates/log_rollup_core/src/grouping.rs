use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::log_key::{KeyParseError, ListedObject, LogObjectKey};

/// Identity of one day group: the directory its keys live in and their UTC day.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub directory: String,
    pub day: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedKey {
    pub key: String,
    pub reason: KeyParseError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayGroups {
    /// Non-empty, chronologically ordered key groups.
    pub groups: BTreeMap<GroupKey, Vec<LogObjectKey>>,
    /// Keys that do not follow the access-log naming convention.
    pub skipped: Vec<SkippedKey>,
    /// Keys dated on or after the as-of day, left for a later pass.
    pub deferred: usize,
}

impl DayGroups {
    pub fn total_keys(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

/// Partitions listed objects into per-(directory, day) groups.
///
/// Only days strictly before `as_of` are kept. `as_of` is always supplied by
/// the caller so grouping stays independent of the wall clock.
pub fn group_by_day(
    bucket: &str,
    objects: impl IntoIterator<Item = ListedObject>,
    as_of: NaiveDate,
) -> DayGroups {
    let mut result = DayGroups::default();

    for ListedObject { key, size, .. } in objects {
        let parsed = match LogObjectKey::parse(bucket, key.as_str(), size) {
            Ok(parsed) => parsed,
            Err(reason) => {
                result.skipped.push(SkippedKey { key, reason });
                continue;
            }
        };

        if parsed.day() >= as_of {
            result.deferred += 1;
            continue;
        }

        result
            .groups
            .entry(GroupKey {
                directory: parsed.directory().to_string(),
                day: parsed.day(),
            })
            .or_default()
            .push(parsed);
    }

    // Listings are lexicographic, which already matches chronological order
    // for this naming convention; sort anyway so callers may pass any order.
    for keys in result.groups.values_mut() {
        keys.sort();
    }

    result
}
