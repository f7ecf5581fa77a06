// SPDX-License-Identifier: MIT

//! Conflict-group partitioning: stories that would touch overlapping files run
//! serially within a group; groups themselves run in parallel, up to `maxConcurrency`
//! at a time. Grouping is a pure function of each story's key so two runs over the
//! same graph always produce the same partition.

use std::collections::BTreeMap;
use std::collections::HashMap;

use substrate_core::StoryId;

use crate::story::Story;

/// Deterministic conflict key for a story. An explicit mapping (operator-supplied,
/// e.g. from the graph file's `conflict_group` field) always wins; otherwise fall
/// back to a module-prefix heuristic: the slice of the key up to its first `/`, or
/// the whole key when there's no path separator.
pub fn conflict_key(story_key: &str, explicit: &HashMap<String, String>) -> String {
    if let Some(group) = explicit.get(story_key) {
        return group.clone();
    }
    match story_key.split_once('/') {
        Some((prefix, _)) => prefix.to_string(),
        None => story_key.to_string(),
    }
}

/// Partition `stories` into conflict groups, keyed deterministically (sorted by
/// group key) so the same input always yields the same group order.
pub fn partition_into_groups(stories: &[Story], explicit: &HashMap<String, String>) -> Vec<Vec<StoryId>> {
    let mut groups: BTreeMap<String, Vec<StoryId>> = BTreeMap::new();
    for story in stories {
        let key = conflict_key(&story.key, explicit);
        groups.entry(key).or_default().push(story.id.clone());
    }
    groups.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use substrate_core::TaskId;

    #[test]
    fn stories_sharing_a_module_prefix_land_in_one_group() {
        let stories = vec![
            Story::new("auth/login", TaskId::new()),
            Story::new("auth/logout", TaskId::new()),
            Story::new("billing/invoice", TaskId::new()),
        ];
        let groups = partition_into_groups(&stories, &HashMap::new());
        assert_eq!(groups.len(), 2);
        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 1]);
    }

    #[test]
    fn explicit_mapping_overrides_the_heuristic() {
        let mut explicit = HashMap::new();
        explicit.insert("auth/login".to_string(), "shared".to_string());
        explicit.insert("billing/invoice".to_string(), "shared".to_string());
        let stories = vec![Story::new("auth/login", TaskId::new()), Story::new("billing/invoice", TaskId::new())];
        let groups = partition_into_groups(&stories, &explicit);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn a_key_with_no_separator_is_its_own_group() {
        let stories = vec![Story::new("standalone", TaskId::new())];
        let groups = partition_into_groups(&stories, &HashMap::new());
        assert_eq!(groups.len(), 1);
    }
}
