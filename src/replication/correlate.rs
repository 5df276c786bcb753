// ABOUTME: Joins configured replication jobs with live replication tasks by job id
// ABOUTME: Jobs present in only one source still produce a pair

use std::collections::{BTreeSet, HashMap, HashSet};

use super::models::{ActiveTask, ReplicationJobConfig};

/// The facts known about one job id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobPair<'a> {
    pub id: &'a str,
    pub task: Option<&'a ActiveTask>,
    pub config: Option<&'a ReplicationJobConfig>,
}

/// Returns one pair per job id in the union of replication tasks and configs.
///
/// With a `filter`, only listed ids survive, in filter order. Ids missing
/// upstream are dropped silently. Without one, pairs are sorted by id.
pub fn correlate<'a>(
    tasks: &'a [ActiveTask],
    configs: &'a [ReplicationJobConfig],
    filter: Option<&[String]>,
) -> Vec<JobPair<'a>> {
    let mut tasks_by_id: HashMap<&'a str, &'a ActiveTask> = HashMap::new();
    for task in tasks.iter().filter(|t| t.is_replication()) {
        match task.doc_id.as_deref() {
            Some(id) => {
                tasks_by_id.insert(id, task);
            }
            None => tracing::debug!("Skipping replication task without a job document"),
        }
    }

    let configs_by_id: HashMap<&'a str, &'a ReplicationJobConfig> =
        configs.iter().map(|c| (c.id.as_str(), c)).collect();

    let pair = |id: &'a str| JobPair {
        id,
        task: tasks_by_id.get(id).copied(),
        config: configs_by_id.get(id).copied(),
    };

    match filter {
        Some(wanted) => {
            let mut seen = HashSet::new();
            let mut pairs = Vec::new();
            for wanted_id in wanted {
                if !seen.insert(wanted_id.as_str()) {
                    continue;
                }
                // borrow the id from upstream data so pairs outlive the filter
                let id = tasks_by_id
                    .get_key_value(wanted_id.as_str())
                    .map(|(k, _)| *k)
                    .or_else(|| {
                        configs_by_id
                            .get_key_value(wanted_id.as_str())
                            .map(|(k, _)| *k)
                    });
                if let Some(id) = id {
                    pairs.push(pair(id));
                }
            }
            pairs
        }
        None => {
            let ids: BTreeSet<&'a str> = tasks_by_id
                .keys()
                .chain(configs_by_id.keys())
                .copied()
                .collect();
            ids.into_iter().map(pair).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: Option<&str>, kind: &str, seq: u64) -> ActiveTask {
        ActiveTask {
            task_type: kind.to_string(),
            doc_id: id.map(str::to_string),
            checkpointed_source_seq: Some(seq),
            ..Default::default()
        }
    }

    fn config(id: &str) -> ReplicationJobConfig {
        ReplicationJobConfig {
            id: id.to_string(),
            source: "db1".to_string(),
            target: "db2".to_string(),
            continuous: true,
            state: None,
            state_time: None,
        }
    }

    #[test]
    fn test_union_of_tasks_and_configs() {
        let tasks = vec![task(Some("a"), "replication", 1), task(Some("b"), "replication", 2)];
        let configs = vec![config("b"), config("c")];

        let pairs = correlate(&tasks, &configs, None);
        let ids: Vec<&str> = pairs.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        assert!(pairs[0].task.is_some() && pairs[0].config.is_none());
        assert!(pairs[1].task.is_some() && pairs[1].config.is_some());
        assert!(pairs[2].task.is_none() && pairs[2].config.is_some());
    }

    #[test]
    fn test_non_replication_and_anonymous_tasks_ignored() {
        let tasks = vec![
            task(Some("idx"), "indexer", 1),
            task(None, "replication", 2),
            task(Some("a"), "replication", 3),
        ];
        let pairs = correlate(&tasks, &[], None);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].id, "a");
    }

    #[test]
    fn test_duplicate_task_ids_last_wins() {
        let tasks = vec![task(Some("a"), "replication", 1), task(Some("a"), "replication", 9)];
        let pairs = correlate(&tasks, &[], None);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].task.unwrap().checkpointed_source_seq, Some(9));
    }

    #[test]
    fn test_filter_keeps_order_and_drops_unknown() {
        let tasks = vec![task(Some("a"), "replication", 1)];
        let configs = vec![config("b"), config("c")];
        let filter = vec![
            "c".to_string(),
            "missing".to_string(),
            "a".to_string(),
            "c".to_string(),
        ];

        let pairs = correlate(&tasks, &configs, Some(filter.as_slice()));
        let ids: Vec<&str> = pairs.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn test_empty_filter_yields_nothing() {
        let configs = vec![config("a")];
        assert!(correlate(&[], &configs, Some(&[][..])).is_empty());
    }
}
