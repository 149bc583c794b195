//! Session-start reconciliation of the local and remote project sets.
//!
//! Whole-project last-writer-wins keyed on `updated_at`. Ties go to the
//! remote copy, which is treated as already synced.

use std::collections::HashMap;

use serde::Serialize;

use crate::storage::Project;

/// Counters describing how a merge went
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    pub local_only: usize,
    pub remote_only: usize,
    pub local_wins: usize,
    pub remote_wins: usize,
}

/// Result of merging local and remote collections
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// Every project id exactly once
    pub projects: Vec<Project>,
    /// Projects whose local copy won and must be pushed
    pub to_push: Vec<String>,
    pub stats: MergeStats,
}

/// Union by id; the strictly later `updated_at` wins in full.
pub fn merge_projects(local: Vec<Project>, remote: Vec<Project>) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    let mut remote_by_id: HashMap<String, Project> = HashMap::with_capacity(remote.len());
    let mut remote_order: Vec<String> = Vec::with_capacity(remote.len());
    for project in remote {
        if !remote_by_id.contains_key(&project.id) {
            remote_order.push(project.id.clone());
        }
        // Duplicates in a collection keep the newest copy
        match remote_by_id.get(&project.id) {
            Some(existing) if existing.updated_at >= project.updated_at => {}
            _ => {
                remote_by_id.insert(project.id.clone(), project);
            }
        }
    }

    let mut seen_local: HashMap<String, usize> = HashMap::new();
    for project in local {
        if let Some(&idx) = seen_local.get(&project.id) {
            if project.updated_at > outcome.projects[idx].updated_at {
                outcome.projects[idx] = project;
            }
            continue;
        }

        let merged = match remote_by_id.remove(&project.id) {
            None => {
                outcome.stats.local_only += 1;
                outcome.to_push.push(project.id.clone());
                project
            }
            Some(remote_copy) => {
                if project.updated_at > remote_copy.updated_at {
                    outcome.stats.local_wins += 1;
                    outcome.to_push.push(project.id.clone());
                    project
                } else {
                    outcome.stats.remote_wins += 1;
                    remote_copy
                }
            }
        };

        seen_local.insert(merged.id.clone(), outcome.projects.len());
        outcome.projects.push(merged);
    }

    for id in remote_order {
        if let Some(project) = remote_by_id.remove(&id) {
            outcome.stats.remote_only += 1;
            outcome.projects.push(project);
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Section;
    use chrono::{DateTime, Utc};
    use std::collections::HashSet;

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    fn project(id: &str, title: &str, updated_at: &str) -> Project {
        let mut p = Project::new(title.to_string(), String::new());
        p.id = id.to_string();
        p.created_at = at("2024-01-01T00:00:00Z");
        p.updated_at = at(updated_at);
        p
    }

    fn ids(projects: &[Project]) -> HashSet<String> {
        projects.iter().map(|p| p.id.clone()).collect()
    }

    #[test]
    fn test_local_newer_wins_and_is_pushed() {
        let local = vec![project("p", "local", "2024-05-01T12:00:00Z")];
        let remote = vec![project("p", "remote", "2024-05-01T10:30:00Z")];

        let outcome = merge_projects(local, remote);

        assert_eq!(outcome.projects.len(), 1);
        assert_eq!(outcome.projects[0].title, "local");
        assert_eq!(outcome.to_push, vec!["p".to_string()]);
        assert_eq!(outcome.stats.local_wins, 1);
    }

    #[test]
    fn test_remote_newer_wins_with_its_sections() {
        let mut local_copy = project("p", "local", "2024-05-01T10:00:00Z");
        local_copy.sections.push(Section::new("Local only".to_string(), String::new(), None, 0));
        let mut remote_copy = project("p", "remote", "2024-05-01T11:00:00Z");
        remote_copy.sections.push(Section::new("Remote A".to_string(), String::new(), None, 0));
        remote_copy.sections.push(Section::new("Remote B".to_string(), String::new(), None, 1));

        let outcome = merge_projects(vec![local_copy], vec![remote_copy.clone()]);

        assert_eq!(outcome.projects, vec![remote_copy]);
        assert!(outcome.to_push.is_empty());
    }

    #[test]
    fn test_equal_timestamps_favor_remote() {
        let local = vec![project("p", "local", "2024-05-01T10:00:00Z")];
        let remote = vec![project("p", "remote", "2024-05-01T10:00:00Z")];

        let outcome = merge_projects(local, remote);

        assert_eq!(outcome.projects[0].title, "remote");
        assert!(outcome.to_push.is_empty());
    }

    #[test]
    fn test_disjoint_ids_are_unioned() {
        let local = vec![
            project("A", "a", "2020-01-01T00:00:00Z"),
            project("B", "b-local", "2024-01-01T00:00:00Z"),
        ];
        let remote = vec![
            project("B", "b-remote", "2023-01-01T00:00:00Z"),
            project("C", "c", "2030-01-01T00:00:00Z"),
        ];

        let outcome = merge_projects(local, remote);

        let expected: HashSet<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        assert_eq!(ids(&outcome.projects), expected);
        assert_eq!(outcome.projects.len(), 3);
        let to_push: HashSet<String> = outcome.to_push.into_iter().collect();
        assert!(to_push.contains("A"));
        assert!(!to_push.contains("C"));
    }

    #[test]
    fn test_session_start_scenario() {
        let local = vec![
            project("p-same", "local title", "2024-05-01T12:00:00Z"),
            project("p-local-only", "mine", "2024-05-01T09:00:00Z"),
        ];
        let remote = vec![
            project("p-same", "remote title", "2024-05-01T10:30:00Z"),
            project("p-remote-only", "theirs", "2024-05-01T09:00:00Z"),
        ];

        let outcome = merge_projects(local, remote);

        assert_eq!(outcome.projects.len(), 3);
        let same = outcome.projects.iter().find(|p| p.id == "p-same").unwrap();
        assert_eq!(same.title, "local title");
        let to_push: HashSet<String> = outcome.to_push.into_iter().collect();
        let expected: HashSet<String> = ["p-same", "p-local-only"].iter().map(|s| s.to_string()).collect();
        assert_eq!(to_push, expected);
        assert_eq!(
            outcome.stats,
            MergeStats {
                local_only: 1,
                remote_only: 1,
                local_wins: 1,
                remote_wins: 0,
            }
        );
    }

    #[test]
    fn test_empty_sides() {
        let outcome = merge_projects(Vec::new(), Vec::new());
        assert!(outcome.projects.is_empty());

        let outcome = merge_projects(Vec::new(), vec![project("r", "r", "2024-01-01T00:00:00Z")]);
        assert_eq!(outcome.projects.len(), 1);
        assert!(outcome.to_push.is_empty());
    }
}
