//! Issue identity and normalization
//!
//! Flattens the sub-reports of an analysis run into one ordered,
//! de-duplicated issue collection and merges later runs into it.

use super::{AnalysisResult, Explanation, Issue, IssueId, SubReportKind};
use crate::util::non_blank;
use std::collections::{HashMap, HashSet};

const FLAMINGO: &str = "🦩";

/// Default friendly restatement for an issue that arrived without one
pub fn friendly_message(kind: SubReportKind, message: &str) -> String {
    match kind {
        SubReportKind::Primary => format!("{} {}", FLAMINGO, message),
        SubReportKind::Complexity => format!("{} Complexity check: {}", FLAMINGO, message),
        SubReportKind::Security => format!("{} Security alert: {}", FLAMINGO, message),
    }
}

/// Flatten all sub-reports into one sequence, one entry per identity.
///
/// The first occurrence of an identity keeps its position; later
/// duplicates (e.g. the same finding reported by two passes) are dropped.
pub fn normalize(result: &AnalysisResult) -> Vec<Issue> {
    let mut seen: HashSet<IssueId> = HashSet::new();
    let mut out = Vec::new();

    for (kind, report) in result.sub_reports() {
        for raw in report.issues() {
            let id = raw.id();
            if !seen.insert(id) {
                continue;
            }
            let mut issue = raw.clone();
            issue.url = non_blank(issue.url.take());
            issue.friendly_message = non_blank(issue.friendly_message.take())
                .or_else(|| Some(friendly_message(kind, &issue.message)));
            out.push(issue);
        }
    }

    out
}

/// Issues of one file, in normalization order
#[derive(Debug)]
pub struct FileGroup<'a> {
    pub file: &'a str,
    pub issues: Vec<&'a Issue>,
}

/// The shared, read-mostly issue collection
#[derive(Debug, Clone, Default)]
pub struct IssueSet {
    issues: Vec<Issue>,
    index: HashMap<IssueId, usize>,
}

impl IssueSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_result(result: &AnalysisResult) -> Self {
        let mut set = Self::new();
        set.replace_all(normalize(result));
        set
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = IssueId> + '_ {
        self.issues.iter().map(Issue::id)
    }

    pub fn contains(&self, id: &IssueId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &IssueId) -> Option<&Issue> {
        self.index.get(id).map(|&i| &self.issues[i])
    }

    /// Replace the whole collection with a fresh normalization.
    ///
    /// Explanations already fetched for identities that survive are carried
    /// over. Returns the identities that disappeared.
    pub fn replace_all(&mut self, fresh: Vec<Issue>) -> Vec<IssueId> {
        let mut previous = std::mem::take(&mut self.issues);
        let fresh = dedup(fresh);
        let kept: HashSet<IssueId> = fresh.iter().map(Issue::id).collect();

        let mut carried = take_explanations(&mut previous);
        self.issues = fresh
            .into_iter()
            .map(|issue| carry_explanation(issue, &mut carried))
            .collect();
        self.reindex();

        previous
            .iter()
            .map(Issue::id)
            .filter(|id| !kept.contains(id))
            .collect()
    }

    /// Replace the issues of one file, leaving other files untouched.
    ///
    /// The file keeps its position in the display order; a file seen for
    /// the first time goes last. Returns the identities that disappeared.
    pub fn replace_file(&mut self, file: &str, fresh: Vec<Issue>) -> Vec<IssueId> {
        let fresh: Vec<Issue> = dedup(fresh)
            .into_iter()
            .filter(|issue| issue.file == file)
            .collect();
        let kept: HashSet<IssueId> = fresh.iter().map(Issue::id).collect();

        let previous = std::mem::take(&mut self.issues);
        let mut old_for_file = Vec::new();
        let mut rebuilt = Vec::with_capacity(previous.len() + fresh.len());
        let mut insert_at = None;

        for issue in previous {
            if issue.file == file {
                insert_at.get_or_insert(rebuilt.len());
                old_for_file.push(issue);
            } else {
                rebuilt.push(issue);
            }
        }

        let removed: Vec<IssueId> = old_for_file
            .iter()
            .map(Issue::id)
            .filter(|id| !kept.contains(id))
            .collect();

        let mut carried = take_explanations(&mut old_for_file);
        let fresh: Vec<Issue> = fresh
            .into_iter()
            .map(|issue| carry_explanation(issue, &mut carried))
            .collect();

        let at = insert_at.unwrap_or(rebuilt.len());
        rebuilt.splice(at..at, fresh);
        self.issues = rebuilt;
        self.reindex();

        removed
    }

    pub fn attach_explanation(&mut self, id: &IssueId, explanation: Explanation) -> bool {
        match self.index.get(id) {
            Some(&i) => {
                self.issues[i].explanation = Some(explanation);
                true
            }
            None => false,
        }
    }

    pub fn clear_explanation(&mut self, id: &IssueId) {
        if let Some(&i) = self.index.get(id) {
            self.issues[i].explanation = None;
        }
    }

    pub fn for_file(&self, file: &str) -> Vec<&Issue> {
        self.issues.iter().filter(|i| i.file == file).collect()
    }

    /// Group by file, preserving first-seen file order
    pub fn group_by_file(&self) -> Vec<FileGroup<'_>> {
        let mut groups: Vec<FileGroup<'_>> = Vec::new();
        let mut slot: HashMap<&str, usize> = HashMap::new();

        for issue in &self.issues {
            let idx = *slot.entry(issue.file.as_str()).or_insert_with(|| {
                groups.push(FileGroup {
                    file: issue.file.as_str(),
                    issues: Vec::new(),
                });
                groups.len() - 1
            });
            groups[idx].issues.push(issue);
        }

        groups
    }

    fn reindex(&mut self) {
        self.index = self
            .issues
            .iter()
            .enumerate()
            .map(|(i, issue)| (issue.id(), i))
            .collect();
    }
}

fn dedup(issues: Vec<Issue>) -> Vec<Issue> {
    let mut seen = HashSet::new();
    issues
        .into_iter()
        .filter(|issue| seen.insert(issue.id()))
        .collect()
}

fn take_explanations(issues: &mut [Issue]) -> HashMap<IssueId, Explanation> {
    issues
        .iter_mut()
        .filter_map(|issue| issue.explanation.take().map(|e| (issue.id(), e)))
        .collect()
}

fn carry_explanation(mut issue: Issue, carried: &mut HashMap<IssueId, Explanation>) -> Issue {
    if issue.explanation.is_none() {
        issue.explanation = carried.remove(&issue.id());
    }
    issue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issues::{Category, SubReport};

    fn warning(file: &str, line: u32, code: &str, message: &str) -> Issue {
        Issue::new(Category::Warning, file, line, code, message)
    }

    fn explanation(fix: &str) -> Explanation {
        Explanation {
            why: "because".to_string(),
            fix: fix.to_string(),
            example: None,
            advanced_tip: None,
            source: Some("template".to_string()),
        }
    }

    fn result_with(primary: Vec<Issue>, security: Vec<Issue>) -> AnalysisResult {
        AnalysisResult {
            main_analysis: Some(SubReport::with_issues(primary)),
            security_scan: Some(SubReport::with_issues(security)),
            ..AnalysisResult::default()
        }
    }

    #[test]
    fn test_duplicates_across_sub_reports_collapse() {
        let dup = warning("a.py", 3, "W001", "unused import");
        let result = result_with(
            vec![dup.clone(), warning("a.py", 4, "W002", "x")],
            vec![dup.clone(), warning("b.py", 1, "S101", "assert used")],
        );

        let issues = normalize(&result);
        let ids: Vec<IssueId> = issues.iter().map(Issue::id).collect();
        assert_eq!(
            ids,
            vec![
                IssueId::new("a.py", 3, "W001"),
                IssueId::new("a.py", 4, "W002"),
                IssueId::new("b.py", 1, "S101"),
            ]
        );

        // Idempotent: normalizing the same input again gives the same set.
        assert_eq!(normalize(&result), issues);
    }

    #[test]
    fn test_partial_issues_survive_sub_report_error() {
        let result = AnalysisResult {
            main_analysis: Some(SubReport {
                success: Some(false),
                issues: Some(vec![warning("a.py", 2, "W001", "unused import")]),
                error: Some("pylint exited with status 2".to_string()),
                raw: None,
            }),
            ..AnalysisResult::default()
        };

        let issues = normalize(&result);

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].id(), IssueId::new("a.py", 2, "W001"));
        assert_eq!(result.primary_error(), Some("pylint exited with status 2"));
    }

    #[test]
    fn test_default_friendly_messages_by_sub_report() {
        let mut complexity = Issue::new(
            Category::Complexity,
            "a.py",
            10,
            "RADON-C",
            "Function 'load' (complexity: 12)",
        );
        complexity.friendly_message = Some("   ".to_string());
        let result = AnalysisResult {
            main_analysis: Some(SubReport::with_issues(vec![warning(
                "a.py", 1, "W001", "unused import",
            )])),
            complexity_analysis: Some(SubReport::with_issues(vec![complexity])),
            security_scan: Some(SubReport::with_issues(vec![Issue::new(
                Category::Security,
                "a.py",
                20,
                "S001",
                "SQL injection",
            )])),
            ..AnalysisResult::default()
        };

        let issues = normalize(&result);
        assert_eq!(issues[0].display_message(), "🦩 unused import");
        assert_eq!(
            issues[1].display_message(),
            "🦩 Complexity check: Function 'load' (complexity: 12)"
        );
        assert_eq!(issues[2].display_message(), "🦩 Security alert: SQL injection");
    }

    #[test]
    fn test_server_friendly_message_is_kept() {
        let mut issue = warning("a.py", 1, "W001", "unused import");
        issue.friendly_message = Some("[Warning] W001: unused import".to_string());
        issue.url = Some(String::new());
        let issues = normalize(&result_with(vec![issue], vec![]));
        assert_eq!(issues[0].display_message(), "[Warning] W001: unused import");
        assert_eq!(issues[0].url, None);
    }

    #[test]
    fn test_group_by_file_preserves_first_seen_order() {
        let mut set = IssueSet::new();
        set.replace_all(vec![
            warning("z.py", 9, "W1", "a"),
            warning("a.py", 1, "W2", "b"),
            warning("z.py", 2, "W3", "c"),
        ]);

        let groups = set.group_by_file();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].file, "z.py");
        let codes: Vec<&str> = groups[0].issues.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(codes, vec!["W1", "W3"]);
        assert_eq!(groups[1].file, "a.py");
    }

    #[test]
    fn test_replace_all_carries_explanations_for_survivors() {
        let mut set = IssueSet::new();
        set.replace_all(vec![
            warning("a.py", 1, "W001", "old text"),
            warning("a.py", 5, "W002", "gone soon"),
        ]);
        let keep = IssueId::new("a.py", 1, "W001");
        let gone = IssueId::new("a.py", 5, "W002");
        assert!(set.attach_explanation(&keep, explanation("remove it")));
        assert!(set.attach_explanation(&gone, explanation("whatever")));

        let removed = set.replace_all(vec![warning("a.py", 1, "W001", "new text")]);

        assert_eq!(removed, vec![gone.clone()]);
        let survivor = set.get(&keep).unwrap();
        assert_eq!(survivor.message, "new text");
        assert_eq!(survivor.explanation.as_ref().unwrap().fix, "remove it");
        assert!(set.get(&gone).is_none());

        // The dropped identity does not come back with its old explanation.
        set.replace_all(vec![
            warning("a.py", 1, "W001", "new text"),
            warning("a.py", 5, "W002", "back again"),
        ]);
        assert!(set.get(&gone).unwrap().explanation.is_none());
    }

    #[test]
    fn test_replace_file_keeps_other_files_and_position() {
        let mut set = IssueSet::new();
        set.replace_all(vec![
            warning("a.py", 1, "W1", "a1"),
            warning("b.py", 1, "W1", "b1"),
            warning("b.py", 3, "W2", "b3"),
            warning("c.py", 1, "W1", "c1"),
        ]);

        let removed = set.replace_file(
            "b.py",
            vec![
                warning("b.py", 7, "W9", "new"),
                warning("b.py", 1, "W1", "b1 again"),
                warning("c.py", 99, "X", "ignored, other file"),
            ],
        );

        assert_eq!(removed, vec![IssueId::new("b.py", 3, "W2")]);
        let files: Vec<&str> = set.group_by_file().iter().map(|g| g.file).collect();
        assert_eq!(files, vec!["a.py", "b.py", "c.py"]);
        let b: Vec<u32> = set.for_file("b.py").iter().map(|i| i.line).collect();
        assert_eq!(b, vec![7, 1]);
        assert!(!set.contains(&IssueId::new("c.py", 99, "X")));
    }

    #[test]
    fn test_replace_file_for_new_file_appends() {
        let mut set = IssueSet::new();
        set.replace_all(vec![warning("a.py", 1, "W1", "a1")]);
        let removed = set.replace_file("new.py", vec![warning("new.py", 2, "W2", "n")]);
        assert!(removed.is_empty());
        let files: Vec<&str> = set.group_by_file().iter().map(|g| g.file).collect();
        assert_eq!(files, vec!["a.py", "new.py"]);
    }
}
