//! Editor annotations
//!
//! The issues of the open file, expressed as data: one annotation per issue
//! with its line, marker colour, hover content and quick-fix action. An
//! [`EditorSurface`] renders a whole set at once; sets are never patched,
//! because identities and line numbers shift between analyses.

use crate::issues::{Category, ExplanationStatus, InteractionStore, Issue, IssueId, MarkerColor};

/// Hover card for one issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hover {
    pub code: String,
    pub category: Category,
    pub message: String,
    /// Only present once the explanation has loaded
    pub why: Option<String>,
}

impl Hover {
    pub fn to_markdown(&self) -> String {
        let mut out = format!(
            "**{}** · {}\n\n{}",
            self.code,
            self.category.label(),
            self.message
        );
        if let Some(why) = &self.why {
            out.push_str("\n\n**Why this matters:** ");
            out.push_str(why);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub id: IssueId,
    pub line: u32,
    pub color: MarkerColor,
    pub hover: Hover,
    /// Title of the quick-fix action; invoking it targets `id`
    pub action_title: String,
}

/// Every annotation for one file, ordered by line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSet {
    file: String,
    annotations: Vec<Annotation>,
}

impl AnnotationSet {
    pub fn build<'a, I>(file: &str, issues: I, store: &InteractionStore) -> Self
    where
        I: IntoIterator<Item = &'a Issue>,
    {
        let mut annotations: Vec<Annotation> = issues
            .into_iter()
            .filter(|issue| issue.file == file)
            .map(|issue| annotate(issue, store))
            .collect();
        // Stable: issues sharing a line keep normalization order.
        annotations.sort_by_key(|a| a.line);

        Self {
            file: file.to_string(),
            annotations,
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn at_line(&self, line: u32) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter().filter(move |a| a.line == line)
    }

    pub fn get(&self, id: &IssueId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| &a.id == id)
    }
}

fn annotate(issue: &Issue, store: &InteractionStore) -> Annotation {
    let why = match store.explanation_status(&issue.id()) {
        ExplanationStatus::Loaded => issue.explanation.as_ref().map(|e| e.why.clone()),
        _ => None,
    };
    Annotation {
        id: issue.id(),
        line: issue.line.max(1),
        color: issue.category.marker_color(),
        hover: Hover {
            code: issue.code.clone(),
            category: issue.category,
            message: issue.message.clone(),
            why,
        },
        action_title: format!("🦩 Fix {}", issue.code),
    }
}

/// A concrete editor widget
pub trait EditorSurface {
    /// Drop every decoration, marker and action
    fn clear_annotations(&mut self);
    /// Install `set` in place of whatever was shown
    fn show_annotations(&mut self, set: &AnnotationSet);
}

/// Tracks what a surface is showing and replaces it wholesale on change
#[derive(Debug, Default)]
pub struct AnnotationBinding {
    shown: Option<AnnotationSet>,
}

impl AnnotationBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Option<&AnnotationSet> {
        self.shown.as_ref()
    }

    /// Bring the surface in line with `next`. Returns true if it was touched.
    pub fn sync<S: EditorSurface + ?Sized>(
        &mut self,
        next: Option<AnnotationSet>,
        surface: &mut S,
    ) -> bool {
        if self.shown == next {
            return false;
        }
        surface.clear_annotations();
        if let Some(set) = &next {
            surface.show_annotations(set);
        }
        self.shown = next;
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::issues::Explanation;

    /// Records what an editor would have been told to draw
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSurface {
        pub(crate) clears: usize,
        pub(crate) shown: Vec<AnnotationSet>,
    }

    impl EditorSurface for RecordingSurface {
        fn clear_annotations(&mut self) {
            self.clears += 1;
        }

        fn show_annotations(&mut self, set: &AnnotationSet) {
            self.shown.push(set.clone());
        }
    }

    fn issues() -> Vec<Issue> {
        vec![
            Issue::new(Category::Security, "file.py", 20, "S001", "SQL injection"),
            Issue::new(Category::Warning, "file.py", 7, "W001", "unused import"),
            Issue::new(Category::Error, "other.py", 1, "E999", "syntax error"),
        ]
    }

    fn store_for(issues: &[Issue]) -> InteractionStore {
        let mut store = InteractionStore::new();
        store.sync(issues.iter().map(Issue::id));
        store
    }

    #[test]
    fn test_build_orders_by_line_and_filters_file() {
        let issues = issues();
        let store = store_for(&issues);
        let set = AnnotationSet::build("file.py", &issues, &store);

        assert_eq!(set.len(), 2);
        let lines: Vec<u32> = set.annotations().iter().map(|a| a.line).collect();
        assert_eq!(lines, vec![7, 20]);
        assert_eq!(set.annotations()[0].color, MarkerColor::Yellow);
        assert_eq!(set.annotations()[1].color, MarkerColor::Purple);
        assert_eq!(set.annotations()[0].action_title, "🦩 Fix W001");
        assert_eq!(set.at_line(20).count(), 1);
    }

    #[test]
    fn test_hover_shows_why_only_when_loaded() {
        let mut issues = issues();
        issues[1].explanation = Some(Explanation {
            why: "Unused imports clutter the namespace".to_string(),
            fix: "remove the import".to_string(),
            example: None,
            advanced_tip: None,
            source: None,
        });
        let mut store = store_for(&issues);
        let id = issues[1].id();

        let before = AnnotationSet::build("file.py", &issues, &store);
        assert_eq!(before.get(&id).unwrap().hover.why, None);

        store.begin_explanation(&id);
        store.finish_explanation(&id, true);
        let after = AnnotationSet::build("file.py", &issues, &store);
        let hover = &after.get(&id).unwrap().hover;
        assert_eq!(
            hover.why.as_deref(),
            Some("Unused imports clutter the namespace")
        );
        let markdown = hover.to_markdown();
        assert!(markdown.starts_with("**W001** · Warning"));
        assert!(markdown.contains("unused import"));
        assert!(markdown.contains("Why this matters"));
    }

    #[test]
    fn test_binding_replaces_wholesale_and_skips_no_ops() {
        let issues = issues();
        let store = store_for(&issues);
        let mut surface = RecordingSurface::default();
        let mut binding = AnnotationBinding::new();

        let set = AnnotationSet::build("file.py", &issues, &store);
        assert!(binding.sync(Some(set.clone()), &mut surface));
        assert!(!binding.sync(Some(set), &mut surface));
        assert_eq!(surface.clears, 1);
        assert_eq!(surface.shown.len(), 1);

        let switched = AnnotationSet::build("other.py", &issues, &store);
        assert!(binding.sync(Some(switched), &mut surface));
        assert_eq!(surface.clears, 2);
        assert_eq!(surface.shown.last().unwrap().file(), "other.py");

        assert!(binding.sync(None, &mut surface));
        assert_eq!(surface.clears, 3);
        assert!(binding.shown().is_none());
    }
}
