// Output stage: keeps the line-numbered lines of the recognized text and
// renders them into the labelled sections of the output file.
//
// Only the Python section is ever filled. Recognized text is not classified
// by language, so the JavaScript, HTML and CSS sections are written empty.

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Python,
    JavaScript,
    Html,
    Css,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Python,
        Section::JavaScript,
        Section::Html,
        Section::Css,
    ];

    pub fn heading(&self) -> &'static str {
        match self {
            Section::Python => "Filtered Python Code:",
            Section::JavaScript => "Filtered JavaScript Code:",
            Section::Html => "Filtered HTML Code:",
            Section::Css => "Filtered CSS Code:",
        }
    }
}

/// Lines whose trimmed text starts with an ASCII digit, deduplicated on the
/// exact line text. First occurrence wins the position.
pub fn numbered_lines<S: AsRef<str>>(snippets: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    snippets
        .iter()
        .flat_map(|snippet| snippet.as_ref().split('\n'))
        .filter(|line| {
            line.trim()
                .chars()
                .next()
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false)
        })
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SnippetReport {
    pub python: Vec<String>,
}

impl SnippetReport {
    pub fn from_snippets<S: AsRef<str>>(snippets: &[S]) -> Self {
        Self {
            python: numbered_lines(snippets),
        }
    }

    pub fn lines(&self, section: Section) -> &[String] {
        match section {
            Section::Python => &self.python,
            Section::JavaScript | Section::Html | Section::Css => &[],
        }
    }

    pub fn line_count(&self) -> usize {
        Section::ALL.iter().map(|s| self.lines(*s).len()).sum()
    }

    pub fn render(&self) -> String {
        Section::ALL
            .iter()
            .map(|section| format!("{}\n\n{}", section.heading(), self.lines(*section).join("\n\n")))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_digit_prefixed_lines_survive() {
        let report = SnippetReport::from_snippets(&["1 print('hi')\nnot a number"]);
        assert_eq!(report.python, vec!["1 print('hi')"]);
    }

    #[test]
    fn test_leading_whitespace_is_ignored_but_kept() {
        let lines = numbered_lines(&["   12 x = 1\n\t3\n  # 4"]);
        assert_eq!(lines, vec!["   12 x = 1", "\t3"]);
    }

    #[test]
    fn test_identical_lines_collapse_across_snippets() {
        let lines = numbered_lines(&["1 import os\n2 os.getcwd()", "1 import os\n3 pass"]);
        assert_eq!(lines, vec!["1 import os", "2 os.getcwd()", "3 pass"]);
    }

    #[test]
    fn test_other_sections_always_empty() {
        let report = SnippetReport::from_snippets(&["1 const x = 1;\n2 <div></div>\n3 a { color: red; }"]);
        assert_eq!(report.python.len(), 3);
        assert!(report.lines(Section::JavaScript).is_empty());
        assert!(report.lines(Section::Html).is_empty());
        assert!(report.lines(Section::Css).is_empty());
        assert_eq!(report.line_count(), 3);
    }

    #[test]
    fn test_render_layout() {
        let report = SnippetReport::from_snippets(&["1 a\nb\n2 c"]);
        assert_eq!(
            report.render(),
            "Filtered Python Code:\n\n1 a\n\n2 c\
             \n\nFiltered JavaScript Code:\n\n\
             \n\nFiltered HTML Code:\n\n\
             \n\nFiltered CSS Code:\n\n"
        );
    }

    #[test]
    fn test_render_empty() {
        let report = SnippetReport::from_snippets::<&str>(&[]);
        assert_eq!(
            report.render(),
            "Filtered Python Code:\n\n\n\nFiltered JavaScript Code:\n\n\n\nFiltered HTML Code:\n\n\n\nFiltered CSS Code:\n\n"
        );
    }
}
