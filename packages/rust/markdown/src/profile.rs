//! Article profiling: heading-delimited sections and document tokens.

use tracing::debug;

use mdenrich_shared::{Profile, Section};

use crate::text::{parse_heading, tokenize};

/// Build the structural profile of a Markdown article.
///
/// Content before the first heading becomes a leading section with no
/// heading, but only when it has non-blank content.
pub fn build_profile(markdown: &str) -> Profile {
    let mut sections = Vec::new();
    let mut current = Section {
        heading: None,
        level: None,
        content: Vec::new(),
    };

    for line in markdown.lines() {
        if let Some((level, text)) = parse_heading(line) {
            let next = Section {
                heading: Some(text.to_string()),
                level: Some(level),
                content: Vec::new(),
            };
            push_section(&mut sections, std::mem::replace(&mut current, next));
        } else {
            current.content.push(line.to_string());
        }
    }
    push_section(&mut sections, current);

    let headings = sections.iter().filter_map(|s| s.heading.clone()).collect();
    let tokens = tokenize(markdown);

    debug!(
        sections = sections.len(),
        tokens = tokens.len(),
        "article profile built"
    );

    Profile {
        sections,
        headings,
        tokens,
    }
}

fn push_section(sections: &mut Vec<Section>, section: Section) {
    let keep = section.heading.is_some() || section.content.iter().any(|l| !l.trim().is_empty());
    if keep {
        sections.push(section);
    }
}

/// Paragraph texts of a section's content, split on blank lines.
pub fn section_paragraphs(section: &Section) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in &section.content {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line.trim());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_follow_headings() {
        let md = "# Title\n\nIntro line.\n\n## Storage\n\nCO2 is injected.\nDeep underground.\n";
        let profile = build_profile(md);

        assert_eq!(profile.headings, vec!["Title", "Storage"]);
        assert_eq!(profile.sections.len(), 2);
        assert_eq!(profile.sections[1].level, Some(2));
        assert_eq!(
            profile.sections[1].content,
            vec!["", "CO2 is injected.", "Deep underground."]
        );
        assert!(profile.tokens.contains(&"co2".to_string()));
        assert!(profile.tokens.contains(&"underground".to_string()));
    }

    #[test]
    fn preamble_only_when_non_blank() {
        let blank = build_profile("\n\n# Title\nBody");
        assert_eq!(blank.sections.len(), 1);
        assert_eq!(blank.sections[0].heading.as_deref(), Some("Title"));

        let with_intro = build_profile("Lead paragraph.\n\n# Title\nBody");
        assert_eq!(with_intro.sections.len(), 2);
        assert_eq!(with_intro.sections[0].heading, None);
        assert_eq!(with_intro.sections[0].level, None);
        assert_eq!(with_intro.headings, vec!["Title"]);
    }

    #[test]
    fn empty_article() {
        let profile = build_profile("");
        assert!(profile.sections.is_empty());
        assert!(profile.headings.is_empty());
        assert!(profile.tokens.is_empty());
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let profile = build_profile("## S\n\nOne\ntwo.\n\nThree.\n");
        assert_eq!(
            section_paragraphs(&profile.sections[0]),
            vec!["One two.", "Three."]
        );
    }
}
