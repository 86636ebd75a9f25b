//! First parsing stage: classify each raw line of an `<operations>` block
//! before the parser interprets operation lines. Keeping classification
//! separate from interpretation keeps `parser::parse_diff` a simple
//! line-by-line state machine instead of one large regex.

/// The section an operation line belongs to, set by the most recent
/// `## Nodes` / `## Edges` header seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Nodes,
    Edges,
}

/// A classified line, still holding its raw text and 1-indexed line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedLine<'a> {
    Blank,
    Comment,
    BaseSnapshot { inner: &'a str },
    ViewContext { inner: &'a str },
    SectionHeader(Section),
    Operation { raw: &'a str },
}

/// Classify one line of an `<operations>` block body (the `<operations>` /
/// `</operations>` wrapper tags themselves are stripped before this runs).
pub fn classify(line: &str) -> ClassifiedLine<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ClassifiedLine::Blank;
    }
    if let Some(inner) = strip_tag(trimmed, "base_snapshot") {
        return ClassifiedLine::BaseSnapshot { inner };
    }
    if let Some(inner) = strip_tag(trimmed, "view_context") {
        return ClassifiedLine::ViewContext { inner };
    }
    if trimmed.eq_ignore_ascii_case("## Nodes") {
        return ClassifiedLine::SectionHeader(Section::Nodes);
    }
    if trimmed.eq_ignore_ascii_case("## Edges") {
        return ClassifiedLine::SectionHeader(Section::Edges);
    }
    if trimmed.starts_with('#') {
        return ClassifiedLine::Comment;
    }
    ClassifiedLine::Operation { raw: trimmed }
}

fn strip_tag<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let body = line.strip_prefix(&open)?;
    body.strip_suffix(&close)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_blank_and_comment() {
        assert_eq!(classify(""), ClassifiedLine::Blank);
        assert_eq!(classify("   "), ClassifiedLine::Blank);
        assert_eq!(classify("# a note"), ClassifiedLine::Comment);
    }

    #[test]
    fn classifies_section_headers() {
        assert_eq!(
            classify("## Nodes"),
            ClassifiedLine::SectionHeader(Section::Nodes)
        );
        assert_eq!(
            classify("## Edges"),
            ClassifiedLine::SectionHeader(Section::Edges)
        );
    }

    #[test]
    fn classifies_base_snapshot_and_view_context() {
        assert_eq!(
            classify("<base_snapshot>Payments@v3</base_snapshot>"),
            ClassifiedLine::BaseSnapshot {
                inner: "Payments@v3"
            }
        );
        assert_eq!(
            classify("<view_context>phase1</view_context>"),
            ClassifiedLine::ViewContext { inner: "phase1" }
        );
    }

    #[test]
    fn classifies_operation_line() {
        assert_eq!(
            classify("+ ProcessPayment.FUNC.001|Processes a payment"),
            ClassifiedLine::Operation {
                raw: "+ ProcessPayment.FUNC.001|Processes a payment"
            }
        );
    }
}
