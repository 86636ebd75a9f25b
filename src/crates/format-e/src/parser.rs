//! `parseDiff` — turns Format E source text into a [`FormatEDiff`].

use crate::diff::{EdgeOp, FormatEDiff, NodeOp};
use crate::error::{FormatEError, Result};
use crate::lexer::{classify, ClassifiedLine, Section};
use crate::types::{EdgeType, NodeType};
use serde_json::{Map, Value};

/// Parse a Format E `<operations>` block into a structured diff.
///
/// Accepts the text either with or without the surrounding
/// `<operations>`/`</operations>` tags — callers typically hand this the
/// exact span the Response Parser extracted, which already has the tags
/// stripped, but tolerating them keeps the codec usable standalone.
pub fn parse_diff(text: &str) -> Result<FormatEDiff> {
    let body = strip_operations_wrapper(text);

    let mut diff = FormatEDiff::default();
    let mut section: Option<Section> = None;

    for (idx, raw_line) in body.lines().enumerate() {
        let line_no = idx + 1;
        match classify(raw_line) {
            ClassifiedLine::Blank | ClassifiedLine::Comment => {}
            ClassifiedLine::BaseSnapshot { inner } => {
                diff.base_snapshot = Some(parse_base_snapshot(inner, line_no)?);
            }
            ClassifiedLine::ViewContext { inner } => {
                diff.view_context = Some(inner.to_string());
            }
            ClassifiedLine::SectionHeader(s) => {
                section = Some(s);
            }
            ClassifiedLine::Operation { raw } => match section {
                Some(Section::Nodes) => diff.node_ops.push(parse_node_op(raw, line_no)?),
                Some(Section::Edges) => diff.edge_ops.push(parse_edge_op(raw, line_no)?),
                None => {
                    return Err(FormatEError::MalformedLine {
                        line: line_no,
                        text: raw.to_string(),
                    })
                }
            },
        }
    }

    Ok(diff)
}

fn strip_operations_wrapper(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("<operations>")
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("</operations>")
        .unwrap_or(without_open)
        .trim_matches('\n')
}

fn parse_base_snapshot(inner: &str, line_no: usize) -> Result<(String, u64)> {
    let (id, version) = inner
        .split_once('@')
        .ok_or_else(|| FormatEError::MalformedLine {
            line: line_no,
            text: inner.to_string(),
        })?;
    let version = version
        .trim_start_matches('v')
        .parse::<u64>()
        .map_err(|_| FormatEError::MalformedLine {
            line: line_no,
            text: inner.to_string(),
        })?;
    Ok((id.to_string(), version))
}

/// Validates that a semantic ID has the shape `Name.TypeAbbr.NNN` and returns
/// its type tag.
fn validate_semantic_id(id: &str, line_no: usize) -> Result<NodeType> {
    if id.trim().is_empty() {
        return Err(FormatEError::EmptySemanticId { line: line_no });
    }
    let parts: Vec<&str> = id.rsplitn(3, '.').collect();
    if parts.len() != 3 {
        return Err(FormatEError::MalformedLine {
            line: line_no,
            text: id.to_string(),
        });
    }
    // rsplitn yields [NNN, TypeAbbr, Name...] in reverse order.
    let abbr = parts[1];
    NodeType::from_abbr(abbr).ok_or_else(|| FormatEError::UnknownNodeType {
        line: line_no,
        abbr: abbr.to_string(),
    })
}

fn parse_node_op(raw: &str, line_no: usize) -> Result<NodeOp> {
    let (sign, rest) = split_sign(raw, line_no)?;

    if sign == '-' {
        let semantic_id = rest.trim().to_string();
        validate_semantic_id(&semantic_id, line_no)?;
        return Ok(NodeOp::Remove { semantic_id });
    }

    let (id_part, tail) = rest.split_once('|').ok_or_else(|| FormatEError::MalformedLine {
        line: line_no,
        text: raw.to_string(),
    })?;
    let semantic_id = id_part.trim().to_string();
    let node_type = validate_semantic_id(&semantic_id, line_no)?;

    let (description, attributes) = split_description_and_attributes(tail, line_no)?;

    if sign == '+' {
        Ok(NodeOp::Add {
            semantic_id,
            node_type,
            description,
            attributes,
        })
    } else {
        Ok(NodeOp::Update {
            semantic_id,
            description: if description.is_empty() {
                None
            } else {
                Some(description)
            },
            attributes,
        })
    }
}

fn parse_edge_op(raw: &str, line_no: usize) -> Result<EdgeOp> {
    let (sign, rest) = split_sign(raw, line_no)?;

    let (left, target) = rest.split_once("->").ok_or_else(|| FormatEError::MalformedLine {
        line: line_no,
        text: raw.to_string(),
    })?;
    let target_id = target.trim().to_string();
    let left = left.trim();
    let dash_idx = left.rfind('-').ok_or_else(|| FormatEError::MalformedLine {
        line: line_no,
        text: raw.to_string(),
    })?;
    let source_id = left[..dash_idx].trim().to_string();
    let arrow = left[dash_idx + 1..].trim();

    if source_id.is_empty() || target_id.is_empty() {
        return Err(FormatEError::MalformedLine {
            line: line_no,
            text: raw.to_string(),
        });
    }
    let edge_type = EdgeType::from_arrow(arrow).ok_or_else(|| FormatEError::UnknownEdgeArrow {
        line: line_no,
        arrow: arrow.to_string(),
    })?;

    Ok(match sign {
        '+' => EdgeOp::Add {
            source_id,
            edge_type,
            target_id,
        },
        _ => EdgeOp::Remove {
            source_id,
            edge_type,
            target_id,
        },
    })
}

fn split_sign(raw: &str, line_no: usize) -> Result<(char, &str)> {
    let mut chars = raw.chars();
    let sign = chars.next().ok_or_else(|| FormatEError::MalformedLine {
        line: line_no,
        text: raw.to_string(),
    })?;
    if !matches!(sign, '+' | '-' | '~') {
        return Err(FormatEError::MalformedLine {
            line: line_no,
            text: raw.to_string(),
        });
    }
    Ok((sign, raw[sign.len_utf8()..].trim_start()))
}

/// Splits `"Description text [key:value, key2:value2]"` into the description
/// and the parsed attribute map. The bracket suffix is optional.
fn split_description_and_attributes(tail: &str, line_no: usize) -> Result<(String, Map<String, Value>)> {
    let tail = tail.trim();
    match tail.rfind('[') {
        None => Ok((tail.to_string(), Map::new())),
        Some(open_idx) => {
            if !tail.ends_with(']') {
                return Err(FormatEError::UnterminatedAttribute { line: line_no });
            }
            let description = tail[..open_idx].trim().to_string();
            let body = &tail[open_idx + 1..tail.len() - 1];
            let attrs = parse_attribute_list(body, line_no)?;
            Ok((description, attrs))
        }
    }
}

fn parse_attribute_list(body: &str, line_no: usize) -> Result<Map<String, Value>> {
    let mut attrs = Map::new();
    for pair in split_top_level(body, ',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once(':').ok_or_else(|| FormatEError::MalformedLine {
            line: line_no,
            text: pair.to_string(),
        })?;
        let key = key.trim().to_string();
        let value = value.trim();
        let parsed = serde_json::from_str::<Value>(value)
            .unwrap_or_else(|_| Value::String(value.to_string()));
        attrs.insert(key, parsed);
    }
    Ok(attrs)
}

/// Splits `s` on `delim` at nesting depth zero, so attribute values that are
/// themselves JSON arrays/objects (`tags:[a,b]`) don't get split apart.
fn split_top_level(s: &str, delim: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    let mut in_string = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '[' | '{' if !in_string => depth += 1,
            ']' | '}' if !in_string => depth -= 1,
            c if c == delim && depth == 0 && !in_string => {
                out.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static str {
        "<base_snapshot>Payments@v3</base_snapshot>\n\
         <view_context>phase1</view_context>\n\
         ## Nodes\n\
         + ProcessPayment.FUNC.001|Processes a payment [phase:1, volatility:\"low\"]\n\
         ~ ProcessPayment.FUNC.001|Processes a payment, now idempotent\n\
         - OldStep.FUNC.002\n\
         ## Edges\n\
         + ProcessPayment.FUNC.001 -io-> Ledger.SYS.001\n\
         - ProcessPayment.FUNC.001 -rel-> Ledger.SYS.001\n"
    }

    #[test]
    fn parses_full_sample() {
        let diff = parse_diff(sample()).expect("should parse");
        assert_eq!(diff.base_snapshot, Some(("Payments".to_string(), 3)));
        assert_eq!(diff.view_context.as_deref(), Some("phase1"));
        assert_eq!(diff.node_ops.len(), 3);
        assert_eq!(diff.edge_ops.len(), 2);

        match &diff.node_ops[0] {
            NodeOp::Add {
                semantic_id,
                node_type,
                description,
                attributes,
            } => {
                assert_eq!(semantic_id, "ProcessPayment.FUNC.001");
                assert_eq!(*node_type, NodeType::Func);
                assert_eq!(description, "Processes a payment");
                assert_eq!(attributes.get("phase"), Some(&Value::from(1)));
                assert_eq!(attributes.get("volatility"), Some(&Value::from("low")));
            }
            other => panic!("expected Add, got {other:?}"),
        }

        match &diff.node_ops[2] {
            NodeOp::Remove { semantic_id } => assert_eq!(semantic_id, "OldStep.FUNC.002"),
            other => panic!("expected Remove, got {other:?}"),
        }

        match &diff.edge_ops[0] {
            EdgeOp::Add {
                source_id,
                edge_type,
                target_id,
            } => {
                assert_eq!(source_id, "ProcessPayment.FUNC.001");
                assert_eq!(*edge_type, EdgeType::Io);
                assert_eq!(target_id, "Ledger.SYS.001");
            }
            other => panic!("expected Add, got {other:?}"),
        }
    }

    #[test]
    fn unknown_node_type_is_rejected() {
        let err = parse_diff("## Nodes\n+ Thing.NOPE.001|desc\n").unwrap_err();
        assert_eq!(
            err,
            FormatEError::UnknownNodeType {
                line: 2,
                abbr: "NOPE".to_string()
            }
        );
    }

    #[test]
    fn unknown_edge_arrow_is_rejected() {
        let err = parse_diff("## Edges\n+ A.SYS.001 -zzz-> B.SYS.002\n").unwrap_err();
        assert_eq!(
            err,
            FormatEError::UnknownEdgeArrow {
                line: 2,
                arrow: "zzz".to_string()
            }
        );
    }

    #[test]
    fn unterminated_attribute_is_rejected() {
        let err = parse_diff("## Nodes\n+ A.SYS.001|desc [phase:1\n").unwrap_err();
        assert_eq!(err, FormatEError::UnterminatedAttribute { line: 2 });
    }

    #[test]
    fn comment_and_blank_lines_are_ignored() {
        let diff = parse_diff("# a note\n\n## Nodes\n# another\n+ A.SYS.001|desc\n").unwrap();
        assert_eq!(diff.node_ops.len(), 1);
    }

    #[test]
    fn operation_before_section_header_is_malformed() {
        let err = parse_diff("+ A.SYS.001|desc\n").unwrap_err();
        assert_eq!(
            err,
            FormatEError::MalformedLine {
                line: 1,
                text: "+ A.SYS.001|desc".to_string()
            }
        );
    }

    #[test]
    fn tolerates_operations_wrapper_tags() {
        let text = format!("<operations>\n{}</operations>", sample());
        let diff = parse_diff(&text).unwrap();
        assert_eq!(diff.node_ops.len(), 3);
    }
}
