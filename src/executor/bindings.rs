//! Step argument bindings
//!
//! Argument strings may carry placeholders:
//! - `{{input}}` is the request text that triggered the execution
//! - `{{steps.N}}` is the output of step N (1-based)
//! - `{{steps.N.a.0.b}}` walks into that output; numeric segments index arrays
//!
//! A string that is exactly one placeholder takes the referenced JSON value
//! as-is. Otherwise each placeholder is spliced in as text. Other `{{...}}`
//! text is left alone.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Input,
    Step { index: usize, path: Vec<String> },
}

impl Binding {
    fn parse(inner: &str) -> Option<std::result::Result<Self, String>> {
        let inner = inner.trim();
        if inner == "input" {
            return Some(Ok(Binding::Input));
        }
        if inner != "steps" && !inner.starts_with("steps.") {
            return None;
        }

        let mut segments = inner.split('.').skip(1);
        let index = match segments.next().map(str::parse::<usize>) {
            Some(Ok(n)) if n >= 1 => n,
            _ => return Some(Err(format!("malformed step reference '{{{{{}}}}}'", inner))),
        };
        let path: Vec<String> = segments.map(String::from).collect();
        if path.iter().any(|s| s.is_empty()) {
            return Some(Err(format!("malformed step reference '{{{{{}}}}}'", inner)));
        }
        Some(Ok(Binding::Step { index, path }))
    }
}

/// A placeholder found in a string, with its byte span
struct Placeholder {
    start: usize,
    end: usize,
    binding: Binding,
}

fn scan(text: &str) -> std::result::Result<Vec<Placeholder>, String> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(open) = text[cursor..].find("{{") {
        let start = cursor + open;
        let Some(close) = text[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + close + 2;
        if let Some(binding) = Binding::parse(&text[start + 2..end - 2]) {
            found.push(Placeholder {
                start,
                end,
                binding: binding?,
            });
        }
        cursor = end;
    }
    Ok(found)
}

fn visit_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| visit_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| visit_strings(v, out)),
        _ => {}
    }
}

/// Every binding referenced anywhere inside `arguments`
pub fn references(arguments: &Value) -> std::result::Result<Vec<Binding>, String> {
    let mut strings = Vec::new();
    visit_strings(arguments, &mut strings);

    let mut bindings = Vec::new();
    for s in strings {
        bindings.extend(scan(s)?.into_iter().map(|p| p.binding));
    }
    Ok(bindings)
}

/// Check that step `step_number` (1-based) only references earlier steps
pub fn validate(arguments: &Value, step_number: usize) -> std::result::Result<(), String> {
    for binding in references(arguments)? {
        if let Binding::Step { index, .. } = binding
            && index >= step_number
        {
            return Err(format!(
                "step {} references step {}; only earlier steps may be referenced",
                step_number, index
            ));
        }
    }
    Ok(())
}

/// Substitute bindings in `arguments` using the request text and prior outputs
pub fn resolve(arguments: &Value, input: &str, outputs: &[Value]) -> std::result::Result<Value, String> {
    match arguments {
        Value::String(s) => resolve_string(s, input, outputs),
        Value::Array(items) => items
            .iter()
            .map(|v| resolve(v, input, outputs))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                resolved.insert(key.clone(), resolve(value, input, outputs)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_string(text: &str, input: &str, outputs: &[Value]) -> std::result::Result<Value, String> {
    let placeholders = scan(text)?;
    if placeholders.is_empty() {
        return Ok(Value::String(text.to_string()));
    }

    // Whole-string placeholder keeps the JSON type
    if placeholders.len() == 1 && placeholders[0].start == 0 && placeholders[0].end == text.len() {
        return lookup(&placeholders[0].binding, input, outputs);
    }

    let mut rendered = String::with_capacity(text.len());
    let mut cursor = 0;
    for p in &placeholders {
        rendered.push_str(&text[cursor..p.start]);
        match lookup(&p.binding, input, outputs)? {
            Value::String(s) => rendered.push_str(&s),
            other => rendered.push_str(&other.to_string()),
        }
        cursor = p.end;
    }
    rendered.push_str(&text[cursor..]);
    Ok(Value::String(rendered))
}

fn lookup(binding: &Binding, input: &str, outputs: &[Value]) -> std::result::Result<Value, String> {
    match binding {
        Binding::Input => Ok(Value::String(input.to_string())),
        Binding::Step { index, path } => {
            let mut current = outputs
                .get(index - 1)
                .ok_or_else(|| format!("output of step {} is not available", index))?;
            for segment in path {
                let next = match current {
                    Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                    Value::Object(map) => map.get(segment),
                    _ => None,
                };
                current = next.ok_or_else(|| format!("steps.{}.{} not found in step output", index, path.join(".")))?;
            }
            Ok(current.clone())
        }
    }
}
