use crate::errors::RestackError;

/// Substrings never accepted in any config string: directory escapes out of
/// the artifact roots and script-bearing URLs.
const DANGEROUS_PATTERNS: &[&str] = &["../", "..\\", "<script", "javascript:", "vbscript:", "data:", "file:"];

pub fn validate_security_patterns(value: &serde_yaml::Value) -> Result<(), RestackError> {
    let mut path = Vec::new();
    walk(value, &mut path)
}

fn walk(value: &serde_yaml::Value, path: &mut Vec<String>) -> Result<(), RestackError> {
    match value {
        serde_yaml::Value::String(s) => {
            let lower = s.to_lowercase();
            match DANGEROUS_PATTERNS.iter().find(|p| lower.contains(**p)) {
                Some(pattern) => Err(RestackError::Config(format!(
                    "Dangerous pattern '{}' at config key {}",
                    pattern,
                    if path.is_empty() { "<root>".to_string() } else { path.join(".") }
                ))),
                None => Ok(()),
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map {
                path.push(k.as_str().unwrap_or("?").to_string());
                walk(v, path)?;
                path.pop();
            }
            Ok(())
        }
        serde_yaml::Value::Sequence(seq) => {
            for (i, v) in seq.iter().enumerate() {
                path.push(i.to_string());
                walk(v, path)?;
                path.pop();
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
