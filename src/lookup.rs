use crate::record::LogEvent;

/// Additional-field value compiled into literal text and per-event lookups.
///
/// Supported lookups: `${ctx:NAME}`, `${level}`, `${logger}`, `${thread}`
/// (resolved per event) and `${env:NAME}` (resolved when compiled). `$${`
/// yields a literal `${`. Unknown or unterminated lookups are kept as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Context(String),
    Level,
    Logger,
    Thread,
}

impl Template {
    pub fn compile<F>(source: &str, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(pos) = rest.find("${") {
            if rest[..pos].ends_with('$') {
                literal.push_str(&rest[..pos - 1]);
                literal.push_str("${");
                rest = &rest[pos + 2..];
                continue;
            }
            literal.push_str(&rest[..pos]);
            let after = &rest[pos + 2..];
            let Some(end) = after.find('}') else {
                literal.push_str(&rest[pos..]);
                rest = "";
                break;
            };
            let name = &after[..end];
            let part = match name {
                "level" => Some(Part::Level),
                "logger" => Some(Part::Logger),
                "thread" => Some(Part::Thread),
                _ => {
                    if let Some(key) = name.strip_prefix("ctx:") {
                        Some(Part::Context(key.to_string()))
                    } else if let Some(var) = name.strip_prefix("env:") {
                        literal.push_str(&env(var).unwrap_or_default());
                        None
                    } else {
                        literal.push_str(&rest[pos..pos + 2 + end + 1]);
                        None
                    }
                }
            };
            if let Some(part) = part {
                if !literal.is_empty() {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                parts.push(part);
            }
            rest = &after[end + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }
        Template { parts }
    }

    pub fn resolve(&self, event: &LogEvent) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Context(key) => {
                    if let Some(value) = event.context_value(key) {
                        out.push_str(&value.render());
                    }
                }
                Part::Level => out.push_str(event.level.as_str()),
                Part::Logger => out.push_str(event.logger_name.as_deref().unwrap_or_default()),
                Part::Thread => out.push_str(event.thread_name.as_deref().unwrap_or_default()),
            }
        }
        out
    }
}
