use crate::value::FieldValue;

/// The message carried by a log event.
#[derive(Debug, Clone)]
pub enum Message {
    /// Already-rendered text.
    Text(String),
    /// Template with `{}` placeholders filled from `args` left to right.
    Parameterized { template: String, args: Vec<FieldValue> },
    /// Structured payload, emitted either as a JSON object or as its JSON text.
    Object(FieldValue),
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text(text.into())
    }

    pub fn parameterized(template: impl Into<String>, args: Vec<FieldValue>) -> Self {
        Message::Parameterized {
            template: template.into(),
            args,
        }
    }

    /// Render to a single string. Object messages render as compact JSON.
    pub fn render(&self) -> String {
        match self {
            Message::Text(text) => text.clone(),
            Message::Parameterized { template, args } => format_template(template, args),
            Message::Object(value) => value.render(),
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Message::Text(String::new())
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

/// Substitute each `{}` with the next argument. Surplus placeholders stay
/// literal, surplus arguments are ignored.
fn format_template(template: &str, args: &[FieldValue]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;

    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        match args.next() {
            Some(arg) => out.push_str(&arg.render()),
            None => out.push_str("{}"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}
