//! Prompt formatting: turn a dataset row into training text.

use serde_json::Value;

use super::error::{Result, TokenizerError};
use crate::config::TokenizerSection;
use crate::data::Row;

/// Template used when only instruction/response fields are configured
pub const INSTRUCTION_TEMPLATE: &str = "### Instruction:\n{instruction}\n\n### Response:\n{response}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// Renders rows through a `{field}` template or copies one text field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptFormatter {
    segments: Vec<Segment>,
}

impl PromptFormatter {
    /// Parse a template; `{{` and `}}` are literal braces
    pub fn from_template(template: &str) -> Result<Self> {
        let err = |message: &str| TokenizerError::Template {
            template: template.to_string(),
            message: message.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => return Err(err("unclosed placeholder")),
                            Some(ch) => name.push(ch),
                        }
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(err("empty placeholder"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(name.to_string()));
                }
                '}' => return Err(err("unmatched '}'")),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        if !segments.iter().any(|s| matches!(s, Segment::Field(_))) {
            return Err(err("template references no field"));
        }
        Ok(Self { segments })
    }

    /// Copy `field` verbatim
    pub fn text_field(field: &str) -> Self {
        Self { segments: vec![Segment::Field(field.to_string())] }
    }

    /// Pick the formatter a tokenizer section describes
    ///
    /// An explicit `template` wins; otherwise `instruction_field` plus
    /// `response_field` select [`INSTRUCTION_TEMPLATE`]; otherwise `text_field`.
    pub fn from_section(section: &TokenizerSection) -> Result<Self> {
        if let Some(template) = &section.template {
            return Self::from_template(template);
        }
        match (&section.instruction_field, &section.response_field) {
            (Some(instruction), Some(response)) => Self::from_template(
                &INSTRUCTION_TEMPLATE
                    .replace("{instruction}", &format!("{{{instruction}}}"))
                    .replace("{response}", &format!("{{{response}}}")),
            ),
            _ => Ok(Self::text_field(&section.text_field)),
        }
    }

    /// Fields the template reads
    pub fn fields(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Field(f) => Some(f.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Render one row; `index` is only used in error messages
    pub fn format(&self, row: &Row, index: usize) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => match row.get(field) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(Value::Null) | None => {
                        return Err(TokenizerError::MissingField { field: field.clone(), row: index })
                    }
                    Some(other) => out.push_str(&other.to_string()),
                },
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_template_rendering() {
        let f = PromptFormatter::from_template("Q: {question}\nA: {answer}").unwrap();
        let text = f.format(&row(json!({"question": "2+2?", "answer": 4})), 0).unwrap();
        assert_eq!(text, "Q: 2+2?\nA: 4");
        assert_eq!(f.fields(), vec!["question", "answer"]);
    }

    #[test]
    fn test_escaped_braces() {
        let f = PromptFormatter::from_template("{{json}} {text}").unwrap();
        assert_eq!(f.format(&row(json!({"text": "x"})), 0).unwrap(), "{json} x");
    }

    #[test]
    fn test_bad_templates() {
        for t in ["{open", "close}", "{}", "no fields"] {
            assert!(PromptFormatter::from_template(t).is_err(), "{t}");
        }
    }

    #[test]
    fn test_missing_field() {
        let f = PromptFormatter::text_field("text");
        let err = f.format(&row(json!({"other": "x"})), 7).unwrap_err();
        assert!(matches!(err, TokenizerError::MissingField { row: 7, .. }));
    }

    #[test]
    fn test_section_selection() {
        let mut section = TokenizerSection::default();
        assert_eq!(PromptFormatter::from_section(&section).unwrap().fields(), vec!["text"]);

        section.instruction_field = Some("prompt".into());
        section.response_field = Some("completion".into());
        let f = PromptFormatter::from_section(&section).unwrap();
        let text = f.format(&row(json!({"prompt": "p", "completion": "c"})), 0).unwrap();
        assert_eq!(text, "### Instruction:\np\n\n### Response:\nc");

        section.template = Some("{body}".into());
        assert_eq!(PromptFormatter::from_section(&section).unwrap().fields(), vec!["body"]);
    }
}
