use super::{OutputParser, ParserErrors, Record};
use log::debug;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

const START_STATE: &str = "Start";
const END_STATE: &str = "End";
const EOF_STATE: &str = "EOF";
const TEMPLATE_EXTENSION: &str = "textfsm";

/// Parses command output with TextFSM templates read from a directory.
///
/// Supported subset: `Value` definitions with the `Required`, `Filldown`,
/// `List` and `Key` options, named states, `${VALUE}` / `$VALUE` / `$$`
/// substitution, the `Next`/`Continue`/`Error` line actions, the
/// `Record`/`NoRecord`/`Clear`/`Clearall` record actions and state
/// transitions. Reaching the end of input records the pending row unless the
/// template declares an `EOF` state or moved to `End`.
pub struct TextFsmParser {
    templates_path: PathBuf,
    cache: Mutex<HashMap<String, Arc<Template>>>,
}

impl TextFsmParser {
    pub fn new(templates_path: impl Into<PathBuf>) -> TextFsmParser {
        TextFsmParser {
            templates_path: templates_path.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn template(&self, name: &str) -> Result<Arc<Template>, ParserErrors> {
        let cached = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        if let Some(template) = cached {
            return Ok(template);
        }

        let path = self.locate(name).await?;
        let source = tokio::fs::read_to_string(&path).await.map_err(|source| {
            ParserErrors::TemplateReadError {
                template: name.to_owned(),
                source,
            }
        })?;
        let template = Arc::new(Template::compile(name, &source)?);
        debug!("compiled template {} from {}", name, path.display());

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), template.clone());

        Ok(template)
    }

    async fn locate(&self, name: &str) -> Result<PathBuf, ParserErrors> {
        let exact = self.templates_path.join(name);
        let with_extension = self
            .templates_path
            .join(format!("{}.{}", name, TEMPLATE_EXTENSION));

        for candidate in [exact, with_extension] {
            if let Ok(metadata) = tokio::fs::metadata(&candidate).await {
                if metadata.is_file() {
                    return Ok(candidate);
                }
            }
        }

        Err(ParserErrors::TemplateNotFound(name.to_owned()))
    }
}

#[async_trait::async_trait]
impl OutputParser for TextFsmParser {
    async fn parse(&self, template: &str, output: &str) -> Result<Vec<Record>, ParserErrors> {
        self.template(template).await?.parse(output)
    }
}

#[derive(Debug)]
struct ValueDef {
    name: String,
    group: String,
    required: bool,
    filldown: bool,
    list: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineOp {
    Next,
    Continue,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOp {
    NoRecord,
    Record,
    Clear,
    Clearall,
}

#[derive(Debug)]
struct Rule {
    regex: Regex,
    line_op: LineOp,
    record_op: RecordOp,
    new_state: Option<String>,
    message: Option<String>,
}

#[derive(Debug)]
struct Template {
    name: String,
    values: Vec<ValueDef>,
    states: HashMap<String, Vec<Rule>>,
}

impl Template {
    fn compile(name: &str, source: &str) -> Result<Template, ParserErrors> {
        let invalid = |line: usize, reason: String| ParserErrors::InvalidTemplate {
            template: name.to_owned(),
            line,
            reason,
        };

        let mut lines = source.lines().enumerate().map(|(index, line)| (index + 1, line));
        let mut values: Vec<ValueDef> = Vec::new();

        for (number, line) in lines.by_ref() {
            let trimmed = line.trim();
            if trimmed.starts_with('#') {
                continue;
            }
            if trimmed.is_empty() {
                if values.is_empty() {
                    continue;
                }
                break;
            }

            let value = parse_value(line).map_err(|reason| invalid(number, reason))?;
            if values.iter().any(|existing| existing.name == value.name) {
                return Err(invalid(number, format!("duplicate value {}", value.name)));
            }
            values.push(value);
        }

        if values.is_empty() {
            return Err(invalid(0, "template defines no values".to_owned()));
        }

        let mut states: HashMap<String, Vec<Rule>> = HashMap::new();
        let mut current: Option<(String, Vec<Rule>)> = None;

        for (number, line) in lines {
            let trimmed = line.trim();
            if trimmed.starts_with('#') {
                continue;
            }
            if trimmed.is_empty() {
                if let Some((state, rules)) = current.take() {
                    states.insert(state, rules);
                }
                continue;
            }

            match current.as_mut() {
                None => {
                    if line.starts_with(char::is_whitespace) || !is_identifier(trimmed) {
                        return Err(invalid(number, format!("invalid state name `{}`", trimmed)));
                    }
                    if states.contains_key(trimmed) {
                        return Err(invalid(number, format!("duplicate state {}", trimmed)));
                    }
                    current = Some((trimmed.to_owned(), Vec::new()));
                }
                Some((_, rules)) => {
                    let rule = parse_rule(line, &values).map_err(|reason| invalid(number, reason))?;
                    rules.push(rule);
                }
            }
        }
        if let Some((state, rules)) = current.take() {
            states.insert(state, rules);
        }

        if !states.contains_key(START_STATE) {
            return Err(invalid(0, "missing Start state".to_owned()));
        }
        for rule in states.values().flatten() {
            if let Some(new_state) = &rule.new_state {
                if new_state != END_STATE && new_state != EOF_STATE && !states.contains_key(new_state) {
                    return Err(invalid(0, format!("transition to unknown state {}", new_state)));
                }
            }
        }

        Ok(Template {
            name: name.to_owned(),
            values,
            states,
        })
    }

    fn parse(&self, text: &str) -> Result<Vec<Record>, ParserErrors> {
        let mut slots: Vec<Vec<String>> = vec![Vec::new(); self.values.len()];
        let mut records = Vec::new();
        let mut state = START_STATE;

        'lines: for (index, line) in text.lines().enumerate() {
            let rules = match self.states.get(state) {
                Some(rules) => rules,
                None => break,
            };

            for rule in rules {
                let Some(captures) = rule.regex.captures(line) else {
                    continue;
                };

                for (value, slot) in self.values.iter().zip(slots.iter_mut()) {
                    if let Some(matched) = captures.name(&value.name) {
                        if !value.list {
                            slot.clear();
                        }
                        slot.push(matched.as_str().to_owned());
                    }
                }

                match rule.record_op {
                    RecordOp::NoRecord => {}
                    RecordOp::Record => self.append_record(&mut slots, &mut records),
                    RecordOp::Clear => self.clear_record(&mut slots, false),
                    RecordOp::Clearall => self.clear_record(&mut slots, true),
                }

                match rule.line_op {
                    LineOp::Error => {
                        return Err(ParserErrors::ErrorAction {
                            template: self.name.clone(),
                            line: index + 1,
                            message: rule
                                .message
                                .clone()
                                .unwrap_or_else(|| "state error raised".to_owned()),
                        })
                    }
                    LineOp::Continue => continue,
                    LineOp::Next => {
                        if let Some(new_state) = &rule.new_state {
                            state = new_state.as_str();
                            if state == END_STATE || state == EOF_STATE {
                                break 'lines;
                            }
                        }
                        continue 'lines;
                    }
                }
            }
        }

        if state != END_STATE && !self.states.contains_key(EOF_STATE) {
            self.append_record(&mut slots, &mut records);
        }

        Ok(records)
    }

    fn append_record(&self, slots: &mut [Vec<String>], records: &mut Vec<Record>) {
        let missing_required = self
            .values
            .iter()
            .zip(slots.iter())
            .any(|(value, slot)| value.required && slot.is_empty());
        if missing_required {
            self.clear_record(slots, false);
            return;
        }
        if slots.iter().all(Vec::is_empty) {
            return;
        }

        let record: Record = self
            .values
            .iter()
            .zip(slots.iter())
            .map(|(value, slot)| {
                let field = if value.list {
                    Value::Array(slot.iter().cloned().map(Value::String).collect())
                } else {
                    Value::String(slot.first().cloned().unwrap_or_default())
                };
                (value.name.to_lowercase(), field)
            })
            .collect();
        records.push(record);

        self.clear_record(slots, false);
    }

    fn clear_record(&self, slots: &mut [Vec<String>], all: bool) {
        for (value, slot) in self.values.iter().zip(slots.iter_mut()) {
            if all || !value.filldown {
                slot.clear();
            }
        }
    }
}

fn is_identifier(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn split_token(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(position) => (&text[..position], text[position..].trim_start()),
        None => (text, ""),
    }
}

fn parse_value(line: &str) -> Result<ValueDef, String> {
    let rest = line
        .strip_prefix("Value ")
        .ok_or_else(|| format!("expected a Value definition, found `{}`", line.trim()))?;

    let (first, remainder) = split_token(rest);
    let (options, name, pattern) = if remainder.starts_with('(') {
        ("", first, remainder)
    } else {
        let (name, pattern) = split_token(remainder);
        (first, name, pattern)
    };
    let pattern = pattern.trim_end();

    if !is_identifier(name) {
        return Err(format!("invalid value name `{}`", name));
    }
    if pattern.len() < 2 || !pattern.starts_with('(') || !pattern.ends_with(')') {
        return Err(format!("value {} regex must be enclosed in parentheses", name));
    }

    let mut value = ValueDef {
        name: name.to_owned(),
        group: format!("(?P<{}>{})", name, &pattern[1..pattern.len() - 1]),
        required: false,
        filldown: false,
        list: false,
    };
    for option in options.split(',').filter(|option| !option.is_empty()) {
        match option {
            "Required" => value.required = true,
            "Filldown" => value.filldown = true,
            "List" => value.list = true,
            "Key" => {}
            other => return Err(format!("unsupported value option `{}`", other)),
        }
    }

    Regex::new(&value.group).map_err(|err| format!("invalid regex for value {}: {}", name, err))?;

    Ok(value)
}

fn parse_rule(line: &str, values: &[ValueDef]) -> Result<Rule, String> {
    let trimmed = line.trim();
    if !trimmed.starts_with('^') {
        return Err(format!("rule must start with `^`, found `{}`", trimmed));
    }

    let (pattern, action) = split_action(trimmed);
    let regex = Regex::new(&substitute_values(pattern, values)?)
        .map_err(|err| format!("invalid rule regex: {}", err))?;

    let mut rule = Rule {
        regex,
        line_op: LineOp::Next,
        record_op: RecordOp::NoRecord,
        new_state: None,
        message: None,
    };
    let Some(action) = action else {
        return Ok(rule);
    };

    let (operations, argument) = split_token(action);
    let (line_op, record_op) = match operations.split_once('.') {
        Some((line_op, record_op)) => (Some(line_op), Some(record_op)),
        None if parse_line_op(operations).is_some() => (Some(operations), None),
        None if parse_record_op(operations).is_some() => (None, Some(operations)),
        None => {
            if !argument.is_empty() || !is_identifier(operations) {
                return Err(format!("invalid action `{}`", action));
            }
            rule.new_state = Some(operations.to_owned());
            return Ok(rule);
        }
    };

    if let Some(line_op) = line_op {
        rule.line_op =
            parse_line_op(line_op).ok_or_else(|| format!("unknown line action `{}`", line_op))?;
    }
    if let Some(record_op) = record_op {
        rule.record_op = parse_record_op(record_op)
            .ok_or_else(|| format!("unknown record action `{}`", record_op))?;
    }

    if !argument.is_empty() {
        match rule.line_op {
            LineOp::Error => rule.message = Some(argument.trim_matches('"').to_owned()),
            LineOp::Continue => {
                return Err("Continue cannot be combined with a state transition".to_owned())
            }
            LineOp::Next => {
                if !is_identifier(argument) {
                    return Err(format!("invalid state name `{}`", argument));
                }
                rule.new_state = Some(argument.to_owned());
            }
        }
    }

    Ok(rule)
}

fn parse_line_op(token: &str) -> Option<LineOp> {
    match token {
        "Next" => Some(LineOp::Next),
        "Continue" => Some(LineOp::Continue),
        "Error" => Some(LineOp::Error),
        _ => None,
    }
}

fn parse_record_op(token: &str) -> Option<RecordOp> {
    match token {
        "NoRecord" => Some(RecordOp::NoRecord),
        "Record" => Some(RecordOp::Record),
        "Clear" => Some(RecordOp::Clear),
        "Clearall" => Some(RecordOp::Clearall),
        _ => None,
    }
}

/// Splits `^regex -> Action` on the last `->` preceded by whitespace.
fn split_action(rule: &str) -> (&str, Option<&str>) {
    for (position, _) in rule.rmatch_indices("->") {
        if rule[..position].ends_with(char::is_whitespace) {
            return (rule[..position].trim_end(), Some(rule[position + 2..].trim()));
        }
    }
    (rule, None)
}

fn substitute_values(pattern: &str, values: &[ValueDef]) -> Result<String, String> {
    let mut substituted = String::with_capacity(pattern.len());
    let mut chars = pattern.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        if c != '$' {
            substituted.push(c);
            continue;
        }

        let name = match chars.peek() {
            Some((_, '$')) => {
                chars.next();
                substituted.push('$');
                continue;
            }
            Some((_, '{')) => {
                let rest = &pattern[position + 2..];
                let end = rest
                    .find('}')
                    .ok_or_else(|| format!("unterminated placeholder in `{}`", pattern))?;
                for _ in 0..=end + 1 {
                    chars.next();
                }
                &rest[..end]
            }
            _ => {
                let rest = &pattern[position + 1..];
                let end = rest
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(rest.len());
                if end == 0 {
                    return Err(format!("invalid `$` in `{}`, use `$$` for a literal", pattern));
                }
                for _ in 0..end {
                    chars.next();
                }
                &rest[..end]
            }
        };

        let value = values
            .iter()
            .find(|value| value.name == name)
            .ok_or_else(|| format!("unknown value `{}`", name))?;
        substituted.push_str(&value.group);
    }

    Ok(substituted)
}
