//! Script evaluation for custom segmentation rules.
//!
//! The engine only talks to scripts through [`ScriptEvaluator`]: named JSON
//! bindings in, named JSON bindings out. [`ExpressionEvaluator`] is the
//! built-in implementation, a small routing language limited to map lookups
//! and string comparison:
//!
//! ```text
//! # VIP customers asking in Russian go to the priority desk
//! when visit.parameterMap.vip == "true" and visit.parameterMap.lang == "ru" then queue "q-vip"
//! when visit.parameterMap.company exists then queue "q-business"
//! otherwise queue none
//! ```
//!
//! Clauses are tried top to bottom; the first `when` whose condition holds
//! sets the `queue` output, `otherwise` applies when none did. `and` binds
//! tighter than `or`. A path's first segment names an input binding, the
//! rest walk into JSON objects.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context};
use serde_json::Value;

/// Evaluates a rule script against named inputs
pub trait ScriptEvaluator: Send + Sync {
    fn evaluate(&self, script: &str, inputs: &HashMap<String, Value>) -> anyhow::Result<HashMap<String, Value>>;
}

/// Built-in evaluator for the `when ... then queue ...` language
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpressionEvaluator;

impl ScriptEvaluator for ExpressionEvaluator {
    fn evaluate(&self, script: &str, inputs: &HashMap<String, Value>) -> anyhow::Result<HashMap<String, Value>> {
        let clauses = parse(script)?;

        let mut queue = Value::Null;
        for clause in &clauses {
            let fires = match &clause.condition {
                Some(condition) => condition.holds(inputs),
                None => true,
            };
            if fires {
                queue = clause.queue.clone().map(Value::String).unwrap_or(Value::Null);
                break;
            }
        }

        let mut outputs = HashMap::new();
        outputs.insert("queue".to_string(), queue);
        Ok(outputs)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
enum Test {
    Equals(String),
    NotEquals(String),
    Exists,
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Check { path: Vec<String>, test: Test },
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

/// `condition: None` is an `otherwise` clause
#[derive(Debug, Clone, PartialEq)]
struct Clause {
    condition: Option<Condition>,
    queue: Option<String>,
}

fn tokenize(line: &str) -> anyhow::Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(escaped) => text.push(escaped),
                            None => bail!("dangling escape in {:?}", line),
                        },
                        Some('"') => break,
                        Some(other) => text.push(other),
                        None => bail!("unterminated string in {:?}", line),
                    }
                }
                tokens.push(Token::Str(text));
            }
            '=' | '!' => {
                chars.next();
                if chars.next() != Some('=') {
                    bail!("expected '{}=' in {:?}", c, line);
                }
                tokens.push(if c == '=' { Token::Eq } else { Token::Ne });
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '"' || c == '=' || c == '!' {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek_word(&self) -> Option<&str> {
        match self.tokens.get(self.pos) {
            Some(Token::Word(w)) => Some(w.as_str()),
            _ => None,
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn keyword(&mut self, expected: &str) -> anyhow::Result<()> {
        match self.next() {
            Some(Token::Word(w)) if w == expected => Ok(()),
            other => Err(anyhow!("expected '{}', found {:?}", expected, other)),
        }
    }

    fn or_condition(&mut self) -> anyhow::Result<Condition> {
        let mut terms = vec![self.and_condition()?];
        while self.peek_word() == Some("or") {
            self.pos += 1;
            terms.push(self.and_condition()?);
        }
        Ok(if terms.len() == 1 { terms.remove(0) } else { Condition::Or(terms) })
    }

    fn and_condition(&mut self) -> anyhow::Result<Condition> {
        let mut terms = vec![self.check()?];
        while self.peek_word() == Some("and") {
            self.pos += 1;
            terms.push(self.check()?);
        }
        Ok(if terms.len() == 1 { terms.remove(0) } else { Condition::And(terms) })
    }

    fn check(&mut self) -> anyhow::Result<Condition> {
        let path = match self.next() {
            Some(Token::Word(w)) if !is_keyword(&w) => w.split('.').map(str::to_string).collect(),
            other => bail!("expected a path, found {:?}", other),
        };
        let test = match self.next() {
            Some(Token::Eq) => Test::Equals(self.literal()?),
            Some(Token::Ne) => Test::NotEquals(self.literal()?),
            Some(Token::Word(w)) if w == "exists" => Test::Exists,
            other => bail!("expected '==', '!=' or 'exists', found {:?}", other),
        };
        Ok(Condition::Check { path, test })
    }

    fn literal(&mut self) -> anyhow::Result<String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s),
            other => Err(anyhow!("expected a quoted string, found {:?}", other)),
        }
    }

    fn target(&mut self) -> anyhow::Result<Option<String>> {
        self.keyword("queue")?;
        let target = match self.next() {
            Some(Token::Str(s)) => Some(s),
            Some(Token::Word(w)) if w == "none" => None,
            other => bail!("expected a queue id or 'none', found {:?}", other),
        };
        if self.pos < self.tokens.len() {
            bail!("unexpected trailing {:?}", &self.tokens[self.pos..]);
        }
        Ok(target)
    }
}

fn is_keyword(word: &str) -> bool {
    matches!(word, "when" | "then" | "otherwise" | "queue" | "none" | "and" | "or" | "exists")
}

fn parse(script: &str) -> anyhow::Result<Vec<Clause>> {
    let mut clauses = Vec::new();

    for (number, raw) in script.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let clause = (|| -> anyhow::Result<Clause> {
            let mut parser = Parser {
                tokens: tokenize(line)?,
                pos: 0,
            };
            match parser.peek_word() {
                Some("when") => {
                    parser.pos += 1;
                    let condition = parser.or_condition()?;
                    parser.keyword("then")?;
                    Ok(Clause {
                        condition: Some(condition),
                        queue: parser.target()?,
                    })
                }
                Some("otherwise") => {
                    parser.pos += 1;
                    Ok(Clause {
                        condition: None,
                        queue: parser.target()?,
                    })
                }
                _ => bail!("a clause starts with 'when' or 'otherwise'"),
            }
        })()
        .with_context(|| format!("line {}: {}", number + 1, line))?;

        clauses.push(clause);
    }

    Ok(clauses)
}

impl Condition {
    fn holds(&self, inputs: &HashMap<String, Value>) -> bool {
        match self {
            Condition::And(terms) => terms.iter().all(|t| t.holds(inputs)),
            Condition::Or(terms) => terms.iter().any(|t| t.holds(inputs)),
            Condition::Check { path, test } => {
                let found = lookup(inputs, path);
                match test {
                    Test::Exists => found.is_some(),
                    Test::Equals(expected) => found.is_some_and(|v| v == *expected),
                    Test::NotEquals(expected) => found.is_none_or(|v| v != *expected),
                }
            }
        }
    }
}

/// Resolve a dotted path to its text form; `null` counts as absent
fn lookup(inputs: &HashMap<String, Value>, path: &[String]) -> Option<String> {
    let (root, rest) = path.split_first()?;
    let mut value = inputs.get(root)?;
    for segment in rest {
        value = value.get(segment.as_str())?;
    }
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
