//! Adapter configuration and return-shape descriptors.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CallError;
use crate::flux::Scheduler;
use crate::observability::FaultReporter;

/// How the call is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    /// `Call::execute` on the thread that requests demand.
    #[default]
    Sync,
    /// `Call::enqueue`; signals arrive on the call's completion context.
    Async,
}

/// One value or a stream of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    Single,
    Stream,
}

/// Whether subscribers see the whole response or only its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wrapping {
    FullResponse,
    BodyOnly,
}

/// Shape of the value handed back by [`CallAdapter::adapt`](super::CallAdapter::adapt).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnShape {
    pub multiplicity: Multiplicity,
    pub wrapping: Wrapping,
}

impl ReturnShape {
    pub const fn new(multiplicity: Multiplicity, wrapping: Wrapping) -> Self {
        Self {
            multiplicity,
            wrapping,
        }
    }

    /// `Flux<Response<T>>`
    pub const fn response_stream() -> Self {
        Self::new(Multiplicity::Stream, Wrapping::FullResponse)
    }

    /// `Flux<T>`
    pub const fn body_stream() -> Self {
        Self::new(Multiplicity::Stream, Wrapping::BodyOnly)
    }

    /// `Mono<Response<T>>`
    pub const fn response_single() -> Self {
        Self::new(Multiplicity::Single, Wrapping::FullResponse)
    }

    /// `Mono<T>`
    pub const fn body_single() -> Self {
        Self::new(Multiplicity::Single, Wrapping::BodyOnly)
    }

    pub const fn is_single(&self) -> bool {
        matches!(self.multiplicity, Multiplicity::Single)
    }

    pub const fn is_body(&self) -> bool {
        matches!(self.wrapping, Wrapping::BodyOnly)
    }
}

/// Options shared by every adapter a factory hands out.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AdapterOptions {
    pub execution: Execution,
    /// Subscribe on this scheduler. Irrelevant to where [`Execution::Async`]
    /// calls complete.
    #[serde(skip)]
    pub scheduler: Option<Arc<dyn Scheduler>>,
    /// Overrides the process-wide reporter.
    #[serde(skip)]
    pub fault_reporter: Option<Arc<dyn FaultReporter>>,
}

impl AdapterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_fault_reporter(mut self, reporter: Arc<dyn FaultReporter>) -> Self {
        self.fault_reporter = Some(reporter);
        self
    }
}

impl fmt::Debug for AdapterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterOptions")
            .field("execution", &self.execution)
            .field("scheduler", &self.scheduler.as_ref().map(|s| s.name()))
            .field("fault_reporter", &self.fault_reporter.is_some())
            .finish()
    }
}

/// A declared return type such as `Flux<Response<User>>`: a name and its
/// type parameters.
///
/// Parsing accepts `? extends Foo` and resolves it to its upper bound `Foo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeclaredType {
    name: String,
    params: Vec<DeclaredType>,
}

impl DeclaredType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn of(name: impl Into<String>, params: Vec<DeclaredType>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[DeclaredType] {
        &self.params
    }

    pub fn is_parameterized(&self) -> bool {
        !self.params.is_empty()
    }

    /// First type parameter, if any.
    pub fn first_param(&self) -> Option<&DeclaredType> {
        self.params.first()
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some((first, rest)) = self.params.split_first() {
            write!(f, "<{first}")?;
            for param in rest {
                write!(f, ", {param}")?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

impl FromStr for DeclaredType {
    type Err = CallError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let mut parser = TypeParser { source, pos: 0 };
        let parsed = parser.parse_type()?;
        parser.skip_whitespace();
        if parser.pos != source.len() {
            return Err(parser.error("trailing input"));
        }
        Ok(parsed)
    }
}

struct TypeParser<'a> {
    source: &'a str,
    pos: usize,
}

impl TypeParser<'_> {
    fn parse_type(&mut self) -> Result<DeclaredType, CallError> {
        self.skip_whitespace();
        if self.eat('?') {
            self.skip_whitespace();
            let keyword = self.identifier().to_string();
            if keyword != "extends" {
                return Err(self.error("expected `extends` after `?`"));
            }
            return self.parse_type();
        }

        let name = self.identifier().to_string();
        if name.is_empty() {
            return Err(self.error("expected a type name"));
        }

        self.skip_whitespace();
        let mut params = Vec::new();
        if self.eat('<') {
            loop {
                params.push(self.parse_type()?);
                self.skip_whitespace();
                if self.eat(',') {
                    continue;
                }
                if self.eat('>') {
                    break;
                }
                return Err(self.error("expected `,` or `>`"));
            }
        }
        Ok(DeclaredType { name, params })
    }

    fn identifier(&mut self) -> &str {
        let start = self.pos;
        let rest = &self.source[start..];
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.' || c == ':'))
            .unwrap_or(rest.len());
        self.pos += len;
        &self.source[start..self.pos]
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.source[self.pos..].starts_with(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.source[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn error(&self, message: &str) -> CallError {
        CallError::ConfigurationError(format!(
            "invalid type `{}` at {}: {message}",
            self.source, self.pos
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flux::ImmediateScheduler;

    #[test]
    fn parses_nested_parameters() {
        let parsed: DeclaredType = "Flux<Response<User>>".parse().unwrap();
        assert_eq!(parsed.name(), "Flux");
        let inner = parsed.first_param().unwrap();
        assert_eq!(inner.name(), "Response");
        assert_eq!(inner.first_param().unwrap(), &DeclaredType::new("User"));
        assert_eq!(parsed.to_string(), "Flux<Response<User>>");
    }

    #[test]
    fn wildcard_resolves_to_upper_bound() {
        let parsed: DeclaredType = "Mono< ? extends api::User >".parse().unwrap();
        assert_eq!(
            parsed,
            DeclaredType::of("Mono", vec![DeclaredType::new("api::User")])
        );
    }

    #[test]
    fn multiple_parameters_are_kept_in_order() {
        let parsed: DeclaredType = "Map<String, Vec<u8>>".parse().unwrap();
        assert_eq!(parsed.params().len(), 2);
        assert_eq!(parsed.to_string(), "Map<String, Vec<u8>>");
    }

    #[test]
    fn malformed_types_are_rejected() {
        for source in ["", "Flux<", "Flux<User", "Flux<>", "Flux<User>>", "? super User"] {
            assert!(
                matches!(source.parse::<DeclaredType>(), Err(CallError::ConfigurationError(_))),
                "{source:?} should not parse"
            );
        }
    }

    #[test]
    fn options_builder_and_serde() {
        let options = AdapterOptions::new()
            .with_execution(Execution::Async)
            .with_scheduler(Arc::new(ImmediateScheduler));
        assert_eq!(options.execution, Execution::Async);
        assert!(format!("{options:?}").contains("immediate"));

        let json = serde_json::to_string(&options).unwrap();
        assert_eq!(json, r#"{"execution":"async"}"#);
        let restored: AdapterOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.execution, Execution::Async);
        assert!(restored.scheduler.is_none());
    }

    #[test]
    fn shapes_describe_themselves() {
        assert!(ReturnShape::body_single().is_single());
        assert!(ReturnShape::body_single().is_body());
        assert!(!ReturnShape::response_stream().is_single());
        assert!(!ReturnShape::response_stream().is_body());
    }
}
