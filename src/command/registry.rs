//! Explicit mapping from command kind to factory

use super::{handlers, Command, RequestAction, ResponseAction};
use bytes::Bytes;
use rcmd_shared::{Descriptor, DescriptorError};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while turning a descriptor into a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Unknown command kind: {0}")]
    UnknownKind(String),

    #[error("{kind} does not accept option -{option}")]
    UnknownOption { kind: String, option: String },

    #[error("{kind} requires option -{option}")]
    MissingOption { kind: String, option: String },

    #[error("Invalid value '{value}' for option -{option}: {reason}")]
    InvalidOption {
        option: String,
        value: String,
        reason: String,
    },
}

pub type RequestFactory = fn(&Descriptor) -> Result<Box<dyn RequestAction>, RegistryError>;
pub type ResponseFactory = fn(&Descriptor) -> Result<Box<dyn ResponseAction>, RegistryError>;

/// Constructor for one command kind
#[derive(Clone, Copy)]
pub enum Factory {
    Request(RequestFactory),
    WithResponse(ResponseFactory),
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Factory::Request(_) => write!(f, "Factory::Request"),
            Factory::WithResponse(_) => write!(f, "Factory::WithResponse"),
        }
    }
}

/// Command kinds known to this process
#[derive(Debug, Default)]
pub struct CommandRegistry {
    factories: HashMap<String, Factory>,
}

impl CommandRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the built-in commands
    pub fn standard() -> Self {
        let mut registry = Self::new();
        handlers::register_all(&mut registry);
        registry
    }

    /// Register a factory, replacing any previous one for `kind`
    pub fn register(&mut self, kind: impl Into<String>, factory: Factory) {
        self.factories.insert(kind.into(), factory);
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Create a new command from descriptor text
    pub fn instantiate(&self, text: &str) -> Result<Command, RegistryError> {
        let descriptor = Descriptor::parse(text)?;
        self.instantiate_descriptor(&descriptor)
    }

    pub fn instantiate_descriptor(&self, descriptor: &Descriptor) -> Result<Command, RegistryError> {
        let factory = self
            .factories
            .get(descriptor.kind())
            .ok_or_else(|| RegistryError::UnknownKind(descriptor.kind().to_string()))?;

        Ok(match factory {
            Factory::Request(build) => Command::request(build(descriptor)?, Bytes::new()),
            Factory::WithResponse(build) => Command::with_response(build(descriptor)?, Bytes::new()),
        })
    }
}

/// Reject options not listed in `allowed`
pub fn allow_options(descriptor: &Descriptor, allowed: &[&str]) -> Result<(), RegistryError> {
    match descriptor
        .options()
        .iter()
        .find(|(name, _)| !allowed.contains(&name.as_str()))
    {
        Some((name, _)) => Err(RegistryError::UnknownOption {
            kind: descriptor.kind().to_string(),
            option: name.clone(),
        }),
        None => Ok(()),
    }
}

/// Parse an optional option value
pub fn parse_option<T>(descriptor: &Descriptor, option: &str) -> Result<Option<T>, RegistryError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let Some(value) = descriptor.option(option) else {
        return Ok(None);
    };
    value
        .parse()
        .map(Some)
        .map_err(|e: T::Err| RegistryError::InvalidOption {
            option: option.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a mandatory option value
pub fn require_option<T>(descriptor: &Descriptor, option: &str) -> Result<T, RegistryError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    parse_option(descriptor, option)?.ok_or_else(|| RegistryError::MissingOption {
        kind: descriptor.kind().to_string(),
        option: option.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tests::{Echo, Note};

    fn note_factory(d: &Descriptor) -> Result<Box<dyn RequestAction>, RegistryError> {
        allow_options(d, &[])?;
        Ok(Box::new(Note))
    }

    fn echo_factory(d: &Descriptor) -> Result<Box<dyn ResponseAction>, RegistryError> {
        allow_options(d, &["mode"])?;
        Ok(Box::new(Echo))
    }

    fn registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        registry.register("test.Note", Factory::Request(note_factory));
        registry.register("test.Echo", Factory::WithResponse(echo_factory));
        registry
    }

    #[test]
    fn test_instantiate_by_exact_kind() {
        let registry = registry();
        assert!(!registry.instantiate("test.Note").unwrap().has_response());
        assert!(registry.instantiate("test.Echo -mode loud").unwrap().has_response());

        assert_eq!(
            registry.instantiate("test.note").unwrap_err(),
            RegistryError::UnknownKind("test.note".into())
        );
    }

    #[test]
    fn test_instantiated_command_is_fresh_request() {
        let command = registry().instantiate("test.Echo").unwrap();
        assert!(command.is_request());
        assert!(command.payload().is_empty());
    }

    #[test]
    fn test_option_validation() {
        let registry = registry();
        assert!(matches!(
            registry.instantiate("test.Note -x 1"),
            Err(RegistryError::UnknownOption { .. })
        ));
        assert!(matches!(
            registry.instantiate("test.Note -x"),
            Err(RegistryError::Descriptor(DescriptorError::MissingValue(_)))
        ));
    }

    #[test]
    fn test_option_parsing() {
        let d = Descriptor::parse("k -id 7 -bad x").unwrap();
        assert_eq!(parse_option::<u64>(&d, "id"), Ok(Some(7)));
        assert_eq!(parse_option::<u64>(&d, "none"), Ok(None));
        assert!(matches!(
            parse_option::<u64>(&d, "bad"),
            Err(RegistryError::InvalidOption { .. })
        ));
        assert!(matches!(
            require_option::<u64>(&d, "none"),
            Err(RegistryError::MissingOption { .. })
        ));
    }

    #[test]
    fn test_standard_registry_kinds() {
        let registry = CommandRegistry::standard();
        assert_eq!(
            registry.kinds(),
            vec![
                "basic.Ping",
                "basic.Stop",
                "basic.SystemInfo",
                "basic.Text",
                "flow.ListFlows",
                "flow.RunScript",
                "flow.StopFlow",
            ]
        );
    }
}
