//! Bridge between wire messages and commands

use super::{Command, CommandRegistry, Exchange, MessageRole};
use rcmd_shared::{ErrorCollection, Processor, WireMessage};
use std::path::Path;

/// Parse wire text into a freshly instantiated command
pub fn parse(
    processor: &dyn Processor,
    registry: &CommandRegistry,
    text: &str,
    errors: &mut ErrorCollection,
) -> Option<Command> {
    let message = processor.parse_message(text, errors)?;
    from_message(registry, message, errors)
}

/// Read a message file into a command
pub fn read(
    processor: &dyn Processor,
    registry: &CommandRegistry,
    path: &Path,
    errors: &mut ErrorCollection,
) -> Option<Command> {
    let message = processor.read_message(path, errors)?;
    from_message(registry, message, errors)
}

/// Instantiate, configure and attach the payload of a decoded message
pub fn from_message(
    registry: &CommandRegistry,
    message: WireMessage,
    errors: &mut ErrorCollection,
) -> Option<Command> {
    let descriptor = message.descriptor();
    let mut command = match registry.instantiate(descriptor) {
        Ok(command) => command,
        Err(e) => {
            errors.add(format!("Failed to instantiate command '{}': {}", descriptor, e));
            return None;
        }
    };

    if let Err(e) = command.configure(&message.header) {
        errors.add(format!("Failed to configure {}: {}", command.kind(), e));
        return None;
    }

    let is_response = match message.is_response() {
        Ok(is_response) => is_response,
        Err(e) => {
            errors.add(e);
            return None;
        }
    };

    match (command, is_response) {
        (Command::Request(mut cmd), false) => {
            cmd.payload = message.payload;
            Some(Command::Request(cmd))
        }
        (Command::WithResponse(mut cmd), response) => {
            cmd.exchange = if response {
                Exchange::Response(message.payload)
            } else {
                Exchange::Request(message.payload)
            };
            Some(Command::WithResponse(cmd))
        }
        (command @ Command::Request(_), true) => {
            errors.add(format!(
                "Command {} flagged as response but does not implement response-carrying capability",
                command.kind()
            ));
            None
        }
    }
}

/// Write a command in its current role
pub fn write(
    processor: &dyn Processor,
    command: &Command,
    path: &Path,
    errors: &mut ErrorCollection,
) -> bool {
    write_as(processor, command, command.role(), path, errors)
}

/// Write a command in the given role
pub fn write_as(
    processor: &dyn Processor,
    command: &Command,
    role: MessageRole,
    path: &Path,
    errors: &mut ErrorCollection,
) -> bool {
    match command.assemble_as(processor, role) {
        Ok(text) => processor.write_text(&text, path, errors),
        Err(e) => {
            errors.add(e);
            false
        }
    }
}
