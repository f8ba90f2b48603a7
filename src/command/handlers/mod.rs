//! Built-in command handlers

mod list_flows;
mod ping;
mod run_script;
mod stop;
mod stop_flow;
mod system_info;
mod text;

use super::{CommandRegistry, Factory};

/// Register every built-in command
pub fn register_all(registry: &mut CommandRegistry) {
    registry.register(ping::KIND, Factory::WithResponse(ping::factory));
    registry.register(text::KIND, Factory::Request(text::factory));
    registry.register(system_info::KIND, Factory::WithResponse(system_info::factory));
    registry.register(stop::KIND, Factory::Request(stop::factory));
    registry.register(run_script::KIND, Factory::Request(run_script::factory));
    registry.register(list_flows::KIND, Factory::WithResponse(list_flows::factory));
    registry.register(stop_flow::KIND, Factory::WithResponse(stop_flow::factory));
}
