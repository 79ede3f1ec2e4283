pub mod calculate;
pub mod calendar;
pub mod clock;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod search;
pub mod weather;

pub use calculate::CalculateTool;
pub use calendar::CalendarTool;
pub use clock::ClockTool;
pub use executor::ToolExecutor;
pub use registry::{
    arg_str, ParamSpec, ParamType, Tool, ToolCallIntent, ToolDescriptor, ToolOutcome,
    ToolRegistry,
};
pub use schema::tool_call_schema_json;
pub use search::SearchTool;
pub use weather::WeatherTool;

/// 内置工具集：calculate / weather / search / calendar / get_current_time
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CalculateTool);
    registry.register(WeatherTool);
    registry.register(SearchTool);
    registry.register(CalendarTool);
    registry.register(ClockTool);
    registry
}
