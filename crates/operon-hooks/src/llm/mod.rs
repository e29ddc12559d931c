pub mod types;

pub use types::{
    Content, GenerateConfig, GenerateResponse, Message, ModelRequest, Role, StopReason, ToolCall,
    ToolChoice, ToolMode, ToolResult, ToolSchema, Usage,
};
