mod settings;

pub use settings::{
    ApiConfig, LogConfig, LogFormat, OtelConfig, ServerConfig, Settings, WebSocketConfig,
};
