mod settings;

pub use settings::{
    ApiConfig, HubConfig, JwtConfig, MembershipConfig, OtelConfig, ServerConfig, Settings,
};
