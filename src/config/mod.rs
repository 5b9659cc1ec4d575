mod settings;

pub use settings::{
    CacheSettings, Command, Config, CredentialSettings, ServerSettings, Settings,
    UpstreamSettings,
};
