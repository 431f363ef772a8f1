//! Project configuration loaded from `.secretctl.toml`.

pub mod settings;

pub use settings::Settings;
