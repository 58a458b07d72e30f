//! Shared configuration for the user directory workspace.

pub mod config;

pub use config::{clamp_debounce, load_dotenv, DirectoryConfig, DuplicateUsernamePolicy};
