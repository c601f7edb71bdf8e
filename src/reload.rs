// Configuration hot reload module
// Handles SIGHUP signal to reload configuration without downtime

use crate::config::Config;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// ReloadManager handles configuration reload via SIGHUP signal
pub struct ReloadManager {
    config_path: PathBuf,
    reload_requested: Arc<AtomicBool>,
}

impl ReloadManager {
    /// Create a new ReloadManager with the config file path
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            reload_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register SIGHUP signal handler
    /// Returns a handle that can be used to check if reload was requested
    #[cfg(unix)]
    pub fn register_signal_handler(&self) -> Result<(), String> {
        use signal_hook::consts::SIGHUP;
        use signal_hook::flag;

        // Register SIGHUP handler that sets the reload_requested flag
        flag::register(SIGHUP, Arc::clone(&self.reload_requested))
            .map_err(|e| format!("Failed to register SIGHUP handler: {}", e))?;

        Ok(())
    }

    /// Check if reload was requested via SIGHUP
    pub fn is_reload_requested(&self) -> bool {
        self.reload_requested.load(Ordering::Relaxed)
    }

    /// Clear the reload request flag
    pub fn clear_reload_request(&self) {
        self.reload_requested.store(false, Ordering::Relaxed);
    }

    /// Attempt to reload configuration from file
    /// Returns Ok(new_config) if reload successful, Err if validation fails
    pub fn reload_config(&self) -> Result<Config, String> {
        // Load new config from file
        let new_config = Config::from_file(&self.config_path)?;

        // Validate before applying
        new_config.validate()?;

        // Increment generation number for version tracking
        // Note: The generation will be properly incremented by the caller
        // based on the current config's generation

        Ok(new_config)
    }

    /// Reload config and increment generation number
    /// Takes the current generation and returns new config with incremented generation
    pub fn reload_config_with_generation(&self, current_generation: u64) -> Result<Config, String> {
        let mut new_config = self.reload_config()?;
        new_config.generation = current_generation + 1;
        Ok(new_config)
    }

    /// Get the config file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}
