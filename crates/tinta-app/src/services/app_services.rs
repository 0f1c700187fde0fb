// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: loads settings, picks the platform bridge, and
// builds the one `PrintSession` the commands share.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tinta_bridge::traits::PlatformBridge;
use tinta_bridge::{MemoryBridge, platform_bridge};
use tinta_core::AppConfig;
use tinta_core::error::{Result, TintaError};
use tinta_core::types::Endpoint;
use tinta_print::PrintSession;
use tracing::{debug, info};

use super::data_dir;

const CONFIG_FILE: &str = "config.json";

/// How the services should start.
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    /// Use the simulated printer instead of real Bluetooth.
    pub offline: bool,
    /// Settings file; defaults to `config.json` in the data directory.
    pub config_path: Option<PathBuf>,
}

#[derive(Clone)]
pub struct AppServices {
    session: Arc<PrintSession>,
    config_path: PathBuf,
}

impl AppServices {
    /// Initialise all services. Call once at startup.
    pub fn init(options: &ServiceOptions) -> Result<Self> {
        let config_path = match &options.config_path {
            Some(path) => path.clone(),
            None => data_dir::data_dir().join(CONFIG_FILE),
        };
        let config = load_config(&config_path)?;

        let bridge: Arc<dyn PlatformBridge> = if options.offline {
            info!("offline mode: using the simulated printer");
            Arc::new(MemoryBridge::offline())
        } else {
            platform_bridge(&config)
        };

        info!(platform = bridge.platform_name(), config = %config_path.display(), "services initialised");
        Ok(Self {
            session: Arc::new(PrintSession::new(bridge, config)),
            config_path,
        })
    }

    pub fn session(&self) -> &Arc<PrintSession> {
        &self.session
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Write the active settings to the config file.
    pub fn save_config(&self) -> Result<()> {
        persist_config(&self.config_path, self.session.config())
    }

    /// Select the printer a command should use: the given address, or the
    /// only known printer when there is exactly one.
    pub fn choose_printer(&self, address: Option<&str>) -> Result<Endpoint> {
        let session = &self.session;
        if let Some(address) = address {
            return session.select(address);
        }

        if session.devices().is_empty() {
            if let Err(e) = session.refresh_paired() {
                debug!(error = %e, "could not load paired printers");
            }
        }
        match session.devices().as_slice() {
            [only] => session.select(only.address.as_str()),
            _ => Err(TintaError::NoPrinterSelected),
        }
    }
}

/// Read settings, falling back to defaults when the file does not exist.
fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(AppConfig::default());
    }
    AppConfig::load(path).map_err(|e| TintaError::Config(format!("{}: {e}", path.display())))
}

fn persist_config(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    config.save(path)
}
