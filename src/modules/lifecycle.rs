//! Loading and unloading modules through the server context.

use super::actions::{Arg, Targets};
use super::traits::{Module, Teardown};
use crate::error::RegistryError;
use crate::metrics;
use crate::state::Matrix;
use futures_util::FutureExt;
use futures_util::future::join_all;
use std::rc::Rc;
use tracing::{info, warn};

impl Matrix {
    /// Install a module. Rejected while an earlier instance is still
    /// tearing down.
    pub fn load_module(&mut self, module: Rc<dyn Module>) -> Result<(), RegistryError> {
        let name = module.name().to_string();
        if self.unloading.contains(&name) {
            return Err(RegistryError::Unloading(name));
        }
        if let Err(e) = self.registry.register(module) {
            warn!(module = %name, error = %e, "Module rejected");
            metrics::record_module_rejection();
            return Err(e);
        }
        info!(module = %name, "Module loaded");
        metrics::set_modules_loaded(self.registry.loaded().len());
        self.run_action_standard("moduleload", &[Arg::Text(name)], &Targets::none());
        Ok(())
    }

    /// Remove a module. A partial unload (`full = false`, used at shutdown)
    /// skips the module's full-unload teardown. Any asynchronous teardown is
    /// queued for the event loop, which calls [`Matrix::finish_unload`].
    pub fn unload_module(&mut self, name: &str, full: bool) -> Result<(), RegistryError> {
        let Some(module) = self.registry.module(name) else {
            return Err(RegistryError::NotLoaded(name.to_string()));
        };
        if full && module.core() {
            return Err(RegistryError::CoreModule(name.to_string()));
        }

        let mut teardowns: Vec<Teardown> = Vec::new();
        teardowns.extend(module.unload(self));
        self.registry.unregister(name)?;
        if full {
            teardowns.extend(module.full_unload(self));
        }

        info!(module = %name, full, "Module unloaded");
        metrics::set_modules_loaded(self.registry.loaded().len());
        self.run_action_standard("moduleunload", &[Arg::Text(name.to_string())], &Targets::none());

        if !teardowns.is_empty() {
            self.unloading.insert(name.to_string());
            let name = name.to_string();
            self.pending_teardowns
                .push(join_all(teardowns).map(move |_| name).boxed_local());
        }
        Ok(())
    }

    /// Mark an asynchronous teardown as done.
    pub fn finish_unload(&mut self, name: &str) {
        if self.unloading.remove(name) {
            info!(module = %name, "Module teardown complete");
        }
    }

    pub fn is_unloading(&self, name: &str) -> bool {
        self.unloading.contains(name)
    }

    /// Partially unload every module, newest first.
    pub fn unload_all(&mut self) {
        let names: Vec<String> = self.registry.loaded().iter().rev().cloned().collect();
        for name in names {
            if let Err(e) = self.unload_module(&name, false) {
                warn!(module = %name, error = %e, "Failed to unload module");
            }
        }
    }
}
