//! Locating the application's scripting binding on disk.

use crate::{Result, Unavailable};
use std::path::{Path, PathBuf};

/// Environment variable naming the scripting API directory.
pub const SCRIPT_API_VAR: &str = "RESOLVE_SCRIPT_API";
/// Environment variable naming the native scripting library.
pub const SCRIPT_LIB_VAR: &str = "RESOLVE_SCRIPT_LIB";
/// Environment variable naming the directory holding the scripting module.
pub const MODULES_VAR: &str = "RESOLVE_MODULES";

/// One override layer: maps a variable name to its value, if set.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Paths the script host needs to load the binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPaths {
    pub script_api: PathBuf,
    pub script_lib: PathBuf,
    pub modules: PathBuf,
}

impl BindingPaths {
    /// Default install locations for the current platform.
    pub fn platform_default() -> Self {
        let (script_api, script_lib) = default_locations();
        let modules = script_api.join("Modules");
        Self {
            script_api,
            script_lib,
            modules,
        }
    }

    /// Platform defaults overridden by the process environment.
    pub fn from_env() -> Self {
        let env = |key: &str| std::env::var(key).ok();
        Self::layered(&[&env as Lookup])
    }

    /// Platform defaults overridden by each lookup in turn, later layers
    /// winning per key. Empty values count as unset.
    ///
    /// The module directory is derived once, after every layer: an explicit
    /// module directory from any layer is kept, otherwise it follows the
    /// final API directory.
    pub fn layered(layers: &[Lookup<'_>]) -> Self {
        let pick = |key: &str| {
            layers
                .iter()
                .rev()
                .find_map(|lookup| lookup(key).filter(|v| !v.is_empty()))
                .map(PathBuf::from)
        };

        let (default_api, default_lib) = default_locations();
        let script_api = pick(SCRIPT_API_VAR).unwrap_or(default_api);
        let script_lib = pick(SCRIPT_LIB_VAR).unwrap_or(default_lib);
        let modules = pick(MODULES_VAR).unwrap_or_else(|| script_api.join("Modules"));
        Self {
            script_api,
            script_lib,
            modules,
        }
    }

    /// Check that every path exists.
    pub fn verify(&self) -> Result<()> {
        check_exists(&self.script_api, SCRIPT_API_VAR)?;
        check_exists(&self.script_lib, SCRIPT_LIB_VAR)?;
        check_exists(&self.modules, "module path")?;
        Ok(())
    }
}

fn check_exists(path: &Path, what: &str) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Unavailable::BindingNotFound {
            detail: format!("{what} points to {}, which does not exist", path.display()),
        }
        .into())
    }
}

fn default_locations() -> (PathBuf, PathBuf) {
    #[cfg(target_os = "macos")]
    {
        (
            PathBuf::from(
                "/Library/Application Support/Blackmagic Design/DaVinci Resolve/Developer/Scripting",
            ),
            PathBuf::from(
                "/Applications/DaVinci Resolve/DaVinci Resolve.app/Contents/Libraries/Fusion/fusionscript.so",
            ),
        )
    }
    #[cfg(target_os = "windows")]
    {
        let program_data =
            std::env::var_os("PROGRAMDATA").unwrap_or_else(|| "C:\\ProgramData".into());
        (
            PathBuf::from(program_data)
                .join("Blackmagic Design\\DaVinci Resolve\\Support\\Developer\\Scripting"),
            PathBuf::from("C:\\Program Files\\Blackmagic Design\\DaVinci Resolve\\fusionscript.dll"),
        )
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        (
            PathBuf::from("/opt/resolve/Developer/Scripting"),
            PathBuf::from("/opt/resolve/libs/Fusion/fusionscript.so"),
        )
    }
}
