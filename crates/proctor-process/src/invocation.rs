//! Invocation assembly: argv, wrapper rewriting and environment resolution

use std::collections::HashMap;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::PathBuf;

use crate::config::{CommandConfig, ENV_WILDCARD};

/// Fully resolved OS invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program actually executed (the wrapper, when one is set)
    pub program: String,
    /// Arguments passed to `program`
    pub args: Vec<String>,
    /// Working directory
    pub working_dir: Option<PathBuf>,
    /// Complete child environment, byte-exact
    pub environ: Vec<(OsString, OsString)>,
}

impl Invocation {
    /// Resolve against the current process environment
    pub fn from_config(config: &CommandConfig) -> Self {
        Self::with_inherited(config, env::vars_os())
    }

    /// Resolve against an explicit inherited environment
    pub fn with_inherited<I>(config: &CommandConfig, inherited: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut args = config.prepend_args.clone();
        args.extend(config.args.iter().cloned());

        let mut program = config.binary.clone();
        if let Some(wrapper) = &config.wrap_binary {
            let mut wrapped = config.wrap_args.clone();
            wrapped.push(program);
            wrapped.append(&mut args);
            args = wrapped;
            program = wrapper.clone();
        }

        Self {
            program,
            args,
            working_dir: config.working_dir.clone(),
            environ: resolve_environ(inherited, &config.env_blacklist, &config.env),
        }
    }

    /// Environment as `NAME=value` entries, for reports
    ///
    /// Non-UTF-8 names and values are rendered lossily; the child itself
    /// receives [`Self::environ`] unchanged.
    pub fn environ_entries(&self) -> Vec<String> {
        self.environ
            .iter()
            .map(|(k, v)| format!("{}={}", k.to_string_lossy(), v.to_string_lossy()))
            .collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Build a child environment
///
/// Inherited entries are dropped when their name is blacklisted, or when the
/// blacklist holds [`ENV_WILDCARD`]. Overrides are then applied in name
/// order and replace any inherited entry of the same name, blacklisted or
/// not.
pub fn resolve_environ<I>(
    inherited: I,
    blacklist: &[String],
    overrides: &HashMap<String, String>,
) -> Vec<(OsString, OsString)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let drop_all = blacklist.iter().any(|name| name == ENV_WILDCARD);
    let listed = |name: &OsStr| blacklist.iter().any(|b| OsStr::new(b) == name);
    let overridden = |name: &OsStr| name.to_str().is_some_and(|n| overrides.contains_key(n));

    let mut environ: Vec<(OsString, OsString)> = if drop_all {
        vec![]
    } else {
        inherited
            .into_iter()
            .filter(|(name, _)| !listed(name) && !overridden(name))
            .collect()
    };

    let mut explicit: Vec<_> = overrides.iter().collect();
    explicit.sort();
    environ.extend(
        explicit
            .into_iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v))),
    );

    environ
}
