//! Module configuration and host directive parsing.
//!
//! Directives use the host's `name arg...;` syntax, one per line, with `#`
//! starting a comment:
//!
//! ```text
//! python_path          /srv/app/lib;
//! python_thread_pool   blocking;
//! python_fast_path     reactor_only;
//! asgi_pass            app.main:application;
//! ```

use std::str::FromStr;

use crate::error::ConfigError;

/// Name of the pool used when none is configured, or the configured one is missing.
pub const DEFAULT_POOL_NAME: &str = "default";

pub const DEFAULT_PROGRAM_PATH: &str = "python3";

pub const DEFAULT_MAX_IN_FLIGHT_ENVELOPES: usize = 65536;

/// What the notification bridge does when no thread pool could be resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FastPathPolicy {
    /// Accept fast-path notifications only from the wake primitive's owner thread.
    #[default]
    ReactorThreadOnly,
    /// Hand every notification to the wake primitive; the caller guarantees
    /// there is a single external caller.
    TrustCaller,
    /// Fail worker startup when no pool is available.
    RefuseStart,
}

impl FromStr for FastPathPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reactor_only" => Ok(FastPathPolicy::ReactorThreadOnly),
            "trust_caller" => Ok(FastPathPolicy::TrustCaller),
            "refuse" => Ok(FastPathPolicy::RefuseStart),
            _ => Err(()),
        }
    }
}

/// Which protocol adapter serves a location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppProtocol {
    Wsgi,
    Asgi,
}

/// A `module:attr.path` reference to an application object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppTarget {
    pub module: String,
    pub attrs: Vec<String>,
}

impl AppTarget {
    /// Splits on the first `:`; the module and every dotted attribute segment
    /// must be non-empty.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidTarget(raw.to_string());

        let (module, object) = raw.split_once(':').ok_or_else(invalid)?;
        if module.is_empty() || module.split('.').any(str::is_empty) {
            return Err(invalid());
        }

        let attrs: Vec<String> = object.split('.').map(str::to_string).collect();
        if attrs.iter().any(String::is_empty) {
            return Err(invalid());
        }

        Ok(Self {
            module: module.to_string(),
            attrs,
        })
    }
}

/// Application bound to a location by `asgi_pass` / `wsgi_pass`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocationConfig {
    pub protocol: AppProtocol,
    pub target: AppTarget,
}

/// Per-process configuration consumed by the lifecycle manager and the bridge.
#[derive(Clone, Debug)]
pub struct ModuleConfig {
    /// Raw program path handed to the runtime for decoding.
    pub program_path: String,

    /// Overrides the runtime's module search path when set.
    pub module_search_path: Option<String>,

    /// Pool the bridge submits envelopes to; falls back to [`DEFAULT_POOL_NAME`].
    pub thread_pool: Option<String>,

    pub fast_path_policy: FastPathPolicy,

    /// Upper bound on live worker task envelopes.
    pub max_in_flight_envelopes: usize,

    /// Thread count for pools created by the bundled host.
    pub pool_threads: usize,

    pub locations: Vec<LocationConfig>,

    // Applied directives whose field has no unset value to check against.
    seen: Vec<String>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            program_path: DEFAULT_PROGRAM_PATH.to_string(),
            module_search_path: None,
            thread_pool: None,
            fast_path_policy: FastPathPolicy::default(),
            max_in_flight_envelopes: DEFAULT_MAX_IN_FLIGHT_ENVELOPES,
            pool_threads: num_cpus::get(),
            locations: Vec::new(),
            seen: Vec::new(),
        }
    }
}

impl ModuleConfig {
    /// Parses a block of directives on top of the defaults.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (index, raw_line) in text.lines().enumerate() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let at_line = |source: ConfigError| ConfigError::AtLine {
                line: index + 1,
                source: Box::new(source),
            };

            let body = line.strip_suffix(';').ok_or_else(|| at_line(ConfigError::Unterminated))?;
            let mut words = body.split_whitespace();
            let Some(name) = words.next() else {
                continue;
            };
            let args: Vec<&str> = words.collect();

            config.apply_directive(name, &args).map_err(at_line)?;
        }

        Ok(config)
    }

    /// Applies a single directive. A single-valued directive applied a second
    /// time, here or through [`parse`](Self::parse), is a
    /// [`ConfigError::Duplicate`] and leaves the first value in place.
    pub fn apply_directive(&mut self, name: &str, args: &[&str]) -> Result<(), ConfigError> {
        let single = expect_one(name, args);

        match name {
            "python_path" => {
                let value = single?;
                if self.module_search_path.is_some() {
                    return Err(duplicate(name));
                }
                self.module_search_path = Some(value.to_string());
            }
            "python_thread_pool" => {
                let value = single?;
                if self.thread_pool.is_some() {
                    return Err(duplicate(name));
                }
                self.thread_pool = Some(value.to_string());
            }
            "python_fast_path" => {
                let value = single?;
                self.check_unseen(name)?;
                self.fast_path_policy = value.parse().map_err(|_| ConfigError::InvalidValue {
                    directive: name.to_string(),
                    value: value.to_string(),
                })?;
                self.seen.push(name.to_string());
            }
            "python_max_in_flight" => {
                let value = single?;
                self.check_unseen(name)?;
                self.max_in_flight_envelopes = parse_positive(name, value)?;
                self.seen.push(name.to_string());
            }
            "python_pool_threads" => {
                let value = single?;
                self.check_unseen(name)?;
                self.pool_threads = parse_positive(name, value)?;
                self.seen.push(name.to_string());
            }
            "asgi_pass" | "wsgi_pass" => {
                let protocol = if name == "asgi_pass" {
                    AppProtocol::Asgi
                } else {
                    AppProtocol::Wsgi
                };
                let target = AppTarget::parse(single?)?;
                self.locations.push(LocationConfig { protocol, target });
            }
            _ => return Err(ConfigError::Unknown(name.to_string())),
        }

        Ok(())
    }

    pub fn thread_pool_name(&self) -> Option<&str> {
        self.thread_pool.as_deref()
    }

    pub fn with_thread_pool(mut self, name: impl Into<String>) -> Self {
        self.thread_pool = Some(name.into());
        self
    }

    pub fn with_fast_path_policy(mut self, policy: FastPathPolicy) -> Self {
        self.fast_path_policy = policy;
        self
    }

    fn check_unseen(&self, name: &str) -> Result<(), ConfigError> {
        if self.seen.iter().any(|s| s == name) {
            return Err(duplicate(name));
        }
        Ok(())
    }
}

fn expect_one<'a>(name: &str, args: &[&'a str]) -> Result<&'a str, ConfigError> {
    match args {
        [value] => Ok(*value),
        _ => Err(ConfigError::Arity {
            directive: name.to_string(),
            expected: 1,
            got: args.len(),
        }),
    }
}

fn duplicate(name: &str) -> ConfigError {
    ConfigError::Duplicate {
        directive: name.to_string(),
    }
}

fn parse_positive(name: &str, value: &str) -> Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            directive: name.to_string(),
            value: value.to_string(),
        }),
    }
}
