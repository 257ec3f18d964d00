//! Server option resolution.
//!
//! Network and protocol settings come from three sources with fixed
//! precedence: explicit values passed by the embedding application win over
//! command-line flags, which win over `LOGUX_*` environment variables,
//! which win over built-in defaults.

use std::collections::HashMap;

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default bind port.
pub const DEFAULT_PORT: u16 = 31337;

/// Fully resolved server options.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host the transport should bind.
    pub host: String,
    /// Port the transport should bind.
    pub port: u16,
    /// TLS certificate path, if any.
    pub cert: Option<String>,
    /// TLS key path, if any.
    pub key: Option<String>,
    /// Application subprotocol version the server itself speaks.
    pub subprotocol: String,
    /// Range of client subprotocol versions the server accepts,
    /// e.g. `"2.x || 1.x"`.
    pub supports: String,
    /// This server's node id.
    pub node_id: String,
}

impl ServerOptions {
    /// Whether the resolved options enable TLS.
    pub fn tls(&self) -> bool {
        self.cert.is_some() && self.key.is_some()
    }
}

/// Options supplied explicitly by the embedding application.
///
/// Every field is optional except the subprotocol pair, which has no
/// sensible default and must always be provided.
#[derive(Debug, Clone, Default)]
pub struct ExplicitOptions {
    /// Bind host override.
    pub host: Option<String>,
    /// Bind port override.
    pub port: Option<u16>,
    /// TLS certificate path.
    pub cert: Option<String>,
    /// TLS key path.
    pub key: Option<String>,
    /// Application subprotocol version. Required.
    pub subprotocol: Option<String>,
    /// Supported client subprotocol range. Required.
    pub supports: Option<String>,
    /// Server node id; generated when absent.
    pub node_id: Option<String>,
}

/// Option resolution errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    /// A flag the resolver does not know about.
    UnknownFlag {
        /// The offending flag.
        flag: String,
    },

    /// A flag was given without its value.
    MissingValue {
        /// The offending flag.
        flag: String,
    },

    /// A port that is not a 16-bit integer.
    InvalidPort {
        /// The offending value.
        value: String,
        /// Where the value came from (`--port` or `LOGUX_PORT`).
        source: &'static str,
    },

    /// A required option was supplied nowhere.
    MissingOption {
        /// The missing option.
        name: &'static str,
    },
}

// Implemented by hand: a thiserror derive would treat the `InvalidPort::source`
// field as the error's `source()`, which `&'static str` cannot be.
impl std::fmt::Display for OptionsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionsError::UnknownFlag { flag } => write!(f, "unknown flag {flag}"),
            OptionsError::MissingValue { flag } => write!(f, "flag {flag} requires a value"),
            OptionsError::InvalidPort { value, source } => {
                write!(f, "invalid port {value:?} from {source}")
            }
            OptionsError::MissingOption { name } => write!(f, "option {name} is required"),
        }
    }
}

impl std::error::Error for OptionsError {}

/// Network settings parsed from one source.
#[derive(Debug, Default)]
struct Layer {
    host: Option<String>,
    port: Option<u16>,
    cert: Option<String>,
    key: Option<String>,
}

/// Resolve server options from explicit values, `argv` and environment.
///
/// `argv` is the full argument vector including the program name. The
/// precedence is explicit > flags > environment > defaults; this is the
/// contract the embedding CLI relies on, so changing it is a breaking
/// change even though most CLI tools order the tiers differently.
pub fn resolve(
    explicit: ExplicitOptions,
    argv: &[String],
    env: &HashMap<String, String>,
) -> Result<ServerOptions, OptionsError> {
    let cli = parse_argv(argv)?;
    let env = parse_env(env)?;

    let subprotocol = explicit
        .subprotocol
        .ok_or(OptionsError::MissingOption {
            name: "subprotocol",
        })?;
    let supports = explicit
        .supports
        .ok_or(OptionsError::MissingOption { name: "supports" })?;

    Ok(ServerOptions {
        host: explicit
            .host
            .or(cli.host)
            .or(env.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: explicit.port.or(cli.port).or(env.port).unwrap_or(DEFAULT_PORT),
        cert: explicit.cert.or(cli.cert).or(env.cert),
        key: explicit.key.or(cli.key).or(env.key),
        subprotocol,
        supports,
        node_id: explicit
            .node_id
            .unwrap_or_else(|| format!("server:{}", uuid::Uuid::new_v4().simple())),
    })
}

fn parse_argv(argv: &[String]) -> Result<Layer, OptionsError> {
    let mut layer = Layer::default();
    let mut args = argv.iter().skip(1);
    while let Some(flag) = args.next() {
        let mut value = |flag: &str| {
            args.next().cloned().ok_or(OptionsError::MissingValue {
                flag: flag.to_string(),
            })
        };
        match flag.as_str() {
            "--host" | "-h" => layer.host = Some(value(flag)?),
            "--port" | "-p" => {
                let raw = value(flag)?;
                layer.port = Some(parse_port(&raw, "--port")?);
            }
            "--cert" | "-c" => layer.cert = Some(value(flag)?),
            "--key" | "-k" => layer.key = Some(value(flag)?),
            other => {
                return Err(OptionsError::UnknownFlag {
                    flag: other.to_string(),
                })
            }
        }
    }
    Ok(layer)
}

fn parse_env(env: &HashMap<String, String>) -> Result<Layer, OptionsError> {
    let mut layer = Layer {
        host: env.get("LOGUX_HOST").cloned(),
        cert: env.get("LOGUX_CERT").cloned(),
        key: env.get("LOGUX_KEY").cloned(),
        ..Layer::default()
    };
    if let Some(raw) = env.get("LOGUX_PORT") {
        layer.port = Some(parse_port(raw, "LOGUX_PORT")?);
    }
    Ok(layer)
}

fn parse_port(raw: &str, source: &'static str) -> Result<u16, OptionsError> {
    raw.parse().map_err(|_| OptionsError::InvalidPort {
        value: raw.to_string(),
        source,
    })
}
