//! `print` and `http.log`, routed to `tracing`

use super::capabilities::{Capability, Namespace};
use super::HttpApi;
use rhai::{Dynamic, EvalAltResult};
use tracing::{debug, error, info, warn};

/// Target of every event emitted by script code
pub const SCRIPT_LOG_TARGET: &str = "headerhook::script";

/// Log levels, numbered as in the nginx error log
pub mod level {
    /// Same as `ERR`
    pub const STDERR: i64 = 0;
    /// System is unusable
    pub const EMERG: i64 = 1;
    /// Immediate action required
    pub const ALERT: i64 = 2;
    /// Critical condition
    pub const CRIT: i64 = 3;
    /// Error
    pub const ERR: i64 = 4;
    /// Warning
    pub const WARN: i64 = 5;
    /// Normal but significant
    pub const NOTICE: i64 = 6;
    /// Informational
    pub const INFO: i64 = 7;
    /// Debug
    pub const DEBUG: i64 = 8;
}

macro_rules! level_constant {
    ($name:ident) => {
        Capability::new(stringify!($name), Namespace::Http, |engine| {
            engine.register_get(stringify!($name), |_: &mut HttpApi| level::$name);
        })
    };
}

/// Emit `message` at the given script log level
pub fn log(lvl: i64, message: &str) -> Result<(), String> {
    match lvl {
        level::STDERR..=level::ERR => error!(target: SCRIPT_LOG_TARGET, lvl, "{message}"),
        level::WARN => warn!(target: SCRIPT_LOG_TARGET, "{message}"),
        level::NOTICE | level::INFO => info!(target: SCRIPT_LOG_TARGET, lvl, "{message}"),
        level::DEBUG => debug!(target: SCRIPT_LOG_TARGET, "{message}"),
        other => return Err(format!("bad log level: {other}")),
    }
    Ok(())
}

fn render(value: &Dynamic) -> String {
    if value.is_unit() {
        "nil".to_string()
    } else {
        value.to_string()
    }
}

pub(crate) fn capabilities() -> Vec<Capability> {
    vec![
        Capability::new("print", Namespace::Root, |engine| {
            engine.on_print(|text| info!(target: SCRIPT_LOG_TARGET, "{text}"));
            engine.on_debug(|text, source, pos| {
                debug!(target: SCRIPT_LOG_TARGET, source, line = pos.line(), "{text}")
            });
        }),
        Capability::new("log", Namespace::Http, |engine| {
            engine.register_fn(
                "log",
                |_: &mut HttpApi, lvl: i64, msg: Dynamic| -> Result<(), Box<EvalAltResult>> {
                    log(lvl, &render(&msg)).map_err(Into::into)
                },
            );
        }),
        level_constant!(STDERR),
        level_constant!(EMERG),
        level_constant!(ALERT),
        level_constant!(CRIT),
        level_constant!(ERR),
        level_constant!(WARN),
        level_constant!(NOTICE),
        level_constant!(INFO),
        level_constant!(DEBUG),
    ]
}
