//! Clock and HTTP date helpers

use super::capabilities::{Capability, Namespace};
use super::HttpApi;
use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone, Utc};
use rhai::{Dynamic, EvalAltResult};

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";
const COOKIE_DATE: &str = "%a, %d-%b-%Y %H:%M:%S GMT";
const COOKIE_DATE_SHORT: &str = "%a, %d-%b-%y %H:%M:%S GMT";

/// Formats accepted by [`parse_http_time`]: RFC 1123, RFC 850, asctime and cookie dates
const PARSE_FORMATS: &[&str] = &[
    HTTP_DATE,
    "%A, %d-%b-%y %H:%M:%S GMT",
    "%a %b %e %H:%M:%S %Y",
    COOKIE_DATE,
];

/// Seconds since the epoch
pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Local time as `yyyy-mm-dd hh:mm:ss`
pub fn localtime() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// UTC time as `yyyy-mm-dd hh:mm:ss`
pub fn utctime() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Local date as `yyyy-mm-dd`
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

fn utc(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Format `secs` as an HTTP date, e.g. `Thu, 18 Nov 2010 11:27:35 GMT`
pub fn http_time(secs: i64) -> Option<String> {
    utc(secs).map(|t| t.format(HTTP_DATE).to_string())
}

/// Format `secs` as a cookie `expires` date
///
/// Uses a two-digit year up to 2037 and a four-digit year after that.
pub fn cookie_time(secs: i64) -> Option<String> {
    utc(secs).map(|t| {
        let fmt = if t.year() > 2037 {
            COOKIE_DATE
        } else {
            COOKIE_DATE_SHORT
        };
        t.format(fmt).to_string()
    })
}

/// Parse an HTTP date into seconds since the epoch
pub fn parse_http_time(s: &str) -> Option<i64> {
    let s = s.trim();
    PARSE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive).timestamp())
    })
}

fn out_of_range(func: &str, secs: i64) -> Box<EvalAltResult> {
    format!("bad argument to '{func}': time {secs} out of range").into()
}

pub(crate) fn capabilities() -> Vec<Capability> {
    vec![
        Capability::new("time", Namespace::Http, |engine| {
            engine.register_fn("time", |_: &mut HttpApi| now());
        }),
        Capability::new("localtime", Namespace::Http, |engine| {
            engine.register_fn("localtime", |_: &mut HttpApi| localtime());
        }),
        Capability::new("utctime", Namespace::Http, |engine| {
            engine.register_fn("utctime", |_: &mut HttpApi| utctime());
        }),
        Capability::new("today", Namespace::Http, |engine| {
            engine.register_fn("today", |_: &mut HttpApi| today());
        }),
        Capability::new("http_time", Namespace::Http, |engine| {
            engine.register_fn("http_time", |_: &mut HttpApi, secs: i64| {
                http_time(secs).ok_or_else(|| out_of_range("http_time", secs))
            });
        }),
        Capability::new("cookie_time", Namespace::Http, |engine| {
            engine.register_fn("cookie_time", |_: &mut HttpApi, secs: i64| {
                cookie_time(secs).ok_or_else(|| out_of_range("cookie_time", secs))
            });
        }),
        Capability::new("parse_http_time", Namespace::Http, |engine| {
            engine.register_fn("parse_http_time", |_: &mut HttpApi, s: &str| {
                parse_http_time(s).map_or(Dynamic::UNIT, Dynamic::from)
            });
        }),
        Capability::new("get_now_ts", Namespace::Http, |engine| {
            engine.register_fn("get_now_ts", |_: &mut HttpApi| now());
        })
        .deprecated(),
        Capability::new("get_now", Namespace::Http, |engine| {
            engine.register_fn("get_now", |_: &mut HttpApi| localtime());
        })
        .deprecated(),
        Capability::new("get_today", Namespace::Http, |engine| {
            engine.register_fn("get_today", |_: &mut HttpApi| today());
        })
        .deprecated(),
    ]
}
