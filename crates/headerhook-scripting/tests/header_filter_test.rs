//! End-to-end tests of the script stage inside a filter chain

use async_trait::async_trait;
use headerhook_config::{Config, ConfigBuilder, HeaderFilterConfig, LocationConfig};
use headerhook_core::{
    FilterChain, FilterStatus, HeaderFilter, HeaderValue, HttpRequest, Next, StatusCode,
};
use headerhook_scripting::{HookContext, HookRuntime, SCRIPT_FILTER_NAME};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Terminal stage counting how often the chain reached it
#[derive(Debug, Default)]
struct Terminal {
    calls: AtomicUsize,
}

#[async_trait]
impl HeaderFilter for Terminal {
    fn name(&self) -> &str {
        "terminal"
    }

    async fn filter(&self, req: &mut HttpRequest, next: Next) -> FilterStatus {
        self.calls.fetch_add(1, Ordering::SeqCst);
        next.run(req).await
    }
}

fn chain(config: &Config) -> (FilterChain, Arc<Terminal>, HookRuntime) {
    let runtime = HookRuntime::from_config(config).unwrap();
    let terminal = Arc::new(Terminal::default());
    let builder = FilterChain::builder().install(terminal.clone()).unwrap();
    let chain = runtime.install(builder).unwrap().build();
    (chain, terminal, runtime)
}

fn inline(code: &str) -> Config {
    ConfigBuilder::new()
        .header_filter(HeaderFilterConfig::inline(code))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_sets_header_and_delegates() {
    let (chain, terminal, _) = chain(&inline(r#"http.header["X-Test"] = "1";"#));
    assert_eq!(chain.stage_names(), vec![SCRIPT_FILTER_NAME, "terminal"]);

    let mut req = HttpRequest::get("/").unwrap();
    assert_eq!(chain.run(&mut req).await, FilterStatus::Continue);

    assert_eq!(req.header_out("x-test"), Some("1"));
    assert_eq!(terminal.calls.load(Ordering::SeqCst), 1);
    let hook = HookContext::get(&req).unwrap();
    assert_eq!(hook.continuation(), Some("terminal"));
}

#[tokio::test]
async fn test_type_error_aborts_without_mutation() {
    let (chain, terminal, runtime) = chain(&inline(r#"http.header["X-Test"] = "1"; let n = 1 + "a" * 2;"#));

    let mut req = HttpRequest::get("/").unwrap();
    req.headers_out
        .insert("x-existing", HeaderValue::from_static("kept"));

    assert_eq!(
        chain.run(&mut req).await,
        FilterStatus::Abort(StatusCode::INTERNAL_SERVER_ERROR)
    );
    assert!(req.header_out("x-test").is_none());
    assert_eq!(req.header_out("x-existing"), Some("kept"));
    assert_eq!(terminal.calls.load(Ordering::SeqCst), 0);
    assert_eq!(runtime.driver().in_flight(), 0);
}

#[tokio::test]
async fn test_all_or_nothing_header_set() {
    let (chain, _, _) = chain(&inline(
        r#"
        http.header["X-One"] = "1";
        http.header["X-Two"] = "2";
        if http.vars.arg_fail == "1" { throw "requested failure"; }
        "#,
    ));

    let mut failing = HttpRequest::get("/?fail=1").unwrap();
    assert!(!chain.run(&mut failing).await.is_continue());
    assert!(failing.header_out("x-one").is_none());
    assert!(failing.header_out("x-two").is_none());

    let mut passing = HttpRequest::get("/").unwrap();
    assert!(chain.run(&mut passing).await.is_continue());
    assert_eq!(passing.header_out("x-one"), Some("1"));
    assert_eq!(passing.header_out("x-two"), Some("2"));
}

#[tokio::test]
async fn test_no_handler_passes_through() {
    let config = ConfigBuilder::new()
        .location(
            LocationConfig::new("/hooked")
                .with_header_filter(HeaderFilterConfig::inline(r#"http.header["X-Hooked"] = "1";"#)),
        )
        .build()
        .unwrap();
    let (chain, terminal, runtime) = chain(&config);

    let mut req = HttpRequest::get("/plain").unwrap();
    assert!(chain.run(&mut req).await.is_continue());

    assert_eq!(terminal.calls.load(Ordering::SeqCst), 1);
    assert!(req.headers_out.is_empty());
    assert!(HookContext::get(&req).is_none());
    assert_eq!(runtime.cache().stats().await.compiles, 0);

    let mut hooked = HttpRequest::get("/hooked/x").unwrap();
    assert!(chain.run(&mut hooked).await.is_continue());
    assert_eq!(hooked.header_out("x-hooked"), Some("1"));
}

#[tokio::test]
async fn test_fault_does_not_poison_next_invocation() {
    let (chain, terminal, runtime) = chain(&inline(
        r#"
        if http.vars.arg_mode == "panic" { throw; }
        http.header["X-Ok"] = "yes";
        "#,
    ));

    let mut bad = HttpRequest::get("/?mode=panic").unwrap();
    assert!(!chain.run(&mut bad).await.is_continue());

    let mut good = HttpRequest::get("/").unwrap();
    assert!(chain.run(&mut good).await.is_continue());
    assert_eq!(good.header_out("x-ok"), Some("yes"));
    assert_eq!(terminal.calls.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.driver().in_flight(), 0);
}

#[tokio::test]
async fn test_locals_isolated_between_requests() {
    let (chain, _, _) = chain(&inline(
        r#"
        let seen = if is_def_var("counter") { "leaked" } else { "fresh" };
        let counter = 1;
        http.header["X-Seen"] = seen;
        "#,
    ));

    for _ in 0..2 {
        let mut req = HttpRequest::get("/").unwrap();
        assert!(chain.run(&mut req).await.is_continue());
        assert_eq!(req.header_out("x-seen"), Some("fresh"));
    }
}

#[tokio::test]
async fn test_globals_and_init_functions_resolve() {
    let config = ConfigBuilder::new()
        .global("site", serde_json::json!("example"))
        .init_script("fn tag(name) { \"hh-\" + name }")
        .header_filter(HeaderFilterConfig::inline(
            r#"http.header["X-Site"] = tag(site);"#,
        ))
        .build()
        .unwrap();
    let (chain, _, _) = chain(&config);

    let mut req = HttpRequest::get("/").unwrap();
    assert!(chain.run(&mut req).await.is_continue());
    assert_eq!(req.header_out("x-site"), Some("hh-example"));
}

#[tokio::test]
async fn test_global_cannot_be_reassigned() {
    let config = ConfigBuilder::new()
        .global("site", serde_json::json!("example"))
        .header_filter(HeaderFilterConfig::inline(r#"site = "hijacked";"#))
        .build()
        .unwrap();
    let (chain, _, runtime) = chain(&config);

    let mut req = HttpRequest::get("/").unwrap();
    assert!(!chain.run(&mut req).await.is_continue());
    let site = runtime.engine().globals().get("site").unwrap().clone();
    assert_eq!(site.into_string().unwrap(), "example");
}

#[tokio::test]
async fn test_ctx_persists_across_invocations_of_one_request() {
    let (chain, _, _) = chain(&inline(
        r#"
        let n = http.ctx.runs;
        http.ctx.runs = if n == () { 1 } else { n + 1 };
        http.header["X-Runs"] = http.ctx.runs;
        "#,
    ));

    let mut req = HttpRequest::get("/").unwrap();
    assert!(chain.run(&mut req).await.is_continue());
    assert_eq!(req.header_out("x-runs"), Some("1"));

    // Same request through the chain again, as on an internal redirect
    assert!(chain.run(&mut req).await.is_continue());
    assert_eq!(req.header_out("x-runs"), Some("2"));
    assert_eq!(HookContext::get(&req).unwrap().invocations(), 2);
}

#[tokio::test]
async fn test_ctx_refuses_nested_request_objects() {
    let (chain, terminal, _) = chain(&inline(
        r#"
        if http.ctx.saved == () {
            http.ctx.saved = #{ headers: [http.header] };
        }
        http.header["X-Reached"] = "1";
        "#,
    ));

    let mut req = HttpRequest::get("/").unwrap();
    assert_eq!(
        chain.run(&mut req).await,
        FilterStatus::Abort(StatusCode::INTERNAL_SERVER_ERROR)
    );
    assert!(req.header_out("x-reached").is_none());
    assert_eq!(terminal.calls.load(Ordering::SeqCst), 0);
    let hook = HookContext::get(&req).unwrap();
    assert!(hook.ctx().map_or(true, |ctx| !ctx.contains_key("saved")));
}

#[tokio::test]
async fn test_operation_limit_is_a_script_fault() {
    let mut config = inline("loop { }");
    config.limits.max_operations = 500;
    let (chain, _, _) = chain(&config);

    let mut req = HttpRequest::get("/").unwrap();
    assert_eq!(
        chain.run(&mut req).await,
        FilterStatus::Abort(StatusCode::INTERNAL_SERVER_ERROR)
    );
}

#[tokio::test]
async fn test_location_handler_overrides_server() {
    let config = ConfigBuilder::new()
        .header_filter(HeaderFilterConfig::inline(r#"http.header["X-Scope"] = "server";"#))
        .location(
            LocationConfig::new("/api")
                .with_header_filter(HeaderFilterConfig::inline(r#"http.header["X-Scope"] = "api";"#)),
        )
        .build()
        .unwrap();
    let (chain, _, _) = chain(&config);

    let mut api = HttpRequest::get("/api/users").unwrap();
    assert!(chain.run(&mut api).await.is_continue());
    assert_eq!(api.header_out("x-scope"), Some("api"));

    let mut other = HttpRequest::get("/index.html").unwrap();
    assert!(chain.run(&mut other).await.is_continue());
    assert_eq!(other.header_out("x-scope"), Some("server"));
}
