//! In-process tests for the request lifecycle, without a socket.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bweb::http::request::Method;
use bweb::http::response::{Response, StatusCode};
use bweb::pipeline::{Callable, Context, Dispatcher, Flow, Handler, HandlerResult, Sink, Stage};
use bweb::{Error, Server};
use parking_lot::Mutex;

async fn run(dispatcher: &Dispatcher, method: Method, target: &str) -> (Stage, Option<Response>) {
    let ctx = Context::new(method, target).unwrap();
    let (sink, rx) = Sink::new();
    let stage = dispatcher.dispatch(ctx, sink).await;
    (stage, rx.await.ok())
}

fn flag_route(seen: &Arc<AtomicBool>) -> Handler {
    let seen = Arc::clone(seen);
    Handler::future(move |_ctx, sink| {
        let seen = Arc::clone(&seen);
        Box::pin(async move {
            seen.store(true, Ordering::SeqCst);
            sink.end();
            Ok(Flow::Done)
        })
    })
}

#[tokio::test]
async fn test_matched_route_runs_and_ends_empty() {
    let seen = Arc::new(AtomicBool::new(false));
    let mut server = Server::new();
    server.get("/", flag_route(&seen)).unwrap();
    let dispatcher = server.dispatcher();

    let (stage, response) = run(&dispatcher, Method::GET, "/").await;
    let response = response.unwrap();

    assert_eq!(stage, Stage::Finalized);
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.is_empty());
    assert_eq!(response.headers.get("Content-Length"), Some("0"));
    assert!(seen.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_unmatched_route_is_404_and_other_handlers_stay_idle() {
    let seen = Arc::new(AtomicBool::new(false));
    let mut server = Server::new();
    server.get("/foobar", flag_route(&seen)).unwrap();
    server.post("/foo", flag_route(&seen)).unwrap();
    let dispatcher = server.dispatcher();

    let (_, response) = run(&dispatcher, Method::POST, "/").await;
    let response = response.unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.status.reason_phrase(), "Not Found");
    assert_eq!(response.body, b"HTTP Error: 404.");

    let (_, response) = run(&dispatcher, Method::GET, "/").await;
    assert_eq!(response.unwrap().status, StatusCode::NOT_FOUND);

    assert!(!seen.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_first_registered_route_shadows_later_one() {
    let hits = Arc::new(Mutex::new(Vec::new()));
    let mut server = Server::new();

    for name in ["first", "second"] {
        let hits = Arc::clone(&hits);
        server
            .get("/user/:id", Handler::sync(move |ctx, sink| {
                hits.lock().push(format!("{name}:{}", ctx.param("id").unwrap_or_default()));
                sink.end();
                Ok(Flow::Done)
            }))
            .unwrap();
    }
    let dispatcher = server.dispatcher();

    run(&dispatcher, Method::GET, "/user/42").await;

    assert_eq!(*hits.lock(), vec!["first:42".to_string()]);
}

#[tokio::test]
async fn test_middleware_runs_in_order_and_sees_earlier_mutations() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut server = Server::new();

    {
        let order = Arc::clone(&order);
        server.use_middleware(Handler::future(move |ctx, _sink| {
            let order = Arc::clone(&order);
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                order.lock().push("slow");
                ctx.query.insert("tag".into(), "set-by-first".into());
                Ok(Flow::Next)
            })
        }));
    }
    {
        let order = Arc::clone(&order);
        server.use_middleware(Handler::sync(move |ctx, _sink| {
            order.lock().push("fast");
            assert_eq!(ctx.query_str("tag"), Some("set-by-first"));
            Ok(Flow::Next)
        }));
    }
    {
        let order = Arc::clone(&order);
        server
            .get("/", Handler::sync(move |_ctx, sink| {
                order.lock().push("route");
                sink.end();
                Ok(Flow::Done)
            }))
            .unwrap();
    }
    let dispatcher = server.dispatcher();

    let (_, response) = run(&dispatcher, Method::GET, "/").await;

    assert_eq!(response.unwrap().status, StatusCode::OK);
    assert_eq!(*order.lock(), vec!["slow", "fast", "route"]);
}

#[tokio::test]
async fn test_middleware_closing_sink_short_circuits() {
    let seen = Arc::new(AtomicBool::new(false));
    let later = Arc::new(AtomicBool::new(false));
    let mut server = Server::new();

    server.use_middleware(Handler::sync(|_ctx, sink| {
        sink.send(StatusCode::from_u16(401).unwrap(), "nope", "text/plain");
        // Returning Next does not matter once the sink is closed.
        Ok(Flow::Next)
    }));
    {
        let later = Arc::clone(&later);
        server.use_middleware(Handler::sync(move |_ctx, _sink| {
            later.store(true, Ordering::SeqCst);
            Ok(Flow::Next)
        }));
    }
    server.get("/", flag_route(&seen)).unwrap();
    let dispatcher = server.dispatcher();

    let (_, response) = run(&dispatcher, Method::GET, "/").await;
    let response = response.unwrap();

    assert_eq!(response.status.as_u16(), 401);
    assert_eq!(response.body, b"nope");
    assert!(!later.load(Ordering::SeqCst));
    assert!(!seen.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_done_without_close_ends_response() {
    let mut server = Server::new();
    server.use_middleware(Handler::sync(|_ctx, sink| {
        sink.set_status(StatusCode::NO_CONTENT);
        sink.set_header("X-Handled", "yes");
        Ok(Flow::Done)
    }));
    let dispatcher = server.dispatcher();

    let (_, response) = run(&dispatcher, Method::GET, "/anything").await;
    let response = response.unwrap();

    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert_eq!(response.headers.get("x-handled"), Some("yes"));
}

#[tokio::test]
async fn test_route_returning_next_without_response_is_404() {
    let mut server = Server::new();
    server.get("/", Handler::sync(|_ctx, _sink| Ok(Flow::Next))).unwrap();
    let dispatcher = server.dispatcher();

    let (_, response) = run(&dispatcher, Method::GET, "/").await;

    assert_eq!(response.unwrap().status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mounted_middleware_only_runs_under_its_path() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut server = Server::new();
    {
        let calls = Arc::clone(&calls);
        server
            .mount("/api", Handler::sync(move |_ctx, _sink| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Flow::Next)
            }))
            .unwrap();
    }
    let dispatcher = server.dispatcher();

    run(&dispatcher, Method::GET, "/api/v1/items").await;
    run(&dispatcher, Method::GET, "/api").await;
    run(&dispatcher, Method::GET, "/apiary").await;
    run(&dispatcher, Method::GET, "/").await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_handler_error_becomes_500_and_is_reported() {
    let mut server = Server::new();
    server
        .get("/boom", Handler::sync(|_ctx, _sink| Err(anyhow::anyhow!("database unavailable"))))
        .unwrap();
    let mut errors = server.subscribe_errors();
    let dispatcher = server.dispatcher();

    let (stage, response) = run(&dispatcher, Method::GET, "/boom").await;
    let response = response.unwrap();

    assert_eq!(stage, Stage::Finalized);
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body, b"HTTP Error: 500.");

    let report = errors.try_recv().unwrap();
    assert_eq!(report.method, Method::GET);
    assert_eq!(report.pathname, "/boom");
    assert!(matches!(*report.error, Error::HandlerFault(ref msg) if msg.contains("database unavailable")));
}

struct Exploding;

impl Callable for Exploding {
    async fn call(&self, _ctx: &mut Context, _sink: &Sink) -> HandlerResult {
        tokio::task::yield_now().await;
        panic!("handler exploded");
    }
}

#[tokio::test]
async fn test_panicking_handler_is_contained() {
    let mut server = Server::new();
    server.get("/panic", Handler::object(Exploding)).unwrap();
    let dispatcher = server.dispatcher();

    let (_, response) = run(&dispatcher, Method::GET, "/panic").await;
    assert_eq!(response.unwrap().status, StatusCode::INTERNAL_SERVER_ERROR);

    // The dispatcher is still usable afterwards.
    let (_, response) = run(&dispatcher, Method::GET, "/missing").await;
    assert_eq!(response.unwrap().status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_custom_error_handler_formats_faults() {
    let mut server = Server::new();
    server
        .post("/fail", Handler::sync(|_ctx, _sink| Err(anyhow::anyhow!("bad input"))))
        .unwrap();
    server.on_error(|err, _ctx, sink| {
        let body = serde_json::json!({ "error": err.to_string() });
        let _ = sink.json(StatusCode::from_u16(422).unwrap(), &body);
    });
    let dispatcher = server.dispatcher();

    let (_, response) = run(&dispatcher, Method::POST, "/fail").await;
    let response = response.unwrap();

    assert_eq!(response.status.as_u16(), 422);
    assert_eq!(response.headers.get("content-type"), Some("application/json"));
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert!(body["error"].as_str().unwrap().contains("bad input"));
}

#[tokio::test]
async fn test_error_handler_that_leaves_sink_open_falls_back_to_500() {
    let mut server = Server::new();
    server
        .get("/", Handler::sync(|_ctx, _sink| Err(anyhow::anyhow!("nope"))))
        .unwrap();
    server.on_error(|_err, _ctx, sink| sink.set_header("X-Seen", "1"));
    let dispatcher = server.dispatcher();

    let (_, response) = run(&dispatcher, Method::GET, "/").await;
    let response = response.unwrap();

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers.get("X-Seen"), Some("1"));
}

#[tokio::test]
async fn test_aborted_sink_stops_the_pipeline() {
    let seen = Arc::new(AtomicBool::new(false));
    let mut server = Server::new();
    server.get("/", flag_route(&seen)).unwrap();
    let dispatcher = server.dispatcher();

    let ctx = Context::new(Method::GET, "/").unwrap();
    let (sink, rx) = Sink::new();
    assert!(sink.abort());

    let stage = dispatcher.dispatch(ctx, sink).await;

    assert_eq!(stage, Stage::Aborted);
    assert!(rx.await.is_err());
    assert!(!seen.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_abort_during_handler_is_observed_and_late_end_is_noop() {
    let observed = Arc::new(Mutex::new(None));
    let late_close = Arc::new(Mutex::new(None));
    let mut server = Server::new();
    {
        let observed = Arc::clone(&observed);
        let late_close = Arc::clone(&late_close);
        server
            .get("/slow", Handler::future(move |_ctx, sink| {
                let observed = Arc::clone(&observed);
                let late_close = Arc::clone(&late_close);
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    *observed.lock() = Some(sink.is_closed());
                    *late_close.lock() = Some(sink.end());
                    Ok(Flow::Done)
                })
            }))
            .unwrap();
    }
    let dispatcher = server.dispatcher();

    let ctx = Context::new(Method::GET, "/slow").unwrap();
    let aborted_events = Arc::new(AtomicUsize::new(0));
    {
        let aborted_events = Arc::clone(&aborted_events);
        ctx.on_error(move |err| {
            assert!(err.is_aborted());
            aborted_events.fetch_add(1, Ordering::SeqCst);
        });
    }
    let events = ctx.events().clone();
    let (sink, rx) = Sink::new();

    let task = {
        let sink = sink.clone();
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.dispatch(ctx, sink).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(sink.abort());
    events.emit(&Error::ConnectionAborted("client disconnected".into()));
    assert!(!sink.abort());

    assert_eq!(task.await.unwrap(), Stage::Aborted);
    assert!(rx.await.is_err());
    assert_eq!(*observed.lock(), Some(true));
    assert_eq!(*late_close.lock(), Some(false));
    assert_eq!(aborted_events.load(Ordering::SeqCst), 1);
}
