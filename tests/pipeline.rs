//! End-to-end request pipeline, dispatched in-process.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use serde::{Deserialize, Serialize};
use serde_json::json;
use weft::template::{JinjaEngine, MemoryFs};
use weft::{Context, HandleFunc, Middleware, Server, handler, middleware};

fn request(method: &str, uri: &str, body: impl Into<Bytes>) -> http::Request<Bytes> {
    http::Request::builder().method(method).uri(uri).body(body.into()).unwrap()
}

async fn body_string(resp: http::Response<Full<Bytes>>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[derive(Debug, Deserialize, Serialize)]
struct Counter {
    count: i64,
}

#[tokio::test]
async fn json_increment() {
    let mut server = Server::new();
    server
        .post(
            "/increment",
            handler(|ctx| {
                Box::pin(async move {
                    match ctx.bind_json::<Counter>() {
                        Ok(c) => ctx.resp_json_ok(&Counter { count: c.count + 1 }).unwrap(),
                        Err(e) => ctx.resp_error(&e),
                    }
                })
            }),
        )
        .unwrap();

    let resp = server.serve_http(request("POST", "/increment", r#"{"count":41}"#)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "application/json; charset=utf-8");
    assert_eq!(body_string(resp).await, r#"{"count":42}"#);

    let resp = server.serve_http(request("POST", "/increment", "")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = server.serve_http(request("POST", "/increment", "{not json")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn path_and_query_parameters() {
    let mut server = Server::new();
    server
        .handle(
            "GET /users/{id}/posts/{post}",
            handler(|ctx| {
                Box::pin(async move {
                    let id = ctx.path_value("id").to_i64();
                    let post = ctx.path_value("post").string().unwrap_or_default();
                    let page = ctx.default_query_value("page", "1").string().unwrap_or_default();
                    match id {
                        Ok(id) => ctx.write_string(format!("user={id} post={post} page={page}")),
                        Err(e) => ctx.resp_error(&e),
                    }
                })
            }),
        )
        .unwrap();

    let resp = server.serve_http(request("GET", "/users/7/posts/hello%20world?page=3", "")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "user=7 post=hello world page=3");

    let resp = server.serve_http(request("GET", "/users/7/posts/x", "")).await;
    assert_eq!(body_string(resp).await, "user=7 post=x page=1");

    let resp = server.serve_http(request("GET", "/users/abc/posts/x", "")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn template_rendering() {
    let fs = MemoryFs::new()
        .with_file("views/index.html", "<h1>{{ Title }}</h1>")
        .with_file("views/notes.txt", "ignored");
    let engine = JinjaEngine::from_vfs(&fs, "views/*.html").unwrap();

    let mut server = Server::new();
    server.template_engine(Arc::new(engine));
    server
        .get(
            "/",
            handler(|ctx| {
                Box::pin(async move {
                    if let Err(e) = ctx.resp_template("index.html", &json!({ "Title": "Hello" })) {
                        ctx.resp_error(&e);
                    }
                })
            }),
        )
        .unwrap();
    server
        .get(
            "/missing",
            handler(|ctx| {
                Box::pin(async move {
                    if let Err(e) = ctx.resp_template("notes.txt", &json!({})) {
                        ctx.resp_error(&e);
                    }
                })
            }),
        )
        .unwrap();

    let resp = server.serve_http(request("GET", "/", "")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "text/html; charset=utf-8");
    assert_eq!(body_string(resp).await, "<h1>Hello</h1>");

    let resp = server.serve_http(request("GET", "/missing", "")).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

fn recording(log: Arc<Mutex<Vec<String>>>, name: &'static str) -> Middleware {
    middleware(move |next: HandleFunc| {
        let log = log.clone();
        handler(move |ctx| {
            let next = next.clone();
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push(format!("{name}>"));
                next.call(ctx).await;
                log.lock().unwrap().push(format!("<{name}"));
            })
        })
    })
}

#[tokio::test]
async fn middleware_order_wraps_the_handler() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut server = Server::new();
    server.use_middleware(recording(log.clone(), "a"));
    server.use_middlewares([recording(log.clone(), "b"), recording(log.clone(), "c")]);

    let inner = log.clone();
    server
        .get(
            "/{$}",
            handler(move |ctx| {
                let inner = inner.clone();
                Box::pin(async move {
                    inner.lock().unwrap().push("handler".to_owned());
                    ctx.write_string("ok");
                })
            }),
        )
        .unwrap();

    let resp = server.serve_http(request("GET", "/", "")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        *log.lock().unwrap(),
        ["a>", "b>", "c>", "handler", "<c", "<b", "<a"]
    );

    // Unrouted requests still pass through every middleware.
    log.lock().unwrap().clear();
    let resp = server.serve_http(request("GET", "/nowhere", "")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(*log.lock().unwrap(), ["a>", "b>", "c>", "<c", "<b", "<a"]);
}

#[tokio::test]
async fn middleware_can_short_circuit() {
    let mut server = Server::new();
    server.use_middleware(middleware(|next: HandleFunc| {
        handler(move |ctx: &mut Context| {
            let next = next.clone();
            Box::pin(async move {
                if ctx.header("authorization").is_none() {
                    ctx.set_status(StatusCode::UNAUTHORIZED);
                    return;
                }
                next.call(ctx).await;
            })
        })
    }));
    server.get("/", handler(|ctx| Box::pin(async move { ctx.write_string("secret") }))).unwrap();

    let resp = server.serve_http(request("GET", "/", "")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(resp).await, "");

    let req = http::Request::builder()
        .uri("/")
        .header("authorization", "token")
        .body(Bytes::new())
        .unwrap();
    assert_eq!(body_string(server.serve_http(req).await).await, "secret");
}

async fn get_body(server: &Server, uri: &str) -> String {
    body_string(server.serve_http(request("GET", uri, "")).await).await
}

#[tokio::test]
async fn routing_priorities_end_to_end() {
    let echo = |label: &'static str| handler(move |ctx| Box::pin(async move { ctx.write_string(label) }));
    let mut server = Server::new();
    server.get("/{$}", echo("root")).unwrap();
    server.get("/assets/", echo("subtree")).unwrap();
    server.get("/files/{name...}", echo("wildcard")).unwrap();
    server.get("/files/readme", echo("literal")).unwrap();

    assert_eq!(get_body(&server, "/").await, "root");
    assert_eq!(get_body(&server, "/files/readme").await, "literal");
    assert_eq!(get_body(&server, "/files/a/b.txt").await, "wildcard");
    assert_eq!(get_body(&server, "/assets/css/site.css").await, "subtree");

    let resp = server.serve_http(request("GET", "/other", "")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // A bare `/` is the catch-all subtree, below every other route.
    server.get("/", echo("fallback")).unwrap();
    assert_eq!(get_body(&server, "/other").await, "fallback");
    assert_eq!(get_body(&server, "/").await, "root");
    assert_eq!(get_body(&server, "/files/readme").await, "literal");
    let resp = server.serve_http(request("POST", "/files/readme", "")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn defaults_for_unset_status_and_no_route() {
    let mut server = Server::new();
    server.get("/quiet", handler(|_ctx| Box::pin(async {}))).unwrap();

    let resp = server.serve_http(request("GET", "/quiet", "")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-length"], "0");

    let resp = server.serve_http(request("GET", "/absent", "")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

fn explode() {
    panic!("kaboom")
}

#[tokio::test]
async fn panics_are_recovered_into_500() {
    let mut server = Server::new();
    server.use_middlewares([weft::middleware::access_log(), weft::middleware::recovery()]);
    server.get("/boom", handler(|_ctx| Box::pin(async { explode() }))).unwrap();
    server.get("/fine", handler(|ctx| Box::pin(async move { ctx.write_string("fine") }))).unwrap();

    let resp = server.serve_http(request("GET", "/boom", "")).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(resp).await, "internal server error");

    let resp = server.serve_http(request("GET", "/fine", "")).await;
    assert_eq!(body_string(resp).await, "fine");
}
