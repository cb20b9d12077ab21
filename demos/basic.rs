//! weft tour: JSON, path parameters, sessions, files and middleware.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -X POST localhost:8080/increment -d '{"count":1}'
//!   curl localhost:8080/users/42?verbose=true
//!   curl -c jar -X POST localhost:8080/login -d 'user=ada'
//!   curl -b jar localhost:8080/me
//!   curl -b jar -X POST localhost:8080/logout
//!   curl -F myfile=@Cargo.toml localhost:8080/upload
//!   curl localhost:8080/download?file=Cargo.toml
//!   curl localhost:8080/static/Cargo.toml
//!   curl localhost:8080/panic

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use weft::files::{FileDownloader, FileUploader, StaticResourceHandler};
use weft::session::{CookiePropagator, Manager, MemoryStore, generate_id};
use weft::{BoxFuture, Context, Server, ServerConfig, handler, middleware};

const UPLOAD_DIR: &str = "./uploads";

#[derive(Deserialize, Serialize)]
struct Counter {
    count: i64,
}

#[tokio::main]
async fn main() -> weft::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };

    let store = MemoryStore::new(Duration::from_secs(15 * 60));
    let _sweeper = store.spawn_sweeper(Duration::from_secs(60));
    let sessions = Manager::new(Arc::new(store), Arc::new(CookiePropagator::new()));

    let mut server = Server::with_config(config);
    server.session_manager(Arc::new(sessions));
    server.use_middlewares([
        middleware::access_log(),
        middleware::recovery(),
        middleware::rate_limit(100, 50.0),
    ]);

    server.post("/increment", handler(increment))?;
    server.get("/users/{id}", handler(get_user))?;
    server.post("/login", handler(login))?;
    server.get("/me", handler(me))?;
    server.post("/logout", handler(logout))?;
    server.get("/panic", handler(|_ctx| Box::pin(async { explode() })))?;

    server.post("/upload", FileUploader::new("myfile", |h| format!("{UPLOAD_DIR}/{}", h.file_name).into()))?;
    server.get("/download", FileDownloader::new(UPLOAD_DIR))?;
    server.get("/static/{file}", StaticResourceHandler::new("."))?;

    server.serve().await
}

fn increment(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move {
        let result = ctx
            .bind_json::<Counter>()
            .and_then(|c| ctx.resp_json_ok(&Counter { count: c.count + 1 }));
        if let Err(e) = result {
            ctx.resp_error(&e);
        }
    })
}

fn get_user(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move {
        let id = match ctx.path_value("id").to_i64() {
            Ok(id) => id,
            Err(e) => return ctx.resp_error(&e),
        };
        let verbose = ctx.default_query_value("verbose", "false").string().unwrap_or_default();
        let _ = ctx.resp_json_ok(&serde_json::json!({ "id": id, "verbose": verbose == "true" }));
    })
}

fn login(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move {
        let Some(manager) = ctx.session_manager() else { return };
        let user = match ctx.form_value("user").string() {
            Ok(user) => user,
            Err(e) => return ctx.resp_error(&e),
        };
        let result = async {
            let session = manager.init_session(ctx, &generate_id()).await?;
            session.set_as("user", &user).await
        }
        .await;
        match result {
            Ok(()) => ctx.write_string(format!("hello {user}")),
            Err(e) => ctx.resp_error(&e),
        }
    })
}

fn me(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move {
        let Some(manager) = ctx.session_manager() else { return };
        let user = match manager.get_session(ctx).await {
            Ok(session) => session.get_as::<String>("user").await,
            Err(e) => Err(e),
        };
        match user {
            Ok(user) => ctx.write_string(user),
            Err(e) => ctx.resp_error(&e),
        }
    })
}

fn logout(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move {
        let Some(manager) = ctx.session_manager() else { return };
        match manager.remove_session(ctx).await {
            Ok(()) => ctx.write_string("bye"),
            Err(e) => ctx.resp_error(&e),
        }
    })
}

fn explode() {
    panic!("the recovery middleware turns this into a 500")
}
