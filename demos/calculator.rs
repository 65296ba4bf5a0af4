//! Calculator server and client in one process.
//!
//! Demonstrates:
//! - Exposing a root object with an action map
//! - Plain calls and calls returning remote instances
//! - Passing a listener the server fires events on
//! - Call-scoped and connection-scoped errors
//!
//! Usage:
//!   cargo run --example calculator
//!   cargo run --example calculator -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use socket_rmi::{
    ActionMap, Arguments, Client, ClientOptions, InvokeError, Listener, RemoteObject, Return,
    Server, args,
};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Server Objects
// ============================================================================

/// Stateless root object.
struct Calculator;

#[async_trait]
impl RemoteObject for Calculator {
    async fn invoke(&self, method: &str, args: Arguments) -> Result<Return, InvokeError> {
        match method {
            "add" => Ok(Return::value(args.value::<f64>(0)? + args.value::<f64>(1)?)?),
            "divide" => {
                let a: f64 = args.value(0)?;
                let b: f64 = args.value(1)?;
                if b == 0.0 {
                    return Err(InvokeError::call("division by zero"));
                }
                Ok(Return::value(a / b)?)
            }
            "accumulator" => Ok(Return::object(Accumulator::default())),
            "crash" => Err(InvokeError::uncatchable("Error", "calculator crashed")),
            other => Err(InvokeError::unknown_method(other)),
        }
    }
}

/// Running total returned by `accumulator`.
#[derive(Default)]
struct Accumulator {
    total: Mutex<f64>,
}

#[async_trait]
impl RemoteObject for Accumulator {
    async fn invoke(&self, method: &str, args: Arguments) -> Result<Return, InvokeError> {
        match method {
            "push" => {
                let listener = args.listener(1).ok();
                let total = {
                    let mut total = self.total.lock();
                    *total += args.value::<f64>(0)?;
                    *total
                };
                if let Some(listener) = listener {
                    listener.emit("onTotal", vec![total.into()])?;
                }
                Ok(Return::value(total)?)
            }
            "total" => Ok(Return::value(*self.total.lock())?),
            other => Err(InvokeError::unknown_method(other)),
        }
    }
}

fn calculator_actions() -> ActionMap {
    let accumulator = ActionMap::new().scalar("push", "number").scalar("total", "number");

    ActionMap::new()
        .scalar("add", "number")
        .scalar("divide", "number")
        .instance("accumulator", accumulator)
        .plain("crash")
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let debug = std::env::args().any(|arg| arg == "--debug");
    init_logging(debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    println!("=== Calculator ===\n");

    // ========================================================================
    // Server
    // ========================================================================

    let server = Server::builder()
        .actions(calculator_actions())
        .root(|| Arc::new(Calculator))
        .bind("127.0.0.1:0")
        .await?;

    let url = server.ws_url().context("server is not bound")?;
    println!("[Server] Listening on {url}");

    // ========================================================================
    // Client
    // ========================================================================

    let client = Client::builder(ClientOptions::new(&url)?)
        .on_connected(|root| println!("[Client] Connected, actions: {:?}", root.actions()))
        .on_disconnected(|| println!("[Client] Disconnected"))
        .on_error(|err| println!("[Client] Connection error: {err}"))
        .build();

    let calculator = client.connect().await?;

    let sum: f64 = calculator.call_value("add", args![1.5, 2.25]).await?;
    println!("[Call] add(1.5, 2.25) = {sum}");

    match calculator.call("divide", args![1, 0]).await {
        Ok(reply) => println!("[Call] divide(1, 0) = {reply:?}"),
        Err(e) => println!("[Call] divide(1, 0) failed: {e}"),
    }

    // ========================================================================
    // Remote Instances and Listeners
    // ========================================================================

    let accumulator = calculator.call_proxy("accumulator", args![]).await?;
    println!("[Call] accumulator() -> {}", accumulator.namespace());

    let listener = Listener::builder()
        .on("onTotal", |args| println!("        onTotal{args:?}"))
        .build()?;

    for value in [1.0, 2.0, 3.5] {
        let total: f64 = accumulator.call_value("push", args![value, &listener]).await?;
        println!("[Call] push({value}) = {total}");
    }

    // ========================================================================
    // Connection-Scoped Errors
    // ========================================================================

    let crash = {
        let calculator = calculator.clone();
        tokio::spawn(async move { calculator.call("crash", args![]).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    client.disconnect().await;
    println!("[Call] crash() settled after disconnect: {:?}", crash.await?.err());

    server.shutdown();
    println!("\n=== Done ===");
    Ok(())
}

// ============================================================================
// Logging
// ============================================================================

fn init_logging(debug: bool) {
    let filter = if debug {
        "socket_rmi=debug"
    } else {
        "socket_rmi=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
