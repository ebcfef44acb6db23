//! A complete example showing how to build pipelines with Pipeforge.
//!
//! This example demonstrates:
//! - Wrapping plain functions into nodes
//! - Chaining nodes with `>>` and fanning out to several branches
//! - Mixing sync and async steps in one pipeline
//! - Guarding a step with input checks
//! - Routing inputs through a conditional gateway
//! - Reading the single wrapped error of a failed run
//! - Rendering the pipeline as a Graphviz graph

use pipeforge::prelude::*;
use serde_json::json;
use std::time::Duration;

// ============================================================================
// Step 1: Plain Steps
// ============================================================================

fn number(value: &NodeValue) -> f64 {
    value.as_f64().unwrap_or_default()
}

fn square() -> Node {
    transformer("square", signature!("float -> float"), |x| {
        let x = number(&x);
        Ok(json!(x * x))
    })
}

fn half() -> Node {
    transformer("half", signature!("float -> float"), |x| Ok(json!(number(&x) / 2.0)))
}

fn natural_logarithm() -> Node {
    let log = transformer("natural_logarithm", signature!("float -> float"), |x| {
        Ok(json!(number(&x).ln()))
    });
    Ensure::new()
        .incoming(|x| {
            if number(x) > 0.0 {
                Ok(())
            } else {
                Err(format!("logarithm of non-positive value {x}").into())
            }
        })
        .apply(&log)
}

// ============================================================================
// Step 2: An Async Step
// ============================================================================

fn fetch() -> Node {
    async_transformer("fetch", signature!("str -> dict[str, str]"), |url| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(json!({ "url": url, "status": "ok" }))
    })
}

// ============================================================================
// Step 3: Build, Run and Draw
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), BoxError> {
    println!("=== {} {} ===\n", pipeforge::NAME, pipeforge::VERSION);

    // Serial: square then half.
    let arithmetic = (square() >> half())?;
    println!("[Arithmetic] {arithmetic}");
    println!("[Arithmetic] 4 -> {}", arithmetic.call(json!(4))?);

    // Diverging: the fetched document goes to both branches.
    let keys = transformer("keys", signature!("dict[str, str] -> list[str]"), |doc| {
        let keys = doc.as_object().map(|o| o.keys().map(|k| json!(k)).collect()).unwrap_or_default();
        Ok(NodeValue::Array(keys))
    });
    let report = fetch().then([keys, forward()])?;
    println!("[Report] {report}");
    println!("[Report] {}", report.call_async(json!("http://x")).await?);

    // A failing run names the step that failed.
    let guarded = (half() >> natural_logarithm())?;
    match guarded.call(json!(0)) {
        Ok(value) => println!("[Guarded] {value}"),
        Err(err) => {
            println!("[Guarded] failed in \"{}\": {}", err.raiser().label, err.cause());
            println!("[Guarded] {}", err.location_hint());
        }
    }

    // Conditional: positive inputs get their logarithm, the rest become null.
    let if_positive = condition("if_positive", |x| number(x) > 0.0);
    let routed = (half() >> if_positive.then(natural_logarithm()).otherwise_none())?;
    println!("[Routed] {routed}");
    for input in [json!(8), json!(-2)] {
        println!("[Routed] {input} -> {}", routed.call(input.clone())?);
    }

    println!("\n{}", report.graph().to_dot(true));
    Ok(())
}
