//! Drives the bridge over real sockets with the host harness on the other end.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use studio_bridge::{routes, AppState, BrokerSettings, JobBroker, LivenessTracker, McpServer};
use studio_harness::{
    register_script_handlers, BridgeClient, HandlerRegistry, MemoryScriptHost, PollLoop,
    ScriptService,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct Bridge {
    base_url: String,
    state: AppState,
    mcp: McpServer,
}

async fn start_bridge(poll_timeout: Duration, job_timeout: Duration) -> Bridge {
    let liveness = Arc::new(LivenessTracker::new(Duration::from_secs(15)));
    let broker = Arc::new(JobBroker::new(
        liveness,
        BrokerSettings {
            job_timeout,
            max_pending_jobs: 256,
        },
    ));
    let state = AppState::new(broker, "studio", poll_timeout);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routes::router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Bridge {
        base_url: format!("http://{addr}"),
        mcp: McpServer::new(state.clone()),
        state,
    }
}

fn start_host(bridge: &Bridge, registry: HandlerRegistry) -> (watch::Sender<bool>, JoinHandle<()>) {
    let client = BridgeClient::new(bridge.base_url.clone(), "studio").unwrap();
    let poll_loop = PollLoop::new(client, registry)
        .with_backoff(Duration::from_millis(10), Duration::from_millis(100));
    let (stop, stopped) = watch::channel(false);
    (stop, tokio::spawn(poll_loop.run(stopped)))
}

async fn wait_until_connected(bridge: &Bridge) {
    while !bridge.state.liveness().is_connected("studio") {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn text_of(result: &Value) -> &str {
    result["content"][0]["text"].as_str().unwrap()
}

#[test_timeout::tokio_timeout_test(30, multi_thread)]
async fn patch_script_round_trip() {
    let bridge = start_bridge(Duration::from_secs(1), Duration::from_secs(10)).await;
    let host = MemoryScriptHost::new();
    host.insert("Workspace.Main", "local a = 1\nprint(a)\n");
    let mut registry = HandlerRegistry::new();
    register_script_handlers(&mut registry, Arc::new(ScriptService::new(host.clone(), 16)));
    let (stop, host_task) = start_host(&bridge, registry);
    wait_until_connected(&bridge).await;

    let result = bridge
        .mcp
        .call_tool(
            "roblox_patch_script",
            Some(json!({
                "path": "Workspace.Main",
                "patches": [{
                    "op": "replace",
                    "lineStart": 2,
                    "lineEnd": 2,
                    "expectedContent": "print(a)",
                    "content": "print(a + 1)",
                }],
            })),
        )
        .await;
    assert!(result.get("isError").is_none(), "{result}");
    let reply: Value = serde_json::from_str(text_of(&result)).unwrap();
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["newLineCount"], 2);
    assert_eq!(
        host.source("Workspace.Main").as_deref(),
        Some("local a = 1\nprint(a + 1)\n")
    );

    // The guard now describes stale content, so nothing is written.
    let result = bridge
        .mcp
        .call_tool(
            "roblox_patch_script",
            Some(json!({
                "path": "Workspace.Main",
                "patches": [{
                    "op": "delete",
                    "lineStart": 2,
                    "lineEnd": 2,
                    "expectedContent": "print(a)",
                }],
            })),
        )
        .await;
    assert_eq!(result["isError"], true);
    let error: Value = serde_json::from_str(text_of(&result)).unwrap();
    assert_eq!(error["code"], "content_mismatch");
    assert_eq!(error["actual"], "print(a + 1)");
    assert_eq!(
        host.source("Workspace.Main").as_deref(),
        Some("local a = 1\nprint(a + 1)\n")
    );

    let result = bridge
        .mcp
        .call_tool(
            "roblox_get_script_lines",
            Some(json!({ "pathArray": ["Workspace", "Main"], "startLine": 2, "endLine": 2 })),
        )
        .await;
    let lines: Value = serde_json::from_str(text_of(&result)).unwrap();
    assert_eq!(lines["lines"], json!([{ "line": 2, "text": "print(a + 1)" }]));

    stop.send(true).unwrap();
    host_task.await.unwrap();
}

#[test_timeout::tokio_timeout_test(30, multi_thread)]
async fn concurrent_calls_are_not_cross_wired() {
    let bridge = start_bridge(Duration::from_secs(1), Duration::from_secs(10)).await;
    let mut registry = HandlerRegistry::new();
    registry.register("run_code", |args: Value| async move {
        let code = args["code"].as_str().unwrap_or_default().to_string();
        let n: u64 = code.trim_start_matches("return ").parse().unwrap_or(0);
        // Later calls finish first.
        tokio::time::sleep(Duration::from_millis(200 - n * 8)).await;
        Ok::<_, Value>(json!({ "echo": code }))
    });
    let (stop, host_task) = start_host(&bridge, registry);
    wait_until_connected(&bridge).await;

    let calls: Vec<_> = (0..20u64)
        .map(|n| {
            let mcp = bridge.mcp.clone();
            tokio::spawn(async move {
                let result = mcp
                    .call_tool("roblox_run_code", Some(json!({ "code": format!("return {n}") })))
                    .await;
                (n, result)
            })
        })
        .collect();
    for call in calls {
        let (n, result) = call.await.unwrap();
        let reply: Value = serde_json::from_str(text_of(&result)).unwrap();
        assert_eq!(reply["echo"], format!("return {n}"));
    }
    assert_eq!(bridge.state.broker().pending_jobs(), 0);

    stop.send(true).unwrap();
    host_task.await.unwrap();
}

#[test_timeout::tokio_timeout_test(30, multi_thread)]
async fn host_errors_and_aliases_reach_the_caller() {
    let bridge = start_bridge(Duration::from_secs(1), Duration::from_secs(10)).await;
    let mut registry = HandlerRegistry::new();
    registry.register("undo", |_args: Value| async move {
        Err::<Value, _>(json!("nothing to undo"))
    });
    registry.register("run_script_in_play_mode", |args: Value| async move {
        Ok::<_, Value>(args["code"].clone())
    });
    let (stop, host_task) = start_host(&bridge, registry);
    wait_until_connected(&bridge).await;

    let result = bridge.mcp.call_tool("roblox_undo", None).await;
    assert_eq!(result["isError"], true);
    assert_eq!(text_of(&result), "nothing to undo");

    let result = bridge
        .mcp
        .call_tool(
            "roblox_run_script_in_play_mode",
            Some(json!({ "source": "print('hi')" })),
        )
        .await;
    assert_eq!(text_of(&result), "\"print('hi')\"");

    // No handler registered on the host side for this job type.
    let result = bridge.mcp.call_tool("roblox_get_place_info", None).await;
    assert_eq!(result["isError"], true);
    assert_eq!(text_of(&result), "unknown job type: get_place_info");

    stop.send(true).unwrap();
    host_task.await.unwrap();
}

#[test_timeout::tokio_timeout_test(30, multi_thread)]
async fn health_answers_while_a_poll_is_held() {
    let bridge = start_bridge(Duration::from_secs(5), Duration::from_secs(10)).await;
    let client = BridgeClient::new(bridge.base_url.clone(), "studio").unwrap();
    let held = tokio::spawn(async move { client.poll().await });
    wait_until_connected(&bridge).await;

    let started = Instant::now();
    let health: Value = reqwest::get(format!("{}/health", bridge.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["ok"], true);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!held.is_finished());

    let idle = held.await.unwrap().unwrap();
    assert!(idle.is_none());
}

#[test_timeout::tokio_timeout_test(30, multi_thread)]
async fn abandoned_call_leaves_nothing_pending() {
    let bridge = start_bridge(Duration::from_secs(1), Duration::from_secs(10)).await;
    bridge.state.liveness().touch("studio");

    let mcp = bridge.mcp.clone();
    let call = tokio::spawn(async move { mcp.call_tool("roblox_get_selection", None).await });
    while bridge.state.broker().pending_jobs() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    call.abort();
    let _ = call.await;
    assert_eq!(bridge.state.broker().pending_jobs(), 0);

    let body: Value = reqwest::get(format!("{}/poll", bridge.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "ok": true, "job": null }));
}

#[test_timeout::tokio_timeout_test(30, multi_thread)]
async fn late_results_are_acknowledged_and_dropped() {
    let bridge = start_bridge(Duration::from_secs(1), Duration::from_secs(1)).await;
    bridge.state.liveness().touch("studio");

    let mcp = bridge.mcp.clone();
    let call = tokio::spawn(async move { mcp.call_tool("roblox_get_selection", None).await });
    let client = BridgeClient::new(bridge.base_url.clone(), "studio").unwrap();
    let job = client.poll().await.unwrap().expect("job queued");

    let result = call.await.unwrap();
    assert_eq!(result["isError"], true);
    assert!(text_of(&result).starts_with("Timed out waiting for Studio"));

    client
        .post_result(&bridge_proto::JobResult::success(job.job_id, json!([])))
        .await
        .unwrap();
    assert_eq!(bridge.state.broker().pending_jobs(), 0);
}
