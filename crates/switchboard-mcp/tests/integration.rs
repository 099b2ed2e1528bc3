//! Integration tests for the MCP supervisor, client and dispatcher.
//!
//! These tests launch the `mock-mcp-server` binary to exercise the full
//! protocol flow over real child processes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use switchboard_mcp::{
    Aggregate, DispatchConfig, Dispatcher, EMPTY_CONTENT_TEXT, FailureHint, McpClient,
    McpServerConfig, McpSupervisor, SupervisorOptions, ToolCall, ToolConnection, ToolInvoker,
    child_env,
};

const MOCK_SERVER: &str = env!("CARGO_BIN_EXE_mock-mcp-server");

fn mock(key: &str, args: &[&str]) -> McpServerConfig {
    McpServerConfig::new(key, MOCK_SERVER).with_args(args.iter().map(|a| a.to_string()).collect())
}

fn supervisor() -> McpSupervisor {
    McpSupervisor::new(SupervisorOptions {
        request_timeout: Duration::from_secs(10),
        probe_timeout: Duration::from_secs(5),
        ..SupervisorOptions::default()
    })
}

fn fast_retries() -> DispatchConfig {
    DispatchConfig {
        max_retries: 3,
        retry_delay: Duration::from_millis(20),
        call_timeout: Duration::from_secs(10),
    }
}

fn dispatcher(supervisor: &McpSupervisor, aggregate: Aggregate) -> Dispatcher {
    Dispatcher::new(Arc::new(aggregate.registry), supervisor.connections())
        .with_config(fast_retries())
}

async fn launch(args: &[&str]) -> McpClient {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    McpClient::launch(
        "test",
        Path::new(MOCK_SERVER),
        &args,
        &child_env(&[]),
        Duration::from_secs(10),
    )
    .expect("failed to launch mock server")
}

#[tokio::test]
async fn test_connect_and_initialize() {
    let mut client = launch(&["--name", "alpha"]).await;

    let server_info = client.initialize().await.expect("failed to initialize");
    assert_eq!(server_info.name, "alpha");
    assert_eq!(server_info.version, "1.0.0");
    assert!(client.is_initialized());
    assert!(client.is_connected());

    client.shutdown().await.unwrap();
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_list_tools() {
    let mut client = launch(&["--tools", "echo,add"]).await;
    client.initialize().await.unwrap();

    let tools = client.list_tools(Duration::from_secs(5)).await.unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["echo", "add"]);
    assert_eq!(tools[0].description.as_deref(), Some("Echo back the input"));
    assert!(tools[0].input_schema.is_some());
}

#[tokio::test]
async fn test_requests_before_initialize_fail() {
    let client = launch(&[]).await;
    let err = client.list_tools(Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(err, switchboard_mcp::McpError::NotInitialized));
}

#[tokio::test]
async fn test_call_echo_tool() {
    let mut client = launch(&[]).await;
    client.initialize().await.unwrap();

    let result = client
        .call_tool("echo", Some(json!({"message": "Hello, MCP!"})), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(!result.is_error());
    assert_eq!(result.content().normalize(), "Hello, MCP!");
}

#[tokio::test]
async fn test_concurrent_calls_on_one_connection() {
    let mut client = launch(&[]).await;
    client.initialize().await.unwrap();
    let client = Arc::new(client);

    let calls = (0..5).map(|i| {
        let client = client.clone();
        async move {
            client
                .call_tool("add", Some(json!({"a": i, "b": 1})), Duration::from_secs(5))
                .await
                .map(|r| r.content().normalize())
        }
    });
    let results = futures::future::join_all(calls).await;

    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap(), format!("{}", i as f64 + 1.0));
    }
}

#[tokio::test]
async fn test_two_servers_distinct_tools() {
    let supervisor = supervisor();
    let configs = vec![
        mock("alpha", &["--tools", "echo"]),
        mock("beta", &["--tools", "add"]),
    ];

    let aggregate = supervisor.connect_all(&configs, false).await;
    assert_eq!(aggregate.connected, vec!["alpha", "beta"]);
    assert_eq!(aggregate.registry.len(), 2);
    assert_eq!(aggregate.registry.resolve("echo"), Some("alpha"));
    assert_eq!(aggregate.registry.resolve("add"), Some("beta"));
    assert!(aggregate.failures.is_empty());

    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn test_failed_server_is_isolated() {
    let supervisor = supervisor();
    let configs = vec![
        mock("first", &["--tools", "echo"]),
        McpServerConfig::new("broken", "nonexistent-mcp-server-12345"),
        mock("third", &["--tools", "add"]),
    ];

    let aggregate = supervisor.connect_all(&configs, false).await;
    assert_eq!(aggregate.connected, vec!["first", "third"]);
    assert_eq!(aggregate.failures.len(), 1);
    assert_eq!(aggregate.failures[0].key, "broken");
    assert_eq!(aggregate.failures[0].hint, FailureHint::MissingExecutable);

    assert!(supervisor.connection("first").is_some());
    assert!(supervisor.connection("broken").is_none());
    assert!(supervisor.connection("third").is_some());
    assert_eq!(aggregate.registry.resolve("echo"), Some("first"));
    assert_eq!(aggregate.registry.resolve("add"), Some("third"));

    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn test_only_invalid_server() {
    let supervisor = supervisor();
    let configs = vec![McpServerConfig::new("invalid", "nonexistent-command-12345")];

    let aggregate = supervisor.connect_all(&configs, false).await;
    assert!(aggregate.connected.is_empty());
    assert!(aggregate.registry.is_empty());
    assert_eq!(supervisor.connection_count(), 0);
}

#[tokio::test]
async fn test_server_exiting_immediately() {
    let supervisor = supervisor();
    let configs = vec![mock("quitter", &["--exit-immediately"])];

    let aggregate = supervisor.connect_all(&configs, false).await;
    assert!(aggregate.connected.is_empty());
    assert_eq!(aggregate.failures[0].hint, FailureHint::ExitedImmediately);
}

#[tokio::test]
async fn test_list_failure_removes_connection() {
    let supervisor = supervisor();
    let configs = vec![mock("nolist", &["--fail-list"])];

    let aggregate = supervisor.connect_all(&configs, false).await;
    assert!(aggregate.connected.is_empty());
    assert_eq!(aggregate.failures.len(), 1);
    assert!(aggregate.failures[0].error.contains("tool listing unavailable"));
    assert!(supervisor.connection("nolist").is_none());
}

#[tokio::test]
async fn test_collision_between_real_servers() {
    let supervisor = supervisor();
    let configs = vec![
        mock("first", &["--tools", "echo,add"]),
        mock("second", &["--tools", "echo"]),
    ];

    let aggregate = supervisor.connect_all(&configs, false).await;
    assert_eq!(aggregate.registry.resolve("echo"), Some("second"));
    assert_eq!(aggregate.registry.resolve("add"), Some("first"));
    let collisions = aggregate.registry.collisions();
    assert_eq!(collisions.len(), 1);
    assert_eq!(collisions[0].winner, "second");
    assert_eq!(collisions[0].loser, "first");

    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn test_connection_reused_across_runs() {
    let supervisor = supervisor();
    let configs = vec![mock("alpha", &["--tools", "echo"])];

    let first = supervisor.connect_all(&configs, false).await;
    assert!(first.reused.is_empty());
    let second = supervisor.connect_all(&configs, false).await;
    assert_eq!(second.reused, vec!["alpha"]);
    assert_eq!(second.registry.resolve("echo"), Some("alpha"));

    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn test_edited_server_is_relaunched() {
    let supervisor = supervisor();

    let first = supervisor
        .connect_all(&[mock("srv", &["--tools", "echo"])], false)
        .await;
    assert_eq!(first.registry.resolve("echo"), Some("srv"));

    let edited = supervisor
        .connect_all(&[mock("srv", &["--tools", "add"])], false)
        .await;
    assert!(edited.reused.is_empty());
    assert_eq!(edited.connected, vec!["srv"]);
    assert_eq!(edited.registry.resolve("add"), Some("srv"));
    assert_eq!(edited.registry.resolve("echo"), None);
    assert_eq!(supervisor.connection_count(), 1);

    let env_changed = supervisor
        .connect_all(
            &[mock("srv", &["--tools", "add"]).with_env_var("SWITCHBOARD_TEST_VALUE", "1")],
            false,
        )
        .await;
    assert!(env_changed.reused.is_empty());

    let unchanged = supervisor
        .connect_all(
            &[mock("srv", &["--tools", "add"]).with_env_var("SWITCHBOARD_TEST_VALUE", "1")],
            false,
        )
        .await;
    assert_eq!(unchanged.reused, vec!["srv"]);

    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn test_crashed_server_is_relaunched() {
    let supervisor = supervisor();
    let configs = vec![mock("crashy", &["--tools", "echo,crash"])];

    let first = supervisor.connect_all(&configs, false).await;
    let dispatcher = dispatcher(&supervisor, first);
    let payload = dispatcher.invoke(ToolCall::new("crash", None)).await;
    assert!(payload.is_error);

    let second = supervisor.connect_all(&configs, false).await;
    assert_eq!(second.connected, vec!["crashy"]);
    assert!(second.reused.is_empty());

    let dispatcher = self::dispatcher(&supervisor, second);
    let payload = dispatcher
        .invoke(ToolCall::new("echo", Some(json!({"message": "back"}))))
        .await;
    assert_eq!(payload.content, "back");

    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn test_dispatch_retries_until_success() {
    let supervisor = supervisor();
    let configs = vec![mock("flaky", &["--tools", "flaky", "--fail-times", "2"])];

    let aggregate = supervisor.connect_all(&configs, false).await;
    let payload = dispatcher(&supervisor, aggregate)
        .invoke(ToolCall::new("flaky", None))
        .await;

    assert!(!payload.is_error);
    assert_eq!(payload.attempts, 3);
    assert_eq!(payload.content, "flaky ok after 3 calls");

    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn test_dispatch_exhaustion_after_crash() {
    let supervisor = supervisor();
    let configs = vec![mock("dies", &["--tools", "echo", "--crash-on", "echo"])];

    let aggregate = supervisor.connect_all(&configs, false).await;
    let payload = dispatcher(&supervisor, aggregate)
        .invoke(ToolCall::new("echo", Some(json!({"message": "x"}))))
        .await;

    assert!(payload.is_error);
    assert_eq!(payload.attempts, 4);
    assert!(payload.content.starts_with("Error executing tool echo after 4 attempts:"));
}

#[tokio::test]
async fn test_call_timeout() {
    let supervisor = supervisor();
    let configs = vec![mock("sleepy", &["--tools", "echo", "--slow-tool", "echo:2000"])];

    let aggregate = supervisor.connect_all(&configs, false).await;
    let payload = Dispatcher::new(Arc::new(aggregate.registry), supervisor.connections())
        .with_config(DispatchConfig {
            max_retries: 0,
            retry_delay: Duration::from_millis(10),
            call_timeout: Duration::from_millis(200),
        })
        .invoke(ToolCall::new("echo", Some(json!({"message": "late"}))))
        .await;

    assert!(payload.is_error);
    assert_eq!(payload.attempts, 1);
    assert!(payload.content.contains("timeout"));

    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn test_result_shapes_normalized() {
    let supervisor = supervisor();
    let configs = vec![mock(
        "shapes",
        &["--tools", "echo,text_result,object_result,empty_result"],
    )];

    let aggregate = supervisor.connect_all(&configs, false).await;
    let dispatcher = dispatcher(&supervisor, aggregate);

    let cases = [
        ("text_result", "plain text".to_string()),
        ("object_result", r#"{"foo":1}"#.to_string()),
        ("empty_result", EMPTY_CONTENT_TEXT.to_string()),
    ];
    for (tool, expected) in cases {
        let payload = dispatcher.invoke(ToolCall::new(tool, None)).await;
        assert_eq!(payload.content, expected, "tool {tool}");
        assert!(!payload.is_error);
    }

    let unknown = dispatcher.invoke(ToolCall::new("not_a_tool", None)).await;
    assert_eq!(unknown.attempts, 0);

    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn test_allowed_directories_rewrite() {
    let supervisor = supervisor();
    let dirs = std::env::join_paths(["/data/a", "/data/b"]).unwrap();
    let configs = vec![
        mock("filesystem", &["--tools", "argv", "{ALLOWED_DIRECTORIES}"])
            .with_env_var("ALLOWED_DIRECTORIES", dirs.to_string_lossy()),
    ];

    let aggregate = supervisor.connect_all(&configs, false).await;
    let payload = dispatcher(&supervisor, aggregate)
        .invoke(ToolCall::new("argv", None))
        .await;

    let argv: Vec<String> = serde_json::from_str(&payload.content).unwrap();
    assert_eq!(argv, vec!["--tools", "argv", "/data/a", "/data/b"]);

    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn test_child_environment_overrides() {
    let supervisor = supervisor();
    let configs = vec![
        mock("envy", &["--tools", "env"])
            .with_env_var("SWITCHBOARD_TEST_VALUE", "42")
            .without_env_var("PATH"),
    ];

    let aggregate = supervisor.connect_all(&configs, false).await;
    let dispatcher = dispatcher(&supervisor, aggregate);

    let value = dispatcher
        .invoke(ToolCall::new("env", Some(json!({"name": "SWITCHBOARD_TEST_VALUE"}))))
        .await;
    assert_eq!(value.content, "42");

    let removed = dispatcher
        .invoke(ToolCall::new("env", Some(json!({"name": "PATH"}))))
        .await;
    assert_eq!(removed.content, "<unset>");

    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn test_web_search_server_skipped_when_disabled() {
    let supervisor = supervisor();
    let configs = vec![
        mock("brave-search", &["--tools", "echo"]),
        mock("plain", &["--tools", "add"]),
    ];

    let off = supervisor.connect_all(&configs, false).await;
    assert_eq!(off.connected, vec!["plain"]);
    assert!(off.registry.resolve("echo").is_none());
    assert!(supervisor.connection("brave-search").is_none());

    let on = supervisor.connect_all(&configs, true).await;
    assert_eq!(on.connected, vec!["brave-search", "plain"]);
    assert_eq!(on.reused, vec!["plain"]);

    supervisor.shutdown_all().await;
}

#[tokio::test]
async fn test_argv_tool_reports_json_array() {
    let mut client = launch(&["--tools", "argv", "extra"]).await;
    client.initialize().await.unwrap();
    let result = client
        .call_tool("argv", None, Duration::from_secs(5))
        .await
        .unwrap();
    let parsed: Value = serde_json::from_str(&result.content().normalize()).unwrap();
    assert_eq!(parsed, json!(["--tools", "argv", "extra"]));
}
