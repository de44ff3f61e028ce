//! Integration tests for the run command: app server plus watch mode.

mod common;

use std::fs;
use std::net::TcpListener;
use std::time::Duration;

use common::{is_empty_dir, Project, ScriptedCompiler};
use kiln_cli::commands::{run, WatchOptions};
use kiln_cli::dev::LIVE_RELOAD_PATH;
use kiln_compiler::RebuildEvent;
use kiln_config::BuildMode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::sleep;

fn pick_available_port() -> u16 {
    TcpListener::bind(("127.0.0.1", 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

async fn http_get(port: u16, path: &str) -> Option<String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.ok()?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.ok()?;
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.ok()?;
    Some(String::from_utf8_lossy(&response).into_owned())
}

async fn get_until(port: u16, path: &str, needle: &str) -> String {
    let mut last = String::new();
    for _ in 0..500 {
        if let Some(response) = http_get(port, path).await {
            if response.contains(needle) {
                return response;
            }
            last = response;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("never saw {needle:?} at {path}, last response:\n{last}");
}

#[tokio::test]
async fn test_run_serves_fresh_output_after_rebuild() {
    let project = Project::new();
    let loader = project.loader();
    let compiler = ScriptedCompiler::default();
    let port = pick_available_port();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let index = project.config.server_output_directory.join("index.html");

    let running = run(
        project.root(),
        BuildMode::Development,
        port,
        &loader,
        &compiler,
        WatchOptions {
            notify_port: 0,
            on_rebuild_start: None,
        },
        async {
            let _ = stop_rx.await;
        },
    );

    let scenario = async {
        let first = get_until(port, "/", "v1").await;
        assert!(first.contains(LIVE_RELOAD_PATH));
        assert!(first.to_ascii_lowercase().contains("cache-control: no-cache"));

        // Cached until a rebuild purges the registry
        fs::write(&index, "<html><body>v2</body></html>").unwrap();
        let cached = http_get(port, "/").await.unwrap();
        assert!(cached.contains("v1"));

        compiler.wait_until_watching().await;
        compiler.emit(RebuildEvent::Started);
        compiler.emit(RebuildEvent::Finished {
            duration: Duration::ZERO,
        });
        get_until(port, "/", "v2").await;

        let asset = http_get(port, "/build/_shared/entry.js").await.unwrap();
        assert!(asset.starts_with("HTTP/1.1 200"));

        stop_tx.send(()).unwrap();
    };

    let (result, ()) = tokio::join!(running, scenario);
    result.unwrap();

    assert!(is_empty_dir(&project.config.server_output_directory));
    assert!(http_get(port, "/").await.is_none());
}

#[tokio::test]
async fn test_run_fails_when_port_is_taken() {
    let project = Project::new();
    let loader = project.loader();
    let compiler = ScriptedCompiler::default();
    let held = TcpListener::bind(("0.0.0.0", 0)).unwrap();
    let port = held.local_addr().unwrap().port();

    let result = run(
        project.root(),
        BuildMode::Development,
        port,
        &loader,
        &compiler,
        WatchOptions {
            notify_port: 0,
            on_rebuild_start: None,
        },
        std::future::pending::<()>(),
    )
    .await;

    assert!(matches!(result, Err(kiln_cli::CliError::Bind { .. })));
    assert!(!compiler.is_watching());
}
